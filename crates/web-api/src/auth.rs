//! JWT 校验
//!
//! 服务端只校验令牌；`generate_token` 供测试和运维工具签发。

use application::{ApplicationError, IdentityVerifier};
use axum::http::{header::AUTHORIZATION, HeaderMap};
use config::JwtConfig;
use domain::UserId;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: i64,
}

#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_ref());
        let decoding_key = DecodingKey::from_secret(config.secret.as_ref());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    pub fn generate_token(&self, user_id: UserId) -> Result<String, ApiError> {
        let exp = chrono::Utc::now() + chrono::Duration::hours(self.config.expiration_hours);
        let claims = Claims {
            sub: Uuid::from(user_id),
            exp: exp.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|err| ApiError::internal_server_error(format!("token generation failed: {err}")))
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|token_data| token_data.claims)
    }
}

impl IdentityVerifier for JwtService {
    fn verify(&self, credential: &str) -> Result<UserId, ApplicationError> {
        self.verify_token(credential)
            .map(|claims| UserId::from(claims.sub))
            .map_err(|err| {
                tracing::debug!(error = %err, "token rejected");
                ApplicationError::Authentication
            })
    }
}

/// `Authorization: Bearer <token>` 中的令牌
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn service(hours: i64) -> JwtService {
        JwtService::new(JwtConfig {
            secret: "a-test-secret-that-is-long-enough-123".to_string(),
            expiration_hours: hours,
        })
    }

    #[test]
    fn issued_token_verifies_to_same_identity() {
        let jwt = service(1);
        let user_id = UserId::generate();
        let token = jwt.generate_token(user_id).unwrap();

        assert_eq!(jwt.verify(&token).unwrap(), user_id);
    }

    #[test]
    fn expired_or_foreign_tokens_are_rejected() {
        let user_id = UserId::generate();
        let expired = service(-2).generate_token(user_id).unwrap();
        assert!(matches!(
            service(1).verify(&expired),
            Err(ApplicationError::Authentication)
        ));

        let other = JwtService::new(JwtConfig {
            secret: "another-secret-that-is-long-enough-456".to_string(),
            expiration_hours: 1,
        });
        let foreign = other.generate_token(user_id).unwrap();
        assert!(service(1).verify(&foreign).is_err());
        assert!(service(1).verify("garbage").is_err());
    }

    #[test]
    fn bearer_token_requires_scheme() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Token abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers), Some("abc"));
    }
}
