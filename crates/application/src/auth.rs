use domain::UserId;

use crate::error::ApplicationError;

/// 校验握手凭证并返回身份。核心只校验，不签发凭证。
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, credential: &str) -> Result<UserId, ApplicationError>;
}
