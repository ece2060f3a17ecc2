use application::ApplicationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use validator::ValidationErrors;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        let status = match &error {
            ApplicationError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApplicationError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ApplicationError::CapacityExceeded { .. } => StatusCode::CONFLICT,
            ApplicationError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApplicationError::Authentication => StatusCode::UNAUTHORIZED,
            ApplicationError::Storage(message) => {
                tracing::error!(error = %message, "storage failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        ApiError::new(status, error.code(), error.to_string())
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        ApplicationError::from(errors).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::RoomId;

    #[test]
    fn application_errors_map_to_statuses() {
        let cases = [
            (ApplicationError::not_found("room", "x"), StatusCode::NOT_FOUND),
            (ApplicationError::forbidden("send"), StatusCode::FORBIDDEN),
            (
                ApplicationError::CapacityExceeded {
                    room_id: RoomId::generate(),
                    max: 2,
                },
                StatusCode::CONFLICT,
            ),
            (
                ApplicationError::validation("content", "too long"),
                StatusCode::BAD_REQUEST,
            ),
            (ApplicationError::Authentication, StatusCode::UNAUTHORIZED),
            (
                ApplicationError::Storage("down".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            let code = error.code();
            let api = ApiError::from(error);
            assert_eq!(api.status(), status);
            assert_eq!(api.body.code, code);
        }
    }
}
