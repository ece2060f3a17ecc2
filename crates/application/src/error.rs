use domain::{DomainError, RepositoryError, RoomId};
use thiserror::Error;
use validator::ValidationErrors;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },
    #[error("forbidden: {action}")]
    Forbidden { action: &'static str },
    #[error("room {room_id} is full ({max} participants)")]
    CapacityExceeded { room_id: RoomId, max: u32 },
    #[error("validation failed: {field}: {reason}")]
    Validation { field: String, reason: String },
    #[error("authentication failed")]
    Authentication,
    #[error("storage error: {0}")]
    Storage(String),
}

impl ApplicationError {
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    pub fn forbidden(action: &'static str) -> Self {
        Self::Forbidden { action }
    }

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// 客户端可见的稳定错误码，HTTP 与 WebSocket 共用
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Authentication => "UNAUTHORIZED",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }
}

impl From<DomainError> for ApplicationError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::InvalidArgument { field, reason } => Self::Validation { field, reason },
        }
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound => Self::not_found("record", "unknown"),
            RepositoryError::Conflict => Self::Storage("conflicting write".to_string()),
            RepositoryError::Storage { message } => Self::Storage(message),
        }
    }
}

impl From<ValidationErrors> for ApplicationError {
    fn from(value: ValidationErrors) -> Self {
        let field = value
            .field_errors()
            .keys()
            .next()
            .map(|field| field.to_string())
            .unwrap_or_else(|| "payload".to_string());
        Self::Validation {
            field,
            reason: value.to_string(),
        }
    }
}
