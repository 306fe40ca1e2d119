use thiserror::Error;

use crate::shared::constants::GENERIC_FAILURE_REPLY;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Text shown to the chat user for this error.
    ///
    /// Caller-correctable failures carry their own message. Infrastructure
    /// failures are logged here and collapse into a generic apology so no
    /// internal detail reaches the chat.
    pub fn user_message(&self) -> String {
        match self {
            AppError::NotFound(msg)
            | AppError::Validation(msg)
            | AppError::BadRequest(msg)
            | AppError::Unauthorized(msg)
            | AppError::RateLimitExceeded(msg) => msg.clone(),
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                GENERIC_FAILURE_REPLY.to_string()
            }
            AppError::Storage(msg) => {
                tracing::error!("Storage error: {}", msg);
                GENERIC_FAILURE_REPLY.to_string()
            }
            AppError::ExternalServiceError(msg) => {
                tracing::error!("External service error: {}", msg);
                GENERIC_FAILURE_REPLY.to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                GENERIC_FAILURE_REPLY.to_string()
            }
        }
    }

    /// Whether the error is an infrastructure fault rather than a user mistake
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            AppError::Database(_)
                | AppError::Storage(_)
                | AppError::ExternalServiceError(_)
                | AppError::Internal(_)
        )
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Internal(format!("I/O error: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
