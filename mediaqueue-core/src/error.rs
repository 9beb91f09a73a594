//! The closed error-kind set surfaced across component boundaries (spec §7).
//!
//! Component-internal errors (a `reqwest::Error` inside a webhook retry
//! loop, an `std::io::Error` while walking a watchfolder) are mapped into
//! one of these variants at the point they cross into executor/scheduler
//! visible code; they never leak their original type past that boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("store unreachable: {0}")]
    TransientStore(String),

    #[error("ffmpeg failed: {0}")]
    SubprocessFailure(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("hook failed: {0}")]
    HookFailure(String),

    #[error("webhook delivery failed: {0}")]
    WebhookDeliveryFailed(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => CoreError::NotFound(err.to_string()),
            other => CoreError::TransientStore(other.to_string()),
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::HookFailure(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
