//! Crate-wide error type
//!
//! Inner components raise their own `thiserror` enums (see
//! `services::llm::LLMError`, `services::queue::QueueError`, ...); `CoreError`
//! is the umbrella used at the outermost operation boundaries
//! (`transfer_to_jobs`, `evaluate_job`, `train`) so callers get one error
//! type regardless of which inner component failed. Mirrors the role
//! `utils::error::ApiError` plays in the teacher's handler layer.

use thiserror::Error;

use crate::services::llm::LLMError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    ValidationError(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("transient infrastructure failure: {0}")]
    TransientInfrastructure(String),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("response validation failed: {0}")]
    ValidationFailed(String),

    #[error("refused to overwrite protected job {job_id}")]
    ProtectedConflict { job_id: String },

    #[error("ambiguous match: {0}")]
    AmbiguousMatch(String),

    #[error("configuration error: {0}")]
    ConfigurationError(String),

    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),

    #[error("database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("LLM error: {0}")]
    Llm(#[from] LLMError),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl CoreError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation_error(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Whether this error is one the caller should retry on a backoff,
    /// as opposed to one that represents a permanent/logical failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientInfrastructure(_) | Self::RateLimited { .. } | Self::DatabaseError(_)
        )
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
