use thiserror::Error;

use crate::engine::EngineError;
use crate::repos::StoreError;

/// Error taxonomy of the clarification core. Every operation that crosses the
/// engine or store boundary returns one of these; the HTTP layer owns the
/// mapping to status codes.
#[derive(Debug, Error)]
pub enum ClarifyError {
    #[error("{0}")]
    Validation(String),
    #[error("resource not found")]
    NotFound,
    #[error("caller does not own this resource")]
    NotOwner,
    #[error("identical request was dispatched moments ago")]
    Duplicate { retry_after_ms: u64 },
    #[error("session was updated concurrently; reload and retry")]
    StaleSession,
    #[error("clarification engine failure: {0}")]
    Upstream(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ClarifyError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl From<EngineError> for ClarifyError {
    fn from(err: EngineError) -> Self {
        Self::Upstream(err.surface_message())
    }
}
