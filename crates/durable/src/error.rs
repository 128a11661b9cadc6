use thiserror::Error;

/// Errors surfaced by a durable execution context.
#[derive(Debug, Error)]
pub enum DurableError {
    /// The participant call failed unrecoverably and must not be retried.
    #[error("Terminal failure: {0}")]
    Terminal(String),

    /// A transient infrastructure failure that outlived the substrate's retries.
    #[error("Transient failure: {0}")]
    Transient(String),

    /// The durable key/value storage failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DurableError {
    /// Returns true if the failure is terminal (non-retryable).
    pub fn is_terminal(&self) -> bool {
        matches!(self, DurableError::Terminal(_))
    }
}

/// Result type for durable context operations.
pub type Result<T> = std::result::Result<T, DurableError>;
