//! Saga error types.

use durable::DurableError;
use thiserror::Error;

/// Boxed error returned by step handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result type returned by step handlers.
pub type HandlerResult<T = ()> = std::result::Result<T, HandlerError>;

/// Errors that can occur while building or running a saga.
///
/// Apart from transient and storage [`DurableError`]s, every variant is fatal: the
/// substrate must record the execution as failed instead of retrying it.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A compensation failed. Compensations are never compensated.
    #[error("Compensation for step {step} failed: {reason}")]
    CompensationFailed { step: i64, reason: String },

    /// A reply arrived for a step index the definition does not have.
    #[error("Reply for step {index} but the saga only has {steps} steps")]
    StepIndexOutOfRange { index: i64, steps: usize },

    /// A reply declared a type that is not registered with the definition.
    #[error("Missing entity for reply type '{0}'")]
    MissingReplyType(String),

    /// A reply payload did not decode into the registered type.
    #[error("Reply payload for '{type_name}' could not be decoded: {source}")]
    ReplyPayload {
        type_name: String,
        #[source]
        source: serde_json::Error,
    },

    /// The saga definition is malformed.
    #[error("Invalid saga definition: {0}")]
    InvalidDefinition(String),

    /// No persisted instance exists to resume.
    #[error("No saga instance stored under '{0}'")]
    InstanceNotFound(String),

    /// Durable context error.
    #[error("Durable context error: {0}")]
    Durable(#[from] DurableError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SagaError {
    /// Returns true if the substrate may retry the execution.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SagaError::Durable(DurableError::Transient(_) | DurableError::Storage(_))
        )
    }

    /// Returns true if a compensation failed.
    pub fn is_compensation_failure(&self) -> bool {
        matches!(self, SagaError::CompensationFailed { .. })
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
