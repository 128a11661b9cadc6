use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

use crate::{ExecutionId, ParticipantCall, ReplyEnvelope, Result};

/// Per-execution handle onto the durable substrate.
///
/// A context is scoped to one saga instance, so storage keys are fixed names
/// rather than instance IDs. Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait DurableContext: Send + Sync {
    /// The execution this context belongs to.
    fn execution_id(&self) -> ExecutionId;

    /// Invokes a participant operation and returns its reply.
    ///
    /// Calls carrying an idempotency key that already completed in this
    /// execution must return the recorded reply without invoking the
    /// participant again. Transient failures are retried by the substrate;
    /// only terminal failures or exhausted retries come back as errors.
    async fn call_participant(&self, call: &ParticipantCall) -> Result<ReplyEnvelope>;

    /// Durably stores a blob under `key`, replacing any previous value.
    async fn persist(&self, key: &str, bytes: Vec<u8>) -> Result<()>;

    /// Returns the blob stored under `key`, if any.
    async fn restore(&self, key: &str) -> Result<Option<Vec<u8>>>;
}

/// Extension trait providing JSON helpers for durable contexts.
#[async_trait]
pub trait DurableContextExt: DurableContext {
    /// Encodes `value` as JSON and persists it.
    async fn persist_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.persist(key, bytes).await
    }

    /// Restores and decodes a JSON value.
    async fn restore_json<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self.restore(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

// Blanket implementation for all DurableContext implementations
impl<T: DurableContext + ?Sized> DurableContextExt for T {}
