use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one durable execution.
///
/// A saga instance runs inside exactly one execution. Participant
/// idempotency keys are scoped by this ID, so two instances of the same
/// saga type never share journal entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(Uuid);

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Prefixes `key` with this execution: `"{execution}:{key}"`.
    pub fn scoped(&self, key: impl fmt::Display) -> String {
        format!("{}:{key}", self.0)
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
