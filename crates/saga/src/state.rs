//! Saga lifecycle status, derived from the execution cursor.

use serde::{Deserialize, Serialize};

use crate::execution_state::SagaExecutionState;

/// Where an instance is in its lifecycle.
///
/// ```text
/// Running ──┬──► Completed
///           └──► Compensating ──► RolledBack
/// ```
///
/// A fatal error leaves the persisted status at `Running` or `Compensating`;
/// the substrate records the failure, not the instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaStatus {
    Running,
    Compensating,
    Completed,
    RolledBack,
}

impl SagaStatus {
    /// True once no further step will run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaStatus::Completed | SagaStatus::RolledBack)
    }

    /// True while or after undoing completed steps.
    pub fn is_backward(&self) -> bool {
        matches!(self, SagaStatus::Compensating | SagaStatus::RolledBack)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Running => "running",
            SagaStatus::Compensating => "compensating",
            SagaStatus::Completed => "completed",
            SagaStatus::RolledBack => "rolled_back",
        }
    }
}

impl From<&SagaExecutionState> for SagaStatus {
    fn from(state: &SagaExecutionState) -> Self {
        match (state.is_compensating(), state.is_end_state()) {
            (false, false) => SagaStatus::Running,
            (true, false) => SagaStatus::Compensating,
            (false, true) => SagaStatus::Completed,
            (true, true) => SagaStatus::RolledBack,
        }
    }
}

impl std::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
