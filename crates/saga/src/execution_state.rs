//! Cursor describing where an instance is within its step sequence.

use serde::{Deserialize, Serialize};

use crate::state::SagaStatus;

/// Position and direction of a saga instance within its definition.
///
/// Values are immutable; transitions return a new state. `compensating`
/// flips from false to true at most once and never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaExecutionState {
    currently_executing: i64,
    compensating: bool,
    #[serde(default)]
    end_state: bool,
}

impl SagaExecutionState {
    /// The state before the first step, moving forward.
    pub fn new() -> Self {
        Self {
            currently_executing: -1,
            compensating: false,
            end_state: false,
        }
    }

    /// A state positioned at `currently_executing`.
    pub fn at(currently_executing: i64, compensating: bool) -> Self {
        Self {
            currently_executing,
            compensating,
            end_state: false,
        }
    }

    /// Index of the step last attempted, or -1 before the first step.
    pub fn currently_executing(&self) -> i64 {
        self.currently_executing
    }

    pub fn is_compensating(&self) -> bool {
        self.compensating
    }

    pub fn is_end_state(&self) -> bool {
        self.end_state
    }

    /// +1 while executing actions, -1 while compensating.
    pub fn direction(&self) -> i64 {
        if self.compensating { -1 } else { 1 }
    }

    /// Advances by `size` steps in the current direction.
    ///
    /// `size` is one plus the number of skipped steps, so skipped steps are
    /// never revisited.
    pub fn next_state(&self, size: usize) -> Self {
        let size = i64::try_from(size).unwrap_or(i64::MAX);
        Self {
            currently_executing: self
                .currently_executing
                .saturating_add(self.direction().saturating_mul(size)),
            compensating: self.compensating,
            end_state: false,
        }
    }

    /// Switches to the backward direction at the current index.
    pub fn start_compensating(&self) -> Self {
        Self {
            currently_executing: self.currently_executing,
            compensating: true,
            end_state: false,
        }
    }

    /// Marks the sequence as finished in the current direction.
    pub fn make_end_state(&self) -> Self {
        Self {
            end_state: true,
            ..*self
        }
    }

    /// Lifecycle status implied by this cursor.
    pub fn status(&self) -> SagaStatus {
        SagaStatus::from(self)
    }
}

impl Default for SagaExecutionState {
    fn default() -> Self {
        Self::new()
    }
}
