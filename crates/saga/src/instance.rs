//! Per-execution saga data and cursor.

use serde::{Deserialize, Serialize};

use crate::execution_state::SagaExecutionState;
use crate::state::SagaStatus;

/// Business data plus the execution cursor of one saga run.
///
/// This is the blob the manager persists after every transition; its JSON
/// layout is `{"sagaData": ..., "currentState": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaInstance<D> {
    saga_data: D,
    current_state: SagaExecutionState,
}

impl<D> SagaInstance<D> {
    /// A fresh instance positioned before the first step.
    pub fn new(saga_data: D) -> Self {
        Self {
            saga_data,
            current_state: SagaExecutionState::new(),
        }
    }

    /// An instance at an explicit cursor.
    pub fn with_state(saga_data: D, current_state: SagaExecutionState) -> Self {
        Self {
            saga_data,
            current_state,
        }
    }

    pub fn data(&self) -> &D {
        &self.saga_data
    }

    pub fn data_mut(&mut self) -> &mut D {
        &mut self.saga_data
    }

    pub fn into_data(self) -> D {
        self.saga_data
    }

    pub fn state(&self) -> &SagaExecutionState {
        &self.current_state
    }

    pub fn status(&self) -> SagaStatus {
        self.current_state.status()
    }

    pub(crate) fn set_state(&mut self, state: SagaExecutionState) {
        self.current_state = state;
    }

    pub(crate) fn set_data(&mut self, data: D) {
        self.saga_data = data;
    }
}
