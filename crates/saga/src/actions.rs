//! The delta produced by attempting one step.

use durable::ParticipantCall;

use crate::error::HandlerError;
use crate::execution_state::SagaExecutionState;

/// What attempting a step produced.
#[derive(Debug)]
pub enum SagaStepOutcome {
    /// A local handler ran; nothing to await.
    Local,
    /// A local handler failed.
    LocalFailure(HandlerError),
    /// A participant must be called before the saga can move on.
    Participant(ParticipantCall),
}

impl SagaStepOutcome {
    pub fn is_local(&self) -> bool {
        !matches!(self, SagaStepOutcome::Participant(_))
    }
}

/// Result of one step decision, consumed by the saga manager.
#[derive(Debug)]
pub struct SagaActions<D> {
    pub compensating: bool,
    pub end_state: bool,
    pub updated_state: Option<SagaExecutionState>,
    pub updated_data: Option<D>,
    pub step_outcome: Option<SagaStepOutcome>,
}

impl<D> SagaActions<D> {
    /// The sequence is exhausted in the direction of `state`.
    pub fn make_end_state(state: &SagaExecutionState) -> Self {
        Self {
            compensating: state.is_compensating(),
            end_state: true,
            updated_state: Some(state.make_end_state()),
            updated_data: None,
            step_outcome: None,
        }
    }

    /// A step was attempted, moving the instance to `new_state`.
    pub fn make_step_execution(
        new_state: SagaExecutionState,
        updated_data: Option<D>,
        outcome: SagaStepOutcome,
    ) -> Self {
        Self {
            compensating: new_state.is_compensating(),
            end_state: false,
            updated_state: Some(new_state),
            updated_data,
            step_outcome: Some(outcome),
        }
    }

    /// Returns the participant call, if the step awaits one.
    pub fn participant_call(&self) -> Option<&ParticipantCall> {
        match &self.step_outcome {
            Some(SagaStepOutcome::Participant(call)) => Some(call),
            _ => None,
        }
    }

    pub fn is_local_failure(&self) -> bool {
        matches!(self.step_outcome, Some(SagaStepOutcome::LocalFailure(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_state_actions() {
        let state = SagaExecutionState::at(0, true);
        let actions = SagaActions::<()>::make_end_state(&state);
        assert!(actions.end_state);
        assert!(actions.compensating);
        assert!(actions.step_outcome.is_none());
        let updated = actions.updated_state.unwrap();
        assert!(updated.is_end_state());
        assert!(updated.is_compensating());
    }

    #[test]
    fn test_step_execution_actions() {
        let call = ParticipantCall::raw("svc", "op", vec![]);
        let actions = SagaActions::make_step_execution(
            SagaExecutionState::at(1, false),
            Some(5u32),
            SagaStepOutcome::Participant(call.clone()),
        );
        assert!(!actions.end_state);
        assert_eq!(actions.updated_data, Some(5));
        assert_eq!(actions.participant_call(), Some(&call));
        assert!(!actions.is_local_failure());
    }

    #[test]
    fn test_outcome_locality() {
        assert!(SagaStepOutcome::Local.is_local());
        assert!(SagaStepOutcome::LocalFailure("boom".into()).is_local());
        assert!(!SagaStepOutcome::Participant(ParticipantCall::raw("s", "o", vec![])).is_local());
    }
}
