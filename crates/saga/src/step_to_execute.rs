//! Resolution of the next step to run.

use crate::actions::{SagaActions, SagaStepOutcome};
use crate::execution_state::SagaExecutionState;
use crate::step::{SagaStep, StepHandler};

/// The next applicable step, plus how many inapplicable steps were skipped
/// on the way to it.
#[derive(Debug)]
pub struct StepToExecute<'a, D> {
    step: Option<&'a SagaStep<D>>,
    skipped: usize,
    compensating: bool,
}

impl<'a, D: Clone> StepToExecute<'a, D> {
    pub(crate) fn new(step: Option<&'a SagaStep<D>>, skipped: usize, compensating: bool) -> Self {
        Self {
            step,
            skipped,
            compensating,
        }
    }

    /// True when no applicable step is left in the current direction.
    pub fn is_empty(&self) -> bool {
        self.step.is_none()
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Distance the cursor moves to reach the step: `1 + skipped`, or 0.
    pub fn size(&self) -> usize {
        if self.step.is_some() {
            1 + self.skipped
        } else {
            0
        }
    }

    /// Attempts the step and packages the resulting actions.
    ///
    /// Local handlers run against a copy of `data`, so a failing handler
    /// leaves the committed data untouched. Participant handlers only build
    /// the call; the manager performs it after persisting.
    pub fn execute_step(&self, data: &D, current_state: &SagaExecutionState) -> SagaActions<D> {
        let new_state = current_state.next_state(self.size());
        let handler = self.step.and_then(|step| step.handler(self.compensating));

        match handler {
            Some(StepHandler::Local(local)) => {
                let mut updated = data.clone();
                match local(&mut updated) {
                    Ok(()) => SagaActions::make_step_execution(
                        new_state,
                        Some(updated),
                        SagaStepOutcome::Local,
                    ),
                    Err(e) => SagaActions::make_step_execution(
                        new_state,
                        None,
                        SagaStepOutcome::LocalFailure(e),
                    ),
                }
            }
            Some(StepHandler::Participant(build_call)) => match build_call(data) {
                Ok(call) => SagaActions::make_step_execution(
                    new_state,
                    None,
                    SagaStepOutcome::Participant(call),
                ),
                Err(e) => SagaActions::make_step_execution(
                    new_state,
                    None,
                    SagaStepOutcome::LocalFailure(e),
                ),
            },
            None => SagaActions::make_end_state(current_state),
        }
    }
}
