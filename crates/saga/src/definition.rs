//! Saga definitions: the ordered step list and the transition algorithm.

use durable::{ParticipantCall, ReplyEnvelope, TerminalFailure};

use crate::actions::{SagaActions, SagaStepOutcome};
use crate::builder::SagaDefinitionBuilder;
use crate::error::{HandlerError, Result, SagaError};
use crate::execution_state::SagaExecutionState;
use crate::reply::ReplyTypeRegistry;
use crate::step::{SagaStep, StepHandler};
use crate::step_to_execute::StepToExecute;

/// An immutable, ordered list of steps plus the reply types they understand.
///
/// The definition owns the saga algorithm: given a cursor and the current
/// data it decides which step runs next, and given a participant reply it
/// decides whether to keep going, start compensating, or fail.
pub struct SagaDefinition<D> {
    saga_type: String,
    steps: Vec<SagaStep<D>>,
    reply_types: ReplyTypeRegistry,
}

impl<D: 'static> SagaDefinition<D> {
    /// Starts a fluent definition.
    pub fn builder(saga_type: impl Into<String>) -> SagaDefinitionBuilder<D> {
        SagaDefinitionBuilder::new(saga_type)
    }

    pub(crate) fn new(
        saga_type: String,
        steps: Vec<SagaStep<D>>,
        reply_types: ReplyTypeRegistry,
    ) -> Self {
        Self {
            saga_type,
            steps,
            reply_types,
        }
    }

    pub fn saga_type(&self) -> &str {
        &self.saga_type
    }

    pub fn steps(&self) -> &[SagaStep<D>] {
        &self.steps
    }

    pub fn reply_types(&self) -> &ReplyTypeRegistry {
        &self.reply_types
    }

    fn step_at(&self, index: i64) -> Result<&SagaStep<D>> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.steps.get(i))
            .ok_or(SagaError::StepIndexOutOfRange {
                index,
                steps: self.steps.len(),
            })
    }
}

impl<D: Clone + 'static> SagaDefinition<D> {
    /// Finds the next applicable step after the cursor, in its direction.
    ///
    /// Steps without an action (forward), or without an applicable
    /// compensation (backward), are skipped and counted.
    pub fn next_step_to_execute(
        &self,
        state: &SagaExecutionState,
        data: &D,
    ) -> StepToExecute<'_, D> {
        let compensating = state.is_compensating();
        let direction = state.direction();
        let len = self.steps.len() as i64;
        let mut skipped = 0;
        let mut index = state.currently_executing() + direction;

        while (0..len).contains(&index) {
            let step = &self.steps[index as usize];
            let applicable = if compensating {
                step.has_compensation(data)
            } else {
                step.has_action(data)
            };
            if applicable {
                return StepToExecute::new(Some(step), skipped, compensating);
            }
            tracing::debug!(saga_type = %self.saga_type, step = index, compensating, "skipping step");
            skipped += 1;
            index += direction;
        }

        StepToExecute::new(None, skipped, compensating)
    }

    /// Attempts the next applicable step, or ends the sequence.
    pub fn execute_next_step(&self, data: &D, state: &SagaExecutionState) -> SagaActions<D> {
        let step_to_execute = self.next_step_to_execute(state, data);
        if step_to_execute.is_empty() {
            SagaActions::make_end_state(state)
        } else {
            step_to_execute.execute_step(data, state)
        }
    }

    /// Entry point: moves forward from before the first step.
    pub fn start(&self, data: &D) -> SagaActions<D> {
        self.execute_next_step(data, &SagaExecutionState::new())
    }

    /// Applies a participant reply for the step at the cursor.
    ///
    /// The matching reply handler (action or compensation side, by the
    /// cursor's direction) mutates `data` in place; `after_handler` is told
    /// which reply type was handled.
    pub fn handle_reply(
        &self,
        state: &SagaExecutionState,
        data: &mut D,
        call: &ParticipantCall,
        reply: &ReplyEnvelope,
        after_handler: Option<&(dyn Fn(&str) + Send + Sync)>,
    ) -> Result<SagaActions<D>> {
        let index = state.currently_executing();
        let step = self.step_at(index)?;

        if let Some(declared) = reply.type_name.as_deref() {
            let type_name = self.reply_types.resolve(declared, reply.success)?;
            if let Some(handler) = step.reply_handler(type_name, state.is_compensating()) {
                tracing::debug!(
                    saga_type = %self.saga_type,
                    step = index,
                    service = %call.service,
                    operation = %call.operation,
                    reply_type = type_name,
                    "invoking reply handler"
                );
                if type_name == declared {
                    handler(&mut *data, reply.payload.as_deref().unwrap_or(b"null"))?;
                } else {
                    // The fallback handler expects a terminal failure payload.
                    let payload = serde_json::to_vec(&TerminalFailure {
                        message: format!("unregistered reply type '{declared}'"),
                    })?;
                    handler(&mut *data, payload.as_slice())?;
                }
                if let Some(after) = after_handler {
                    after(type_name);
                }
            }
        }

        let failure = (!reply.success).then(|| -> HandlerError {
            format!(
                "{}.{} replied {}",
                call.service,
                call.operation,
                reply.type_name.as_deref().unwrap_or("failure")
            )
            .into()
        });
        self.handle_actions(state, data, reply.success, failure)
    }

    /// Decides the next transition after a step succeeded or failed.
    pub fn handle_actions(
        &self,
        state: &SagaExecutionState,
        data: &D,
        success: bool,
        failure: Option<HandlerError>,
    ) -> Result<SagaActions<D>> {
        if success {
            return Ok(self.execute_next_step(data, state));
        }

        let reason = failure.map_or_else(|| "step failed".to_string(), |e| e.to_string());
        if state.is_compensating() {
            return Err(SagaError::CompensationFailed {
                step: state.currently_executing(),
                reason,
            });
        }

        tracing::warn!(
            saga_type = %self.saga_type,
            step = state.currently_executing(),
            %reason,
            "step failed, starting compensation"
        );
        Ok(self.execute_next_step(data, &state.start_compensating()))
    }

    /// Re-derives the actions for a persisted, non-terminal cursor.
    ///
    /// A participant step at the cursor has its call rebuilt so the substrate
    /// can answer it from the journal. A local step at the cursor was
    /// persisted only after it succeeded, so the saga moves on.
    pub fn resume_actions(&self, state: &SagaExecutionState, data: &D) -> Result<SagaActions<D>> {
        if state.currently_executing() < 0 {
            return Ok(self.start(data));
        }

        let step = self.step_at(state.currently_executing())?;
        match step.handler(state.is_compensating()) {
            Some(StepHandler::Participant(build_call)) => {
                let outcome = match build_call(data) {
                    Ok(call) => SagaStepOutcome::Participant(call),
                    Err(e) => SagaStepOutcome::LocalFailure(e),
                };
                Ok(SagaActions::make_step_execution(*state, None, outcome))
            }
            Some(StepHandler::Local(_)) => self.handle_actions(state, data, true, None),
            None => Err(SagaError::InvalidDefinition(format!(
                "persisted cursor points at step {} which has no {}",
                state.currently_executing(),
                if state.is_compensating() {
                    "compensation"
                } else {
                    "action"
                }
            ))),
        }
    }
}

impl<D> std::fmt::Debug for SagaDefinition<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SagaDefinition")
            .field("saga_type", &self.saga_type)
            .field("steps", &self.steps)
            .field("reply_types", &self.reply_types)
            .finish()
    }
}
