//! Fluent construction of saga definitions.
//!
//! ```ignore
//! let definition = SagaDefinition::builder("CreateOrder")
//!     .step()
//!     .invoke_local(|order: &mut Order| { order.pending = true; Ok(()) })
//!     .compensate_local(|order: &mut Order| { order.pending = false; Ok(()) })
//!     .step()
//!     .invoke_participant(|order: &Order| Ok(ParticipantCall::new("customer", "reserve", &order.total)?))
//!     .on_reply("CreditRejected", |order: &mut Order, r: CreditRejected| order.reason = Some(r.reason))
//!     .build()?;
//! ```

use serde::de::DeserializeOwned;

use durable::ParticipantCall;

use crate::definition::SagaDefinition;
use crate::error::{HandlerResult, Result, SagaError};
use crate::reply::ReplyTypeRegistry;
use crate::step::{SagaStep, StepHandler};

/// Builds an ordered, immutable list of steps.
///
/// Construction problems (empty reply type names, steps with nothing to run,
/// handlers declared twice) are collected and reported by `build`.
pub struct SagaDefinitionBuilder<D> {
    saga_type: String,
    steps: Vec<SagaStep<D>>,
    reply_types: ReplyTypeRegistry,
    errors: Vec<String>,
}

impl<D: 'static> SagaDefinitionBuilder<D> {
    pub fn new(saga_type: impl Into<String>) -> Self {
        Self {
            saga_type: saga_type.into(),
            steps: Vec::new(),
            reply_types: ReplyTypeRegistry::new(),
            errors: Vec::new(),
        }
    }

    /// Begins a new step.
    pub fn step(self) -> StepBuilder<D> {
        StepBuilder {
            parent: self,
            step: SagaStep::empty(),
        }
    }

    /// Declares a reply type that has no handler but must still resolve.
    pub fn reply_type(mut self, type_name: &str) -> Self {
        self.register_reply_type(type_name);
        self
    }

    /// Rejects failed replies of unregistered types instead of treating
    /// them as terminal failures.
    pub fn strict_reply_types(mut self) -> Self {
        self.reply_types.disable_failure_fallback();
        self
    }

    /// Validates and produces the definition.
    pub fn build(self) -> Result<SagaDefinition<D>> {
        if self.steps.is_empty() {
            return Err(SagaError::InvalidDefinition(format!(
                "saga '{}' has no steps",
                self.saga_type
            )));
        }
        if !self.errors.is_empty() {
            return Err(SagaError::InvalidDefinition(self.errors.join("; ")));
        }
        Ok(SagaDefinition::new(
            self.saga_type,
            self.steps,
            self.reply_types,
        ))
    }

    fn register_reply_type(&mut self, type_name: &str) -> bool {
        if type_name.trim().is_empty() {
            self.errors.push(format!(
                "step {} registers a reply type without a name",
                self.steps.len()
            ));
            return false;
        }
        self.reply_types.register(type_name);
        true
    }

    fn add_step(&mut self, step: SagaStep<D>) {
        let index = self.steps.len();
        if step.action.is_none() && step.compensation.is_none() {
            self.errors
                .push(format!("step {index} has neither an action nor a compensation"));
        }
        if step.compensation_predicate.is_some() && step.compensation.is_none() {
            self.errors
                .push(format!("step {index} has a compensation predicate but no compensation"));
        }
        self.steps.push(step);
    }
}

/// Builder scoped to one step of a [`SagaDefinitionBuilder`].
pub struct StepBuilder<D> {
    parent: SagaDefinitionBuilder<D>,
    step: SagaStep<D>,
}

impl<D: 'static> StepBuilder<D> {
    /// Forward action computed locally.
    pub fn invoke_local<F>(self, action: F) -> Self
    where
        F: Fn(&mut D) -> HandlerResult + Send + Sync + 'static,
    {
        self.with_action(StepHandler::Local(Box::new(action)))
    }

    /// Forward action performed by a participant.
    pub fn invoke_participant<F>(self, action: F) -> Self
    where
        F: Fn(&D) -> HandlerResult<ParticipantCall> + Send + Sync + 'static,
    {
        self.with_action(StepHandler::Participant(Box::new(action)))
    }

    /// Compensation computed locally.
    pub fn compensate_local<F>(self, compensation: F) -> Self
    where
        F: Fn(&mut D) -> HandlerResult + Send + Sync + 'static,
    {
        self.with_compensation(StepHandler::Local(Box::new(compensation)))
    }

    /// Compensation performed by a participant.
    pub fn compensate_participant<F>(self, compensation: F) -> Self
    where
        F: Fn(&D) -> HandlerResult<ParticipantCall> + Send + Sync + 'static,
    {
        self.with_compensation(StepHandler::Participant(Box::new(compensation)))
    }

    /// Only compensate this step when `predicate` holds for the saga data.
    pub fn compensation_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&D) -> bool + Send + Sync + 'static,
    {
        self.step.compensation_predicate = Some(Box::new(predicate));
        self
    }

    /// Registers a handler for replies declared as `type_name`.
    ///
    /// The handler lands on the compensation side if a compensation is
    /// already attached to this step, otherwise on the action side, so call
    /// `compensate_*` first for compensation replies.
    pub fn on_reply<T, F>(mut self, type_name: &str, handler: F) -> Self
    where
        T: DeserializeOwned + 'static,
        F: Fn(&mut D, T) + Send + Sync + 'static,
    {
        if !self.parent.register_reply_type(type_name) {
            return self;
        }

        let owned_name = type_name.to_string();
        let reply_handler = Box::new(move |data: &mut D, payload: &[u8]| -> Result<()> {
            let reply: T =
                serde_json::from_slice(payload).map_err(|source| SagaError::ReplyPayload {
                    type_name: owned_name.clone(),
                    source,
                })?;
            handler(data, reply);
            Ok(())
        });

        let compensating = self.step.compensation.is_some();
        let handlers = if compensating {
            &mut self.step.compensation_reply_handlers
        } else {
            &mut self.step.action_reply_handlers
        };
        if handlers.contains_key(type_name) {
            let side = if compensating { "compensation" } else { "action" };
            let index = self.parent.steps.len();
            self.parent.errors.push(format!(
                "step {index} declares more than one {side} handler for reply '{type_name}'"
            ));
        } else {
            handlers.insert(type_name.to_string(), reply_handler);
        }
        self
    }

    /// Declares a reply type this step expects without handling it.
    pub fn reply_type(mut self, type_name: &str) -> Self {
        self.parent.register_reply_type(type_name);
        self
    }

    /// Finalizes this step and begins the next one.
    pub fn step(mut self) -> StepBuilder<D> {
        self.parent.add_step(self.step);
        self.parent.step()
    }

    /// Finalizes this step and builds the definition.
    pub fn build(mut self) -> Result<SagaDefinition<D>> {
        self.parent.add_step(self.step);
        self.parent.build()
    }

    fn with_action(mut self, handler: StepHandler<D>) -> Self {
        if self.step.action.is_some() {
            let index = self.parent.steps.len();
            self.parent
                .errors
                .push(format!("step {index} declares more than one action"));
        }
        self.step.action = Some(handler);
        self
    }

    fn with_compensation(mut self, handler: StepHandler<D>) -> Self {
        if self.step.compensation.is_some() {
            let index = self.parent.steps.len();
            self.parent
                .errors
                .push(format!("step {index} declares more than one compensation"));
        }
        self.step.compensation = Some(handler);
        self
    }
}
