//! Saga steps: a forward action, an optional compensation and reply handlers.

use std::collections::HashMap;

use durable::ParticipantCall;

use crate::error::{HandlerResult, Result};

/// Local handler: mutates the saga data and awaits nothing.
pub type LocalFn<D> = Box<dyn Fn(&mut D) -> HandlerResult + Send + Sync>;

/// Participant handler: builds the call a step wants to make.
pub type ParticipantFn<D> = Box<dyn Fn(&D) -> HandlerResult<ParticipantCall> + Send + Sync>;

/// Guard deciding whether a compensation applies to the current data.
pub type Predicate<D> = Box<dyn Fn(&D) -> bool + Send + Sync>;

/// Decodes a reply payload and applies it to the saga data.
pub type ReplyHandler<D> = Box<dyn Fn(&mut D, &[u8]) -> Result<()> + Send + Sync>;

/// A step action or compensation, tagged by how it runs.
pub enum StepHandler<D> {
    Local(LocalFn<D>),
    Participant(ParticipantFn<D>),
}

impl<D> StepHandler<D> {
    pub fn is_local(&self) -> bool {
        matches!(self, StepHandler::Local(_))
    }
}

impl<D> std::fmt::Debug for StepHandler<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepHandler::Local(_) => f.write_str("Local"),
            StepHandler::Participant(_) => f.write_str("Participant"),
        }
    }
}

/// One unit of a saga definition.
pub struct SagaStep<D> {
    pub(crate) action: Option<StepHandler<D>>,
    pub(crate) compensation: Option<StepHandler<D>>,
    pub(crate) compensation_predicate: Option<Predicate<D>>,
    pub(crate) action_reply_handlers: HashMap<String, ReplyHandler<D>>,
    pub(crate) compensation_reply_handlers: HashMap<String, ReplyHandler<D>>,
}

impl<D> SagaStep<D> {
    pub(crate) fn empty() -> Self {
        Self {
            action: None,
            compensation: None,
            compensation_predicate: None,
            action_reply_handlers: HashMap::new(),
            compensation_reply_handlers: HashMap::new(),
        }
    }

    /// Returns true if the step runs something in the forward direction.
    pub fn has_action(&self, _data: &D) -> bool {
        self.action.is_some()
    }

    /// Returns true if the step has a compensation whose predicate holds.
    pub fn has_compensation(&self, data: &D) -> bool {
        self.compensation.is_some()
            && self
                .compensation_predicate
                .as_ref()
                .is_none_or(|predicate| predicate(data))
    }

    /// The handler for the given direction.
    pub fn handler(&self, compensating: bool) -> Option<&StepHandler<D>> {
        if compensating {
            self.compensation.as_ref()
        } else {
            self.action.as_ref()
        }
    }

    /// The reply handler registered for `type_name` in the given direction.
    pub fn reply_handler(&self, type_name: &str, compensating: bool) -> Option<&ReplyHandler<D>> {
        if compensating {
            self.compensation_reply_handlers.get(type_name)
        } else {
            self.action_reply_handlers.get(type_name)
        }
    }
}

impl<D> std::fmt::Debug for SagaStep<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut action_replies: Vec<_> = self.action_reply_handlers.keys().collect();
        action_replies.sort();
        let mut compensation_replies: Vec<_> = self.compensation_reply_handlers.keys().collect();
        compensation_replies.sort();
        f.debug_struct("SagaStep")
            .field("action", &self.action)
            .field("compensation", &self.compensation)
            .field("has_predicate", &self.compensation_predicate.is_some())
            .field("action_replies", &action_replies)
            .field("compensation_replies", &compensation_replies)
            .finish()
    }
}
