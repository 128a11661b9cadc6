//! Per-definition registry of reply types.

use std::collections::HashSet;

use durable::TERMINAL_FAILURE_TYPE;

use crate::error::{Result, SagaError};

/// The reply type names a saga definition understands.
///
/// Resolution order: an exact registered name, then (for failed replies
/// only) the generic [`TERMINAL_FAILURE_TYPE`] fallback, otherwise
/// [`SagaError::MissingReplyType`].
#[derive(Debug, Clone)]
pub struct ReplyTypeRegistry {
    types: HashSet<String>,
    failure_fallback: bool,
}

impl ReplyTypeRegistry {
    /// A registry knowing only the terminal-failure type, with fallback enabled.
    pub fn new() -> Self {
        let mut types = HashSet::new();
        types.insert(TERMINAL_FAILURE_TYPE.to_string());
        Self {
            types,
            failure_fallback: true,
        }
    }

    pub fn register(&mut self, type_name: impl Into<String>) {
        self.types.insert(type_name.into());
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains(type_name)
    }

    /// Disables the catch-all for unregistered failure types.
    pub fn disable_failure_fallback(&mut self) {
        self.failure_fallback = false;
    }

    /// Resolves the declared type of a reply to a registered name.
    pub fn resolve<'a>(&self, type_name: &'a str, success: bool) -> Result<&'a str> {
        if self.contains(type_name) {
            Ok(type_name)
        } else if !success && self.failure_fallback {
            tracing::debug!(%type_name, "unregistered failure reply, using terminal failure fallback");
            Ok(TERMINAL_FAILURE_TYPE)
        } else {
            Err(SagaError::MissingReplyType(type_name.to_string()))
        }
    }
}

impl Default for ReplyTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
