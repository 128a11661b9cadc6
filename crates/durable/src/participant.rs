//! Participant services reachable from an in-memory durable context.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::{DurableError, ReplyEnvelope};

/// A service that saga steps invoke through the durable context.
#[async_trait]
pub trait Participant: Send + Sync {
    /// Handles one operation and returns the reply envelope.
    ///
    /// Domain failures are returned as `Ok` replies with `success = false`.
    /// `Err` is reserved for infrastructure failures: [`DurableError::Transient`]
    /// is retried by the substrate, everything else is terminal.
    async fn handle(&self, operation: &str, args: &[u8]) -> Result<ReplyEnvelope, DurableError>;
}

/// Adapts a synchronous closure into a [`Participant`].
pub struct FnParticipant<F> {
    handler: F,
}

impl<F> FnParticipant<F>
where
    F: Fn(&str, &[u8]) -> Result<ReplyEnvelope, DurableError> + Send + Sync,
{
    /// Wraps `handler`.
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<F> Participant for FnParticipant<F>
where
    F: Fn(&str, &[u8]) -> Result<ReplyEnvelope, DurableError> + Send + Sync,
{
    async fn handle(&self, operation: &str, args: &[u8]) -> Result<ReplyEnvelope, DurableError> {
        (self.handler)(operation, args)
    }
}

/// Participants addressable by service name.
#[derive(Clone, Default)]
pub struct ParticipantRegistry {
    participants: HashMap<String, Arc<dyn Participant>>,
}

impl ParticipantRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `participant` under `service`, replacing any previous one.
    pub fn register(&mut self, service: impl Into<String>, participant: Arc<dyn Participant>) {
        self.participants.insert(service.into(), participant);
    }

    /// Builder-style variant of [`register`](Self::register).
    pub fn with(mut self, service: impl Into<String>, participant: impl Participant + 'static) -> Self {
        self.register(service, Arc::new(participant));
        self
    }

    /// Looks up the participant for `service`.
    pub fn get(&self, service: &str) -> Option<Arc<dyn Participant>> {
        self.participants.get(service).cloned()
    }

    /// Returns the number of registered services.
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    /// Returns true if no service is registered.
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

impl std::fmt::Debug for ParticipantRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut services: Vec<_> = self.participants.keys().collect();
        services.sort();
        f.debug_struct("ParticipantRegistry")
            .field("services", &services)
            .finish()
    }
}
