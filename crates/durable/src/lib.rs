//! Durable execution contract consumed by the saga engine.
//!
//! The engine never talks to the network or to storage directly. It goes
//! through a [`DurableContext`], which invokes participants, persists opaque
//! state and replays completed participant calls from its journal.

pub mod call;
pub mod context;
pub mod error;
pub mod memory;
pub mod participant;

pub use call::{ParticipantCall, ReplyEnvelope, TERMINAL_FAILURE_TYPE, TerminalFailure};
pub use common::ExecutionId;
pub use context::{DurableContext, DurableContextExt};
pub use error::{DurableError, Result};
pub use memory::{InMemoryDurableContext, Invocation, RetryPolicy};
pub use participant::{FnParticipant, Participant, ParticipantRegistry};
