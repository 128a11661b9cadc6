//! Orchestrated sagas on top of a durable execution substrate.
//!
//! A saga is an ordered list of steps. Each step has an optional forward
//! action and an optional compensation, each either computed locally or
//! performed by a participant service. Steps run forward one at a time; when
//! one fails, the previously completed steps are compensated in reverse
//! order. A failing compensation is fatal.
//!
//! [`SagaDefinition`] holds the steps and the transition algorithm,
//! [`SagaManager`] drives an instance through a [`durable::DurableContext`],
//! persisting the [`SagaInstance`] after every transition.

pub mod actions;
pub mod builder;
pub mod config;
pub mod definition;
pub mod error;
pub mod execution_state;
pub mod instance;
pub mod manager;
pub mod reply;
pub mod state;
pub mod step;
pub mod step_to_execute;

pub use actions::{SagaActions, SagaStepOutcome};
pub use builder::{SagaDefinitionBuilder, StepBuilder};
pub use config::{CompensationFailurePolicy, SagaConfig};
pub use definition::SagaDefinition;
pub use error::{HandlerError, HandlerResult, Result, SagaError};
pub use execution_state::SagaExecutionState;
pub use instance::SagaInstance;
pub use manager::{EscalationRecord, Saga, SagaManager};
pub use reply::ReplyTypeRegistry;
pub use state::SagaStatus;
pub use step::{SagaStep, StepHandler};
pub use step_to_execute::StepToExecute;
