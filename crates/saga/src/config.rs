//! Engine configuration loaded from environment variables.

use std::str::FromStr;

/// What the engine does when a compensation fails.
///
/// Either way the execution ends with a fatal error and no further
/// compensation runs; compensations that already completed are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompensationFailurePolicy {
    /// Propagate the fatal error.
    #[default]
    Abort,
    /// Persist an escalation record for an operator, then propagate.
    Escalate,
}

impl CompensationFailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompensationFailurePolicy::Abort => "abort",
            CompensationFailurePolicy::Escalate => "escalate",
        }
    }
}

impl FromStr for CompensationFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(CompensationFailurePolicy::Abort),
            "escalate" => Ok(CompensationFailurePolicy::Escalate),
            other => Err(format!("unknown compensation failure policy '{other}'")),
        }
    }
}

impl std::fmt::Display for CompensationFailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Saga manager configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `SAGA_STATE_KEY` — storage key of the instance blob (default: `"saga_instance"`)
/// - `SAGA_ESCALATION_KEY` — storage key of escalation records (default: `"saga_escalation"`)
/// - `SAGA_COMPENSATION_FAILURE_POLICY` — `abort` or `escalate` (default: `abort`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SagaConfig {
    pub state_key: String,
    pub escalation_key: String,
    pub compensation_failure_policy: CompensationFailurePolicy,
}

impl SagaConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            state_key: std::env::var("SAGA_STATE_KEY").unwrap_or(defaults.state_key),
            escalation_key: std::env::var("SAGA_ESCALATION_KEY")
                .unwrap_or(defaults.escalation_key),
            compensation_failure_policy: std::env::var("SAGA_COMPENSATION_FAILURE_POLICY")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.compensation_failure_policy),
        }
    }

    /// Sets the compensation failure policy.
    pub fn with_policy(mut self, policy: CompensationFailurePolicy) -> Self {
        self.compensation_failure_policy = policy;
        self
    }
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            state_key: "saga_instance".to_string(),
            escalation_key: "saga_escalation".to_string(),
            compensation_failure_policy: CompensationFailurePolicy::Abort,
        }
    }
}
