use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// Reserved reply type name marking an unrecoverable participant-side failure.
///
/// The engine synthesizes a reply of this type when a participant call ends
/// in a terminal error, so sagas can react to it with an ordinary reply handler.
pub const TERMINAL_FAILURE_TYPE: &str = "TerminalFailure";

/// Payload carried by a [`TERMINAL_FAILURE_TYPE`] reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalFailure {
    /// Description of the failure reported by the substrate.
    pub message: String,
}

/// Descriptor of a remote operation a saga step wants to invoke.
///
/// Building a call has no side effects; the engine hands it to the durable
/// context only after the instance state has been persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantCall {
    /// The participant service to invoke.
    pub service: String,

    /// The operation on that service.
    pub operation: String,

    /// JSON-encoded operation arguments.
    pub args: Vec<u8>,

    /// Idempotency key used by the substrate to de-duplicate the call on replay.
    pub key: Option<String>,
}

impl ParticipantCall {
    /// Creates a call whose arguments are encoded as JSON.
    pub fn new<T: Serialize>(
        service: impl Into<String>,
        operation: impl Into<String>,
        args: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::raw(service, operation, serde_json::to_vec(args)?))
    }

    /// Creates a call from already encoded arguments.
    pub fn raw(service: impl Into<String>, operation: impl Into<String>, args: Vec<u8>) -> Self {
        Self {
            service: service.into(),
            operation: operation.into(),
            args,
            key: None,
        }
    }

    /// Sets the idempotency key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Decodes the call arguments.
    pub fn decode_args<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.args)
    }
}

/// Reply a participant sends back for a [`ParticipantCall`].
///
/// `success = false` with [`TERMINAL_FAILURE_TYPE`] signals an unrecoverable
/// failure; any other failed type is a domain error sagas may handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    /// Whether the participant completed the operation.
    pub success: bool,

    /// Declared type name of the payload, if any.
    pub type_name: Option<String>,

    /// JSON-encoded payload.
    pub payload: Option<Vec<u8>>,
}

impl ReplyEnvelope {
    /// A successful reply without a payload.
    pub fn empty_success() -> Self {
        Self {
            success: true,
            type_name: None,
            payload: None,
        }
    }

    /// A successful reply carrying a typed payload.
    pub fn success<T: Serialize>(
        type_name: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            success: true,
            type_name: Some(type_name.into()),
            payload: Some(serde_json::to_vec(payload)?),
        })
    }

    /// A failed reply carrying a typed domain error.
    pub fn failure<T: Serialize>(
        type_name: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            success: false,
            type_name: Some(type_name.into()),
            payload: Some(serde_json::to_vec(payload)?),
        })
    }

    /// A failed reply marking an unrecoverable participant failure.
    pub fn terminal_failure(message: impl Into<String>) -> Self {
        let failure = TerminalFailure {
            message: message.into(),
        };
        Self {
            success: false,
            type_name: Some(TERMINAL_FAILURE_TYPE.to_string()),
            // A struct with a single string field always encodes.
            payload: serde_json::to_vec(&failure).ok(),
        }
    }

    /// Returns true if this reply marks an unrecoverable failure.
    pub fn is_terminal_failure(&self) -> bool {
        !self.success && self.type_name.as_deref() == Some(TERMINAL_FAILURE_TYPE)
    }

    /// Decodes the payload. A missing payload decodes from JSON `null`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(self.payload.as_deref().unwrap_or(b"null"))
    }
}
