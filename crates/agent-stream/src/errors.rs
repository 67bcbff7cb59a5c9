use crate::model::RuntimeId;

/// Errors raised by an upstream producer (agent runtime or transport) before
/// they are normalized into a terminal stream marker.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    /// Runtime returned an application-level failure (HTTP status, auth, etc.).
    #[error("runtime error ({runtime}): {message}")]
    Runtime {
        runtime: RuntimeId,
        message: String,
        status_code: Option<u16>,
    },
    /// Transport or stream I/O failed.
    #[error("transport error ({runtime}): {message}")]
    Transport { runtime: RuntimeId, message: String },
    /// Upstream response shape or event sequencing was invalid.
    #[error("protocol error ({runtime}): {message}")]
    Protocol { runtime: RuntimeId, message: String },
}

impl UpstreamError {
    /// Creates a runtime-level error.
    pub fn runtime(
        runtime: impl Into<RuntimeId>,
        message: impl Into<String>,
        status_code: Option<u16>,
    ) -> Self {
        Self::Runtime {
            runtime: runtime.into(),
            message: message.into(),
            status_code,
        }
    }

    /// Creates a transport-level error.
    pub fn transport(runtime: impl Into<RuntimeId>, message: impl Into<String>) -> Self {
        Self::Transport {
            runtime: runtime.into(),
            message: message.into(),
        }
    }

    /// Creates a protocol-level error.
    pub fn protocol(runtime: impl Into<RuntimeId>, message: impl Into<String>) -> Self {
        Self::Protocol {
            runtime: runtime.into(),
            message: message.into(),
        }
    }

    /// Returns the runtime associated with this error.
    pub fn runtime_id(&self) -> &RuntimeId {
        match self {
            Self::Runtime { runtime, .. }
            | Self::Transport { runtime, .. }
            | Self::Protocol { runtime, .. } => runtime,
        }
    }

    /// Returns the human-readable message for this error.
    pub fn message(&self) -> &str {
        match self {
            Self::Runtime { message, .. }
            | Self::Transport { message, .. }
            | Self::Protocol { message, .. } => message,
        }
    }

    /// Returns the HTTP status code for runtime-level errors, when known.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Runtime { status_code, .. } => *status_code,
            _ => None,
        }
    }
}

/// Terminal failure carried by `DeltaEvent::Error`.
///
/// Callers match on the variant to tell an upstream failure apart from a
/// cancellation; the message is for display only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamFailure {
    /// The upstream generator failed before completing.
    #[error("upstream failure ({runtime}): {message}")]
    Upstream { runtime: String, message: String },
    /// Network/stream transport failed.
    #[error("transport failure ({runtime}): {message}")]
    Transport { runtime: String, message: String },
    /// Upstream produced something the stream could not interpret.
    #[error("protocol failure: {message}")]
    Protocol { message: String },
    /// The stream was cancelled by the caller.
    #[error("stream cancelled")]
    Cancelled,
}

/// Top-level error type for the public API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgentStreamError {
    /// Invalid client or stream configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid caller input.
    #[error("validation error: {0}")]
    Validation(String),
    /// Upstream failure surfaced before a stream was established.
    #[error(transparent)]
    Upstream(UpstreamError),
    /// Terminal failure returned from a started stream.
    #[error(transparent)]
    StreamFailed(StreamFailure),
    /// Internal protocol misuse or invariant violation.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl AgentStreamError {
    pub(crate) fn protocol_msg(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}

impl From<StreamFailure> for AgentStreamError {
    fn from(value: StreamFailure) -> Self {
        AgentStreamError::StreamFailed(value)
    }
}

impl From<UpstreamError> for AgentStreamError {
    fn from(value: UpstreamError) -> Self {
        AgentStreamError::Upstream(value)
    }
}

impl From<&UpstreamError> for StreamFailure {
    fn from(err: &UpstreamError) -> Self {
        match err {
            UpstreamError::Runtime {
                runtime, message, ..
            } => StreamFailure::Upstream {
                runtime: runtime.to_string(),
                message: message.clone(),
            },
            UpstreamError::Transport { runtime, message } => StreamFailure::Transport {
                runtime: runtime.to_string(),
                message: message.clone(),
            },
            UpstreamError::Protocol { runtime, message } => StreamFailure::Protocol {
                message: format!("runtime={runtime}: {message}"),
            },
        }
    }
}
