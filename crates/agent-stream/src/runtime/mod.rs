//! Agent runtime seam and the HTTP client implementation.
//!
//! The runtime itself (model hosting, tools, sandboxes) lives behind a remote
//! endpoint; this module only knows how to invoke it and read what comes back.
mod config;
mod http;

pub use config::RuntimeClientConfig;
pub use http::HttpRuntimeClient;

use futures::StreamExt as _;
use futures::future;

use crate::decode::InvalidBytePolicy;
use crate::errors::{StreamFailure, UpstreamError};
use crate::event::{DeltaEvent, StreamEvent};
use crate::model::RuntimeId;
use crate::response::{ByteStream, ContentType, read_fragments, read_to_string};
use crate::session::RuntimeSessionId;

/// Request for one agent invocation.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InvocationRequest {
    /// Session the invocation belongs to; also the source of the trace id.
    pub session_id: RuntimeSessionId,
    /// JSON payload forwarded to the runtime entrypoint.
    pub payload: serde_json::Value,
}

impl InvocationRequest {
    /// Builds the `{"prompt": ...}` payload agent entrypoints expect.
    pub fn prompt(session_id: RuntimeSessionId, prompt: impl Into<String>) -> Self {
        Self {
            session_id,
            payload: serde_json::json!({ "prompt": prompt.into() }),
        }
    }
}

/// Response handle returned by [`AgentRuntime::invoke`].
pub struct RuntimeResponse {
    pub runtime: RuntimeId,
    pub content_type: ContentType,
    pub body: ByteStream,
}

impl RuntimeResponse {
    /// Decoded text fragments in arrival order.
    pub fn fragments(
        self,
        policy: InvalidBytePolicy,
    ) -> impl futures::Stream<Item = Result<String, UpstreamError>> + Send {
        read_fragments(self.content_type, self.body, policy)
    }

    /// Whole response as one string.
    pub async fn into_text(self, policy: InvalidBytePolicy) -> Result<String, UpstreamError> {
        read_to_string(self.content_type, self.body, policy).await
    }

    /// Reads a runtime that streams cumulative snapshots.
    ///
    /// JSON objects are classified with [`StreamEvent::from_json`]; bare JSON
    /// strings and non-JSON fragments are the snapshot text itself.
    pub fn snapshot_events(
        self,
        policy: InvalidBytePolicy,
    ) -> impl futures::Stream<Item = Result<StreamEvent, UpstreamError>> + Send {
        self.fragments(policy).map(|fragment| {
            fragment.map(|text| match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(serde_json::Value::String(snapshot)) => StreamEvent::Data(snapshot),
                Ok(value @ serde_json::Value::Object(_)) => StreamEvent::from_json(value),
                _ => StreamEvent::Data(text),
            })
        })
    }

    /// Parses each fragment of a streaming response as a wire event written
    /// by [`DeltaEvent::to_json`]. Fragments that are not JSON are treated
    /// as plain text deltas. A transport failure becomes a terminal
    /// [`DeltaEvent::Error`] and ends the stream.
    pub fn delta_events(
        self,
        policy: InvalidBytePolicy,
    ) -> impl futures::Stream<Item = DeltaEvent> + Send {
        let runtime = self.runtime.clone();
        let mut failed = false;
        self.fragments(policy)
            .filter_map(move |fragment| {
                let event = match fragment {
                    Ok(text) => DeltaEvent::from_wire(&text, &runtime),
                    Err(err) => Some(DeltaEvent::Error(StreamFailure::from(&err))),
                };
                future::ready(event)
            })
            .take_while(move |event| {
                let keep = !failed;
                failed = failed || event.is_terminal();
                future::ready(keep)
            })
    }
}

/// Seam between invocation helpers and a concrete runtime transport.
#[async_trait::async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Identifier used in logs and errors.
    fn id(&self) -> RuntimeId;

    /// Invokes the runtime. Errors here mean no response body was obtained.
    async fn invoke(&self, request: InvocationRequest) -> Result<RuntimeResponse, UpstreamError>;
}
