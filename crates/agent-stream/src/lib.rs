//! Streaming helpers for agent runtimes that report cumulative text.
//!
//! Agent frameworks often emit the whole response generated so far on every
//! stream event. This crate turns those snapshots into deltas, decodes raw
//! response bytes without splitting multi-byte characters, and wraps it all
//! around an HTTP runtime client.
//!
//! # Reconciling a runtime response
//!
//! ```no_run
//! use agent_stream::prelude::*;
//! use agent_stream::run::spawn_response_reconciler;
//! use agent_stream::runtime::InvocationRequest;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), AgentStreamError> {
//! let client = HttpRuntimeClient::from_env()?;
//! let session = RuntimeSessionId::generate("user0001", "demo")?;
//! let response = client
//!     .invoke(InvocationRequest::prompt(session, "How much does a t3.micro cost?"))
//!     .await?;
//!
//! let mut stream = spawn_response_reconciler(response, ReconcileOptions::default())?;
//! while let Some(event) = stream.next_event().await {
//!     if let Some(text) = event.text() {
//!         print!("{text}");
//!     }
//! }
//! let summary = stream.finish().await?;
//! println!("\n{} chunks", summary.chunks);
//! # Ok(())
//! # }
//! ```

/// Byte-level decoding that never splits a UTF-8 sequence.
pub mod decode;
/// Public error types.
pub mod errors;
/// Upstream and reconciled event types.
pub mod event;
/// Identifiers and stream options.
pub mod model;
/// Logging setup.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Snapshot to delta reconciliation.
pub mod reconcile;
/// Content-typed response reading.
pub mod response;
/// Spawned reconciler task, streaming handle, and cancellation handle.
pub mod run;
pub mod runtime;
/// Runtime session ids and multi-invocation sessions.
pub mod session;

pub use decode::{ByteBoundaryDecoder, InvalidBytePolicy, LineFramer, strip_data_prefix};
pub use errors::{AgentStreamError, StreamFailure, UpstreamError};
pub use event::{DeltaEvent, StreamEvent};
pub use model::{ReconcileOptions, RuntimeId};
pub use observability::init_observability;
pub use reconcile::{ReconciliationState, reconcile, reconcile_stream};
pub use response::{ByteStream, ContentType, ResponseReader};
pub use run::{
    AbortHandle, ReconciledStream, StreamSummary, spawn_reconciler, spawn_response_reconciler,
};
pub use runtime::{
    AgentRuntime, HttpRuntimeClient, InvocationRequest, RuntimeClientConfig, RuntimeResponse,
};
pub use session::{
    InvocationOutcome, InvocationRecord, RuntimeSessionId, SessionReport, invoke_all,
};
