//! Common imports for typical stream consumers.
pub use crate::{
    AbortHandle, AgentRuntime, AgentStreamError, ByteBoundaryDecoder, DeltaEvent,
    HttpRuntimeClient, InvalidBytePolicy, ReconcileOptions, ReconciledStream,
    ReconciliationState, RuntimeClientConfig, RuntimeSessionId, StreamEvent, StreamFailure,
    UpstreamError,
};
