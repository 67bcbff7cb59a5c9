//! Delta reconciliation for cumulative text snapshots.
//!
//! Some agent frameworks report the whole text generated so far on every
//! stream event instead of just the new part. [`ReconciliationState`] turns
//! those snapshots back into deltas that can be printed or forwarded as they
//! arrive, and the [`Reconcile`] / [`reconcile_stream`] adapters drive it over
//! an iterator or an async stream.

use std::pin::Pin;

use futures::StreamExt as _;
use futures::stream;
use tracing::debug;

use crate::errors::{StreamFailure, UpstreamError};
use crate::event::{DeltaEvent, StreamEvent};

/// Per-stream reconciliation state.
///
/// Owned by exactly one stream; create a fresh value for every invocation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconciliationState {
    previous_output: String,
}

impl ReconciliationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last snapshot that produced output.
    pub fn previous_output(&self) -> &str {
        &self.previous_output
    }

    /// Applies one upstream event.
    ///
    /// Returns `None` when the event carries no new text (a repeated or empty
    /// snapshot). A snapshot that does not extend the previous one is an
    /// implicit reset: it is emitted in full and becomes the new baseline.
    pub fn step(&mut self, event: StreamEvent) -> Option<DeltaEvent> {
        let current = match event {
            StreamEvent::Data(current) => current,
            StreamEvent::Passthrough(value) => return Some(DeltaEvent::Passthrough(value)),
        };
        if current.is_empty() {
            return None;
        }

        if let Some(delta) = current.strip_prefix(self.previous_output.as_str()) {
            if delta.is_empty() {
                return None;
            }
            let delta = delta.to_owned();
            self.previous_output = current;
            return Some(DeltaEvent::Delta(delta));
        }

        debug!(
            previous_len = self.previous_output.len(),
            snapshot_len = current.len(),
            "snapshot does not extend previous output; treating as reset"
        );
        self.previous_output = current.clone();
        Some(DeltaEvent::Delta(current))
    }
}

/// Iterator adapter returned by [`reconcile`].
///
/// The first upstream error becomes a single terminal
/// [`DeltaEvent::Error`], after which the adapter yields nothing.
pub struct Reconcile<I> {
    upstream: I,
    state: ReconciliationState,
    done: bool,
}

/// Reconciles a blocking sequence of upstream events.
pub fn reconcile<I>(upstream: I) -> Reconcile<I::IntoIter>
where
    I: IntoIterator<Item = Result<StreamEvent, UpstreamError>>,
{
    Reconcile {
        upstream: upstream.into_iter(),
        state: ReconciliationState::new(),
        done: false,
    }
}

impl<I> Iterator for Reconcile<I>
where
    I: Iterator<Item = Result<StreamEvent, UpstreamError>>,
{
    type Item = DeltaEvent;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.upstream.next() {
                Some(Ok(event)) => {
                    if let Some(out) = self.state.step(event) {
                        return Some(out);
                    }
                }
                Some(Err(err)) => {
                    self.done = true;
                    return Some(DeltaEvent::Error(StreamFailure::from(&err)));
                }
                None => {
                    self.done = true;
                    return None;
                }
            }
        }
    }
}

/// Reconciles an async sequence of upstream events.
///
/// Same contract as [`reconcile`]: one output per non-suppressed input, in
/// order, and at most one terminal error marker.
pub fn reconcile_stream<S>(upstream: S) -> impl futures::Stream<Item = DeltaEvent>
where
    S: futures::Stream<Item = Result<StreamEvent, UpstreamError>>,
{
    struct State<S> {
        upstream: Pin<Box<S>>,
        reconciler: ReconciliationState,
        done: bool,
    }

    stream::unfold(
        State {
            upstream: Box::pin(upstream),
            reconciler: ReconciliationState::new(),
            done: false,
        },
        |mut state| async move {
            if state.done {
                return None;
            }
            loop {
                match state.upstream.next().await {
                    Some(Ok(event)) => {
                        if let Some(out) = state.reconciler.step(event) {
                            return Some((out, state));
                        }
                    }
                    Some(Err(err)) => {
                        debug!(runtime = %err.runtime_id(), "upstream failed; ending reconciled stream");
                        state.done = true;
                        return Some((DeltaEvent::Error(StreamFailure::from(&err)), state));
                    }
                    None => return None,
                }
            }
        },
    )
}
