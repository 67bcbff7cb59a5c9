use futures::StreamExt as _;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{Instrument as _, debug, info_span, warn};

use crate::errors::{AgentStreamError, StreamFailure, UpstreamError};
use crate::event::{DeltaEvent, StreamEvent};
use crate::model::ReconcileOptions;
use crate::reconcile::ReconciliationState;
use crate::runtime::RuntimeResponse;

/// Handle used to request cancellation of a reconciled stream.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Requests cancellation.
    ///
    /// Cancellation is best-effort and becomes visible as a terminal
    /// `DeltaEvent::Error` with `StreamFailure::Cancelled`.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// Aggregate of everything a stream delivered.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StreamSummary {
    /// Concatenation of every delta, in order.
    pub text: String,
    /// Number of deltas emitted.
    pub chunks: usize,
    /// Number of characters across all deltas.
    pub characters: usize,
    /// Passthrough events, in order.
    pub passthrough: Vec<serde_json::Value>,
}

impl StreamSummary {
    fn record(&mut self, event: &DeltaEvent) {
        match event {
            DeltaEvent::Delta(text) => {
                self.text.push_str(text);
                self.chunks += 1;
                self.characters += text.chars().count();
            }
            DeltaEvent::Passthrough(value) => self.passthrough.push(value.clone()),
            DeltaEvent::Error(_) => {}
        }
    }
}

/// Spawns a task that pulls `upstream` through a fresh reconciler and
/// returns the consumer side.
///
/// Must be called from within a tokio runtime.
pub fn spawn_reconciler<S>(
    upstream: S,
    options: ReconcileOptions,
) -> Result<ReconciledStream, AgentStreamError>
where
    S: futures::Stream<Item = Result<StreamEvent, UpstreamError>> + Send + 'static,
{
    options.validate()?;

    let (tx, rx) = mpsc::channel(options.stream_buffer_capacity);
    let (final_tx, final_rx) = oneshot::channel();
    let (abort_tx, abort_rx) = watch::channel(false);
    let stream_id = uuid::Uuid::new_v4();

    let span = info_span!("reconciled_stream", stream_id = %stream_id);
    tokio::spawn(run_task(upstream, tx, final_tx, abort_rx).instrument(span));

    Ok(ReconciledStream {
        stream_id,
        rx,
        final_rx,
        abort_handle: AbortHandle { tx: abort_tx },
    })
}

/// Reconciles a runtime response that streams cumulative snapshots.
///
/// The body is decoded with `options.invalid_bytes`.
pub fn spawn_response_reconciler(
    response: RuntimeResponse,
    options: ReconcileOptions,
) -> Result<ReconciledStream, AgentStreamError> {
    let policy = options.invalid_bytes;
    spawn_reconciler(response.snapshot_events(policy), options)
}

/// Consumer side of a reconciled stream.
///
/// Use `next_event()` to print or forward deltas as they arrive and
/// `finish()` to obtain the aggregate once the stream ends.
pub struct ReconciledStream {
    stream_id: uuid::Uuid,
    rx: mpsc::Receiver<DeltaEvent>,
    final_rx: oneshot::Receiver<Result<StreamSummary, AgentStreamError>>,
    abort_handle: AbortHandle,
}

impl ReconciledStream {
    /// Returns the id used in this stream's log events.
    pub fn stream_id(&self) -> uuid::Uuid {
        self.stream_id
    }

    /// Returns a handle that can cancel the stream.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Waits for and returns the next event.
    ///
    /// Returns `None` once the upstream has ended, or after the terminal
    /// error marker.
    pub async fn next_event(&mut self) -> Option<DeltaEvent> {
        self.rx.recv().await
    }

    /// Drains the stream (if needed) and returns the aggregate result.
    ///
    /// This is safe to call after consuming events manually with `next_event()`.
    pub async fn finish(mut self) -> Result<StreamSummary, AgentStreamError> {
        while self.rx.recv().await.is_some() {}

        match self.final_rx.await {
            Ok(result) => result,
            Err(_) => Err(AgentStreamError::protocol_msg(format!(
                "reconciler task ended without final result (stream={})",
                self.stream_id
            ))),
        }
    }

    /// Runs to completion and returns the concatenated deltas.
    pub async fn collect_text(self) -> Result<String, AgentStreamError> {
        Ok(self.finish().await?.text)
    }
}

async fn run_task<S>(
    upstream: S,
    tx: mpsc::Sender<DeltaEvent>,
    final_tx: oneshot::Sender<Result<StreamSummary, AgentStreamError>>,
    mut abort_rx: watch::Receiver<bool>,
) where
    S: futures::Stream<Item = Result<StreamEvent, UpstreamError>> + Send + 'static,
{
    let mut upstream = Box::pin(upstream);
    let mut state = ReconciliationState::new();
    let mut summary = StreamSummary::default();
    let mut pending: Option<DeltaEvent> = None;
    let mut seq = 0_u64;
    let mut abort_open = true;

    loop {
        tokio::select! {
            biased;

            changed = abort_rx.changed(), if abort_open => {
                match changed {
                    Ok(()) if *abort_rx.borrow() => {
                        debug!(seq, "stream cancelled by caller");
                        let failure = StreamFailure::Cancelled;
                        let _ = tx.send(DeltaEvent::Error(failure.clone())).await;
                        let _ = final_tx.send(Err(AgentStreamError::StreamFailed(failure)));
                        return;
                    }
                    Ok(()) => {}
                    Err(_) => abort_open = false,
                }
            }
            _ = tx.closed() => {
                debug!(seq, "consumer dropped; stopping reconciler");
                return;
            }
            permit = tx.reserve(), if pending.is_some() => {
                let Ok(permit) = permit else {
                    let _ = final_tx.send(Err(AgentStreamError::protocol_msg(
                        "stream receiver dropped during output",
                    )));
                    return;
                };
                if let Some(out) = pending.take() {
                    permit.send(out);
                }
            }
            next = upstream.next(), if pending.is_none() => {
                match next {
                    Some(Ok(event)) => {
                        let Some(out) = state.step(event) else {
                            continue;
                        };
                        summary.record(&out);
                        debug!(seq, "reconciled event");
                        seq = seq.saturating_add(1);
                        pending = Some(out);
                    }
                    Some(Err(err)) => {
                        warn!(runtime = %err.runtime_id(), error = %err, "upstream failed");
                        let failure = StreamFailure::from(&err);
                        let _ = tx.send(DeltaEvent::Error(failure.clone())).await;
                        let _ = final_tx.send(Err(AgentStreamError::StreamFailed(failure)));
                        return;
                    }
                    None => {
                        debug!(chunks = summary.chunks, "upstream completed");
                        let _ = final_tx.send(Ok(summary));
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt as _;
    use futures::stream;

    fn snapshots(items: &[&str]) -> Vec<Result<StreamEvent, UpstreamError>> {
        items.iter().map(|s| Ok(StreamEvent::data(*s))).collect()
    }

    #[tokio::test]
    async fn zero_capacity_is_rejected() {
        let result = spawn_reconciler(
            stream::iter(snapshots(&["a"])),
            ReconcileOptions::default().stream_buffer_capacity(0),
        );
        assert!(matches!(result, Err(AgentStreamError::Validation(_))));
    }

    #[tokio::test]
    async fn emits_deltas_then_ends() {
        let mut stream = spawn_reconciler(
            stream::iter(snapshots(&["Hello", "Hello, ", "Hello, ", "Hello, world!"])),
            ReconcileOptions::default(),
        )
        .expect("spawn");

        let mut deltas = Vec::new();
        while let Some(event) = stream.next_event().await {
            deltas.push(event.text().map(ToOwned::to_owned).expect("delta"));
        }
        assert_eq!(deltas, vec!["Hello", ", ", "world!"]);

        let summary = stream.finish().await.expect("finish");
        assert_eq!(summary.text, "Hello, world!");
        assert_eq!(summary.chunks, 3);
        assert_eq!(summary.characters, 13);
    }

    #[tokio::test]
    async fn finish_without_consuming_aggregates_everything() {
        let meta = serde_json::json!({"meta": 1});
        let stream = spawn_reconciler(
            stream::iter(vec![
                Ok(StreamEvent::data("Hi")),
                Ok(StreamEvent::Passthrough(meta.clone())),
                Ok(StreamEvent::data("Hi there")),
            ]),
            ReconcileOptions::default().stream_buffer_capacity(1),
        )
        .expect("spawn");

        let summary = stream.finish().await.expect("finish");
        assert_eq!(summary.text, "Hi there");
        assert_eq!(summary.passthrough, vec![meta]);
    }

    #[tokio::test]
    async fn upstream_error_becomes_terminal_event_and_finish_error() {
        let mut stream = spawn_reconciler(
            stream::iter(vec![
                Ok(StreamEvent::data("partial")),
                Err(UpstreamError::runtime("agent", "boom", Some(500))),
            ]),
            ReconcileOptions::default(),
        )
        .expect("spawn");

        let mut events = Vec::new();
        while let Some(event) = stream.next_event().await {
            events.push(event);
        }
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[1],
            DeltaEvent::Error(StreamFailure::Upstream { .. })
        ));
        assert!(matches!(
            stream.finish().await,
            Err(AgentStreamError::StreamFailed(StreamFailure::Upstream { .. }))
        ));
    }

    #[tokio::test]
    async fn cancellation_emits_terminal_error() {
        let upstream = stream::iter(snapshots(&["first"])).chain(stream::pending());
        let mut stream =
            spawn_reconciler(upstream, ReconcileOptions::default()).expect("spawn");

        let abort = stream.abort_handle();
        assert_eq!(stream.next_event().await, Some(DeltaEvent::Delta("first".into())));
        abort.abort();

        let mut saw_cancel = false;
        while let Some(event) = stream.next_event().await {
            if let DeltaEvent::Error(StreamFailure::Cancelled) = event {
                saw_cancel = true;
            }
        }
        assert!(saw_cancel);
        assert!(matches!(
            stream.finish().await,
            Err(AgentStreamError::StreamFailed(StreamFailure::Cancelled))
        ));
    }

    #[tokio::test]
    async fn collect_text_returns_concatenated_deltas() {
        let text = spawn_reconciler(
            stream::iter(snapshots(&["a", "ab", "xyz"])),
            ReconcileOptions::default(),
        )
        .expect("spawn")
        .collect_text()
        .await
        .expect("text");
        assert_eq!(text, "abxyz");
    }

    #[tokio::test]
    async fn response_snapshots_are_reconciled() {
        use crate::model::RuntimeId;
        use crate::response::{ByteStream, ContentType};

        let body: ByteStream = Box::pin(stream::iter(vec![
            Ok(bytes::Bytes::from_static(b"data: {\"data\": \"The \"}\n\n")),
            Ok(bytes::Bytes::from_static(b"data: {\"data\": \"The answer\"}\n\n")),
            Ok(bytes::Bytes::from_static(b"data: {\"data\": \"The answer is 42\"}\n\n")),
        ]));
        let response = RuntimeResponse {
            runtime: RuntimeId::new("agent"),
            content_type: ContentType::EventStream,
            body,
        };

        let mut stream =
            spawn_response_reconciler(response, ReconcileOptions::default()).expect("spawn");
        let mut deltas = Vec::new();
        while let Some(event) = stream.next_event().await {
            deltas.push(event);
        }
        assert_eq!(
            deltas,
            vec![
                DeltaEvent::Delta("The ".into()),
                DeltaEvent::Delta("answer".into()),
                DeltaEvent::Delta(" is 42".into()),
            ]
        );
    }

    #[tokio::test]
    async fn abort_is_seen_while_consumer_lags() {
        let upstream =
            stream::iter(1..).map(|n| Ok::<_, UpstreamError>(StreamEvent::data("x".repeat(n))));
        let mut stream = spawn_reconciler(
            upstream,
            ReconcileOptions::default().stream_buffer_capacity(1),
        )
        .expect("spawn");

        // Let the task fill the channel and park on the next send.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        stream.abort_handle().abort();

        let mut events = Vec::new();
        while let Some(event) = stream.next_event().await {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                DeltaEvent::Delta("x".into()),
                DeltaEvent::Error(StreamFailure::Cancelled),
            ]
        );
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if let Ok(mut out) = self.0.lock() {
                out.extend_from_slice(buf);
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn task_logs_are_scoped_to_stream_id() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let stream_id = tracing::subscriber::with_default(subscriber, || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .build()
                .expect("runtime");
            rt.block_on(async {
                let stream = spawn_reconciler(
                    stream::iter(snapshots(&["a", "ab"])),
                    ReconcileOptions::default(),
                )
                .expect("spawn");
                let id = stream.stream_id();
                stream.finish().await.expect("finish");
                id
            })
        });

        let output = String::from_utf8(logs.0.lock().expect("lock").clone()).expect("utf8");
        assert!(output.contains("reconciled_stream"));
        assert!(output.contains(&stream_id.to_string()));
        assert!(output.contains("upstream completed"));
    }
}
