//! Reading runtime responses into text.
//!
//! Event-stream responses are framed into lines and each `data:` line is
//! decoded as soon as it is complete; JSON and other bodies are buffered and
//! decoded once at the end.

use std::collections::VecDeque;
use std::pin::Pin;

use futures::StreamExt as _;
use futures::stream;

use crate::decode::{InvalidBytePolicy, LineFramer, decode_complete};
use crate::errors::UpstreamError;

/// Raw response body as delivered by the transport.
pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, UpstreamError>> + Send + 'static>>;

/// Response classification by `Content-Type`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentType {
    /// `text/event-stream`: line-framed `data: ` events.
    EventStream,
    /// `application/json`: a single document.
    Json,
    /// Anything else, kept verbatim.
    Other(String),
}

impl ContentType {
    pub fn classify(raw: &str) -> Self {
        if raw.contains("text/event-stream") {
            return Self::EventStream;
        }
        let media_type = raw.split(';').next().unwrap_or_default().trim();
        if media_type.eq_ignore_ascii_case("application/json") {
            Self::Json
        } else {
            Self::Other(raw.to_string())
        }
    }

    pub fn is_event_stream(&self) -> bool {
        matches!(self, Self::EventStream)
    }
}

enum ReaderMode {
    EventStream(LineFramer),
    Buffered(Vec<u8>),
}

/// Incremental reader for one response body.
pub struct ResponseReader {
    mode: ReaderMode,
    policy: InvalidBytePolicy,
}

impl ResponseReader {
    pub fn new(content_type: &ContentType, policy: InvalidBytePolicy) -> Self {
        let mode = if content_type.is_event_stream() {
            ReaderMode::EventStream(LineFramer::default())
        } else {
            ReaderMode::Buffered(Vec::new())
        };
        Self { mode, policy }
    }

    /// Feeds one transport chunk. Event-stream bodies return the fragments
    /// completed by this chunk; buffered bodies return nothing until
    /// [`ResponseReader::finish`].
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<String> {
        let policy = self.policy;
        match &mut self.mode {
            ReaderMode::EventStream(framer) => framer
                .push_chunk(chunk)
                .iter()
                .filter_map(|line| data_fragment(line, policy))
                .collect(),
            ReaderMode::Buffered(buf) => {
                buf.extend_from_slice(chunk);
                Vec::new()
            }
        }
    }

    /// Flushes whatever the body still holds.
    pub fn finish(self) -> Vec<String> {
        let text = match self.mode {
            ReaderMode::EventStream(framer) => framer
                .finish()
                .and_then(|line| data_fragment(&line, self.policy)),
            ReaderMode::Buffered(buf) => Some(decode_complete(&buf, self.policy)),
        };
        text.into_iter().filter(|t| !t.is_empty()).collect()
    }
}

/// Returns the payload of a `data:` field line, without the field name and
/// at most one following space. Any other line carries no text.
fn data_payload(line: &[u8]) -> Option<&[u8]> {
    let rest = line.strip_prefix(b"data:")?;
    Some(rest.strip_prefix(b" ").unwrap_or(rest))
}

// Each line is complete, so a truncated sequence at its end is never
// continued by the next line.
fn data_fragment(line: &[u8], policy: InvalidBytePolicy) -> Option<String> {
    let text = decode_complete(data_payload(line)?, policy);
    (!text.is_empty()).then_some(text)
}

/// Turns a response body into text fragments in arrival order.
pub fn read_fragments(
    content_type: ContentType,
    body: ByteStream,
    policy: InvalidBytePolicy,
) -> impl futures::Stream<Item = Result<String, UpstreamError>> + Send {
    struct State {
        body: ByteStream,
        reader: Option<ResponseReader>,
        pending: VecDeque<String>,
    }

    stream::try_unfold(
        State {
            body,
            reader: Some(ResponseReader::new(&content_type, policy)),
            pending: VecDeque::new(),
        },
        |mut state| async move {
            loop {
                if let Some(fragment) = state.pending.pop_front() {
                    return Ok(Some((fragment, state)));
                }
                let Some(reader) = state.reader.as_mut() else {
                    return Ok(None);
                };

                match state.body.next().await {
                    Some(Ok(chunk)) => {
                        state.pending.extend(reader.push_chunk(&chunk));
                    }
                    Some(Err(err)) => return Err(err),
                    None => {
                        if let Some(reader) = state.reader.take() {
                            state.pending.extend(reader.finish());
                        }
                    }
                }
            }
        },
    )
}

/// Reads a whole response body into one string.
pub async fn read_to_string(
    content_type: ContentType,
    body: ByteStream,
    policy: InvalidBytePolicy,
) -> Result<String, UpstreamError> {
    let mut fragments = Box::pin(read_fragments(content_type, body, policy));
    let mut out = String::new();
    while let Some(fragment) = fragments.next().await {
        out.push_str(&fragment?);
    }
    Ok(out)
}
