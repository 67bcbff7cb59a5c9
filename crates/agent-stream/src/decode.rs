//! Incremental UTF-8 decoding for chunked runtime responses.
//!
//! Transport chunks are not aligned to character boundaries, so a multi-byte
//! sequence may arrive split across two chunks. [`ByteBoundaryDecoder`] holds
//! back an incomplete trailing sequence until the rest of it arrives and
//! strips the event-stream `data: ` marker from each decoded fragment.

use tracing::{debug, warn};

/// Line prefix used by event-stream framing.
pub const DATA_PREFIX: &str = "data: ";

/// What to do with bytes that can never decode (as opposed to bytes that are
/// merely incomplete).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidBytePolicy {
    /// Drop the offending bytes one at a time.
    #[default]
    Drop,
    /// Emit U+FFFD in place of each invalid sequence.
    Replace,
}

/// Removes one leading `data: ` marker, if present.
pub fn strip_data_prefix(text: &str) -> &str {
    text.strip_prefix(DATA_PREFIX).unwrap_or(text)
}

/// Decoder state for one response stream.
///
/// `pending` only ever holds the start of an incomplete UTF-8 sequence
/// between calls; anything decodable is emitted immediately.
#[derive(Debug, Default)]
pub struct ByteBoundaryDecoder {
    pending: Vec<u8>,
    policy: InvalidBytePolicy,
}

impl ByteBoundaryDecoder {
    pub fn new(policy: InvalidBytePolicy) -> Self {
        Self {
            pending: Vec::new(),
            policy,
        }
    }

    /// Number of bytes held back waiting for the rest of a sequence.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Feeds one chunk and returns the text that became decodable, with the
    /// `data: ` marker stripped from its start. Returns `None` when the chunk
    /// produced no text (for example when it only carried half a character).
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Option<String> {
        self.pending.extend_from_slice(chunk);
        let mut decoded = String::new();
        drain_decodable(&mut self.pending, self.policy, &mut decoded);

        let text = strip_data_prefix(&decoded);
        if text.is_empty() {
            None
        } else {
            Some(text.to_owned())
        }
    }

    /// Ends the stream. A truncated sequence left in the buffer is discarded
    /// under [`InvalidBytePolicy::Drop`] or rendered as U+FFFD under
    /// [`InvalidBytePolicy::Replace`].
    pub fn finish(self) -> Option<String> {
        let mut tail = String::new();
        finish_truncated(&self.pending, self.policy, &mut tail);
        if tail.is_empty() { None } else { Some(tail) }
    }
}

/// Moves every decodable byte from `pending` into `out`, leaving only the
/// start of an incomplete sequence behind.
///
/// Each pass either consumes a valid prefix or removes at least one invalid
/// byte, so the loop ends after at most `pending.len()` passes.
fn drain_decodable(
    pending: &mut Vec<u8>,
    policy: InvalidBytePolicy,
    out: &mut String,
) {
    while !pending.is_empty() {
        let err = match std::str::from_utf8(pending) {
            Ok(text) => {
                out.push_str(text);
                pending.clear();
                return;
            }
            Err(err) => err,
        };

        let valid = err.valid_up_to();
        if valid > 0 {
            if let Ok(text) = std::str::from_utf8(&pending[..valid]) {
                out.push_str(text);
            }
            pending.drain(..valid);
            continue;
        }

        match err.error_len() {
            // Truncated sequence at the front: wait for more bytes.
            None => return,
            Some(invalid_len) => match policy {
                InvalidBytePolicy::Drop => {
                    warn!(byte = pending[0], "dropping undecodable leading byte");
                    pending.remove(0);
                }
                InvalidBytePolicy::Replace => {
                    out.push(char::REPLACEMENT_CHARACTER);
                    pending.drain(..invalid_len);
                }
            },
        }
    }
}

/// Handles bytes still pending when the stream ends.
fn finish_truncated(pending: &[u8], policy: InvalidBytePolicy, out: &mut String) {
    if pending.is_empty() {
        return;
    }
    match policy {
        InvalidBytePolicy::Drop => {
            debug!(
                pending = pending.len(),
                "discarding truncated sequence at end of stream"
            );
        }
        InvalidBytePolicy::Replace => out.push(char::REPLACEMENT_CHARACTER),
    }
}

/// Decodes a complete byte sequence (one whole line or body) under `policy`.
///
/// Nothing follows the input, so a truncated trailing sequence is handled
/// as at end of stream instead of being held back.
pub(crate) fn decode_complete(bytes: &[u8], policy: InvalidBytePolicy) -> String {
    let mut pending = bytes.to_vec();
    let mut out = String::new();
    drain_decodable(&mut pending, policy, &mut out);
    finish_truncated(&pending, policy, &mut out);
    out
}

/// Splits a raw byte stream into lines.
///
/// Lines end at `\n` (an optional preceding `\r` is removed). Empty lines are
/// skipped, so event-stream frame separators never reach the decoder.
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: Vec<u8>,
    // Bytes of `buf` already searched for a line end.
    scanned: usize,
}

impl LineFramer {
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        let mut start = 0;
        let mut from = self.scanned;
        while let Some(offset) = self.buf[from..].iter().position(|b| *b == b'\n') {
            let end = from + offset;
            let mut line = &self.buf[start..end];
            if let Some(stripped) = line.strip_suffix(b"\r") {
                line = stripped;
            }
            if !line.is_empty() {
                lines.push(line.to_vec());
            }
            start = end + 1;
            from = start;
        }
        self.buf.drain(..start);
        self.scanned = self.buf.len();
        lines
    }

    /// Returns the trailing line that was never terminated, if any.
    pub fn finish(self) -> Option<Vec<u8>> {
        let mut line = self.buf;
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        if line.is_empty() { None } else { Some(line) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_split(text: &str, at: usize, policy: InvalidBytePolicy) -> String {
        let bytes = text.as_bytes();
        let mut decoder = ByteBoundaryDecoder::new(policy);
        let mut out = String::new();
        for chunk in [&bytes[..at], &bytes[at..]] {
            if let Some(fragment) = decoder.push_chunk(chunk) {
                out.push_str(&fragment);
            }
        }
        if let Some(rest) = decoder.finish() {
            out.push_str(&rest);
        }
        out
    }

    #[test]
    fn every_split_point_reconstructs_multibyte_text() {
        let text = "¢ € 𝄞 こんにちは 🌍 done";
        for at in 0..=text.len() {
            assert_eq!(
                decode_split(text, at, InvalidBytePolicy::Drop),
                text,
                "split at {at}"
            );
        }
    }

    #[test]
    fn incomplete_sequence_is_held_back() {
        let bytes = "a€".as_bytes();
        let mut decoder = ByteBoundaryDecoder::default();
        assert_eq!(decoder.push_chunk(&bytes[..2]).as_deref(), Some("a"));
        assert_eq!(decoder.pending_len(), 1);
        assert_eq!(decoder.push_chunk(&bytes[2..3]), None);
        assert_eq!(decoder.pending_len(), 2);
        assert_eq!(decoder.push_chunk(&bytes[3..]).as_deref(), Some("€"));
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn data_prefix_is_stripped_once_at_start() {
        let mut decoder = ByteBoundaryDecoder::default();
        assert_eq!(
            decoder.push_chunk(b"data: data: x").as_deref(),
            Some("data: x")
        );
        assert_eq!(
            decoder.push_chunk(b"say data: y").as_deref(),
            Some("say data: y")
        );
        assert_eq!(decoder.push_chunk(b"data: "), None);
    }

    #[test]
    fn invalid_leading_bytes_are_dropped() {
        let mut decoder = ByteBoundaryDecoder::default();
        assert_eq!(decoder.push_chunk(b"\xff\xfeok").as_deref(), Some("ok"));
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn invalid_bytes_mid_chunk_are_dropped_and_text_kept() {
        let mut decoder = ByteBoundaryDecoder::default();
        assert_eq!(decoder.push_chunk(b"ab\x80cd").as_deref(), Some("abcd"));
    }

    #[test]
    fn replace_policy_marks_invalid_bytes() {
        let mut decoder = ByteBoundaryDecoder::new(InvalidBytePolicy::Replace);
        assert_eq!(
            decoder.push_chunk(b"ab\xffcd").as_deref(),
            Some("ab\u{FFFD}cd")
        );
    }

    #[test]
    fn truncated_tail_at_end_follows_policy() {
        let mut dropping = ByteBoundaryDecoder::default();
        assert_eq!(dropping.push_chunk(&[0xe2, 0x82]), None);
        assert_eq!(dropping.finish(), None);

        let mut replacing = ByteBoundaryDecoder::new(InvalidBytePolicy::Replace);
        assert_eq!(replacing.push_chunk(&[0xe2, 0x82]), None);
        assert_eq!(replacing.finish().as_deref(), Some("\u{FFFD}"));
    }

    #[test]
    fn line_framer_handles_split_lines_and_crlf() {
        let mut framer = LineFramer::default();
        assert!(framer.push_chunk(b"data: {\"a\"").is_empty());
        let lines = framer.push_chunk(b":1}\r\n\r\ndata: next\npartial");
        assert_eq!(lines, vec![b"data: {\"a\":1}".to_vec(), b"data: next".to_vec()]);
        assert_eq!(framer.finish(), Some(b"partial".to_vec()));
    }

    #[test]
    fn line_framer_resumes_scan_across_small_chunks() {
        let mut framer = LineFramer::default();
        for byte in b"data: long line" {
            assert!(framer.push_chunk(&[*byte]).is_empty());
        }
        assert_eq!(framer.scanned, b"data: long line".len());
        assert_eq!(
            framer.push_chunk(b"\r\nnext"),
            vec![b"data: long line".to_vec()]
        );
        assert_eq!(framer.scanned, 4);
        assert_eq!(framer.finish(), Some(b"next".to_vec()));
    }

    #[test]
    fn decode_complete_does_not_hold_back_truncated_tail() {
        assert_eq!(decode_complete(b"a\xe2\x82", InvalidBytePolicy::Drop), "a");
        assert_eq!(
            decode_complete(b"a\xe2\x82", InvalidBytePolicy::Replace),
            "a\u{FFFD}"
        );
    }
}
