//! Incremental stream parser for agent stdout.
//!
//! Agents write newline-delimited JSON, but the pipe hands it over in
//! arbitrarily sized chunks. [`StreamParser`] buffers raw bytes, decodes only
//! complete lines, and hands each decoded JSON object to the agent's
//! [`Protocol`] for normalization.

use serde_json::Value;

use crate::cli::NormalizedEvent;

/// Byte buffer that splits an arbitrarily chunked stream into lines.
///
/// Bytes are buffered, not text, so a multi-byte character split across two
/// chunks is decoded only once the whole line is present.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed.
    ///
    /// Lines are returned without their terminating `\n` (or `\r\n`).
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        // Bytes already pending hold no newline, so only the new chunk is scanned.
        let Some(pos) = chunk.iter().rposition(|b| *b == b'\n') else {
            self.pending.extend_from_slice(chunk);
            return Vec::new();
        };
        let last_newline = self.pending.len() + pos;
        self.pending.extend_from_slice(chunk);

        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);

        complete[..last_newline]
            .split(|b| *b == b'\n')
            .map(decode_line)
            .collect()
    }

    /// Take whatever partial line remains, leaving the buffer empty.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(decode_line(&rest))
    }

    /// Number of buffered bytes not yet terminated by a newline.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Outcome of decoding one JSON object.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// The object was recognized. May be empty for heartbeat-like lines.
    Events(Vec<NormalizedEvent>),
    /// The discriminator is unknown or the payload has the wrong shape.
    Unrecognized,
}

impl Decoded {
    /// A recognized line that carries nothing worth reporting.
    #[must_use]
    pub fn nothing() -> Self {
        Self::Events(Vec::new())
    }

    #[must_use]
    pub fn one(event: NormalizedEvent) -> Self {
        Self::Events(vec![event])
    }
}

/// Per-agent mapping from JSON objects to normalized events.
///
/// Implementations may keep state across lines, e.g. to turn fragment deltas
/// into cumulative text.
pub trait Protocol: Send {
    /// Decode one JSON object read from a complete stdout line.
    fn decode(&mut self, value: &Value) -> Decoded;
}

/// Incremental decoder turning stdout chunks into normalized events.
pub struct StreamParser {
    lines: LineBuffer,
    protocol: Box<dyn Protocol>,
}

impl std::fmt::Debug for StreamParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamParser")
            .field("pending_bytes", &self.lines.pending_len())
            .finish_non_exhaustive()
    }
}

impl StreamParser {
    #[must_use]
    pub fn new(protocol: Box<dyn Protocol>) -> Self {
        Self {
            lines: LineBuffer::new(),
            protocol,
        }
    }

    /// Feed a chunk of raw stdout bytes.
    ///
    /// Returns the events decoded from every line the chunk completed, in
    /// line order. The trailing partial line stays buffered.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<NormalizedEvent> {
        let lines = self.lines.push(chunk);
        let mut events = Vec::new();
        for line in lines {
            self.decode_into(&line, &mut events);
        }
        events
    }

    /// Convenience wrapper around [`StreamParser::feed`] for text input.
    pub fn feed_str(&mut self, chunk: &str) -> Vec<NormalizedEvent> {
        self.feed(chunk.as_bytes())
    }

    /// Treat the buffered remainder as a final line.
    ///
    /// Call once after end-of-stream.
    pub fn flush(&mut self) -> Vec<NormalizedEvent> {
        let mut events = Vec::new();
        if let Some(line) = self.lines.finish() {
            self.decode_into(&line, &mut events);
        }
        events
    }

    /// Decode a single complete line.
    ///
    /// Blank lines produce nothing. Anything that is not a JSON object, or an
    /// object the protocol does not recognize, produces one
    /// [`NormalizedEvent::Raw`].
    fn decode_into(&mut self, line: &str, events: &mut Vec<NormalizedEvent>) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return;
        }

        let value = match serde_json::from_str::<Value>(trimmed) {
            Ok(value) if value.is_object() => value,
            Ok(_) => {
                tracing::debug!(line = %trimmed, "Non-object JSON line");
                events.push(NormalizedEvent::Raw {
                    line: line.to_string(),
                });
                return;
            }
            Err(e) => {
                tracing::debug!(line = %trimmed, error = %e, "Non-JSON line");
                events.push(NormalizedEvent::Raw {
                    line: line.to_string(),
                });
                return;
            }
        };

        match self.protocol.decode(&value) {
            Decoded::Events(decoded) => {
                if decoded.is_empty() {
                    tracing::trace!(kind = ?value.get("type"), "Line produced no events");
                }
                events.extend(decoded);
            }
            Decoded::Unrecognized => {
                tracing::debug!(kind = ?value.get("type"), "Unrecognized event");
                events.push(NormalizedEvent::Raw {
                    line: value.to_string(),
                });
            }
        }
    }
}
