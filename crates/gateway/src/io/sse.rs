use std::time::Duration;

use serde_json::Value;
use tokio::time::timeout;

use super::{Chunks, ChunksError, Utf8Decoder};

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    ChunksError(ChunksError),
    /// Too much data is waiting for a line terminator or a parsable
    /// payload.
    Overflow,
    /// No chunk arrived within the idle timeout.
    TimedOut,
}

/// Bounds applied while reading a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SseLimits {
    pub idle_timeout: Duration,
    pub max_buffered_bytes: usize,
}

/// A decoded `data:` payload.
#[derive(Debug, PartialEq)]
pub enum SseEvent {
    Data(Value),
    Done,
}

/// What a single terminated line amounts to.
#[derive(Debug, PartialEq)]
enum Line {
    Skip,
    Done,
    Data(Value),
    /// The payload is not valid JSON (yet).
    Incomplete,
}

/// A type for reading `data: {json}` lines from a chunk stream.
///
/// Only terminated lines are ever looked at. A terminated `data:` line
/// whose payload fails to parse stays at the front of the buffer, and
/// scanning pauses until more bytes arrive.
pub struct Sse {
    buf: String,
    decoder: Utf8Decoder,
    chunks: Chunks,
    limits: SseLimits,
    stalled: bool,
    finished: bool,
}

impl Sse {
    #[inline]
    pub fn new(chunks: Chunks, limits: SseLimits) -> Self {
        Self {
            buf: String::new(),
            decoder: Utf8Decoder::default(),
            chunks,
            limits,
            stalled: false,
            finished: false,
        }
    }

    pub async fn next_event(&mut self) -> Result<Option<SseEvent>, Error> {
        loop {
            if self.finished {
                return Ok(None);
            }

            // Drain what is already buffered before reading more.
            if !self.stalled {
                if let Some(event) = self.try_parse_event() {
                    if event == SseEvent::Done {
                        // Nothing after the sentinel is looked at.
                        self.finish();
                    }
                    return Ok(Some(event));
                }
            }

            if self.buf.len() > self.limits.max_buffered_bytes {
                warn!(
                    "{} bytes buffered without a complete payload",
                    self.buf.len()
                );
                self.finish();
                return Err(Error::Overflow);
            }

            let next_chunk =
                timeout(self.limits.idle_timeout, self.chunks.next_chunk());
            let chunk = match next_chunk.await {
                Ok(chunk) => chunk.map_err(Error::ChunksError)?,
                Err(_) => {
                    self.finish();
                    return Err(Error::TimedOut);
                }
            };

            let Some(bytes) = chunk else {
                self.decoder.finish(&mut self.buf);
                if !self.buf.trim().is_empty() {
                    debug!(
                        "stream ended with {} bytes of unfinished data",
                        self.buf.len()
                    );
                }
                self.finish();
                return Ok(None);
            };
            trace!("got {} bytes", bytes.len());
            self.decoder.decode(&bytes, &mut self.buf);
            self.stalled = false;
        }
    }

    fn try_parse_event(&mut self) -> Option<SseEvent> {
        loop {
            let eol_idx = self.buf.find('\n')?;
            let line = {
                let line = &self.buf[..eol_idx];
                classify_line(line.strip_suffix('\r').unwrap_or(line))
            };
            match line {
                Line::Skip => {}
                Line::Done => {
                    self.buf.drain(..=eol_idx);
                    return Some(SseEvent::Done);
                }
                Line::Data(value) => {
                    self.buf.drain(..=eol_idx);
                    return Some(SseEvent::Data(value));
                }
                Line::Incomplete => {
                    // Keep the line where it is and wait for more data.
                    self.stalled = true;
                    return None;
                }
            }
            self.buf.drain(..=eol_idx);
        }
    }

    #[inline]
    fn finish(&mut self) {
        self.finished = true;
        self.buf = String::new();
    }
}

fn classify_line(line: &str) -> Line {
    // Blank lines separate events and `:` starts a comment (keep-alive).
    if line.is_empty() || line.starts_with(':') {
        return Line::Skip;
    }
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        trace!("skipping line: {line}");
        return Line::Skip;
    };
    let payload = payload.trim();
    if payload == DONE_SENTINEL {
        return Line::Done;
    }
    match serde_json::from_str(payload) {
        Ok(value) => Line::Data(value),
        Err(err) => {
            debug!("payload is not parsable yet: {err}");
            Line::Incomplete
        }
    }
}
