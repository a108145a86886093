//! Server-Sent Events (SSE) utilities
//!
//! Client-side decoding of a `text/event-stream` body into frames. The
//! decoder is incremental: bytes arrive in arbitrary chunks (a frame, or a
//! multi-byte UTF-8 sequence, may be split across two chunks).

use futures::stream::{Stream, StreamExt};
use tracing::debug;

/// One dispatched SSE frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    /// `event:` field, `None` means the default `message` type
    pub event: Option<String>,
    /// `data:` lines joined with `\n`
    pub data: String,
    /// Last seen `id:` field
    pub id: Option<String>,
    /// `retry:` reconnection hint in milliseconds
    pub retry: Option<u64>,
}

impl SseFrame {
    pub fn event_name(&self) -> &str {
        self.event.as_deref().unwrap_or("message")
    }
}

/// Incremental `text/event-stream` parser
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    last_id: Option<String>,
    retry: Option<u64>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every frame it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line).into_owned();
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Drop any partially received frame (used after a disconnect)
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.event = None;
        self.data.clear();
        self.retry = None;
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            // Comment (heartbeat)
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => self.last_id = Some(value.to_string()),
            "retry" => {
                if let Ok(ms) = value.parse() {
                    self.retry = Some(ms);
                }
            }
            _ => debug!("SSE: ignoring unknown field {:?}", field),
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        if self.data.is_empty() {
            self.event = None;
            return None;
        }

        let frame = SseFrame {
            event: self.event.take(),
            data: self.data.join("\n"),
            id: self.last_id.clone(),
            retry: self.retry.take(),
        };
        self.data.clear();
        Some(frame)
    }
}

/// Decode a byte stream (e.g. `reqwest::Response::bytes_stream`) into SSE frames
///
/// The first transport error is yielded and ends the stream.
pub fn decode_stream<S, B, E>(stream: S) -> impl Stream<Item = Result<SseFrame, E>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    async_stream::stream! {
        let mut decoder = SseDecoder::new();
        futures::pin_mut!(stream);

        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => {
                    for frame in decoder.push(bytes.as_ref()) {
                        yield Ok(frame);
                    }
                }
                Err(e) => {
                    yield Err(e);
                    break;
                }
            }
        }

        debug!("SSE: byte stream ended");
    }
}
