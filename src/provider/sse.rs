//! Decoder for the provider's `text/event-stream` responses
//!
//! Turns an arbitrary split of response bytes into whole `data` payloads and
//! then into [`ChatChunk`]s. Lines are split on raw `\n` bytes before UTF-8
//! decoding, so a multi-byte character cut across two network reads is
//! reassembled intact.

use super::ChunkStream;
use super::types::ChatChunk;
use crate::error::ProviderError;
use futures::{Stream, StreamExt, stream};
use std::collections::VecDeque;
use std::pin::Pin;

/// Terminal payload of OpenAI-style streams
pub const DONE_MARKER: &str = "[DONE]";

/// Incremental server-sent-event parser
///
/// Only `data` fields are kept; comments, `event`, `id` and `retry` fields
/// are ignored. Multiple `data` lines of one event are joined with `\n`.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data_lines: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning every event payload completed by them
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            self.process_line(&line, &mut events);
        }
        events
    }

    /// Flush an event left open when the byte stream ended
    pub fn finish(&mut self) -> Option<String> {
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest).into_owned();
            self.process_line(line.trim_end_matches('\r'), &mut events);
        }
        self.dispatch(&mut events);
        events.pop()
    }

    fn process_line(&mut self, line: &str, events: &mut Vec<String>) {
        if line.is_empty() {
            self.dispatch(events);
            return;
        }
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        if field == "data" {
            self.data_lines.push(value.to_string());
        }
    }

    fn dispatch(&mut self, events: &mut Vec<String>) {
        if !self.data_lines.is_empty() {
            events.push(self.data_lines.join("\n"));
            self.data_lines.clear();
        }
    }
}

struct DecodeState<S> {
    bytes: Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    finished: bool,
}

/// Adapt a provider byte stream into a [`ChunkStream`]
///
/// The sequence ends at `[DONE]` or at the end of the body. A transport error
/// or an undecodable payload yields one `Err` and ends the sequence. Bytes
/// are only read when the consumer asks for the next chunk.
pub fn decode_chunks<S, B, E>(bytes: S) -> ChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = DecodeState {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(data) = state.pending.pop_front() {
                if data.trim() == DONE_MARKER {
                    state.pending.clear();
                    state.finished = true;
                    return None;
                }

                let item = match serde_json::from_str::<ChatChunk>(&data) {
                    Ok(chunk) => match chunk.error_message() {
                        Some(message) => Err(ProviderError::Stream(message)),
                        None => Ok(chunk),
                    },
                    Err(e) => Err(ProviderError::MalformedResponse(format!(
                        "undecodable stream chunk: {}",
                        e
                    ))),
                };
                if item.is_err() {
                    state.pending.clear();
                    state.finished = true;
                }
                return Some((item, state));
            }

            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(bytes)) => {
                    let events = state.decoder.feed(bytes.as_ref());
                    state.pending.extend(events);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(ProviderError::Stream(e.to_string())), state));
                }
                None => {
                    state.finished = true;
                    state.pending.extend(state.decoder.finish());
                }
            }
        }
    })
    .boxed()
}
