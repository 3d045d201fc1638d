//! Server-sent event relay for streamed chat responses
//!
//! Each upstream chunk becomes exactly one frame:
//!
//! ```text
//! data: {"text":"<fragment>"}
//!
//! ```
//!
//! The next upstream chunk is pulled only when the response body is polled,
//! so a slow client slows the upstream read. Closing the event stream is the
//! terminal signal; `streaming.done_sentinel` adds a `data: [DONE]` frame
//! before a clean close.
//!
//! Once the 200 status and headers are sent, failures can no longer become a
//! JSON error. They end the body with an error instead, so the transport
//! aborts the response rather than closing it cleanly.

use crate::config::StreamingConfig;
use crate::error::ProviderError;
use crate::metrics::Metrics;
use crate::middleware::RequestId;
use crate::provider::ChunkStream;
use crate::provider::sse::DONE_MARKER;
use axum::{
    http::{HeaderValue, header},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Payload of one relayed frame
#[derive(Debug, Serialize)]
pub struct TextFrame<'a> {
    pub text: &'a str,
}

/// Build the SSE event for one fragment
pub fn frame_event(fragment: &str) -> Result<Event, axum::Error> {
    Event::default().json_data(TextFrame { text: fragment })
}

/// Why a committed stream ended abnormally
#[derive(Error, Debug)]
pub enum StreamTermination {
    #[error("Upstream failed after the response was committed: {0}")]
    Upstream(#[source] ProviderError),

    #[error("No upstream chunk within {} seconds", .0.as_secs())]
    IdleTimeout(Duration),

    #[error("Failed to encode stream frame: {0}")]
    Encode(#[source] axum::Error),
}

/// Per-stream bookkeeping; logs a client disconnect when dropped unfinished
struct StreamGuard {
    request_id: RequestId,
    metrics: Arc<Metrics>,
    started: Instant,
    chunks: u64,
    finished: bool,
}

impl StreamGuard {
    fn new(request_id: RequestId, metrics: Arc<Metrics>) -> Self {
        Self {
            request_id,
            metrics,
            started: Instant::now(),
            chunks: 0,
            finished: false,
        }
    }

    fn chunk(&mut self) {
        self.chunks += 1;
        self.metrics.stream_chunk();
    }

    fn complete(&mut self) {
        self.finished = true;
        tracing::info!(
            request_id = %self.request_id,
            chunks = self.chunks,
            duration_ms = self.started.elapsed().as_millis() as u64,
            "Stream completed"
        );
    }

    fn fail(&mut self, termination: &StreamTermination) {
        self.finished = true;
        self.metrics.stream_failure();
        tracing::error!(
            request_id = %self.request_id,
            endpoint = "chat",
            chunks = self.chunks,
            error = %termination,
            "Stream terminated abnormally after commit"
        );
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.metrics.client_disconnect();
            tracing::info!(
                request_id = %self.request_id,
                chunks = self.chunks,
                duration_ms = self.started.elapsed().as_millis() as u64,
                "Client disconnected before stream finished, upstream dropped"
            );
        }
    }
}

struct Relay {
    chunks: ChunkStream,
    idle_timeout: Duration,
    done_sentinel: bool,
    guard: StreamGuard,
}

/// Turn upstream chunks into SSE events
///
/// Ends after the first error item; dropping the returned stream drops the
/// upstream chunk stream.
pub fn relay_events(
    chunks: ChunkStream,
    settings: &StreamingConfig,
    metrics: Arc<Metrics>,
    request_id: RequestId,
) -> impl Stream<Item = Result<Event, StreamTermination>> + Send + 'static {
    let relay = Relay {
        chunks,
        idle_timeout: settings.idle_timeout(),
        done_sentinel: settings.done_sentinel,
        guard: StreamGuard::new(request_id, metrics),
    };

    stream::unfold(Some(relay), |relay| async move {
        let mut relay = relay?;

        let termination = match tokio::time::timeout(relay.idle_timeout, relay.chunks.next()).await
        {
            Ok(Some(Ok(chunk))) => match frame_event(chunk.fragment()) {
                Ok(event) => {
                    relay.guard.chunk();
                    return Some((Ok(event), Some(relay)));
                }
                Err(e) => StreamTermination::Encode(e),
            },
            Ok(Some(Err(e))) => StreamTermination::Upstream(e),
            Ok(None) => {
                relay.guard.complete();
                return relay
                    .done_sentinel
                    .then(|| (Ok(Event::default().data(DONE_MARKER)), None));
            }
            Err(_) => StreamTermination::IdleTimeout(relay.idle_timeout),
        };

        relay.guard.fail(&termination);
        Some((Err(termination), None))
    })
}

/// Committed `200 text/event-stream` response relaying `chunks`
pub fn sse_response(
    chunks: ChunkStream,
    settings: &StreamingConfig,
    metrics: Arc<Metrics>,
    request_id: RequestId,
) -> Response {
    let events = relay_events(chunks, settings, metrics, request_id);

    let mut response = Sse::new(events)
        .keep_alive(KeepAlive::new().interval(settings.keep_alive()))
        .into_response();

    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));

    response
}
