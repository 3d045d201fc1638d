//! Shared fixtures for the HTTP integration tests
//!
//! `FakeProvider` stands in for the LLM provider and records every call, so
//! tests can assert both on what the client saw and on what reached the
//! provider.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response},
};
use futures::stream::{self, StreamExt};
use stackrelay::{
    config::Config,
    error::ProviderError,
    handlers::{self, AppState},
    provider::{ChatChunk, ChatCompletion, ChatMessage, ChunkStream, Provider},
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn test_config(streaming_section: &str) -> Config {
    format!(
        r#"
[server]
host = "127.0.0.1"
port = 3000

[provider]
base_url = "http://localhost:9/v1"
model = "test-model"
api_key = "sk-test"

{streaming_section}
"#
    )
    .parse()
    .expect("should parse test config")
}

/// Sets its flag when dropped
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Scripted provider
#[derive(Default)]
pub struct FakeProvider {
    completion: Option<ChatCompletion>,
    chunks: Vec<String>,
    stream_error_after_chunks: Option<String>,
    stall_after_chunks: bool,
    failure: Option<String>,
    analysis: Option<serde_json::Value>,

    pub calls: AtomicUsize,
    pub seen_messages: Mutex<Vec<ChatMessage>>,
    pub seen_stream: Mutex<Option<bool>>,
    pub seen_text: Mutex<Option<String>>,
    pub stream_dropped: Arc<AtomicBool>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn completing(mut self, completion: ChatCompletion) -> Self {
        self.completion = Some(completion);
        self
    }

    pub fn streaming(mut self, fragments: &[&str]) -> Self {
        self.chunks = fragments.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn streaming_owned(mut self, fragments: Vec<String>) -> Self {
        self.chunks = fragments;
        self
    }

    /// Yield an upstream error after the scripted chunks
    pub fn then_stream_error(mut self, message: &str) -> Self {
        self.stream_error_after_chunks = Some(message.to_string());
        self
    }

    /// Never finish after the scripted chunks
    pub fn then_stall(mut self) -> Self {
        self.stall_after_chunks = true;
        self
    }

    /// Fail every call with a provider API error carrying `message`
    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    pub fn analyzing(mut self, analysis: serde_json::Value) -> Self {
        self.analysis = Some(analysis);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record(&self, messages: &[ChatMessage], stream: bool) -> Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.seen_messages.lock().unwrap() = messages.to_vec();
        *self.seen_stream.lock().unwrap() = Some(stream);
        self.failed()
    }

    fn failed(&self) -> Result<(), ProviderError> {
        match &self.failure {
            Some(message) => Err(ProviderError::Api {
                status: 500,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Provider for FakeProvider {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<ChatCompletion, ProviderError> {
        self.record(messages, false)?;
        Ok(self.completion.clone().unwrap_or_default())
    }

    async fn stream(&self, messages: &[ChatMessage]) -> Result<ChunkStream, ProviderError> {
        self.record(messages, true)?;

        let items: Vec<Result<ChatChunk, ProviderError>> = self
            .chunks
            .iter()
            .map(|f| Ok(ChatChunk::text(f.clone())))
            .collect();
        let mut chunks = stream::iter(items).boxed();

        if let Some(message) = &self.stream_error_after_chunks {
            let error = ProviderError::Stream(message.clone());
            chunks = chunks.chain(stream::once(async { Err(error) })).boxed();
        }
        if self.stall_after_chunks {
            chunks = chunks.chain(stream::pending()).boxed();
        }

        let guard = DropFlag(self.stream_dropped.clone());
        Ok(chunks
            .map(move |item| {
                let _ = &guard;
                item
            })
            .boxed())
    }

    async fn analyze(&self, text: &str) -> Result<serde_json::Value, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.seen_text.lock().unwrap() = Some(text.to_string());
        self.failed()?;
        Ok(self
            .analysis
            .clone()
            .unwrap_or_else(|| serde_json::json!({ "echo": text })))
    }
}

pub fn state_with(provider: Arc<FakeProvider>, config: Config) -> AppState {
    AppState::new(Arc::new(config), provider).expect("should create AppState")
}

pub fn app(provider: Arc<FakeProvider>) -> Router {
    handlers::router(state_with(provider, test_config("")))
}

pub fn post_json(uri: &str, body: impl Into<String>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.into()))
        .expect("should build request")
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

/// Read body frames until the body ends or fails
///
/// Returns the data read so far and whether the body ended with an error.
pub async fn read_body(response: Response<Body>) -> (String, bool) {
    let mut data = response.into_body().into_data_stream();
    let mut text = String::new();
    while let Some(frame) = data.next().await {
        match frame {
            Ok(bytes) => text.push_str(&String::from_utf8_lossy(&bytes)),
            Err(_) => return (text, true),
        }
    }
    (text, false)
}

/// `{"text": ...}` payloads of every `data:` frame, in order
pub fn frame_texts(body: &str) -> Vec<String> {
    body.split("\n\n")
        .filter_map(|frame| frame.strip_prefix("data: "))
        .filter(|data| *data != "[DONE]")
        .map(|data| {
            let value: serde_json::Value =
                serde_json::from_str(data).expect("frame should be JSON");
            value["text"]
                .as_str()
                .expect("frame should carry text")
                .to_string()
        })
        .collect()
}
