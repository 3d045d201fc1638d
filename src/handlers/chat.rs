//! Chat endpoint handler
//!
//! Handles POST /chat requests. The `stream` flag decides between a single
//! JSON body and a server-sent event stream.

use crate::error::{AppError, AppResult, Operation, ProviderError};
use crate::handlers::AppState;
use crate::handlers::extractor::ValidatedJson;
use crate::handlers::streaming;
use crate::metrics::Outcome;
use crate::middleware::RequestId;
use crate::provider::{ChatMessage, ChatReply, MessageRole};
use axum::{
    Extension, Json,
    extract::State,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Instant;

/// Maximum number of messages in one conversation
const MAX_MESSAGES: usize = 100;

/// Maximum total content length across all messages in characters (500K chars)
const MAX_TOTAL_CONTENT_LENGTH: usize = 500_000;

/// Chat request from client
///
/// Validation is enforced during deserialization - invalid instances cannot exist.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    messages: Vec<ChatMessage>,
    stream: bool,
}

impl ChatRequest {
    /// Get the conversation, in client order
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Whether the client asked for a streamed response
    pub fn stream(&self) -> bool {
        self.stream
    }
}

impl<'de> Deserialize<'de> for ChatRequest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;

        #[derive(Deserialize)]
        struct RawChatRequest {
            #[serde(default)]
            messages: Option<serde_json::Value>,
            #[serde(default)]
            stream: Option<serde_json::Value>,
        }

        let raw = RawChatRequest::deserialize(deserializer)?;

        let items = match raw.messages {
            None => return Err(D::Error::custom("messages is required")),
            Some(serde_json::Value::Array(items)) => items,
            Some(_) => return Err(D::Error::custom("messages must be an array")),
        };

        let messages = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                serde_json::from_value::<ChatMessage>(item)
                    .map_err(|e| D::Error::custom(format!("messages[{}]: {}", index, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        validate_messages(&messages).map_err(D::Error::custom)?;

        let stream = match raw.stream {
            None => false,
            Some(serde_json::Value::Bool(stream)) => stream,
            Some(_) => return Err(D::Error::custom("stream must be a boolean")),
        };

        Ok(ChatRequest { messages, stream })
    }
}

/// Conversation-level checks on already well-typed messages
fn validate_messages(messages: &[ChatMessage]) -> Result<(), String> {
    if messages.is_empty() {
        return Err("messages must contain at least one message".to_string());
    }

    if messages.len() > MAX_MESSAGES {
        return Err(format!(
            "messages cannot contain more than {} entries (got {})",
            MAX_MESSAGES,
            messages.len()
        ));
    }

    for (index, message) in messages.iter().enumerate() {
        // Assistant turns may be empty (e.g. a prior tool-only reply)
        if message.role() != MessageRole::Assistant && message.content().trim().is_empty() {
            return Err(format!(
                "messages[{}].content cannot be empty or contain only whitespace",
                index
            ));
        }
    }

    let total: usize = messages.iter().map(ChatMessage::content_length).sum();
    if total > MAX_TOTAL_CONTENT_LENGTH {
        return Err(format!(
            "total message content exceeds maximum length of {} characters (got {})",
            MAX_TOTAL_CONTENT_LENGTH, total
        ));
    }

    Ok(())
}

/// Non-streaming chat response to client
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    /// Content of the first choice
    pub message: String,
    /// Provider usage object, `null` when the provider sent none
    pub usage: serde_json::Value,
}

/// POST /chat handler
pub async fn handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    request: Result<ValidatedJson<ChatRequest>, AppError>,
) -> AppResult<Response> {
    let metrics = state.metrics();

    let ValidatedJson(request) = request.inspect_err(|e| {
        tracing::warn!(
            request_id = %request_id,
            endpoint = "chat",
            error = %e,
            "Rejected chat request"
        );
        metrics.record_request(Operation::Chat, Outcome::Rejected);
    })?;

    tracing::debug!(
        request_id = %request_id,
        messages_count = request.messages().len(),
        stream = request.stream(),
        "Received chat request"
    );

    let provider_failed = |e: ProviderError| {
        metrics.record_request(Operation::Chat, Outcome::ProviderFailed);
        tracing::error!(
            request_id = %request_id,
            endpoint = "chat",
            stream = request.stream(),
            error = %e,
            "Chat request failed"
        );
        AppError::provider(Operation::Chat, e)
    };

    let started = Instant::now();
    let reply = state
        .provider()
        .query(request.messages(), request.stream())
        .await;
    metrics.observe_provider_duration(Operation::Chat, started.elapsed().as_secs_f64());

    match reply.map_err(provider_failed)? {
        ChatReply::Complete(completion) => {
            let message = completion
                .first_content()
                .map_err(provider_failed)?
                .to_string();
            metrics.record_request(Operation::Chat, Outcome::Success);

            Ok(Json(ChatResponse {
                message,
                usage: completion.usage(),
            })
            .into_response())
        }
        ChatReply::Stream(chunks) => {
            metrics.record_request(Operation::Chat, Outcome::Success);
            tracing::info!(request_id = %request_id, "Starting streaming response");

            Ok(streaming::sse_response(
                chunks,
                &state.config().streaming,
                metrics,
                request_id,
            ))
        }
    }
}
