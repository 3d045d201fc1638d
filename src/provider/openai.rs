//! Provider client for OpenAI-compatible chat completions APIs
//!
//! One `reqwest::Client` is shared by all requests. Each call is bounded by
//! `provider.timeout_seconds`: the whole exchange for single completions, and
//! up to the response headers for streams (the stream itself is bounded by
//! the relay's idle timeout).

use super::retry::{RetryPolicy, with_retry};
use super::sse::decode_chunks;
use super::types::{ChatCompletion, ChatMessage};
use super::{ChunkStream, Provider};
use crate::config::ProviderConfig;
use crate::error::{AppError, AppResult, ProviderError};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// Longest upstream error body echoed back in an error message
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Request body for `POST {base_url}/chat/completions`
#[derive(Debug, Serialize)]
struct CompletionsRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

/// HTTP client for one configured provider
pub struct OpenAiProvider {
    client: reqwest::Client,
    completions_url: String,
    model: String,
    api_key: Option<String>,
    api_key_env: String,
    timeout: Duration,
    retry: RetryPolicy,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
    analysis_prompt: String,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("completions_url", &self.completions_url)
            .field("model", &self.model)
            .field("api_key_configured", &self.api_key.is_some())
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl OpenAiProvider {
    /// Build a client from validated provider configuration
    ///
    /// `api_key` is the resolved key (config, environment or local
    /// credential store). Without one, every call fails with
    /// `ProviderError::MissingApiKey`.
    pub fn new(config: &ProviderConfig, api_key: Option<String>) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.timeout())
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        let retry = RetryPolicy::new(config.max_retries(), config.retry_backoff_ms())
            .map_err(|e| AppError::Config(format!("provider.max_retries: {}", e)))?;

        Ok(Self {
            client,
            completions_url: format!(
                "{}/chat/completions",
                config.base_url().trim_end_matches('/')
            ),
            model: config.model().to_string(),
            api_key,
            api_key_env: config.api_key_env().to_string(),
            timeout: config.timeout(),
            retry,
            temperature: config.temperature(),
            max_tokens: config.max_tokens(),
            analysis_prompt: config.analysis_prompt().to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send one completions request and check the status
    async fn send(
        &self,
        messages: &[ChatMessage],
        stream: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::MissingApiKey {
                env_var: self.api_key_env.clone(),
            })?;

        let body = CompletionsRequest {
            model: &self.model,
            messages,
            stream,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        tracing::debug!(
            url = %self.completions_url,
            model = %self.model,
            messages_count = messages.len(),
            stream,
            "Sending provider request"
        );

        let response = self
            .client
            .post(&self.completions_url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!(
                    status = %status,
                    error = %e,
                    "Failed to read provider error body, reporting status only"
                );
                String::new()
            }
        };
        Err(ProviderError::Api {
            status: status.as_u16(),
            message: api_error_message(status, &body),
        })
    }

    /// One bounded, unretried single-completion exchange
    async fn complete_once(&self, messages: &[ChatMessage]) -> Result<ChatCompletion, ProviderError> {
        let exchange = async {
            let response = self.send(messages, false).await?;
            let bytes = response.bytes().await?;
            serde_json::from_slice::<ChatCompletion>(&bytes)
                .map_err(|e| ProviderError::MalformedResponse(e.to_string()))
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| ProviderError::Timeout {
                timeout_seconds: self.timeout.as_secs(),
            })?
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<ChatCompletion, ProviderError> {
        self.complete_once(messages).await
    }

    async fn stream(&self, messages: &[ChatMessage]) -> Result<ChunkStream, ProviderError> {
        let response = tokio::time::timeout(self.timeout, self.send(messages, true))
            .await
            .map_err(|_| ProviderError::Timeout {
                timeout_seconds: self.timeout.as_secs(),
            })??;

        Ok(decode_chunks(response.bytes_stream()))
    }

    async fn analyze(&self, text: &str) -> Result<serde_json::Value, ProviderError> {
        let messages = [
            ChatMessage::system(self.analysis_prompt.as_str()),
            ChatMessage::user(text),
        ];

        let completion = with_retry(&self.retry, "analyze", |_| self.complete_once(&messages)).await?;
        Ok(parse_analysis(completion.first_content()?))
    }
}

/// Interpret the model's analysis reply
///
/// JSON replies (optionally wrapped in a Markdown code fence) are returned
/// parsed; anything else is returned as a JSON string.
pub fn parse_analysis(content: &str) -> serde_json::Value {
    let trimmed = content.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed);

    serde_json::from_str(unfenced)
        .unwrap_or_else(|_| serde_json::Value::String(content.to_string()))
}

/// Best available message for a non-success provider response
fn api_error_message(status: reqwest::StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let message = value
            .pointer("/error/message")
            .or_else(|| value.get("message"))
            .or_else(|| value.get("error"))
            .and_then(|m| m.as_str());
        if let Some(message) = message
            && !message.trim().is_empty()
        {
            return message.to_string();
        }
    }

    let body = body.trim();
    if !body.is_empty() {
        let truncated: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
        return format!("Provider returned {}: {}", status, truncated);
    }

    format!("Provider returned {}", status)
}
