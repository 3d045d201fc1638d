//! Error types for stackrelay
//!
//! All request-path errors implement `IntoResponse` for Axum handlers and
//! render as the uniform `{"error": "..."}` envelope.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Failures raised by the provider collaborator
///
/// Every variant carries a human-readable message; `Display` is what ends up
/// in the client-visible error envelope.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("{0}")]
    Transport(String),

    #[error("Provider request timed out after {timeout_seconds} seconds")]
    Timeout { timeout_seconds: u64 },

    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("Provider stream failed: {0}")]
    Stream(String),

    #[error("No provider API key configured (set provider.api_key or ${env_var})")]
    MissingApiKey { env_var: String },
}

impl ProviderError {
    /// Whether a repeat of the same idempotent call could succeed
    ///
    /// Connection failures, timeouts, rate limits and 5xx responses are
    /// transient. Authentication and shape errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout { .. } => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::MalformedResponse(_) | Self::Stream(_) | Self::MissingApiKey { .. } => false,
        }
    }

    /// Short label for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Timeout { .. } => "timeout",
            Self::Api { .. } => "api",
            Self::MalformedResponse(_) => "malformed_response",
            Self::Stream(_) => "stream",
            Self::MissingApiKey { .. } => "missing_api_key",
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::MalformedResponse(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Which gateway operation a provider failure belongs to
///
/// Selects the generic message used when the failure has no message of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Chat,
    Analyze,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Chat => "chat",
            Operation::Analyze => "analyze",
        }
    }

    /// Fallback message for failures that carry no text
    pub fn generic_message(&self) -> &'static str {
        match self {
            Operation::Chat => "Failed to process chat request",
            Operation::Analyze => "Failed to analyze text",
        }
    }
}

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read config file '{path}': {source}")]
    ConfigFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ConfigParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration in '{path}': {reason}")]
    ConfigValidationFailed { path: String, reason: String },

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("{} failed: {source}", .operation.as_str())]
    Provider {
        operation: Operation,
        #[source]
        source: ProviderError,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Wrap a provider failure for the given operation
    pub fn provider(operation: Operation, source: ProviderError) -> Self {
        Self::Provider { operation, source }
    }

    /// Status code and client-visible message for this error
    pub fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Provider { operation, source } => {
                let message = source.to_string();
                let message = if message.trim().is_empty() {
                    operation.generic_message().to_string()
                } else {
                    message
                };
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
            Self::Config(msg) | Self::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
            Self::ConfigFileRead { .. }
            | Self::ConfigParseFailed { .. }
            | Self::ConfigValidationFailed { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;
