//! Analyze endpoint handler
//!
//! Handles POST /analyze requests: one text blob in, one structured
//! analysis out.

use crate::error::{AppError, AppResult, Operation};
use crate::handlers::AppState;
use crate::handlers::extractor::ValidatedJson;
use crate::metrics::Outcome;
use crate::middleware::RequestId;
use axum::{Extension, Json, extract::State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Instant;

/// Maximum allowed text length in characters (100K chars)
const MAX_TEXT_LENGTH: usize = 100_000;

/// Analyze request from client
///
/// Validation is enforced during deserialization - invalid instances cannot exist.
#[derive(Debug, Clone)]
pub struct AnalyzeRequest {
    text: String,
}

impl AnalyzeRequest {
    /// Get the text to analyze
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl<'de> Deserialize<'de> for AnalyzeRequest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct RawAnalyzeRequest {
            #[serde(default)]
            text: Option<serde_json::Value>,
        }

        let raw = RawAnalyzeRequest::deserialize(deserializer)?;

        let text = match raw.text {
            None => return Err(serde::de::Error::custom("text is required")),
            Some(serde_json::Value::String(text)) => text,
            Some(_) => return Err(serde::de::Error::custom("text must be a string")),
        };

        if text.trim().is_empty() {
            return Err(serde::de::Error::custom(
                "text cannot be empty or contain only whitespace",
            ));
        }

        let char_count = text.chars().count();
        if char_count > MAX_TEXT_LENGTH {
            return Err(serde::de::Error::custom(format!(
                "text exceeds maximum length of {} characters (got {})",
                MAX_TEXT_LENGTH, char_count
            )));
        }

        Ok(AnalyzeRequest { text })
    }
}

/// Analyze response to client
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeResponse {
    /// Provider-defined analysis value
    pub analysis: serde_json::Value,
    /// Captured when the response is built
    pub timestamp: DateTime<Utc>,
}

impl AnalyzeResponse {
    pub fn new(analysis: serde_json::Value) -> Self {
        Self {
            analysis,
            timestamp: Utc::now(),
        }
    }
}

/// POST /analyze handler
pub async fn handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    request: Result<ValidatedJson<AnalyzeRequest>, AppError>,
) -> AppResult<Json<AnalyzeResponse>> {
    let metrics = state.metrics();

    let ValidatedJson(request) = request.inspect_err(|e| {
        tracing::warn!(
            request_id = %request_id,
            endpoint = "analyze",
            error = %e,
            "Rejected analyze request"
        );
        metrics.record_request(Operation::Analyze, Outcome::Rejected);
    })?;

    tracing::debug!(
        request_id = %request_id,
        text_length = request.text().len(),
        "Received analyze request"
    );

    let started = Instant::now();
    let result = state.provider().analyze(request.text()).await;
    metrics.observe_provider_duration(Operation::Analyze, started.elapsed().as_secs_f64());

    match result {
        Ok(analysis) => {
            metrics.record_request(Operation::Analyze, Outcome::Success);
            tracing::info!(
                request_id = %request_id,
                duration_ms = started.elapsed().as_millis() as u64,
                "Analysis completed"
            );
            Ok(Json(AnalyzeResponse::new(analysis)))
        }
        Err(e) => {
            metrics.record_request(Operation::Analyze, Outcome::ProviderFailed);
            tracing::error!(
                request_id = %request_id,
                endpoint = "analyze",
                error = %e,
                error_kind = e.kind(),
                "Analysis failed"
            );
            Err(AppError::provider(Operation::Analyze, e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> Result<AnalyzeRequest, serde_json::Error> {
        serde_json::from_str(body)
    }

    #[test]
    fn test_valid_request() {
        let request = parse(r#"{"text": "Unity + C# project"}"#).unwrap();
        assert_eq!(request.text(), "Unity + C# project");
    }

    #[test]
    fn test_missing_text_rejected() {
        let err = parse("{}").unwrap_err();
        assert!(err.to_string().contains("text is required"));

        let err = parse(r#"{"text": null}"#).unwrap_err();
        assert!(err.to_string().contains("text is required"));
    }

    #[test]
    fn test_non_string_text_rejected() {
        for body in [r#"{"text": 42}"#, r#"{"text": ["a"]}"#, r#"{"text": {"a": 1}}"#] {
            let err = parse(body).unwrap_err();
            assert!(err.to_string().contains("text must be a string"), "{}", body);
        }
    }

    #[test]
    fn test_blank_text_rejected() {
        let err = parse(r#"{"text": "  \n\t"}"#).unwrap_err();
        assert!(err.to_string().contains("cannot be empty"));
    }

    #[test]
    fn test_length_limit_counts_characters() {
        let at_limit = "é".repeat(MAX_TEXT_LENGTH);
        let body = serde_json::json!({ "text": at_limit }).to_string();
        assert!(parse(&body).is_ok());

        let over = "a".repeat(MAX_TEXT_LENGTH + 1);
        let body = serde_json::json!({ "text": over }).to_string();
        let err = parse(&body).unwrap_err();
        assert!(err.to_string().contains("exceeds maximum length"));
    }

    #[test]
    fn test_response_serializes_rfc3339_timestamp() {
        let response = AnalyzeResponse::new(serde_json::json!({"engines": ["godot"]}));
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["analysis"]["engines"][0], "godot");
        let timestamp = value["timestamp"].as_str().expect("timestamp is a string");
        assert!(DateTime::parse_from_rfc3339(timestamp).is_ok());
    }
}
