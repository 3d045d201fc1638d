//! JSON body extractor that reports failures in the gateway error envelope
//!
//! Axum's `Json` rejects bodies without an `application/json` content type
//! and answers with plain text. Clients of this gateway send JSON bodies with
//! whatever content type their HTTP library picks, so the body is read as
//! bytes and decoded directly. Every failure becomes a 400 with
//! `{"error": "..."}`.
//!
//! Request types do their own field validation inside `Deserialize`, so a
//! successfully extracted value is already valid.

use crate::error::AppError;
use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
};
use serde::de::DeserializeOwned;

/// Validated JSON request body
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|rejection| AppError::Validation(rejection.body_text()))?;

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(AppError::Validation("Request body is required".to_string()));
        }

        serde_json::from_slice(&bytes)
            .map(ValidatedJson)
            .map_err(|e| AppError::Validation(rejection_message(&e)))
    }
}

/// Client-facing text for a body that failed to decode
///
/// Field validation errors are raised as custom serde errors and carry
/// exactly the message the client should see; only syntax and type errors
/// get a prefix.
fn rejection_message(e: &serde_json::Error) -> String {
    use serde_json::error::Category;

    match e.classify() {
        Category::Data => strip_position(&e.to_string()),
        Category::Syntax | Category::Eof => format!("Malformed JSON body: {}", e),
        Category::Io => format!("Failed to read request body: {}", e),
    }
}

/// Drop serde_json's " at line X column Y" suffix
fn strip_position(message: &str) -> String {
    match message.rfind(" at line ") {
        Some(idx) => message[..idx].to_string(),
        None => message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Probe {
        #[allow(dead_code)]
        name: String,
    }

    async fn extract(body: &'static str, content_type: Option<&str>) -> Result<Probe, AppError> {
        let mut builder = Request::builder().method("POST").uri("/");
        if let Some(ct) = content_type {
            builder = builder.header("content-type", ct);
        }
        let req = builder.body(Body::from(body)).unwrap();
        ValidatedJson::<Probe>::from_request(req, &())
            .await
            .map(|ValidatedJson(p)| p)
    }

    #[tokio::test]
    async fn test_accepts_body_without_json_content_type() {
        assert!(extract(r#"{"name": "x"}"#, None).await.is_ok());
        assert!(extract(r#"{"name": "x"}"#, Some("text/plain")).await.is_ok());
    }

    #[tokio::test]
    async fn test_syntax_error_is_400() {
        let err = extract("{not json", Some("application/json"))
            .await
            .unwrap_err();
        let (status, message) = err.status_and_message();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(message.starts_with("Malformed JSON body"));
    }

    #[tokio::test]
    async fn test_empty_body_is_400() {
        let err = extract("  ", None).await.unwrap_err();
        let (status, message) = err.status_and_message();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(message, "Request body is required");
    }

    #[tokio::test]
    async fn test_data_error_drops_position_suffix() {
        let err = extract(r#"{"other": 1}"#, None).await.unwrap_err();
        let (_, message) = err.status_and_message();
        assert_eq!(message, "missing field `name`");
    }
}
