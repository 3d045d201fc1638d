//! stackrelay - Validating relay for a hosted LLM provider
//!
//! This library provides an HTTP gateway with two operations, `POST /chat`
//! (JSON or server-sent events) and `POST /analyze`, plus the client-side
//! credential holder that keeps the provider API key.

pub mod cli;
pub mod config;
pub mod credentials;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod provider;
pub mod telemetry;
