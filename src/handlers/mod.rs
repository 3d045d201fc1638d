//! HTTP request handlers for the stackrelay API

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::metrics::Metrics;
use crate::middleware::request_id_middleware;
use crate::provider::Provider;
use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod analyze;
pub mod chat;
pub mod extractor;
pub mod health;
pub mod metrics;
pub mod streaming;

/// Application state shared across all handlers
///
/// All fields are Arc'd for cheap cloning across Axum handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    provider: Arc<dyn Provider>,
    metrics: Arc<Metrics>,
}

impl AppState {
    /// Create a new AppState
    ///
    /// # Errors
    ///
    /// Returns `AppError::Internal` if the metrics registry cannot be built.
    pub fn new(config: Arc<Config>, provider: Arc<dyn Provider>) -> AppResult<Self> {
        let metrics = Metrics::new()
            .map_err(|e| AppError::Internal(format!("Failed to initialize metrics: {}", e)))?;

        Ok(Self {
            config,
            provider,
            metrics: Arc::new(metrics),
        })
    }

    /// Get reference to the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get reference to the provider
    pub fn provider(&self) -> &dyn Provider {
        self.provider.as_ref()
    }

    /// Get a shared handle to the metrics collector
    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }
}

/// Full application router
///
/// Every response, including errors, carries an `x-request-id` header.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/analyze", post(analyze::handler))
        .route("/chat", post(chat::handler))
        .route("/health", get(health::handler))
        .route("/metrics", get(metrics::handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id_middleware))
}
