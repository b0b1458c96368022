//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific concern.

pub mod error;
pub mod health;
pub mod run;
pub mod webhook;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::orchestrator::Orchestrator;
use crate::trigger::WebhookRegistry;

/// Shared state of every handler
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub registry: Arc<WebhookRegistry>,
}

impl AppState {
    /// State for `orchestrator`, subscribed to its own trigger
    pub fn new(orchestrator: Orchestrator) -> Self {
        let registry = WebhookRegistry::new();
        registry.register(
            orchestrator.definition().name(),
            orchestrator.definition().trigger(),
        );
        Self {
            orchestrator,
            registry: Arc::new(registry),
        }
    }
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Trigger endpoints
        .route("/webhook", post(webhook::receive_webhook))
        .route("/trigger", post(webhook::trigger_run))
        .route("/subscriptions", get(webhook::list_subscriptions))
        // Run endpoints
        .route("/runs", get(run::list_runs))
        .route("/runs/{id}", get(run::get_run))
        .route("/runs/{id}/logs", get(run::get_run_logs))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
