//! HTTP route handlers.
//!
//! The gateway calls [`sms::sms`] for every received message; the `/api`
//! endpoints are read-only views for operators and monitoring.

pub mod health;
pub mod sms;
pub mod status;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::gateway::Gateway;

/// State passed to every handler via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/sms", get(sms::sms))
        .route("/api/health", get(health::health))
        .route("/api/status", get(status::status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
