//! Unauthenticated health-check endpoint.

use axum::{extract::State, Json};
use serde_json::{json, Value};

use super::AppState;

/// `GET /api/health`: liveness check.
///
/// Returns status, uptime, version, and whether the integration is started
/// and holds a gateway session.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let uptime = state.gateway.uptime().as_secs();
    let (started, session) = {
        let st = state.gateway.state().lock().await;
        (st.started, st.session.is_some())
    };

    Json(json!({
        "status": "ok",
        "uptime_secs": uptime,
        "version": env!("CARGO_PKG_VERSION"),
        "started": started,
        "session": session,
    }))
}
