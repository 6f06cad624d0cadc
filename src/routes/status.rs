//! Modem telemetry endpoint.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use super::AppState;

/// `GET /api/status`: last modem snapshot plus session and modem state.
///
/// `telemetry` is `null` until the first successful poll.
pub async fn status(State(state): State<AppState>) -> Json<Value> {
    let st = state.gateway.state().lock().await;

    Json(json!({
        "started": st.started,
        "session": st.session.is_some(),
        "modem": st.modem,
        "telemetry": st.snapshot.as_ref().map(|s| s.to_json()),
    }))
}

#[cfg(test)]
mod tests {
    use super::super::test_support;
    use crate::config::Settings;
    use crate::testutil::{MockGateway, MockVehicle};
    use std::sync::Arc;
    use std::time::Instant;

    #[tokio::test]
    async fn test_status_before_and_after_poll() {
        let gw = MockGateway::start().await;
        let mut settings = Settings::default();
        settings.gateway.router = Some(gw.host());
        settings.gateway.port = gw.port();
        let state = test_support::state(settings, Arc::new(MockVehicle::new("AUTO")));

        let (_, body) = test_support::get(state.clone(), "/api/status").await;
        let v: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(v["started"], false);
        assert!(v["telemetry"].is_null());

        state.gateway.start().await.unwrap();
        state.gateway.tick(Instant::now()).await;

        let (_, body) = test_support::get(state, "/api/status").await;
        let v: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(v["session"], true);
        assert_eq!(v["modem"], "1-1");
        assert_eq!(v["telemetry"]["rssi"], 67);
        assert_eq!(v["telemetry"]["snr"], 12);
        assert_eq!(v["telemetry"]["mcc"], 246);
        assert_eq!(v["telemetry"]["mnc"], 1);
        assert_eq!(v["telemetry"]["fields"]["operator"], "Bite LT");
    }
}
