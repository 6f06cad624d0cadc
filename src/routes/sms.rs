//! Inbound SMS hook called by the gateway.

use axum::extract::{Query, State};
use serde::Deserialize;

use super::AppState;

#[derive(Deserialize)]
pub struct SmsQuery {
    /// Sender phone number.
    pub sender: String,
    /// Base64-encoded message body.
    pub message: String,
}

/// `GET /sms?sender=..&message=..`: returns a plain-text acknowledgement.
///
/// Missing parameters are rejected by the `Query` extractor with `400`.
pub async fn sms(State(state): State<AppState>, Query(q): Query<SmsQuery>) -> &'static str {
    state.gateway.handle_sms(&q.sender, &q.message).await
}
