//! Keeps the gateway's own SMS auto-replies current with the vehicle position.
//!
//! The gateway answers status queries and event reports itself, even when
//! nothing on the vehicle side is running. Every [`PUBLISH_INTERVAL`] the
//! templates in `sms_utils` and `events_reporting` are rewritten to end with
//! the latest position and a timestamp, then committed with `uci apply`.

use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use serde_json::json;
use tracing::{debug, warn};

use crate::config::GatewayConfig;
use crate::rpc::{params, RpcClient, RpcError};
use crate::state::SharedState;
use crate::vehicle::{GlobalPosition, Vehicle};

/// Minimum spacing between template rewrites.
pub const PUBLISH_INTERVAL: Duration = Duration::from_secs(30);

/// Seconds the gateway may take to apply the new configuration.
const APPLY_TIMEOUT_SECS: u64 = 10;

/// `LAT LON @ TIMESTAMP` line appended to both templates.
fn position_line(position: &GlobalPosition, at: &DateTime<Local>) -> String {
    format!(
        "{:.7} {:.7} @ {}",
        position.lat_deg(),
        position.lon_deg(),
        at.format("%Y-%m-%dT%H:%M:%S")
    )
}

/// Status reply template. `%`-codes are expanded by the gateway.
pub fn status_template(position: &GlobalPosition, at: &DateTime<Local>) -> String {
    format!(
        "%rn\n%cs over %ct at %ss\nCELL %ci\n{}",
        position_line(position, at)
    )
}

/// Event report template.
pub fn event_template(position: &GlobalPosition, at: &DateTime<Local>) -> String {
    format!("%ts %rn %ex %ss\nCELL %ci\n{}", position_line(position, at))
}

/// Outcome of one publish attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Publish {
    /// All three calls completed (non-zero codes are logged, not fatal).
    Completed,
    /// No vehicle position yet; retry on the next tick.
    NoPosition,
}

/// Rewrite both templates and apply. Updates the publish time once the
/// three calls have completed.
pub async fn publish(
    rpc: &RpcClient,
    state: &SharedState,
    gateway: &GatewayConfig,
    vehicle: &dyn Vehicle,
    now: Instant,
) -> Result<Publish, RpcError> {
    let Some(position) = vehicle.global_position() else {
        debug!("Auto-reply: position unknown");
        return Ok(Publish::NoPosition);
    };
    let at = Local::now();

    let status = rpc
        .call(
            "call",
            "uci",
            "set",
            params(json!({
                "config": "sms_utils",
                "section": gateway.status_section,
                "values": { "message": status_template(&position, &at) },
            })),
        )
        .await?;
    let event = rpc
        .call(
            "call",
            "uci",
            "set",
            params(json!({
                "config": "events_reporting",
                "section": gateway.event_section,
                "values": { "message": event_template(&position, &at) },
            })),
        )
        .await?;
    let apply = rpc
        .call(
            "call",
            "uci",
            "apply",
            params(json!({ "timeout": APPLY_TIMEOUT_SECS })),
        )
        .await?;

    if !status.is_ok() || !event.is_ok() || !apply.is_ok() {
        warn!(
            "Auto-reply: status set {}|{}, applied {}",
            status.code, event.code, apply.code
        );
    }

    state.lock().await.last_publish = Some(now);
    Ok(Publish::Completed)
}
