//! LTE signal reporting from the gateway modem to the vehicle links.
//!
//! Each poll reads `vuci.network.mobile mobile_info` for the resolved modem,
//! reduces the raw field map to a [`MobileSnapshot`], and sends it to every
//! selected link: `CELLULAR_STATUS` where the link's dialect has it,
//! `RADIO_STATUS` otherwise.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::config::TelemetryConfig;
use crate::mobilelog::MobileLog;
use crate::modem;
use crate::rpc::{params, RpcClient, RpcError};
use crate::state::{MobileSnapshot, SharedState};
use crate::vehicle::{CellularStatus, LinkSource, RadioStatus, TelemetryLink};

/// Signal-strength fields in order of preference.
pub const SIGNAL_KEYS: &[&str] = &["signal", "rsrp", "rscp", "rsrq"];

/// Signal-to-noise field.
pub const SNR_KEYS: &[&str] = &["sinr"];

/// Reported when a metric is missing ("unknown" on the wire).
pub const UNKNOWN: u8 = 255;

// TODO: derive from the modem's registration state instead of assuming connected.
const CELLULAR_STATUS_CONNECTED: u8 = 12;
const RADIO_TYPE_LTE: u8 = 4;
const RADIO_TXBUF: u8 = 100;

/// First of `keys` whose value parses as a number, truncated to an integer.
///
/// String values are trimmed; values that fail to parse are skipped.
pub fn first_int(fields: &Map<String, Value>, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|key| {
        let value = match fields.get(*key)? {
            Value::String(s) => s.trim().parse::<f64>().ok()?,
            Value::Number(n) => n.as_f64()?,
            _ => return None,
        };
        #[allow(clippy::cast_possible_truncation)]
        let truncated = value.trunc() as i64;
        value.is_finite().then_some(truncated)
    })
}

fn saturate(value: i64) -> u8 {
    u8::try_from(value.clamp(0, i64::from(u8::MAX))).unwrap_or(UNKNOWN)
}

/// Signal strength as a positive magnitude (`-67` dBm → 67), 255 when unknown.
pub fn signal_strength(fields: &Map<String, Value>) -> u8 {
    first_int(fields, SIGNAL_KEYS).map_or(UNKNOWN, |v| saturate(v.saturating_neg()))
}

/// SNR magnitude, 255 when unknown.
pub fn snr(fields: &Map<String, Value>) -> u8 {
    first_int(fields, SNR_KEYS).map_or(UNKNOWN, |v| {
        u8::try_from(v.unsigned_abs()).unwrap_or(u8::MAX)
    })
}

/// Split an IMSI into (MCC, MNC). Unparseable parts are 0.
pub fn mcc_mnc(imsi: &str) -> (u16, u16) {
    let digits = |range: std::ops::Range<usize>| {
        imsi.get(range)
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(0)
    };
    (digits(0..3), digits(3..5))
}

impl MobileSnapshot {
    /// Reduce a raw `mobile` field map.
    pub fn from_fields(fields: Map<String, Value>, fetched_at: Instant) -> Self {
        let imsi = fields
            .get("imsi")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let (mcc, mnc) = imsi.as_deref().map_or((0, 0), mcc_mnc);
        Self {
            rssi: signal_strength(&fields),
            snr: snr(&fields),
            mcc,
            mnc,
            imsi,
            fields,
            fetched_at,
        }
    }

    pub fn cellular_status(&self) -> CellularStatus {
        CellularStatus {
            status: CELLULAR_STATUS_CONNECTED,
            failure_reason: 0,
            network_type: RADIO_TYPE_LTE,
            quality: self.rssi,
            mcc: self.mcc,
            mnc: self.mnc,
            lac: 0,
        }
    }

    pub fn radio_status(&self) -> RadioStatus {
        RadioStatus {
            rssi: self.rssi,
            remrssi: UNKNOWN,
            txbuf: RADIO_TXBUF,
            noise: self.snr,
            remnoise: UNKNOWN,
            rxerrors: 0,
            fixed: 0,
        }
    }

    /// JSON view for the status API.
    pub fn to_json(&self) -> Value {
        json!({
            "rssi": self.rssi,
            "snr": self.snr,
            "mcc": self.mcc,
            "mnc": self.mnc,
            "imsi": self.imsi,
            "age_secs": self.fetched_at.elapsed().as_secs(),
            "fields": self.fields,
        })
    }
}

/// Links to report on: the primary (or every link with `send_all_links`),
/// plus every output with `send_all_outputs`.
pub fn select_links(source: &dyn LinkSource, config: &TelemetryConfig) -> Vec<Arc<dyn TelemetryLink>> {
    let mut links = if config.send_all_links {
        source.all_links()
    } else {
        source.primary().into_iter().collect()
    };
    if config.send_all_outputs {
        links.extend(source.outputs());
    }
    links
}

/// Send the snapshot on each link in the shape the link understands.
pub fn fan_out(snapshot: &MobileSnapshot, links: &[Arc<dyn TelemetryLink>]) {
    for link in links {
        if link.supports_cellular_status() {
            link.send_cellular_status(&snapshot.cellular_status());
        } else {
            link.send_radio_status(&snapshot.radio_status());
        }
    }
}

/// One poll cycle.
///
/// Returns `Ok(false)` when there was nothing to publish (no modem yet or a
/// non-zero status code). On success the snapshot and poll time are updated.
pub async fn poll(
    rpc: &RpcClient,
    state: &SharedState,
    links: &dyn LinkSource,
    config: &TelemetryConfig,
    mobile_log: &MobileLog,
    now: Instant,
) -> Result<bool, RpcError> {
    let Some(modem) = modem::ensure(rpc, state).await else {
        return Ok(false);
    };

    let reply = rpc
        .call(
            "call",
            "vuci.network.mobile",
            "mobile_info",
            params(json!({ "modem": modem })),
        )
        .await?;
    if !reply.is_ok() {
        debug!("LTE: mobile_info returned code {}", reply.code);
        return Ok(false);
    }

    let fields = match reply.payload.as_ref().map(|p| &p["mobile"]) {
        Some(Value::Object(map)) => map.clone(),
        _ => return Err(RpcError::Protocol("mobile_info reply has no mobile object".into())),
    };

    if let Some(path) = &config.logfile {
        mobile_log
            .append(Path::new(path), &Value::Object(fields.clone()))
            .await;
    }

    let snapshot = MobileSnapshot::from_fields(fields, now);
    debug!(
        "LTE: rssi={} snr={} mcc={} mnc={}",
        snapshot.rssi, snapshot.snr, snapshot.mcc, snapshot.mnc
    );

    fan_out(&snapshot, &select_links(links, config));

    let mut state = state.lock().await;
    state.snapshot = Some(snapshot);
    state.last_poll = Some(now);
    Ok(true)
}
