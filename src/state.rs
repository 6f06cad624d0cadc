//! Mutable integration state shared by the tick loop, the SMS hook and the
//! status API.
//!
//! Everything lives in one [`GatewayState`] behind a single
//! `tokio::sync::Mutex`. Critical sections are short: the lock is taken to
//! read or write a field and released before any network round trip.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tokio::sync::Mutex;

/// Shared handle to the integration state.
pub type SharedState = Arc<Mutex<GatewayState>>;

/// Last successfully decoded modem status.
#[derive(Debug, Clone)]
pub struct MobileSnapshot {
    /// Signal strength as reported on the links (255 = unknown).
    pub rssi: u8,
    /// Signal-to-noise magnitude (255 = unknown).
    pub snr: u8,
    /// Mobile country code (first three IMSI digits).
    pub mcc: u16,
    /// Mobile network code (next two IMSI digits).
    pub mnc: u16,
    pub imsi: Option<String>,
    /// Raw field map returned by the gateway.
    pub fields: Map<String, Value>,
    pub fetched_at: Instant,
}

/// Session, modem and scheduling state of one integration instance.
#[derive(Debug, Default)]
pub struct GatewayState {
    /// Set by `start`, cleared by `stop`. The tick loop is a no-op while false.
    pub started: bool,
    /// ubus session token; `None` means unauthenticated.
    pub session: Option<String>,
    /// Resolved modem identifier, cached once found.
    pub modem: Option<String>,
    pub snapshot: Option<MobileSnapshot>,
    pub last_login: Option<Instant>,
    pub last_poll: Option<Instant>,
    pub last_publish: Option<Instant>,
}

impl GatewayState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn shared() -> SharedState {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Drop the session only if it is still the token a failed call used.
    ///
    /// Returns `true` when the stored token was cleared.
    pub fn expire_session(&mut self, used: Option<&str>) -> bool {
        if self.session.is_some() && self.session.as_deref() == used {
            self.session = None;
            true
        } else {
            false
        }
    }

    /// Forget everything learned from the gateway (used by `stop`).
    pub fn reset(&mut self) {
        self.started = false;
        self.session = None;
        self.snapshot = None;
    }
}

/// `true` when `interval` has elapsed since `last` (or nothing ran yet).
pub fn is_due(last: Option<Instant>, now: Instant, interval: Duration) -> bool {
    match last {
        None => true,
        Some(t) => now.saturating_duration_since(t) >= interval,
    }
}
