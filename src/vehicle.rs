//! Seams to the vehicle telemetry transport.
//!
//! The integration never speaks the vehicle protocol itself. It consumes a
//! [`Vehicle`] (command sends plus the most recent cached telemetry) and a
//! [`LinkSource`] (the outbound channels that receive modem status). Sends are
//! fire-and-forget: nothing here waits for an acknowledgement.

use std::sync::Arc;

use tracing::{debug, info};

use crate::geometry::Frame;

/// Mode in which the vehicle accepts external position targets.
pub const MODE_GUIDED: &str = "GUIDED";
/// Autonomous mission mode.
pub const MODE_AUTO: &str = "AUTO";
pub const MODE_LOITER: &str = "LOITER";

/// Battery part of the cached `SYS_STATUS` message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SysStatus {
    /// Remaining battery in percent (-1 when the autopilot does not estimate it).
    pub battery_remaining: i8,
    /// Battery voltage in millivolts.
    pub voltage_battery: u16,
}

/// Cached `GLOBAL_POSITION_INT` message, in the message's integer units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalPosition {
    /// Latitude in degrees * 1e7.
    pub lat: i32,
    /// Longitude in degrees * 1e7.
    pub lon: i32,
    /// North velocity in cm/s.
    pub vx: i16,
    /// East velocity in cm/s.
    pub vy: i16,
    /// Heading in centidegrees.
    pub hdg: u16,
}

impl GlobalPosition {
    #[must_use]
    pub fn lat_deg(&self) -> f64 {
        f64::from(self.lat) / 1e7
    }

    #[must_use]
    pub fn lon_deg(&self) -> f64 {
        f64::from(self.lon) / 1e7
    }

    /// Horizontal ground speed in m/s.
    #[must_use]
    pub fn ground_speed(&self) -> f64 {
        f64::from(self.vx).hypot(f64::from(self.vy)) / 100.0
    }

    #[must_use]
    pub fn heading_deg(&self) -> f64 {
        f64::from(self.hdg) / 100.0
    }
}

/// Cached `WIND` estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Wind {
    /// Direction the wind is coming from, degrees.
    pub direction: f32,
    /// Speed in m/s.
    pub speed: f32,
}

/// Position-only target relative to the vehicle or to its current position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalTarget {
    pub frame: Frame,
    /// Metres forward (body frame) or north (local frame).
    pub x: f64,
    /// Metres to starboard (body frame) or east (local frame).
    pub y: f64,
}

/// Absolute position target in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalTarget {
    pub lat: f64,
    pub lon: f64,
}

/// Command and telemetry interface of the attached vehicle.
pub trait Vehicle: Send + Sync {
    fn arm_disarm(&self, arm: bool, force: bool);
    fn set_mode(&self, mode: &str);
    fn set_local_position_target(&self, target: LocalTarget);
    fn set_global_position_target(&self, target: GlobalTarget);
    fn set_current_waypoint(&self, seq: u16);
    /// Ground speed change in m/s.
    fn change_speed(&self, speed: f64);

    /// Current flight mode name, `None` before the first heartbeat.
    fn flight_mode(&self) -> Option<String>;
    fn motors_armed(&self) -> bool;
    fn sys_status(&self) -> Option<SysStatus>;
    fn global_position(&self) -> Option<GlobalPosition>;
    fn wind(&self) -> Option<Wind>;
}

/// Rich cellular status (`CELLULAR_STATUS`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellularStatus {
    pub status: u8,
    pub failure_reason: u8,
    /// Radio access technology; 4 = LTE.
    pub network_type: u8,
    /// Signal quality, 255 = unknown.
    pub quality: u8,
    pub mcc: u16,
    pub mnc: u16,
    pub lac: u16,
}

/// Legacy radio status (`RADIO_STATUS`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioStatus {
    pub rssi: u8,
    pub remrssi: u8,
    pub txbuf: u8,
    pub noise: u8,
    pub remnoise: u8,
    pub rxerrors: u16,
    pub fixed: u16,
}

/// One outbound telemetry channel.
pub trait TelemetryLink: Send + Sync {
    fn name(&self) -> &str;
    /// Whether this link's dialect carries [`CellularStatus`].
    fn supports_cellular_status(&self) -> bool;
    fn send_cellular_status(&self, msg: &CellularStatus);
    fn send_radio_status(&self, msg: &RadioStatus);
}

/// Supplies the currently active links. Queried afresh on every poll.
pub trait LinkSource: Send + Sync {
    /// Link to the vehicle commands are sent on.
    fn primary(&self) -> Option<Arc<dyn TelemetryLink>>;
    /// Every vehicle link, primary included.
    fn all_links(&self) -> Vec<Arc<dyn TelemetryLink>>;
    /// Output-only links (e.g. forwarded ground-station streams).
    fn outputs(&self) -> Vec<Arc<dyn TelemetryLink>>;
}

/// Stand-in used when no vehicle transport is attached: commands are logged
/// and dropped, telemetry is always absent, and the single primary link logs
/// what it would have sent.
pub struct Detached {
    link: Arc<LogLink>,
}

impl Detached {
    #[must_use]
    pub fn new() -> Self {
        Self {
            link: Arc::new(LogLink),
        }
    }
}

impl Default for Detached {
    fn default() -> Self {
        Self::new()
    }
}

impl Vehicle for Detached {
    fn arm_disarm(&self, arm: bool, force: bool) {
        info!("Vehicle detached: dropping arm_disarm(arm={arm}, force={force})");
    }

    fn set_mode(&self, mode: &str) {
        info!("Vehicle detached: dropping set_mode({mode})");
    }

    fn set_local_position_target(&self, target: LocalTarget) {
        info!("Vehicle detached: dropping local target {target:?}");
    }

    fn set_global_position_target(&self, target: GlobalTarget) {
        info!("Vehicle detached: dropping global target {target:?}");
    }

    fn set_current_waypoint(&self, seq: u16) {
        info!("Vehicle detached: dropping set_current_waypoint({seq})");
    }

    fn change_speed(&self, speed: f64) {
        info!("Vehicle detached: dropping change_speed({speed})");
    }

    fn flight_mode(&self) -> Option<String> {
        None
    }

    fn motors_armed(&self) -> bool {
        false
    }

    fn sys_status(&self) -> Option<SysStatus> {
        None
    }

    fn global_position(&self) -> Option<GlobalPosition> {
        None
    }

    fn wind(&self) -> Option<Wind> {
        None
    }
}

impl LinkSource for Detached {
    fn primary(&self) -> Option<Arc<dyn TelemetryLink>> {
        Some(self.link.clone() as Arc<dyn TelemetryLink>)
    }

    fn all_links(&self) -> Vec<Arc<dyn TelemetryLink>> {
        vec![self.link.clone() as Arc<dyn TelemetryLink>]
    }

    fn outputs(&self) -> Vec<Arc<dyn TelemetryLink>> {
        Vec::new()
    }
}

/// Link that only logs.
struct LogLink;

impl TelemetryLink for LogLink {
    fn name(&self) -> &str {
        "log"
    }

    fn supports_cellular_status(&self) -> bool {
        true
    }

    fn send_cellular_status(&self, msg: &CellularStatus) {
        debug!("Link log: {msg:?}");
    }

    fn send_radio_status(&self, msg: &RadioStatus) {
        debug!("Link log: {msg:?}");
    }
}
