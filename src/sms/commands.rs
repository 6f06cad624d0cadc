//! SMS command table and handlers.
//!
//! Every handler gets the lowercased keyword, the sender and the remaining
//! whitespace-separated arguments, performs its vehicle sends, and returns
//! the text to reply with, if any. Bad arguments and wrong flight modes are
//! answered with a usage or explanation reply; nothing here fails.

use std::collections::HashMap;

use tracing::info;

use crate::geometry;
use crate::vehicle::{GlobalTarget, LocalTarget, Vehicle, MODE_AUTO, MODE_GUIDED, MODE_LOITER};

/// What a handler sees of one command.
pub struct Context<'a> {
    pub vehicle: &'a dyn Vehicle,
    pub sender: &'a str,
    /// Lowercased keyword the command was invoked with.
    pub command: &'a str,
}

/// Handler signature: arguments exclude the keyword.
pub type Handler = fn(&Context<'_>, &[&str]) -> Option<String>;

/// Keyword → handler lookup, fixed at construction.
pub struct CommandTable {
    handlers: HashMap<&'static str, Handler>,
}

impl CommandTable {
    #[must_use]
    pub fn new() -> Self {
        let mut table = Self {
            handlers: HashMap::new(),
        };
        table.insert("arm", arm);
        table.insert("status", status);
        for mode in ["rtl", "auto", "guided", "hold"] {
            table.insert(mode, named_mode);
        }
        for loiter in ["loit", "loiter", "pause"] {
            table.insert(loiter, loiter_mode);
        }
        table.insert("move", move_relative);
        table.insert("goto", goto);
        table.insert("go", goto);
        table.insert("speed", speed);
        table.insert("start", start);
        table.insert("resume", start);
        table.insert("wp", waypoint);
        table
    }

    fn insert(&mut self, keyword: &'static str, handler: Handler) {
        let previous = self.handlers.insert(keyword, handler);
        assert!(previous.is_none(), "duplicate SMS command {keyword}");
    }

    #[must_use]
    pub fn get(&self, keyword: &str) -> Option<Handler> {
        self.handlers.get(keyword).copied()
    }

    /// Registered keywords, sorted.
    #[must_use]
    pub fn keywords(&self) -> Vec<&'static str> {
        let mut keys: Vec<_> = self.handlers.keys().copied().collect();
        keys.sort_unstable();
        keys
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a finite number, tolerating a trailing degree sign or comma.
fn number(token: &str) -> Option<f64> {
    token
        .trim_end_matches(|c| c == '°' || c == ',')
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// `Some(reply)` unless the vehicle is in guided mode.
fn require_guided(ctx: &Context<'_>) -> Option<String> {
    match ctx.vehicle.flight_mode() {
        Some(mode) if mode == MODE_GUIDED => None,
        mode => Some(format!(
            "Not in Guided mode {}",
            mode.as_deref().unwrap_or("UNKNOWN")
        )),
    }
}

fn arm(ctx: &Context<'_>, _args: &[&str]) -> Option<String> {
    ctx.vehicle.arm_disarm(true, false);
    None
}

fn status(ctx: &Context<'_>, _args: &[&str]) -> Option<String> {
    let v = ctx.vehicle;
    let (sys, position, wind) = (v.sys_status(), v.global_position(), v.wind());
    let (Some(sys), Some(position), Some(wind)) = (sys, position, wind) else {
        let missing: Vec<&str> = [
            ("SYS_STATUS", sys.is_none()),
            ("GLOBAL_POSITION_INT", position.is_none()),
            ("WIND", wind.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();
        return Some(format!("No telemetry yet (missing {})", missing.join(", ")));
    };

    Some(format!(
        "{} {} Batt {}% ({:.2}V)\n@ {:.7}, {:.7} {:.1}m/s @ {:.0}deg\nWind: {:.1}m/s @ {:.0}deg",
        if v.motors_armed() { "ARMED" } else { "DISARMED" },
        v.flight_mode().as_deref().unwrap_or("UNKNOWN"),
        sys.battery_remaining,
        f64::from(sys.voltage_battery) / 1000.0,
        position.lat_deg(),
        position.lon_deg(),
        position.ground_speed(),
        position.heading_deg(),
        wind.speed,
        wind.direction,
    ))
}

fn named_mode(ctx: &Context<'_>, _args: &[&str]) -> Option<String> {
    ctx.vehicle.set_mode(&ctx.command.to_ascii_uppercase());
    None
}

fn loiter_mode(ctx: &Context<'_>, _args: &[&str]) -> Option<String> {
    ctx.vehicle.set_mode(MODE_LOITER);
    None
}

fn move_relative(ctx: &Context<'_>, args: &[&str]) -> Option<String> {
    const USAGE: &str = "Usage: move X fwd|aft|port|stb|HDG [Y fwd|aft|port|stb]";
    if !matches!(args.len(), 2 | 4) {
        return Some(USAGE.to_string());
    }
    if let Some(reply) = require_guided(ctx) {
        return Some(reply);
    }

    let Some(distance1) = number(args[0]) else {
        return Some(USAGE.to_string());
    };
    let second = match args {
        [_, _, distance2, direction2] => match number(distance2) {
            Some(d) => Some((d, *direction2)),
            None => return Some(USAGE.to_string()),
        },
        _ => None,
    };

    let d = geometry::displacement(distance1, args[1], second);
    info!("SMS {}: moving {:.1}m {:.1}m ({:?})", ctx.sender, d.x, d.y, d.frame);
    if !d.is_negligible() {
        ctx.vehicle.set_local_position_target(LocalTarget {
            frame: d.frame,
            x: d.x,
            y: d.y,
        });
    }
    None
}

/// Sign of a hemisphere token: `+1` for `positive`, `-1` for `negative`.
fn hemisphere(token: &str, positive: char, negative: char) -> Option<f64> {
    match token.chars().next()?.to_ascii_lowercase() {
        c if c == positive => Some(1.0),
        c if c == negative => Some(-1.0),
        _ => None,
    }
}

/// `LAT N|S LON E|W` to signed degrees.
fn with_hemispheres(lat: &str, ns: &str, lon: &str, ew: &str) -> Option<(f64, f64)> {
    let lat = number(lat)? * hemisphere(ns, 'n', 's')?;
    let lon = number(lon)? * hemisphere(ew, 'e', 'w')?;
    Some((lat, lon))
}

fn goto(ctx: &Context<'_>, args: &[&str]) -> Option<String> {
    let cmd = ctx.command;
    let usage = || format!("Usage: {cmd} [-]LAT [-]LON or {cmd} LAT° (S|N), LON° (E|W)");
    if !matches!(args.len(), 2 | 4) {
        return Some(usage());
    }
    if let Some(reply) = require_guided(ctx) {
        return Some(reply);
    }

    let coords = match args {
        [lat, lon] => number(lat).zip(number(lon)),
        [lat, ns, lon, ew] => with_hemispheres(lat, ns, lon, ew),
        _ => None,
    };
    let Some((lat, lon)) = coords.filter(|(lat, lon)| lat.abs() <= 90.0 && lon.abs() <= 180.0)
    else {
        return Some(usage());
    };

    ctx.vehicle
        .set_global_position_target(GlobalTarget { lat, lon });
    Some(format!("Going to {lat:.7} {lon:.7}"))
}

fn speed(ctx: &Context<'_>, args: &[&str]) -> Option<String> {
    const USAGE: &str = "Usage: speed X (m/s)";
    let [value] = args else {
        return Some(USAGE.to_string());
    };
    match number(value) {
        Some(speed) => {
            ctx.vehicle.change_speed(speed);
            None
        }
        None => Some(USAGE.to_string()),
    }
}

fn start(ctx: &Context<'_>, _args: &[&str]) -> Option<String> {
    // Re-entering AUTO makes the mission engine restart from the current item
    if ctx.vehicle.flight_mode().as_deref() == Some(MODE_AUTO) {
        ctx.vehicle.set_mode(MODE_LOITER);
    }
    ctx.vehicle.set_mode(MODE_AUTO);
    None
}

fn waypoint(ctx: &Context<'_>, args: &[&str]) -> Option<String> {
    const USAGE: &str = "Usage: wp N";
    let [seq] = args else {
        return Some(USAGE.to_string());
    };
    match seq.parse::<u16>() {
        Ok(seq) => {
            ctx.vehicle.set_current_waypoint(seq);
            None
        }
        Err(_) => Some(USAGE.to_string()),
    }
}
