//! Configuration loading and defaults.
//!
//! Configuration is resolved in order of precedence (highest wins):
//!
//! 1. **Environment variables**: `RUTLINK_ROUTER`, `RUTLINK_USERNAME`,
//!    `RUTLINK_PASSWORD`, `RUTLINK_LISTEN`
//! 2. **Config file**: path via `--config <path>`, or `rutlink.toml` in CWD
//! 3. **Compiled defaults**: see each field's default value below
//!
//! The TOML file mirrors the struct hierarchy:
//!
//! ```toml
//! [gateway]
//! router = "192.168.1.1"
//! port = 80
//! username = "admin"
//! password = "secret"
//! path = "ubus"
//! sms_path = "cgi-bin/sms_send"
//!
//! [telemetry]
//! freq = 1.0                 # modem polls per second
//! logfile = "/tmp/mobile.jsonl"
//! send_all_links = false
//! send_all_outputs = false
//!
//! [sms]
//! enabled = true
//!
//! [server]
//! listen = "0.0.0.0:8080"
//!
//! [logging]
//! level = "info"
//! ```

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub sms: SmsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where and how to reach the cellular gateway's JSON-RPC (ubus) endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Gateway host name or address. Required before `start`.
    #[serde(default)]
    pub router: Option<String>,
    /// HTTP port of the gateway web service (default 80).
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// JSON-RPC path under the gateway root (default `ubus`).
    #[serde(default = "default_rpc_path")]
    pub path: String,
    /// CGI path used to send outbound SMS (default `cgi-bin/sms_send`).
    #[serde(default = "default_sms_path")]
    pub sms_path: String,
    /// `sms_utils` section holding the status auto-reply template.
    #[serde(default = "default_status_section")]
    pub status_section: String,
    /// `events_reporting` section holding the event-report template.
    #[serde(default = "default_event_section")]
    pub event_section: String,
    /// HTTP client timeout in seconds (default 10).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Modem telemetry polling and fan-out.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Poll frequency in Hz (default 1.0).
    #[serde(default = "default_freq")]
    pub freq: f64,
    /// Optional JSON-lines file receiving every raw modem status.
    #[serde(default)]
    pub logfile: Option<String>,
    /// Send to every vehicle link, not just the primary one.
    #[serde(default)]
    pub send_all_links: bool,
    /// Additionally send to every output-only link.
    #[serde(default)]
    pub send_all_outputs: bool,
}

/// Inbound SMS command handling.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SmsConfig {
    /// Interpret `!!` messages as vehicle commands (default false).
    #[serde(default)]
    pub enabled: bool,
}

/// HTTP listener for the SMS hook and the status API.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind (default `0.0.0.0:8080`).
    #[serde(default = "default_listen")]
    pub listen: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter level (default `info`). Overridden by `RUST_LOG` env var.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_port() -> u16 {
    80
}
fn default_rpc_path() -> String {
    "ubus".to_string()
}
fn default_sms_path() -> String {
    "cgi-bin/sms_send".to_string()
}
fn default_status_section() -> String {
    "cfg0392bd".to_string()
}
fn default_event_section() -> String {
    "cfg0292bd".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_freq() -> f64 {
    1.0
}
fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            router: None,
            port: default_port(),
            username: None,
            password: None,
            path: default_rpc_path(),
            sms_path: default_sms_path(),
            status_section: default_status_section(),
            event_section: default_event_section(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            freq: default_freq(),
            logfile: None,
            send_all_links: false,
            send_all_outputs: false,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl GatewayConfig {
    /// `http://{router}:{port}`, or `None` until a router is configured.
    pub fn base_url(&self) -> Option<String> {
        self.router
            .as_deref()
            .map(|router| format!("http://{router}:{}", self.port))
    }
}

/// Settings the running integration reads on every tick.
///
/// This is the part of [`Config`] that `set <key> <value>` may change at
/// runtime; the tick path always works on a cloned snapshot.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub gateway: GatewayConfig,
    pub telemetry: TelemetryConfig,
    pub sms: SmsConfig,
}

impl Settings {
    /// Keys accepted by [`Settings::set`], in the order they are listed to users.
    pub const KEYS: &'static [&'static str] = &[
        "router",
        "port",
        "username",
        "password",
        "path",
        "freq",
        "logfile",
        "sendalllinks",
        "sendalloutputs",
        "sms_enabled",
    ];

    /// Poll interval derived from `freq`, capped at [`MAX_POLL_INTERVAL`].
    pub fn poll_interval(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.telemetry.freq)
            .map_or(MAX_POLL_INTERVAL, |interval| interval.min(MAX_POLL_INTERVAL))
    }

    /// Apply a single `set <key> <value>` change.
    ///
    /// On error the settings are left untouched.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "router" => self.gateway.router = optional(value),
            "port" => {
                self.gateway.port = value
                    .parse()
                    .map_err(|e| format!("invalid port {value:?}: {e}"))?;
            }
            "username" => self.gateway.username = optional(value),
            "password" => self.gateway.password = optional(value),
            "path" => self.gateway.path = value.trim_matches('/').to_string(),
            "freq" => {
                let freq: f64 = value
                    .parse()
                    .map_err(|e| format!("invalid freq {value:?}: {e}"))?;
                check_freq(freq)?;
                self.telemetry.freq = freq;
            }
            "logfile" => self.telemetry.logfile = optional(value),
            "sendalllinks" => self.telemetry.send_all_links = parse_bool(value)?,
            "sendalloutputs" => self.telemetry.send_all_outputs = parse_bool(value)?,
            "sms_enabled" => self.sms.enabled = parse_bool(value)?,
            _ => {
                return Err(format!(
                    "unknown setting {key:?} (expected one of: {})",
                    Self::KEYS.join(", ")
                ))
            }
        }
        Ok(())
    }

    /// One `key=value` line per setting; the password is masked.
    pub fn describe(&self) -> Vec<String> {
        let opt = |v: &Option<String>| v.clone().unwrap_or_else(|| "None".to_string());
        vec![
            format!("router={}", opt(&self.gateway.router)),
            format!("port={}", self.gateway.port),
            format!("username={}", opt(&self.gateway.username)),
            format!(
                "password={}",
                if self.gateway.password.is_some() { "****" } else { "None" }
            ),
            format!("path={}", self.gateway.path),
            format!("freq={}", self.telemetry.freq),
            format!("logfile={}", opt(&self.telemetry.logfile)),
            format!("sendalllinks={}", self.telemetry.send_all_links),
            format!("sendalloutputs={}", self.telemetry.send_all_outputs),
            format!("sms_enabled={}", self.sms.enabled),
        ]
    }
}

/// `none` / empty clears an optional setting.
fn optional(value: &str) -> Option<String> {
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        None
    } else {
        Some(value.to_string())
    }
}

/// Slowest accepted poll rate: one poll per [`MAX_POLL_INTERVAL`].
pub const MIN_FREQ: f64 = 1.0 / 3600.0;

/// Longest interval between polls.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(3600);

fn check_freq(freq: f64) -> Result<(), String> {
    if freq.is_finite() && freq >= MIN_FREQ {
        Ok(())
    } else {
        Err(format!("freq must be a number >= {MIN_FREQ} Hz, got {freq}"))
    }
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(format!("invalid boolean {value:?}")),
    }
}

impl Config {
    /// Load configuration with the precedence chain: env vars > file > defaults.
    ///
    /// If `path` is `Some`, reads that file. Otherwise looks for `rutlink.toml`
    /// in the current directory, falling back to compiled defaults.
    pub fn load(path: Option<&str>) -> Result<Self, String> {
        let mut config = if let Some(p) = path {
            Self::from_file(Path::new(p))?
        } else if Path::new("rutlink.toml").exists() {
            Self::from_file(Path::new("rutlink.toml"))?
        } else {
            Config::default()
        };

        // Env var overrides
        if let Ok(router) = std::env::var("RUTLINK_ROUTER") {
            config.gateway.router = Some(router);
        }
        if let Ok(username) = std::env::var("RUTLINK_USERNAME") {
            config.gateway.username = Some(username);
        }
        if let Ok(password) = std::env::var("RUTLINK_PASSWORD") {
            config.gateway.password = Some(password);
        }
        if let Ok(listen) = std::env::var("RUTLINK_LISTEN") {
            config.server.listen = listen;
        }

        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;
        toml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file {}: {e}", path.display()))
    }

    fn validate(&self) -> Result<(), String> {
        check_freq(self.telemetry.freq).map_err(|e| format!("telemetry.{e}"))
    }

    /// The runtime-adjustable part of the configuration.
    pub fn settings(&self) -> Settings {
        Settings {
            gateway: self.gateway.clone(),
            telemetry: self.telemetry.clone(),
            sms: self.sms.clone(),
        }
    }
}
