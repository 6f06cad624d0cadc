#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::unused_async)]
#![allow(clippy::redundant_closure_for_method_calls)]

//! rutlink library: cellular gateway integration for a vehicle ground station.
//!
//! Building blocks:
//! - `rpc`: session-aware JSON-RPC client for the gateway's ubus endpoint
//! - `modem` / `lte`: modem discovery and periodic signal telemetry
//! - `autoreply`: keeps the gateway's SMS auto-reply templates current
//! - `sms`: `!!` command interpreter and outbound SMS
//! - `gateway`: the tick-driven component tying these together
//! - `control`: `start` / `stop` / `status` / `set` operator commands
//! - `routes`: HTTP hook for inbound SMS plus status endpoints

pub mod autoreply;
pub mod config;
pub mod control;
pub mod gateway;
pub mod geometry;
pub mod lte;
pub mod mobilelog;
pub mod modem;
pub mod routes;
pub mod rpc;
pub mod sms;
pub mod state;
pub mod vehicle;

#[cfg(test)]
mod testutil;

// Re-export key types at crate root for convenience.
pub use config::{Config, Settings};
pub use gateway::Gateway;
pub use routes::AppState;
pub use state::{GatewayState, SharedState};
pub use vehicle::{Detached, LinkSource, TelemetryLink, Vehicle};
