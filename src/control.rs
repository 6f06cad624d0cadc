//! Operator commands: `start`, `stop`, `status`, `set <key> <value>`.
//!
//! The binary feeds stdin to [`spawn_console`]; each line is executed and its
//! reply printed.

use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use crate::config::Settings;
use crate::gateway::Gateway;

const USAGE: &str = "Usage: start | stop | status | set <key> <value>";

/// Execute one command line and return the reply.
pub async fn execute(gateway: &Gateway, line: &str) -> String {
    let mut words = line.split_whitespace();
    match words.next() {
        Some("start") => match gateway.start().await {
            Ok(()) => "Started".to_string(),
            Err(reason) => reason.to_string(),
        },
        Some("stop") => {
            gateway.stop().await;
            "Stopped".to_string()
        }
        Some("status") => status(gateway).await,
        Some("set") => {
            let (Some(key), Some(value)) = (words.next(), words.next()) else {
                return format!(
                    "Usage: set <key> <value>\n{}",
                    gateway.settings().describe().join("\n")
                );
            };
            match gateway.set(key, value) {
                Ok(()) => format!("{key} = {value}"),
                Err(e) => e,
            }
        }
        _ => format!("{USAGE}\nkeys: {}", Settings::KEYS.join(", ")),
    }
}

/// Raw modem fields as `key: value` lines with keys padded to one width.
async fn status(gateway: &Gateway) -> String {
    let state = gateway.state().lock().await;
    if !state.started {
        return "Not started".to_string();
    }
    let Some(snapshot) = &state.snapshot else {
        return "no data".to_string();
    };

    let width = snapshot.fields.keys().map(String::len).max().unwrap_or(0);
    snapshot
        .fields
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            };
            format!("{key:<width$}: {value}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Read commands from stdin until EOF. Returns a `JoinHandle` for abort on shutdown.
pub fn spawn_console(gateway: Arc<Gateway>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!("Console: stdin closed");
                    break;
                }
                Err(e) => {
                    warn!("Console: read failed: {e}");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            let mut reply = execute(&gateway, &line).await;
            reply.push('\n');
            if stdout.write_all(reply.as_bytes()).await.is_err() {
                break;
            }
            let _ = stdout.flush().await;
        }
    })
}
