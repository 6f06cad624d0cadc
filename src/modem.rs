//! Discovery of the active cellular modem.
//!
//! The gateway's `network` UCI config lists interface sections; the mobile
//! ones carry a `modem` option naming the modem they run on. The first such
//! section wins, in whatever order the gateway returned them.

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::rpc::{params, RpcClient};
use crate::state::SharedState;

/// Pick the modem id out of a `uci get config=network` payload.
fn modem_from_network(payload: &Value) -> Option<String> {
    payload["values"]
        .as_object()?
        .values()
        .find_map(|section| section.get("modem"))
        .and_then(|modem| match modem {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .filter(|id| !id.is_empty())
}

/// Look up the modem id. `None` on any failure; callers retry next cycle.
pub async fn resolve(rpc: &RpcClient) -> Option<String> {
    let reply = match rpc
        .call("call", "uci", "get", params(json!({ "config": "network" })))
        .await
    {
        Ok(reply) => reply,
        Err(e) => {
            debug!("Modem: network config read failed: {e}");
            return None;
        }
    };
    if !reply.is_ok() {
        debug!("Modem: network config read returned code {}", reply.code);
        return None;
    }
    reply.payload.as_ref().and_then(modem_from_network)
}

/// Return the cached modem id, resolving and caching it on first success.
pub async fn ensure(rpc: &RpcClient, state: &SharedState) -> Option<String> {
    if let Some(modem) = state.lock().await.modem.clone() {
        return Some(modem);
    }
    let modem = resolve(rpc).await?;
    let mut state = state.lock().await;
    // Another path may have resolved it meanwhile; keep the first one.
    let modem = state.modem.get_or_insert(modem).clone();
    info!("Gateway: modem {modem} selected");
    Some(modem)
}
