//! JSON-RPC (ubus) session client for the cellular gateway.
//!
//! Every call is a `POST http://{router}:{port}/{path}` carrying
//!
//! ```json
//! {"jsonrpc": "2.0", "id": 7, "method": "call",
//!  "params": ["<session or 32 zeros>", "<object>", "<action>", {..}]}
//! ```
//!
//! A successful reply has `result: [code, payload?]`; a failed one has
//! `error: {code, message}`. The `-32002` error code means the session
//! expired: [`RpcClient::call`] clears the stored token when it sees it, so
//! the next tick logs in again.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::state::{is_due, SharedState};

/// Token sent while no session exists.
pub const PLACEHOLDER_SESSION: &str = "00000000000000000000000000000000";

/// ubus error code for an unknown or expired session.
pub const SESSION_EXPIRED_CODE: &str = "-32002";

/// Minimum spacing between login attempts, successful or not.
pub const LOGIN_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Errors returned by [`RpcClient`] calls.
#[derive(Debug)]
pub enum RpcError {
    /// The gateway rejected the session token. The token has already been cleared.
    SessionExpired { message: String },
    /// Any other JSON-RPC error envelope.
    Fault { code: String, message: String },
    /// HTTP transport error (connection refused, timeout, DNS failure, etc.).
    Transport(reqwest::Error),
    /// The response body was not a JSON-RPC reply.
    Protocol(String),
}

impl RpcError {
    /// Classify an error envelope by its code.
    fn from_envelope(error: &Value) -> Self {
        let code = code_string(&error["code"]);
        let message = error["message"].as_str().unwrap_or_default().to_string();
        if code == SESSION_EXPIRED_CODE {
            RpcError::SessionExpired { message }
        } else {
            RpcError::Fault { code, message }
        }
    }

    #[must_use]
    pub fn is_session_expired(&self) -> bool {
        matches!(self, RpcError::SessionExpired { .. })
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcError::SessionExpired { message } => write!(f, "invalid session: {message}"),
            RpcError::Fault { code, message } => write!(f, "RPC fault {code}: {message}"),
            RpcError::Transport(e) => write!(f, "HTTP request failed: {e}"),
            RpcError::Protocol(msg) => write!(f, "protocol error: {msg}"),
        }
    }
}

impl std::error::Error for RpcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RpcError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

/// Error codes arrive as numbers from some firmware and strings from others.
fn code_string(code: &Value) -> String {
    match code {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Decoded `result` array of a JSON-RPC reply.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcReply {
    /// ubus status code; `0` is success.
    pub code: i64,
    pub payload: Option<Value>,
}

impl RpcReply {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.code == 0
    }

    fn from_result(result: &Value) -> Result<Self, RpcError> {
        let items = result
            .as_array()
            .ok_or_else(|| RpcError::Protocol(format!("result is not an array: {result}")))?;
        let code = items
            .first()
            .and_then(Value::as_i64)
            .ok_or_else(|| RpcError::Protocol(format!("result has no status code: {result}")))?;
        Ok(Self {
            code,
            payload: items.get(1).cloned(),
        })
    }
}

/// Key/value parameters of a call (the fourth positional argument).
pub type Params = Map<String, Value>;

/// Build a [`Params`] map from a `json!({..})` object literal.
#[must_use]
pub fn params(value: Value) -> Params {
    match value {
        Value::Object(map) => map,
        _ => Params::new(),
    }
}

/// Session-aware JSON-RPC client bound to one gateway endpoint.
///
/// Cheap to construct: the HTTP client and the request-id counter are shared
/// handles, so a fresh client can be built from each settings snapshot.
#[derive(Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    url: String,
    state: SharedState,
    next_id: Arc<AtomicU64>,
}

impl RpcClient {
    pub fn new(
        http: reqwest::Client,
        url: String,
        state: SharedState,
        next_id: Arc<AtomicU64>,
    ) -> Self {
        Self {
            http,
            url,
            state,
            next_id,
        }
    }

    /// Endpoint URL this client posts to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Issue one call with the current session (or the placeholder token).
    pub async fn call(
        &self,
        method: &str,
        object: &str,
        action: &str,
        params: Params,
    ) -> Result<RpcReply, RpcError> {
        let session = self.state.lock().await.session.clone();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": [
                session.as_deref().unwrap_or(PLACEHOLDER_SESSION),
                object,
                action,
                params,
            ],
        });

        let response: Value = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(RpcError::Transport)?
            .json()
            .await
            .map_err(RpcError::Transport)?;
        debug!("RPC #{id} response to {method} {object} {action}: {response}");

        if let Some(error) = response.get("error") {
            let err = RpcError::from_envelope(error);
            if err.is_session_expired()
                && self.state.lock().await.expire_session(session.as_deref())
            {
                warn!("Gateway: invalid session, will log in again");
            }
            return Err(err);
        }

        let result = response
            .get("result")
            .ok_or_else(|| RpcError::Protocol(format!("reply has neither result nor error: {response}")))?;
        RpcReply::from_result(result)
    }

    /// Log in and store the session token on success.
    ///
    /// Returns `Ok(true)` when a session was established. A non-zero status
    /// code is logged and leaves the session unset.
    pub async fn login(&self, username: &str, password: &str) -> Result<bool, RpcError> {
        let reply = self
            .call(
                "call",
                "session",
                "login",
                params(json!({ "username": username, "password": password })),
            )
            .await?;

        if !reply.is_ok() {
            warn!("Gateway: failed to login (code {})", reply.code);
            return Ok(false);
        }

        let token = reply
            .payload
            .as_ref()
            .and_then(|p| p["ubus_rpc_session"].as_str())
            .ok_or_else(|| RpcError::Protocol("login reply has no ubus_rpc_session".into()))?;
        self.state.lock().await.session = Some(token.to_string());
        info!("Gateway: session started");
        Ok(true)
    }

    /// Log in unless a session exists or the last attempt was under
    /// [`LOGIN_RETRY_INTERVAL`] ago. Returns whether a session is held afterwards.
    ///
    /// The attempt time is recorded before the call, so failures are rate
    /// limited too.
    pub async fn ensure_session(&self, now: Instant, username: &str, password: &str) -> bool {
        {
            let mut state = self.state.lock().await;
            if state.session.is_some() {
                return true;
            }
            if !is_due(state.last_login, now, LOGIN_RETRY_INTERVAL) {
                return false;
            }
            state.last_login = Some(now);
        }

        match self.login(username, password).await {
            Ok(established) => established,
            Err(e) => {
                warn!("Gateway: login failed: {e}");
                false
            }
        }
    }
}
