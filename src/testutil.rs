//! Test doubles: an in-process mock gateway plus recording vehicle and link
//! implementations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use crate::geometry::Frame;
use crate::vehicle::{
    CellularStatus, GlobalPosition, GlobalTarget, LinkSource, LocalTarget, RadioStatus, SysStatus,
    TelemetryLink, Vehicle, Wind,
};

struct GatewayInner {
    rpc_calls: Vec<Value>,
    sms_sent: Vec<HashMap<String, String>>,
    login_code: i64,
    logins: usize,
    expired: bool,
    network: Value,
    mobile: Value,
    uci_set_code: i64,
    faults: HashMap<(String, String), Fault>,
}

/// Injected failure for one `object action` pair.
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// JSON-RPC error envelope with this code.
    Error(i64),
    /// Non-JSON body, seen by the client as a transport failure.
    Malformed,
}

/// Minimal ubus + SMS CGI gateway bound to an ephemeral loopback port.
#[derive(Clone)]
pub struct MockGateway {
    addr: std::net::SocketAddr,
    inner: Arc<Mutex<GatewayInner>>,
}

impl MockGateway {
    pub const TOKEN: &'static str = "5f6d0d3c8f3e4a0e9b6a2f1c7d8e9a0b";

    pub async fn start() -> Self {
        let inner = Arc::new(Mutex::new(GatewayInner {
            rpc_calls: Vec::new(),
            sms_sent: Vec::new(),
            login_code: 0,
            logins: 0,
            expired: false,
            network: json!({
                "lan": {"proto": "static", "ipaddr": "192.168.1.1"},
                "mob1s1a1": {"proto": "wwan", "modem": "1-1", "sim": "1"},
            }),
            mobile: json!({
                "signal": "-67",
                "rsrp": "-95",
                "sinr": "-12.4",
                "imsi": "246012345678901\n",
                "operator": "Bite LT",
            }),
            uci_set_code: 0,
            faults: HashMap::new(),
        }));

        let app = Router::new()
            .route("/ubus", post(rpc))
            .route("/cgi-bin/sms_send", get(sms_send))
            .with_state(inner.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, inner }
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn rpc_url(&self) -> String {
        format!("{}/ubus", self.base_url())
    }

    pub fn rpc_calls(&self) -> Vec<Value> {
        self.inner.lock().unwrap().rpc_calls.clone()
    }

    /// Recorded calls to `object action`.
    pub fn calls_to(&self, object: &str, action: &str) -> Vec<Value> {
        self.rpc_calls()
            .into_iter()
            .filter(|c| c["params"][1] == object && c["params"][2] == action)
            .collect()
    }

    pub fn sms_sent(&self) -> Vec<HashMap<String, String>> {
        self.inner.lock().unwrap().sms_sent.clone()
    }

    pub fn login_count(&self) -> usize {
        self.inner.lock().unwrap().logins
    }

    pub fn set_login_code(&self, code: i64) {
        self.inner.lock().unwrap().login_code = code;
    }

    /// Reject every non-placeholder token with `-32002` until the next login.
    pub fn expire_sessions(&self) {
        self.inner.lock().unwrap().expired = true;
    }

    pub fn set_network(&self, network: Value) {
        self.inner.lock().unwrap().network = network;
    }

    pub fn set_mobile(&self, mobile: Value) {
        self.inner.lock().unwrap().mobile = mobile;
    }

    pub fn set_uci_set_code(&self, code: i64) {
        self.inner.lock().unwrap().uci_set_code = code;
    }

    /// Make every `object action` call fail until [`MockGateway::clear_faults`].
    pub fn set_fault(&self, object: &str, action: &str, fault: Fault) {
        self.inner
            .lock()
            .unwrap()
            .faults
            .insert((object.to_string(), action.to_string()), fault);
    }

    pub fn clear_faults(&self) {
        self.inner.lock().unwrap().faults.clear();
    }
}

async fn rpc(State(inner): State<Arc<Mutex<GatewayInner>>>, Json(body): Json<Value>) -> Response {
    let mut g = inner.lock().unwrap();
    g.rpc_calls.push(body.clone());
    let id = body["id"].clone();
    let token = body["params"][0].as_str().unwrap_or_default().to_string();
    let object = body["params"][1].as_str().unwrap_or_default().to_string();
    let action = body["params"][2].as_str().unwrap_or_default().to_string();

    match g.faults.get(&(object.clone(), action.clone())) {
        Some(Fault::Error(code)) => {
            return Json(json!({
                "jsonrpc": "2.0", "id": id,
                "error": {"code": code, "message": "Injected fault"},
            }))
            .into_response();
        }
        Some(Fault::Malformed) => return "<html>502 Bad Gateway</html>".into_response(),
        None => {}
    }

    if g.expired && token != crate::rpc::PLACEHOLDER_SESSION && object != "session" {
        return Json(json!({
            "jsonrpc": "2.0", "id": id,
            "error": {"code": -32002, "message": "Access denied"},
        }))
        .into_response();
    }

    let result = match (object.as_str(), action.as_str()) {
        ("session", "login") => {
            g.logins += 1;
            if g.login_code == 0 {
                g.expired = false;
                json!([0, {"ubus_rpc_session": MockGateway::TOKEN, "timeout": 300}])
            } else {
                json!([g.login_code])
            }
        }
        ("uci", "get") => json!([0, {"values": g.network.clone()}]),
        ("uci", "set") => json!([g.uci_set_code]),
        ("uci", "apply") => json!([0]),
        ("vuci.network.mobile", "mobile_info") => json!([0, {"mobile": g.mobile.clone()}]),
        ("system", "board") => json!([0, {"model": "RUT955"}]),
        _ => {
            return Json(json!({
                "jsonrpc": "2.0", "id": id,
                "error": {"code": -32000, "message": "Object not found"},
            }))
            .into_response();
        }
    };
    Json(json!({"jsonrpc": "2.0", "id": id, "result": result})).into_response()
}

async fn sms_send(
    State(inner): State<Arc<Mutex<GatewayInner>>>,
    Query(query): Query<HashMap<String, String>>,
) -> &'static str {
    inner.lock().unwrap().sms_sent.push(query);
    "OK"
}

/// A vehicle command recorded by [`MockVehicle`].
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    ArmDisarm { arm: bool, force: bool },
    Mode(String),
    Local { frame: Frame, x: f64, y: f64 },
    Global { lat: f64, lon: f64 },
    Waypoint(u16),
    Speed(f64),
}

/// Records every command and serves canned telemetry.
pub struct MockVehicle {
    pub sent: Mutex<Vec<Sent>>,
    pub mode: Mutex<Option<String>>,
    pub armed: bool,
    pub sys_status: Option<SysStatus>,
    pub position: Option<GlobalPosition>,
    pub wind: Option<Wind>,
}

impl MockVehicle {
    pub fn new(mode: &str) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            mode: Mutex::new(Some(mode.to_string())),
            armed: false,
            sys_status: None,
            position: None,
            wind: None,
        }
    }

    pub fn with_telemetry(mut self) -> Self {
        self.armed = true;
        self.sys_status = Some(SysStatus {
            battery_remaining: 76,
            voltage_battery: 15_432,
        });
        self.position = Some(GlobalPosition {
            lat: 546_872_345,
            lon: 252_796_512,
            vx: 300,
            vy: 400,
            hdg: 9_040,
        });
        self.wind = Some(Wind {
            direction: 270.4,
            speed: 3.3,
        });
        self
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

impl Vehicle for MockVehicle {
    fn arm_disarm(&self, arm: bool, force: bool) {
        self.sent.lock().unwrap().push(Sent::ArmDisarm { arm, force });
    }

    fn set_mode(&self, mode: &str) {
        self.sent.lock().unwrap().push(Sent::Mode(mode.to_string()));
        *self.mode.lock().unwrap() = Some(mode.to_string());
    }

    fn set_local_position_target(&self, target: LocalTarget) {
        self.sent.lock().unwrap().push(Sent::Local {
            frame: target.frame,
            x: target.x,
            y: target.y,
        });
    }

    fn set_global_position_target(&self, target: GlobalTarget) {
        self.sent.lock().unwrap().push(Sent::Global {
            lat: target.lat,
            lon: target.lon,
        });
    }

    fn set_current_waypoint(&self, seq: u16) {
        self.sent.lock().unwrap().push(Sent::Waypoint(seq));
    }

    fn change_speed(&self, speed: f64) {
        self.sent.lock().unwrap().push(Sent::Speed(speed));
    }

    fn flight_mode(&self) -> Option<String> {
        self.mode.lock().unwrap().clone()
    }

    fn motors_armed(&self) -> bool {
        self.armed
    }

    fn sys_status(&self) -> Option<SysStatus> {
        self.sys_status
    }

    fn global_position(&self) -> Option<GlobalPosition> {
        self.position
    }

    fn wind(&self) -> Option<Wind> {
        self.wind
    }
}

/// What a [`MockLink`] was asked to send.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkMsg {
    Cellular(CellularStatus),
    Radio(RadioStatus),
}

pub struct MockLink {
    pub name: &'static str,
    pub cellular: bool,
    pub sent: Mutex<Vec<LinkMsg>>,
}

impl MockLink {
    pub fn new(name: &'static str, cellular: bool) -> Arc<Self> {
        Arc::new(Self {
            name,
            cellular,
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent(&self) -> Vec<LinkMsg> {
        self.sent.lock().unwrap().clone()
    }
}

impl TelemetryLink for MockLink {
    fn name(&self) -> &str {
        self.name
    }

    fn supports_cellular_status(&self) -> bool {
        self.cellular
    }

    fn send_cellular_status(&self, msg: &CellularStatus) {
        self.sent.lock().unwrap().push(LinkMsg::Cellular(msg.clone()));
    }

    fn send_radio_status(&self, msg: &RadioStatus) {
        self.sent.lock().unwrap().push(LinkMsg::Radio(msg.clone()));
    }
}

/// Fixed primary / extra / output link sets.
pub struct MockLinks {
    pub primary: Arc<MockLink>,
    pub extra: Vec<Arc<MockLink>>,
    pub outputs: Vec<Arc<MockLink>>,
}

impl LinkSource for MockLinks {
    fn primary(&self) -> Option<Arc<dyn TelemetryLink>> {
        Some(self.primary.clone() as Arc<dyn TelemetryLink>)
    }

    fn all_links(&self) -> Vec<Arc<dyn TelemetryLink>> {
        std::iter::once(self.primary.clone())
            .chain(self.extra.iter().cloned())
            .map(|l| l as Arc<dyn TelemetryLink>)
            .collect()
    }

    fn outputs(&self) -> Vec<Arc<dyn TelemetryLink>> {
        self.outputs
            .iter()
            .cloned()
            .map(|l| l as Arc<dyn TelemetryLink>)
            .collect()
    }
}
