//! The gateway integration as one component.
//!
//! [`Gateway`] owns the runtime settings, the shared [`GatewayState`] and the
//! vehicle/link seams. The host drives it by calling [`Gateway::tick`]
//! repeatedly; inbound SMS arrive through [`Gateway::handle_sms`] on the HTTP
//! path and may run concurrently with a tick.
//!
//! [`GatewayState`]: crate::state::GatewayState

use std::sync::atomic::AtomicU64;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::autoreply::{self, PUBLISH_INTERVAL};
use crate::config::{GatewayConfig, Settings};
use crate::lte;
use crate::mobilelog::MobileLog;
use crate::rpc::RpcClient;
use crate::sms::{self, Interpreter, Outbox};
use crate::state::{is_due, GatewayState, SharedState};
use crate::vehicle::{LinkSource, Vehicle};

/// How often the tick loop wakes up. Actual work is paced by elapsed time.
pub const TICK_PERIOD: Duration = Duration::from_millis(200);

pub struct Gateway {
    settings: RwLock<Settings>,
    state: SharedState,
    http: reqwest::Client,
    next_id: Arc<AtomicU64>,
    vehicle: Arc<dyn Vehicle>,
    links: Arc<dyn LinkSource>,
    interpreter: Interpreter,
    mobile_log: MobileLog,
    created: Instant,
}

impl Gateway {
    pub fn new(
        settings: Settings,
        http: reqwest::Client,
        vehicle: Arc<dyn Vehicle>,
        links: Arc<dyn LinkSource>,
    ) -> Self {
        Self {
            settings: RwLock::new(settings),
            state: GatewayState::shared(),
            http,
            next_id: Arc::new(AtomicU64::new(1)),
            interpreter: Interpreter::new(vehicle.clone()),
            vehicle,
            links,
            mobile_log: MobileLog::new(),
            created: Instant::now(),
        }
    }

    /// Copy of the current settings.
    pub fn settings(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn uptime(&self) -> Duration {
        self.created.elapsed()
    }

    /// Apply `set <key> <value>`. Takes effect from the next tick.
    pub fn set(&self, key: &str, value: &str) -> Result<(), String> {
        let mut settings = self.settings.write().unwrap_or_else(PoisonError::into_inner);
        let mut updated = settings.clone();
        updated.set(key, value)?;
        *settings = updated;
        info!("Setting {key} updated");
        Ok(())
    }

    /// Begin ticking. Fails when no router is configured.
    pub async fn start(&self) -> Result<(), &'static str> {
        if self.settings().gateway.router.is_none() {
            return Err("Require router");
        }
        self.state.lock().await.started = true;
        info!("Gateway integration started");
        Ok(())
    }

    /// Stop ticking and forget the session and the last snapshot.
    pub async fn stop(&self) {
        self.state.lock().await.reset();
        info!("Gateway integration stopped");
    }

    fn rpc(&self, gateway: &GatewayConfig) -> Option<RpcClient> {
        let base = gateway.base_url()?;
        Some(RpcClient::new(
            self.http.clone(),
            format!("{base}/{}", gateway.path),
            self.state.clone(),
            self.next_id.clone(),
        ))
    }

    /// One scheduling step: log in if needed, then poll and publish whatever
    /// is due at `now`. Never fails; problems are logged and retried later.
    pub async fn tick(&self, now: Instant) {
        if !self.state.lock().await.started {
            return;
        }
        let settings = self.settings();
        let Some(rpc) = self.rpc(&settings.gateway) else {
            return;
        };

        let username = settings.gateway.username.as_deref().unwrap_or_default();
        let password = settings.gateway.password.as_deref().unwrap_or_default();
        if !rpc.ensure_session(now, username, password).await {
            return;
        }

        let poll_due = is_due(self.state.lock().await.last_poll, now, settings.poll_interval());
        if poll_due {
            let polled = lte::poll(
                &rpc,
                &self.state,
                self.links.as_ref(),
                &settings.telemetry,
                &self.mobile_log,
                now,
            )
            .await;
            match polled {
                Ok(_) => {}
                Err(e) if e.is_session_expired() => {
                    debug!("LTE: session expired during poll");
                    return;
                }
                Err(e) => warn!("LTE: poll failed: {e}"),
            }
        }

        let publish_due = {
            let state = self.state.lock().await;
            state.session.is_some() && is_due(state.last_publish, now, PUBLISH_INTERVAL)
        };
        if publish_due {
            if let Err(e) = autoreply::publish(
                &rpc,
                &self.state,
                &settings.gateway,
                self.vehicle.as_ref(),
                now,
            )
            .await
            {
                warn!("Auto-reply: publish failed: {e}");
            }
        }
    }

    /// Handle one inbound SMS and return the acknowledgement text.
    pub async fn handle_sms(&self, sender: &str, body: &str) -> &'static str {
        let settings = self.settings();
        let outbox = Outbox::new(self.http.clone(), settings.gateway);
        sms::handle(&self.interpreter, &outbox, settings.sms.enabled, sender, body).await
    }
}

/// Spawn the host scheduler. Returns a `JoinHandle` for abort on shutdown.
pub fn spawn_tick_loop(gateway: Arc<Gateway>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(TICK_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            gateway.tick(Instant::now()).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{Fault, LinkMsg, MockGateway, MockLink, MockLinks, MockVehicle};
    use base64::Engine;
    use serde_json::json;

    fn gateway(gw: &MockGateway, vehicle: Arc<MockVehicle>) -> (Gateway, Arc<MockLinks>) {
        let mut settings = Settings::default();
        settings.gateway.router = Some(gw.host());
        settings.gateway.port = gw.port();
        settings.gateway.username = Some("admin".into());
        settings.gateway.password = Some("secret".into());
        let links = Arc::new(MockLinks {
            primary: MockLink::new("primary", true),
            extra: vec![],
            outputs: vec![],
        });
        let gateway = Gateway::new(settings, reqwest::Client::new(), vehicle, links.clone());
        (gateway, links)
    }

    #[tokio::test]
    async fn test_tick_idle_until_started() {
        let gw = MockGateway::start().await;
        let (gateway, _) = gateway(&gw, Arc::new(MockVehicle::new("AUTO")));

        gateway.tick(Instant::now()).await;
        assert!(gw.rpc_calls().is_empty());
    }

    #[tokio::test]
    async fn test_start_requires_router() {
        let gw = MockGateway::start().await;
        let (gateway, _) = gateway(&gw, Arc::new(MockVehicle::new("AUTO")));
        gateway.set("router", "none").unwrap();
        assert_eq!(gateway.start().await, Err("Require router"));
        assert!(!gateway.state().lock().await.started);
    }

    #[tokio::test]
    async fn test_login_rate_limited_across_ticks() {
        let gw = MockGateway::start().await;
        gw.set_login_code(6);
        let (gateway, _) = gateway(&gw, Arc::new(MockVehicle::new("AUTO")));
        gateway.start().await.unwrap();

        let t0 = Instant::now();
        gateway.tick(t0).await;
        gateway.tick(t0 + Duration::from_secs(1)).await;
        gateway.tick(t0 + Duration::from_millis(4_999)).await;
        assert_eq!(gw.login_count(), 1);

        gateway.tick(t0 + Duration::from_secs(5)).await;
        assert_eq!(gw.login_count(), 2);
        assert!(gateway.state().lock().await.session.is_none());
        // Only login calls went out
        assert_eq!(gw.rpc_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_full_cycle_polls_and_publishes() {
        let gw = MockGateway::start().await;
        let (gateway, links) = gateway(&gw, Arc::new(MockVehicle::new("AUTO").with_telemetry()));
        gateway.start().await.unwrap();

        let t0 = Instant::now();
        gateway.tick(t0).await;
        assert_eq!(gw.login_count(), 1);
        assert_eq!(gw.calls_to("vuci.network.mobile", "mobile_info").len(), 1);
        assert_eq!(gw.calls_to("uci", "set").len(), 2);
        assert_eq!(gw.calls_to("uci", "apply").len(), 1);
        assert!(matches!(links.primary.sent().as_slice(), [LinkMsg::Cellular(_)]));

        // Poll is due again after 1/freq, publish not yet
        gateway.tick(t0 + Duration::from_millis(500)).await;
        assert_eq!(gw.calls_to("vuci.network.mobile", "mobile_info").len(), 1);
        gateway.tick(t0 + Duration::from_secs(1)).await;
        assert_eq!(gw.calls_to("vuci.network.mobile", "mobile_info").len(), 2);
        assert_eq!(gw.calls_to("uci", "apply").len(), 1);

        gateway.tick(t0 + Duration::from_secs(30)).await;
        assert_eq!(gw.calls_to("uci", "apply").len(), 2);
        assert_eq!(gw.login_count(), 1);
    }

    #[tokio::test]
    async fn test_expired_session_skips_publish_and_relogs() {
        let gw = MockGateway::start().await;
        let (gateway, _) = gateway(&gw, Arc::new(MockVehicle::new("AUTO").with_telemetry()));
        gateway.start().await.unwrap();

        let t0 = Instant::now();
        gateway.tick(t0).await;
        gw.expire_sessions();

        let t1 = t0 + Duration::from_secs(31);
        gateway.tick(t1).await;
        assert!(gateway.state().lock().await.session.is_none());
        assert_eq!(gw.calls_to("uci", "apply").len(), 1);

        gateway.tick(t1 + Duration::from_secs(1)).await;
        assert_eq!(gw.login_count(), 2);
        assert_eq!(gw.calls_to("uci", "apply").len(), 2);
    }

    async fn assert_poll_failure_is_contained(fault: Fault) {
        let gw = MockGateway::start().await;
        gw.set_fault("vuci.network.mobile", "mobile_info", fault);
        let (gateway, links) = gateway(&gw, Arc::new(MockVehicle::new("AUTO").with_telemetry()));
        gateway.start().await.unwrap();

        let t0 = Instant::now();
        gateway.tick(t0).await;
        {
            let state = gateway.state().lock().await;
            assert_eq!(state.session.as_deref(), Some(MockGateway::TOKEN));
            assert!(state.snapshot.is_none());
            assert!(state.last_poll.is_none());
            assert_eq!(state.last_publish, Some(t0));
        }
        assert_eq!(gw.calls_to("uci", "apply").len(), 1);
        assert!(links.primary.sent().is_empty());

        // The failed poll is retried on the very next tick
        gw.clear_faults();
        gw.set_mobile(json!({"signal": "-80", "sinr": "3"}));
        gateway.tick(t0 + Duration::from_millis(200)).await;
        assert_eq!(gw.calls_to("vuci.network.mobile", "mobile_info").len(), 2);
        assert_eq!(gw.login_count(), 1);
        let state = gateway.state().lock().await;
        let snapshot = state.snapshot.as_ref().unwrap();
        assert_eq!((snapshot.rssi, snapshot.snr), (80, 3));
    }

    #[tokio::test]
    async fn test_poll_fault_keeps_session_and_publishes() {
        assert_poll_failure_is_contained(Fault::Error(-32000)).await;
    }

    #[tokio::test]
    async fn test_poll_transport_failure_keeps_session_and_publishes() {
        assert_poll_failure_is_contained(Fault::Malformed).await;
    }

    #[tokio::test]
    async fn test_stop_clears_session_and_snapshot() {
        let gw = MockGateway::start().await;
        let (gateway, _) = gateway(&gw, Arc::new(MockVehicle::new("AUTO")));
        gateway.start().await.unwrap();
        gateway.tick(Instant::now()).await;
        assert!(gateway.state().lock().await.snapshot.is_some());

        gateway.stop().await;
        let state = gateway.state().lock().await;
        assert!(!state.started);
        assert!(state.session.is_none());
        assert!(state.snapshot.is_none());
    }

    #[tokio::test]
    async fn test_set_applies_to_next_tick() {
        let gw = MockGateway::start().await;
        let (gateway, _) = gateway(&gw, Arc::new(MockVehicle::new("AUTO")));
        assert!(gateway.set("freq", "0").is_err());
        assert!((gateway.settings().telemetry.freq - 1.0).abs() < f64::EPSILON);

        gateway.set("freq", "0.1").unwrap();
        gateway.start().await.unwrap();
        let t0 = Instant::now();
        gateway.tick(t0).await;
        gateway.tick(t0 + Duration::from_secs(5)).await;
        assert_eq!(gw.calls_to("vuci.network.mobile", "mobile_info").len(), 1);
        gateway.tick(t0 + Duration::from_secs(10)).await;
        assert_eq!(gw.calls_to("vuci.network.mobile", "mobile_info").len(), 2);
    }

    #[tokio::test]
    async fn test_handle_sms_respects_enabled() {
        let gw = MockGateway::start().await;
        let vehicle = Arc::new(MockVehicle::new("GUIDED"));
        let (gateway, _) = gateway(&gw, vehicle.clone());
        let body = base64::engine::general_purpose::STANDARD.encode("!!arm");

        assert_eq!(gateway.handle_sms("+1", &body).await, sms::ACK_DISABLED);
        assert!(vehicle.sent().is_empty());

        gateway.set("sms_enabled", "true").unwrap();
        assert_eq!(gateway.handle_sms("+1", &body).await, sms::ACK);
        assert_eq!(vehicle.sent().len(), 1);
    }
}
