//! Outbound SMS through the gateway's send-SMS CGI endpoint.

use std::time::Duration;

use tracing::info;

use crate::config::GatewayConfig;

/// Why a reply SMS was not delivered to the gateway.
#[derive(Debug)]
pub enum SmsError {
    /// No router address configured.
    NoRouter,
    Transport(reqwest::Error),
    /// Gateway answered with a non-success HTTP status.
    Status(reqwest::StatusCode),
}

impl std::fmt::Display for SmsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SmsError::NoRouter => write!(f, "no router configured"),
            SmsError::Transport(e) => write!(f, "transport error: {e}"),
            SmsError::Status(status) => write!(f, "gateway returned {status}"),
        }
    }
}

impl std::error::Error for SmsError {}

/// Sends SMS using the credentials of one settings snapshot.
pub struct Outbox {
    http: reqwest::Client,
    gateway: GatewayConfig,
}

impl Outbox {
    pub fn new(http: reqwest::Client, gateway: GatewayConfig) -> Self {
        Self { http, gateway }
    }

    /// Send `text` to `number`.
    pub async fn send(&self, number: &str, text: &str) -> Result<(), SmsError> {
        let base = self.gateway.base_url().ok_or(SmsError::NoRouter)?;
        let url = format!("{base}/{}", self.gateway.sms_path);
        let username = self.gateway.username.as_deref().unwrap_or_default();
        let password = self.gateway.password.as_deref().unwrap_or_default();

        let response = self
            .http
            .get(&url)
            .query(&[
                ("username", username),
                ("password", password),
                ("number", number),
                ("text", text),
            ])
            .timeout(Duration::from_secs(self.gateway.timeout_secs))
            .send()
            .await
            .map_err(SmsError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(SmsError::Status(status));
        }
        info!("SMS reply sent to {number}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockGateway;

    #[tokio::test]
    async fn test_send_encodes_query() {
        let gw = MockGateway::start().await;
        let outbox = Outbox::new(
            reqwest::Client::new(),
            GatewayConfig {
                router: Some(gw.host()),
                port: gw.port(),
                username: Some("user".into()),
                password: Some("p&ss word".into()),
                ..GatewayConfig::default()
            },
        );

        outbox
            .send("+37060000000", "ARMED AUTO\n@ 54.1, 25.2")
            .await
            .unwrap();
        let sent = gw.sms_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["password"], "p&ss word");
        assert_eq!(sent[0]["text"], "ARMED AUTO\n@ 54.1, 25.2");
    }

    #[tokio::test]
    async fn test_send_without_router() {
        let outbox = Outbox::new(reqwest::Client::new(), GatewayConfig::default());
        assert!(matches!(
            outbox.send("+1", "hi").await,
            Err(SmsError::NoRouter)
        ));
    }

    #[tokio::test]
    async fn test_send_reports_http_status() {
        let gw = MockGateway::start().await;
        let outbox = Outbox::new(
            reqwest::Client::new(),
            GatewayConfig {
                router: Some(gw.host()),
                port: gw.port(),
                sms_path: "cgi-bin/missing".into(),
                ..GatewayConfig::default()
            },
        );
        assert!(matches!(
            outbox.send("+1", "hi").await,
            Err(SmsError::Status(s)) if s == reqwest::StatusCode::NOT_FOUND
        ));
    }
}
