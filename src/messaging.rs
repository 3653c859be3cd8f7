use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;

/// Outbound messaging contract. The scheduling engine and the notification
/// dispatcher depend on this seam, never on a concrete session object.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    /// Best-effort delivery. Returns whether the gateway accepted the message.
    async fn send_message(&self, phone: &str, body: &str) -> bool;

    fn connection_state(&self) -> ConnectionState;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Ready,
    Disconnected,
}

/// Builds the configured messenger. Without WHATSAPP_GATEWAY_URL the
/// application runs with messaging disabled.
pub fn from_env() -> Arc<dyn MessagingPort> {
    match env::var("WHATSAPP_GATEWAY_URL") {
        Ok(base_url) if !base_url.trim().is_empty() => {
            let token = env::var("WHATSAPP_GATEWAY_TOKEN").unwrap_or_default();
            log::info!("WhatsApp gateway messaging enabled at {base_url}");
            Arc::new(HttpGatewayMessenger::new(base_url, token))
        }
        _ => {
            log::warn!("WHATSAPP_GATEWAY_URL not set. Outbound messages will be dropped.");
            Arc::new(DisabledMessenger)
        }
    }
}

/// HTTP client for a WhatsApp session gateway exposing POST {base}/send.
pub struct HttpGatewayMessenger {
    client: reqwest::Client,
    base_url: String,
    token: String,
    last_send_ok: AtomicBool,
}

impl HttpGatewayMessenger {
    pub fn new(base_url: String, token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            last_send_ok: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl MessagingPort for HttpGatewayMessenger {
    async fn send_message(&self, phone: &str, body: &str) -> bool {
        let url = format!("{}/send", self.base_url);
        let result = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&json!({ "phone": phone, "message": body }))
            .send()
            .await;

        let ok = match result {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                log::warn!("Gateway rejected message to {phone}: HTTP {}", response.status());
                false
            }
            Err(err) => {
                log::warn!("Gateway send to {phone} failed: {err}");
                false
            }
        };

        self.last_send_ok.store(ok, Ordering::Relaxed);
        ok
    }

    fn connection_state(&self) -> ConnectionState {
        if self.last_send_ok.load(Ordering::Relaxed) {
            ConnectionState::Ready
        } else {
            ConnectionState::Disconnected
        }
    }
}

/// Used when no gateway is configured. Drops every message.
pub struct DisabledMessenger;

#[async_trait]
impl MessagingPort for DisabledMessenger {
    async fn send_message(&self, phone: &str, _body: &str) -> bool {
        log::debug!("Messaging disabled, dropping message to {phone}");
        false
    }

    fn connection_state(&self) -> ConnectionState {
        ConnectionState::Disconnected
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// Captures sent messages so tests can assert on the outbound side effects.
    #[derive(Default)]
    pub struct RecordingMessenger {
        pub sent: Mutex<Vec<(String, String)>>,
        pub fail: bool,
    }

    impl RecordingMessenger {
        pub fn failing() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        pub fn messages(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessagingPort for RecordingMessenger {
        async fn send_message(&self, phone: &str, body: &str) -> bool {
            self.sent
                .lock()
                .unwrap()
                .push((phone.to_string(), body.to_string()));
            !self.fail
        }

        fn connection_state(&self) -> ConnectionState {
            ConnectionState::Ready
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[actix_web::test]
    async fn gateway_send_reports_success_and_state() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/send")
                .header("authorization", "Bearer tok")
                .json_body(serde_json::json!({
                    "phone": "5562991234567",
                    "message": "Olá"
                }));
            then.status(200).json_body(serde_json::json!({ "ok": true }));
        });

        let messenger = HttpGatewayMessenger::new(server.base_url(), "tok".to_string());
        assert!(messenger.send_message("5562991234567", "Olá").await);
        assert_eq!(messenger.connection_state(), ConnectionState::Ready);
        mock.assert();
    }

    #[actix_web::test]
    async fn gateway_failure_flips_connection_state() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/send");
            then.status(502);
        });

        let messenger = HttpGatewayMessenger::new(server.base_url(), String::new());
        assert!(!messenger.send_message("62991234567", "hi").await);
        assert_eq!(messenger.connection_state(), ConnectionState::Disconnected);
    }

    #[actix_web::test]
    async fn disabled_messenger_drops_messages() {
        let messenger = DisabledMessenger;
        assert!(!messenger.send_message("62991234567", "hi").await);
        assert_eq!(messenger.connection_state(), ConnectionState::Disconnected);
    }
}
