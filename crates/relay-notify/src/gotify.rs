use std::time::Duration;

use relay_core::{GotifyConfig, Notifier};
use reqwest::Url;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::NotifyError;

const TITLE: &str = "relay";

#[derive(Debug, Serialize)]
struct GotifyMessage {
    title: &'static str,
    message: String,
    priority: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    extras: Option<Value>,
}

/// Pushes messages to a Gotify server.
pub struct GotifyNotifier {
    http: reqwest::Client,
    endpoint: Url,
    app_token: String,
    priority: i64,
}

impl GotifyNotifier {
    pub fn new(config: &GotifyConfig) -> Result<Self, NotifyError> {
        let mut raw = config.url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let endpoint = Url::parse(&raw)
            .and_then(|base| base.join("message"))
            .map_err(|e| NotifyError::Address(format!("{}: {e}", config.url)))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            endpoint,
            app_token: config.app_token.clone(),
            priority: config.priority,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn send(&self, message: &GotifyMessage) -> Result<(), NotifyError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .header("X-Gotify-Key", &self.app_token)
            .json(message)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Notifier for GotifyNotifier {
    async fn notify_new_session(&self, topic: &str, share_url: &str) {
        let message = GotifyMessage {
            title: TITLE,
            message: format!(
                "Forwarding **{topic}** to Hauk\r\n\r\nNew session: [hauk link]({share_url})"
            ),
            priority: self.priority,
            extras: Some(json!({
                "client::display": {"contentType": "text/markdown"},
                "client::notification": {"click": {"url": share_url}},
            })),
        };
        match self.send(&message).await {
            Ok(()) => debug!(topic, "gotify: session message sent"),
            Err(err) => warn!(topic, "gotify: could not send message: {err}"),
        }
    }

    async fn notify_error(&self, text: &str) {
        let message = GotifyMessage {
            title: TITLE,
            message: text.to_string(),
            priority: self.priority,
            extras: None,
        };
        if let Err(err) = self.send(&message).await {
            warn!("gotify: could not send error message: {err}");
        }
    }
}
