//! [`Notifier`] implementations.

mod bus;
mod gotify;
mod smtp;

use std::sync::Arc;

use relay_core::{NotificationConfig, Notifier, SharedNotifier};
use qrcode::render::unicode::Dense1x2;
use qrcode::{EcLevel, QrCode};
use relay_events::Bus;
use tracing::{error, info};

pub use bus::{BusNotifier, SessionCreated};
pub use gotify::GotifyNotifier;
pub use smtp::SmtpNotifier;

#[derive(thiserror::Error, Debug)]
pub enum NotifyError {
    #[error("invalid notification address: {0}")]
    Address(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server answered with status {0}")]
    Status(u16),
    #[error("could not build mail: {0}")]
    Mail(#[from] lettre::error::Error),
    #[error("smtp error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Writes announcements to the log, with the share link as a terminal QR code.
pub struct LogNotifier;

/// Render `data` as a QR code of half-block characters, two modules per line.
pub fn qr_code(data: &str) -> Option<String> {
    let code = QrCode::with_error_correction_level(data, EcLevel::L).ok()?;
    Some(code.render::<Dense1x2>().quiet_zone(true).build())
}

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn notify_new_session(&self, topic: &str, share_url: &str) {
        match qr_code(share_url) {
            Some(qr) => info!(topic, share_url, "forwarding topic to new session\n{qr}"),
            None => info!(topic, share_url, "forwarding topic to new session"),
        }
    }

    async fn notify_error(&self, message: &str) {
        error!("{message}");
    }
}

/// Calls each notifier in turn.
#[derive(Default)]
pub struct FanoutNotifier {
    targets: Vec<SharedNotifier>,
}

impl FanoutNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, target: SharedNotifier) -> Self {
        self.targets.push(target);
        self
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[async_trait::async_trait]
impl Notifier for FanoutNotifier {
    async fn notify_new_session(&self, topic: &str, share_url: &str) {
        for target in &self.targets {
            target.notify_new_session(topic, share_url).await;
        }
    }

    async fn notify_error(&self, message: &str) {
        for target in &self.targets {
            target.notify_error(message).await;
        }
    }
}

/// Log and bus notifiers, plus Gotify and SMTP when enabled.
pub fn build_notifier(config: &NotificationConfig, bus: &Bus) -> Result<FanoutNotifier, NotifyError> {
    let mut fanout = FanoutNotifier::new()
        .with(Arc::new(LogNotifier))
        .with(Arc::new(BusNotifier::new(bus.clone())));
    if config.gotify.enabled {
        let gotify = GotifyNotifier::new(&config.gotify)?;
        info!(endpoint = %gotify.endpoint(), "gotify notifications enabled");
        fanout = fanout.with(Arc::new(gotify));
    }
    if config.smtp.enabled {
        let smtp = SmtpNotifier::new(&config.smtp)?;
        info!(host = %config.smtp.host, port = config.smtp.port, "smtp notifications enabled");
        fanout = fanout.with(Arc::new(smtp));
    }
    Ok(fanout)
}
