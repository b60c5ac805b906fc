use std::time::Duration;

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use relay_core::{Notifier, SmtpConfig};
use tracing::{debug, warn};

use crate::NotifyError;

const SEND_TIMEOUT: Duration = Duration::from_secs(15);

/// Mails new share links to a fixed recipient.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

fn mailbox(field: &str, raw: &str) -> Result<Mailbox, NotifyError> {
    raw.trim()
        .parse()
        .map_err(|e| NotifyError::Address(format!("smtp {field} {raw:?}: {e}")))
}

impl SmtpNotifier {
    pub fn new(config: &SmtpConfig) -> Result<Self, NotifyError> {
        let from = mailbox("from", &config.from)?;
        let to = mailbox("to", &config.to)?;
        let tls = TlsParameters::new(config.host.clone())?;
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(config.host.as_str())
            .port(config.port)
            .tls(Tls::Opportunistic(tls))
            .timeout(Some(SEND_TIMEOUT));
        if !config.login.is_empty() {
            builder = builder
                .credentials(Credentials::new(config.login.clone(), config.password.clone()))
                .authentication(vec![Mechanism::Plain]);
        }
        Ok(Self {
            transport: builder.build(),
            from,
            to,
        })
    }

    fn message(&self, subject: String, body: String) -> Result<Message, NotifyError> {
        Ok(Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)?)
    }

    pub fn session_message(&self, topic: &str, share_url: &str) -> Result<Message, NotifyError> {
        self.message(
            format!("Forwarding {topic} to Hauk"),
            format!("New session: {share_url}"),
        )
    }

    pub fn error_message(&self, text: &str) -> Result<Message, NotifyError> {
        self.message("relay-bridge error".to_string(), text.to_string())
    }

    async fn send(&self, message: Result<Message, NotifyError>) -> Result<(), NotifyError> {
        self.transport.send(message?).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Notifier for SmtpNotifier {
    async fn notify_new_session(&self, topic: &str, share_url: &str) {
        match self.send(self.session_message(topic, share_url)).await {
            Ok(()) => debug!(topic, "smtp: session mail sent"),
            Err(err) => warn!(topic, "smtp: could not send email notification: {err}"),
        }
    }

    async fn notify_error(&self, text: &str) {
        if let Err(err) = self.send(self.error_message(text)).await {
            warn!("smtp: could not send error mail: {err}");
        }
    }
}
