//! MQTT subscription feeding the dispatcher.

use std::time::Duration;

use relay_core::{DispatchError, Dispatcher, MqttConfig};
use relay_protocol::Event;
use rumqttc::{AsyncClient, Event as MqttEvent, MqttOptions, Outgoing, Packet, QoS, Transport};
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub const INITIAL_BACKOFF: Duration = Duration::from_millis(250);
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);
const KEEP_ALIVE: Duration = Duration::from_secs(30);
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);
const REQUEST_CAPACITY: usize = 64;

/// Reconnect delay, doubling up to [`MAX_BACKOFF`].
#[derive(Debug)]
pub struct Backoff {
    current: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            current: INITIAL_BACKOFF,
        }
    }
}

impl Backoff {
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(MAX_BACKOFF);
        delay
    }

    pub fn reset(&mut self) {
        self.current = INITIAL_BACKOFF;
    }
}

pub fn client_id(config: &MqttConfig) -> String {
    match config.client_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => {
            let suffix = uuid::Uuid::new_v4().simple().to_string();
            format!("relay-bridge-{}", &suffix[..10])
        }
    }
}

pub fn broker_url(config: &MqttConfig) -> String {
    let scheme = if config.tls { "ssl" } else { "tcp" };
    format!("{scheme}://{}:{}", config.host, config.port)
}

pub fn options(config: &MqttConfig) -> MqttOptions {
    let mut opts = MqttOptions::new(client_id(config), config.host.clone(), config.port);
    opts.set_keep_alive(KEEP_ALIVE);
    opts.set_clean_session(false);
    if !config.anonymous {
        opts.set_credentials(config.user.clone(), config.password.clone());
    }
    if config.tls {
        opts.set_transport(Transport::tls_with_default_config());
    }
    opts
}

/// Decode one publish and hand it to the dispatcher. Payloads that are not a
/// JSON object are dropped.
pub fn forward(dispatcher: &Dispatcher, topic: &str, payload: &[u8]) -> Result<(), DispatchError> {
    match Event::from_json(topic, payload) {
        Ok(event) => dispatcher.route(event),
        Err(err) => {
            debug!(topic, "skipping undecodable payload: {err}");
            Ok(())
        }
    }
}

/// Receive publishes until `shutdown` flips to true, then disconnect.
pub async fn run(config: MqttConfig, dispatcher: Dispatcher, mut shutdown: watch::Receiver<bool>) {
    let opts = options(&config);
    info!(
        broker = %broker_url(&config),
        client_id = %opts.client_id(),
        topic = %config.topic,
        "connecting to mqtt broker"
    );
    let (client, mut eventloop) = AsyncClient::new(opts, REQUEST_CAPACITY);
    let mut backoff = Backoff::default();

    loop {
        let retry_in = tokio::select! {
            _ = shutdown.wait_for(|stop| *stop) => break,
            polled = eventloop.poll() => match polled {
                Ok(MqttEvent::Incoming(Packet::ConnAck(ack))) => {
                    backoff.reset();
                    info!(session_present = ack.session_present, "mqtt connected");
                    if let Err(err) = client.try_subscribe(config.topic.clone(), QoS::AtMostOnce) {
                        warn!(topic = %config.topic, "subscribe request failed: {err}");
                    }
                    None
                }
                Ok(MqttEvent::Incoming(Packet::Publish(publish))) => {
                    if forward(&dispatcher, &publish.topic, &publish.payload).is_err() {
                        debug!("dispatcher closed, leaving receive loop");
                        break;
                    }
                    None
                }
                Ok(_) => None,
                Err(err) => {
                    let delay = backoff.next_delay();
                    warn!(retry_in_ms = delay.as_millis() as u64, "mqtt connection error: {err}");
                    Some(delay)
                }
            }
        };

        if let Some(delay) = retry_in {
            tokio::select! {
                _ = shutdown.wait_for(|stop| *stop) => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    info!("disconnecting from mqtt broker");
    if client.try_disconnect().is_ok() {
        let _ = tokio::time::timeout(DISCONNECT_GRACE, async {
            loop {
                match eventloop.poll().await {
                    Ok(MqttEvent::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{ClientError, Notifier, SessionClient, SessionPolicy};
    use relay_protocol::{LocationParams, Session};
    use std::sync::Arc;

    struct IdleClient;

    #[async_trait::async_trait]
    impl SessionClient for IdleClient {
        async fn create_session(&self) -> Result<Session, ClientError> {
            Ok(Session::new("SID", "https://hauk.local/?SID"))
        }

        async fn post_location(&self, _: &str, _: &LocationParams) -> Result<(), ClientError> {
            Ok(())
        }

        async fn stop_session(&self, _: &str) -> Result<(), ClientError> {
            Ok(())
        }
    }

    struct Silent;

    #[async_trait::async_trait]
    impl Notifier for Silent {
        async fn notify_new_session(&self, _: &str, _: &str) {}
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(SessionPolicy::default(), Arc::new(IdleClient), Arc::new(Silent))
    }

    fn unreachable_broker() -> MqttConfig {
        MqttConfig {
            host: "127.0.0.1".into(),
            port: 1,
            ..MqttConfig::default()
        }
    }

    #[tokio::test]
    async fn run_returns_when_already_stopped() {
        let (_tx, rx) = watch::channel(true);
        let d = dispatcher();
        tokio::time::timeout(Duration::from_secs(5), run(unreachable_broker(), d.clone(), rx))
            .await
            .expect("receive loop ends on shutdown");
        assert_eq!(d.worker_count(), 0);
    }

    #[tokio::test]
    async fn shutdown_interrupts_reconnect_backoff() {
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(run(unreachable_broker(), dispatcher(), rx));
        // let the first connection attempt fail and the backoff start
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!task.is_finished());

        tx.send(true).expect("receiver alive");
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("receive loop ends on shutdown")
            .expect("source task");
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let mut backoff = Backoff::default();
        let delays: Vec<u64> = (0..10).map(|_| backoff.next_delay().as_millis() as u64).collect();
        assert_eq!(
            delays,
            vec![250, 500, 1000, 2000, 4000, 8000, 16000, 30000, 30000, 30000]
        );
        backoff.reset();
        assert_eq!(backoff.next_delay(), INITIAL_BACKOFF);
    }

    #[test]
    fn client_id_is_random_unless_configured() {
        let config = MqttConfig::default();
        let a = client_id(&config);
        let b = client_id(&config);
        assert!(a.starts_with("relay-bridge-"));
        assert_eq!(a.len(), "relay-bridge-".len() + 10);
        assert_ne!(a, b);

        let fixed = MqttConfig {
            client_id: Some("tracker".into()),
            ..MqttConfig::default()
        };
        assert_eq!(client_id(&fixed), "tracker");
    }

    #[test]
    fn options_follow_config() {
        let config = MqttConfig {
            host: "broker.local".into(),
            port: 8883,
            tls: true,
            ..MqttConfig::default()
        };
        assert_eq!(broker_url(&config), "ssl://broker.local:8883");
        let opts = options(&config);
        assert_eq!(opts.broker_address(), ("broker.local".to_string(), 8883));
        assert!(!opts.clean_session());
        assert_eq!(opts.credentials(), None);

        let authed = MqttConfig {
            anonymous: false,
            user: "u".into(),
            password: "p".into(),
            ..MqttConfig::default()
        };
        assert_eq!(
            options(&authed).credentials(),
            Some(("u".to_string(), "p".to_string()))
        );
    }

    #[tokio::test]
    async fn forward_skips_bad_payloads() {
        let d = dispatcher();
        forward(&d, "owntracks/a/phone", b"not json").unwrap();
        forward(&d, "owntracks/a/phone", b"[1, 2]").unwrap();
        assert_eq!(d.worker_count(), 0);

        forward(
            &d,
            "owntracks/a/phone",
            br#"{"_type":"location","lat":1.0,"lon":2.0,"tst":1618243873}"#,
        )
        .unwrap();
        assert_eq!(d.topics(), vec!["owntracks/a/phone"]);

        d.shutdown().await;
        assert_eq!(
            forward(&d, "owntracks/a/phone", br#"{"_type":"location"}"#),
            Err(DispatchError::Closed)
        );
    }
}
