use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

/// Bus topic names. Keep dot.case.
pub mod topics {
    pub const TOPIC_SESSION_CREATED: &str = "session.created";
    pub const TOPIC_BRIDGE_STARTED: &str = "bridge.started";
    pub const TOPIC_BRIDGE_STOPPING: &str = "bridge.stopping";
}

/// Minimal event envelope (RFC3339 time).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Envelope {
    pub time: String,
    pub kind: String,
    pub payload: Value,
}

/// In-process broadcast bus for JSON-serializable events.
///
/// Publishing never blocks; slow subscribers lag and lose the oldest entries.
#[derive(Clone)]
pub struct Bus {
    tx: broadcast::Sender<Envelope>,
}

impl Bus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    pub fn publish<T: Serialize>(&self, kind: &str, payload: &T) {
        let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let val =
            serde_json::to_value(payload).unwrap_or_else(|_| serde_json::json!({"_ser":"error"}));
        if self
            .tx
            .send(Envelope {
                time: now,
                kind: kind.to_string(),
                payload: val,
            })
            .is_err()
        {
            tracing::trace!(kind, "bus event dropped, no subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn subscribers_receive_published_envelopes() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        bus.publish(
            topics::TOPIC_SESSION_CREATED,
            &json!({"topic": "owntracks/a/b"}),
        );
        let env = rx.recv().await.expect("envelope");
        assert_eq!(env.kind, "session.created");
        assert_eq!(env.payload["topic"], "owntracks/a/b");
        assert!(env.time.ends_with('Z'));
    }

    #[test]
    fn publish_without_subscribers_is_harmless() {
        let bus = Bus::new(0);
        bus.publish(topics::TOPIC_BRIDGE_STARTED, &json!({}));
    }
}
