use relay_core::Notifier;
use relay_events::{topics, Bus};
use serde::{Deserialize, Serialize};

/// Payload of [`topics::TOPIC_SESSION_CREATED`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCreated {
    pub topic: String,
    pub share_url: String,
}

/// Publishes new sessions on the in-process bus.
pub struct BusNotifier {
    bus: Bus,
}

impl BusNotifier {
    pub fn new(bus: Bus) -> Self {
        Self { bus }
    }
}

#[async_trait::async_trait]
impl Notifier for BusNotifier {
    async fn notify_new_session(&self, topic: &str, share_url: &str) {
        self.bus.publish(
            topics::TOPIC_SESSION_CREATED,
            &SessionCreated {
                topic: topic.to_string(),
                share_url: share_url.to_string(),
            },
        );
    }
}
