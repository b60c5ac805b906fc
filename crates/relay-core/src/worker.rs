//! Per-topic session state machine.
//!
//! A [`TopicWorker`] owns the session binding of exactly one topic and handles
//! that topic's events one after another. Nothing else reads or writes its
//! state, so it needs no locking.

use relay_protocol::{Event, LocationParams, TriggerKind};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::SessionPolicy;
use crate::contracts::{SharedNotifier, SharedSessionClient};
use crate::error::{ClientError, EventError};
use crate::mapper::map_event;

/// Session binding of one topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicState {
    pub topic: String,
    pub current_token: Option<String>,
}

impl TopicState {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            current_token: None,
        }
    }
}

/// How an event reached the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Token the location was accepted under.
    pub token: String,
    /// A session was created while handling this event.
    pub new_session: bool,
    /// The first post hit an expired session and was re-sent.
    pub recovered: bool,
}

pub struct TopicWorker {
    state: TopicState,
    policy: SessionPolicy,
    client: SharedSessionClient,
    notifier: SharedNotifier,
}

impl TopicWorker {
    pub fn new(
        topic: impl Into<String>,
        policy: SessionPolicy,
        client: SharedSessionClient,
        notifier: SharedNotifier,
    ) -> Self {
        Self {
            state: TopicState::new(topic),
            policy,
            client,
            notifier,
        }
    }

    pub fn state(&self) -> &TopicState {
        &self.state
    }

    /// Drain `queue` in order until every sender is gone.
    pub async fn run(mut self, mut queue: mpsc::UnboundedReceiver<Event>) {
        debug!(topic = %self.state.topic, "topic worker started");
        while let Some(event) = queue.recv().await {
            match self.handle(event).await {
                Ok(delivery) => debug!(
                    topic = %self.state.topic,
                    new_session = delivery.new_session,
                    recovered = delivery.recovered,
                    "location delivered"
                ),
                Err(EventError::Malformed) => {
                    debug!(topic = %self.state.topic, "skipping non-location message")
                }
                Err(err) => warn!(
                    topic = %self.state.topic,
                    reason = err.as_str(),
                    "dropping location: {err}"
                ),
            }
        }
        debug!(topic = %self.state.topic, "topic worker drained");
    }

    /// Process one event end to end.
    pub async fn handle(&mut self, event: Event) -> Result<Delivery, EventError> {
        let params = map_event(&event.fields).ok_or(EventError::Malformed)?;
        let trigger = event.trigger();
        let (token, new_session) = self.resolve_session(trigger).await?;

        match self.client.post_location(&token, &params).await {
            Ok(()) => Ok(Delivery {
                token,
                new_session,
                recovered: false,
            }),
            Err(ClientError::SessionExpired) => self.recover_expired(&params).await,
            Err(err) => Err(EventError::DeliveryFailed(err)),
        }
    }

    /// Pick the token to post under, creating or replacing the session as the
    /// policy demands.
    async fn resolve_session(&mut self, trigger: TriggerKind) -> Result<(String, bool), EventError> {
        if trigger == TriggerKind::Manual && self.policy.start_on_manual_trigger {
            if self.policy.stop_prior_session_on_new_start {
                self.stop_current().await;
            }
            let token = self.start_session().await?;
            return Ok((token, true));
        }
        if let Some(token) = &self.state.current_token {
            return Ok((token.clone(), false));
        }
        if !self.policy.start_automatically {
            return Err(EventError::NoSession);
        }
        let token = self.start_session().await?;
        Ok((token, true))
    }

    // The old session is abandoned whether or not the remote accepts the stop.
    async fn stop_current(&mut self) {
        let Some(token) = self.state.current_token.take() else {
            return;
        };
        match self.client.stop_session(&token).await {
            Ok(()) => debug!(topic = %self.state.topic, "stopped prior session"),
            Err(err) => warn!(topic = %self.state.topic, "could not stop prior session: {err}"),
        }
    }

    async fn start_session(&mut self) -> Result<String, EventError> {
        let session = self
            .client
            .create_session()
            .await
            .map_err(EventError::SessionCreateFailed)?;
        info!(
            topic = %self.state.topic,
            share_url = %session.share_url,
            "new session"
        );
        self.state.current_token = Some(session.token.clone());
        self.notifier
            .notify_new_session(&self.state.topic, &session.share_url)
            .await;
        Ok(session.token)
    }

    async fn recover_expired(&mut self, params: &LocationParams) -> Result<Delivery, EventError> {
        info!(topic = %self.state.topic, "session expired, creating new one");
        self.state.current_token = None;
        let token = self.start_session().await?;
        self.client
            .post_location(&token, params)
            .await
            .map_err(EventError::RedeliveryFailed)?;
        Ok(Delivery {
            token,
            new_session: true,
            recovered: true,
        })
    }
}
