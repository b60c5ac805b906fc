use std::collections::VecDeque;

use parking_lot::Mutex;
use relay_protocol::{params, Event, LocationParams, Session};
use serde_json::{json, Map, Value};

use crate::contracts::{Notifier, SessionClient};
use crate::error::ClientError;

/// A recorded remote call. Posts keep the token and the `lat` parameter so
/// tests can tell locations apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create,
    Post(String, String),
    Stop(String),
}

/// In-memory session client issuing `SID<n>`/`URL<n>` sessions.
#[derive(Default)]
pub struct ScriptedClient {
    calls: Mutex<Vec<Call>>,
    issued: Mutex<usize>,
    create_failures: Mutex<VecDeque<ClientError>>,
    post_failures: Mutex<VecDeque<ClientError>>,
    stop_failure: Mutex<Option<ClientError>>,
}

impl ScriptedClient {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    pub fn fail_next_create(&self, err: ClientError) {
        self.create_failures.lock().push_back(err);
    }

    pub fn fail_next_post(&self, err: ClientError) {
        self.post_failures.lock().push_back(err);
    }

    pub fn fail_stops(&self, err: ClientError) {
        *self.stop_failure.lock() = Some(err);
    }
}

#[async_trait::async_trait]
impl SessionClient for ScriptedClient {
    async fn create_session(&self) -> Result<Session, ClientError> {
        self.calls.lock().push(Call::Create);
        let mut issued = self.issued.lock();
        let n = *issued;
        *issued += 1;
        if let Some(err) = self.create_failures.lock().pop_front() {
            return Err(err);
        }
        Ok(Session::new(format!("SID{n}"), format!("URL{n}")))
    }

    async fn post_location(
        &self,
        token: &str,
        location: &LocationParams,
    ) -> Result<(), ClientError> {
        let lat = location.get(params::LATITUDE).unwrap_or_default();
        self.calls
            .lock()
            .push(Call::Post(token.to_string(), lat.to_string()));
        match self.post_failures.lock().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn stop_session(&self, token: &str) -> Result<(), ClientError> {
        self.calls.lock().push(Call::Stop(token.to_string()));
        match self.stop_failure.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sessions: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn sessions(&self) -> Vec<(String, String)> {
        self.sessions.lock().clone()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_new_session(&self, topic: &str, share_url: &str) {
        self.sessions
            .lock()
            .push((topic.to_string(), share_url.to_string()));
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

pub fn location(topic: &str, lat: f64) -> Event {
    Event::new(
        topic,
        object(json!({"_type": "location", "lat": lat, "lon": 12.95, "tst": 1618243873, "t": "p"})),
    )
}

pub fn manual_location(topic: &str, lat: f64) -> Event {
    Event::new(
        topic,
        object(json!({"_type": "location", "lat": lat, "lon": 12.95, "tst": 1618243873, "t": "u"})),
    )
}
