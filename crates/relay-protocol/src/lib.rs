//! Data shared between the event source, the session engine and the remote
//! tracking API client.
//!
//! Field names on both sides are part of the wire contract: [`payload`] holds
//! the keys of the device location payload, [`params`] the form parameter names
//! understood by the tracking API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keys found in device location payloads.
pub mod payload {
    /// Message discriminator.
    pub const TYPE: &str = "_type";
    pub const TYPE_LOCATION: &str = "location";
    pub const LATITUDE: &str = "lat";
    pub const LONGITUDE: &str = "lon";
    pub const ALTITUDE: &str = "alt";
    pub const ACCURACY: &str = "acc";
    /// Velocity in km/h.
    pub const VELOCITY: &str = "vel";
    /// Epoch seconds, possibly fractional.
    pub const TIMESTAMP: &str = "tst";
    /// What caused the device to report.
    pub const TRIGGER: &str = "t";
    /// Trigger value for a location the user pushed by hand.
    pub const TRIGGER_MANUAL: &str = "u";
}

/// Form parameter names of the tracking API.
pub mod params {
    pub const SESSION_ID: &str = "sid";
    pub const LATITUDE: &str = "lat";
    pub const LONGITUDE: &str = "lon";
    pub const ALTITUDE: &str = "alt";
    pub const ACCURACY: &str = "acc";
    /// Speed in m/s.
    pub const SPEED: &str = "spd";
    pub const TIME: &str = "time";
    pub const DURATION: &str = "dur";
    pub const INTERVAL: &str = "int";
    pub const PASSWORD: &str = "pwd";
    pub const USER: &str = "usr";
}

/// One raw message from a device stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Stable key of the device stream the message arrived on.
    pub topic: String,
    pub fields: Map<String, Value>,
}

impl Event {
    pub fn new(topic: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            topic: topic.into(),
            fields,
        }
    }

    /// Decode a JSON object payload received on `topic`.
    pub fn from_json(topic: impl Into<String>, body: &[u8]) -> Result<Self, serde_json::Error> {
        let fields: Map<String, Value> = serde_json::from_slice(body)?;
        Ok(Self::new(topic, fields))
    }

    pub fn trigger(&self) -> TriggerKind {
        TriggerKind::of(&self.fields)
    }
}

/// Whether a location was reported on a schedule or pushed by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Automatic,
    Manual,
}

impl TriggerKind {
    pub fn of(fields: &Map<String, Value>) -> Self {
        match fields.get(payload::TRIGGER).and_then(Value::as_str) {
            Some(payload::TRIGGER_MANUAL) => TriggerKind::Manual,
            _ => TriggerKind::Automatic,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Automatic => "automatic",
            TriggerKind::Manual => "manual",
        }
    }
}

/// Ordered tracking API parameters derived from one event.
///
/// Serializes as a sequence of pairs, which is what form encoders expect.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct LocationParams(Vec<(&'static str, String)>);

impl LocationParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: &'static str, value: impl Into<String>) {
        self.0.push((name, value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        self.0.iter().map(|(key, value)| (*key, value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A tracking session issued by the remote API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque handle used when posting to or stopping the session.
    pub token: String,
    /// Link a human can open to follow the device.
    pub share_url: String,
    /// Informational id reported by the remote, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Session {
    pub fn new(token: impl Into<String>, share_url: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            share_url: share_url.into(),
            id: None,
        }
    }
}
