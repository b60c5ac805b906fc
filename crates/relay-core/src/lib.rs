//! Session lifecycle engine of the relay.
//!
//! Events enter through the [`Dispatcher`], which hands each topic's events to
//! that topic's [`TopicWorker`]. The worker maps the payload with
//! [`map_event`], decides whether to reuse, create or replace the topic's
//! remote session, and posts the location through a [`SessionClient`].

pub mod config;
mod contracts;
pub mod dispatcher;
mod error;
pub mod mapper;
#[cfg(test)]
mod test_support;
pub mod worker;

pub use config::{
    config_path_from_env, config_schema_json, load_config, parse_config, Config, FrontendConfig,
    GotifyConfig, HaukConfig, MqttConfig, NotificationConfig, SessionPolicy, SmtpConfig,
};
pub use contracts::{Notifier, SessionClient, SharedNotifier, SharedSessionClient};
pub use dispatcher::Dispatcher;
pub use error::{ClientError, DispatchError, EventError};
pub use mapper::map_event;
pub use worker::{Delivery, TopicState, TopicWorker};
