use relay_protocol::{LocationParams, Session};

use crate::error::ClientError;

/// Remote session-based tracking API.
///
/// Implementations are shared by every topic worker and must tolerate
/// concurrent calls.
#[async_trait::async_trait]
pub trait SessionClient: Send + Sync {
    async fn create_session(&self) -> Result<Session, ClientError>;

    /// Post one location. Must report an invalidated token as
    /// [`ClientError::SessionExpired`].
    async fn post_location(&self, token: &str, params: &LocationParams)
        -> Result<(), ClientError>;

    async fn stop_session(&self, token: &str) -> Result<(), ClientError>;
}

/// Out-of-band announcements for humans.
///
/// Delivery problems are the notifier's own business: it logs them and returns.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_new_session(&self, topic: &str, share_url: &str);

    async fn notify_error(&self, _message: &str) {}
}

pub type SharedSessionClient = std::sync::Arc<dyn SessionClient>;
pub type SharedNotifier = std::sync::Arc<dyn Notifier>;
