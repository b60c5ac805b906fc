/// Failures reported by a [`crate::SessionClient`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The token is no longer valid for posting.
    #[error("session expired")]
    SessionExpired,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rejected by remote (status {status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Why a single event was not delivered.
///
/// Every variant is local to the event that caused it; none of them stops a
/// topic worker.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    #[error("not a location event")]
    Malformed,
    #[error("no active session and automatic start is disabled")]
    NoSession,
    #[error("could not create session: {0}")]
    SessionCreateFailed(#[source] ClientError),
    #[error("could not post location: {0}")]
    DeliveryFailed(#[source] ClientError),
    #[error("could not re-post location to fresh session: {0}")]
    RedeliveryFailed(#[source] ClientError),
}

impl EventError {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventError::Malformed => "malformed",
            EventError::NoSession => "no_session",
            EventError::SessionCreateFailed(_) => "session_create_failed",
            EventError::DeliveryFailed(_) => "delivery_failed",
            EventError::RedeliveryFailed(_) => "redelivery_failed",
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("dispatcher is shut down")]
    Closed,
}
