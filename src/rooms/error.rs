use thiserror::Error;

use crate::store::StoreError;

use super::Lifecycle;

/// Why a single relay event was rejected. Never affects other rooms or
/// other connections in the same room.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("message text must not be empty")]
    InvalidMessage,

    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    #[error("cannot {action} while the session is {state}")]
    InvalidState { action: &'static str, state: Lifecycle },

    #[error("session is {0}, messages are no longer accepted")]
    SessionClosed(Lifecycle),

    #[error("room {0} not found")]
    RoomNotFound(String),

    #[error("no session record for {0}")]
    RecordNotFound(String),

    #[error("message store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),
}

impl RelayError {
    /// Stable identifier sent to clients in `error` events.
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::InvalidMessage => "invalid_message",
            RelayError::Forbidden(_) => "forbidden",
            RelayError::InvalidState { .. } => "invalid_state",
            RelayError::SessionClosed(_) => "session_closed",
            RelayError::RoomNotFound(_) => "room_not_found",
            RelayError::RecordNotFound(_) => "record_not_found",
            RelayError::StoreUnavailable(_) => "store_unavailable",
        }
    }
}

impl From<StoreError> for RelayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(key) => RelayError::RecordNotFound(key),
            other => RelayError::StoreUnavailable(other),
        }
    }
}
