use bridge_traits::error::BridgeError;
use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No playback session is open")]
    NoActiveSession,

    /// The server no longer knows the session; open a new one.
    #[error("Session {session_id} expired on the server")]
    SessionExpired { session_id: String },

    #[error("Authentication rejected by the server: {0}")]
    Authentication(String),

    #[error("Remote session call failed: {0}")]
    Remote(BridgeError),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Item {item_id} is not known locally")]
    ItemNotFound { item_id: String },

    #[error("Invalid session configuration: {0}")]
    InvalidConfig(String),
}

impl SessionError {
    /// Connection loss and server-side failures worth retrying later.
    pub fn is_transient(&self) -> bool {
        matches!(self, SessionError::Remote(e) if e.is_transient())
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, SessionError::SessionExpired { .. })
    }
}

impl From<BridgeError> for SessionError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::Unauthorized(message) => SessionError::Authentication(message),
            other => SessionError::Remote(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_error_mapping() {
        let auth: SessionError = BridgeError::Unauthorized("token".into()).into();
        assert!(matches!(auth, SessionError::Authentication(_)));

        let network: SessionError = BridgeError::Network("timeout".into()).into();
        assert!(network.is_transient());

        let missing: SessionError = BridgeError::NotFound("gone".into()).into();
        assert!(!missing.is_transient());
        assert!(!missing.is_expired());
    }
}
