//! Registry error types
//!
//! Errors surfaced by `create_or_join`; the signaling client reports them to
//! the requesting peer.

/// Error type for registry operations
#[derive(Debug, Clone)]
pub enum RegistryError {
    /// A relay subscriber asked to join before any publisher created the relay track
    NoRelayTrack,
    /// The requested action names no known role
    UnknownAction(String),
    /// Ingest subscription requested but no ingest hub is attached
    IngestUnavailable,
    /// The registry is shutting down
    ShuttingDown,
    /// The session is gone; it can no longer take commands
    SessionClosed(String),
    /// The session's command queue is full; the command was dropped
    SessionBusy(String),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::NoRelayTrack => write!(f, "No relay track yet: no publisher has connected"),
            RegistryError::UnknownAction(action) => write!(f, "Unknown action: {}", action),
            RegistryError::IngestUnavailable => write!(f, "Ingest is not enabled"),
            RegistryError::ShuttingDown => write!(f, "Registry is shutting down"),
            RegistryError::SessionClosed(peer) => write!(f, "Session closed: {}", peer),
            RegistryError::SessionBusy(peer) => write!(f, "Session busy, message dropped: {}", peer),
        }
    }
}

impl std::error::Error for RegistryError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            RegistryError::UnknownAction("dance".into()).to_string(),
            "Unknown action: dance"
        );
        assert!(RegistryError::NoRelayTrack.to_string().contains("relay track"));
    }
}
