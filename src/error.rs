//! Error types
//!
//! Crate-wide error enum. Module-local errors (`ContainerError`,
//! `RegistryError`, `IngestError`) convert into it with `?`.

use crate::container::ContainerError;
use crate::ingest::IngestError;
use crate::registry::RegistryError;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Local I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Container read/write failure
    #[error("container error: {0}")]
    Container(#[from] ContainerError),

    /// Description or candidate rejected by the negotiation agent
    #[error("negotiation failed: {0}")]
    Negotiation(String),

    /// Malformed signaling payload (base64, JSON)
    #[error("decode failed: {0}")]
    Decode(String),

    /// Native transport setup or media I/O failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Control channel failure
    #[error("control channel error: {0}")]
    Channel(String),

    /// Session registry failure
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Ingest adapter failure
    #[error(transparent)]
    Ingest(#[from] IngestError),
}

impl From<base64::DecodeError> for Error {
    fn from(e: base64::DecodeError) -> Self {
        Error::Decode(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Decode(e.to_string())
    }
}

impl From<webrtc::Error> for Error {
    fn from(e: webrtc::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_display() {
        let err = Error::Decode("bad base64".into());
        assert_eq!(err.to_string(), "decode failed: bad base64");
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_registry_error_transparent() {
        let err: Error = RegistryError::NoRelayTrack.into();
        assert_eq!(err.to_string(), RegistryError::NoRelayTrack.to_string());
    }
}
