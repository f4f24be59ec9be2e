//! Ingest error types

use crate::container::ContainerError;

/// Error type for ingest operations
#[derive(Debug)]
pub enum IngestError {
    /// No stream is published at this path
    StreamNotFound(String),
    /// Stream already has a publisher
    AlreadyPublishing(String),
    /// Publisher announced an empty or non-UTF-8 path
    InvalidPath,
    /// Publisher did not announce a path in time
    HandshakeTimeout,
    /// Socket failure
    Io(std::io::Error),
    /// Pushed stream is not a valid container
    Container(ContainerError),
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::StreamNotFound(path) => write!(f, "Ingest stream not found: {}", path),
            IngestError::AlreadyPublishing(path) => {
                write!(f, "Ingest stream already has a publisher: {}", path)
            }
            IngestError::InvalidPath => write!(f, "Invalid ingest stream path"),
            IngestError::HandshakeTimeout => write!(f, "Ingest handshake timed out"),
            IngestError::Io(e) => write!(f, "Ingest I/O error: {}", e),
            IngestError::Container(e) => write!(f, "Ingest container error: {}", e),
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IngestError::Io(e) => Some(e),
            IngestError::Container(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for IngestError {
    fn from(e: std::io::Error) -> Self {
        IngestError::Io(e)
    }
}

impl From<ContainerError> for IngestError {
    fn from(e: ContainerError) -> Self {
        IngestError::Container(e)
    }
}
