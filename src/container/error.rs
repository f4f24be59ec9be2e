//! Container error types

/// Error type for container operations
#[derive(Debug)]
pub enum ContainerError {
    /// Underlying file or stream failure
    Io(std::io::Error),
    /// File does not start with the `DKIF` signature
    BadSignature([u8; 4]),
    /// Header declares a size this reader does not understand
    UnsupportedHeaderSize(u16),
    /// Stream ended inside the file header
    TruncatedHeader,
    /// Stream ended inside a frame header
    TruncatedFrameHeader,
    /// Stream ended inside a frame payload
    TruncatedFrame { expected: u32, actual: usize },
    /// Frame size exceeds the accepted maximum
    FrameTooLarge(u32),
    /// Write attempted after the writer was closed
    Closed,
}

impl std::fmt::Display for ContainerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerError::Io(e) => write!(f, "I/O error: {}", e),
            ContainerError::BadSignature(sig) => write!(f, "Bad IVF signature: {:?}", sig),
            ContainerError::UnsupportedHeaderSize(size) => {
                write!(f, "Unsupported IVF header size: {}", size)
            }
            ContainerError::TruncatedHeader => write!(f, "Truncated IVF file header"),
            ContainerError::TruncatedFrameHeader => write!(f, "Truncated IVF frame header"),
            ContainerError::TruncatedFrame { expected, actual } => write!(
                f,
                "Truncated IVF frame: expected {} bytes, got {}",
                expected, actual
            ),
            ContainerError::FrameTooLarge(size) => write!(f, "IVF frame too large: {} bytes", size),
            ContainerError::Closed => write!(f, "IVF writer already closed"),
        }
    }
}

impl std::error::Error for ContainerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ContainerError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ContainerError {
    fn from(e: std::io::Error) -> Self {
        ContainerError::Io(e)
    }
}
