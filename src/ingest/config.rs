//! Ingest adapter configuration

use std::net::SocketAddr;
use std::time::Duration;

/// Ingest adapter configuration options
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Address the push listener binds to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent publisher connections (0 = unlimited)
    pub max_connections: usize,

    /// Per-stream broadcast queue capacity
    pub broadcast_capacity: usize,

    /// Hand late joiners the current GOP before live frames
    pub gop_catchup: bool,

    /// Maximum GOP buffer size in bytes
    pub max_gop_size: usize,

    /// Publisher must announce its path within this time
    pub handshake_timeout: Duration,

    /// Remove streams idle (no publisher) for longer than this
    pub idle_stream_timeout: Duration,

    /// How often idle streams are swept
    pub cleanup_interval: Duration,

    /// Enable TCP_NODELAY on publisher sockets
    pub tcp_nodelay: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8554)),
            max_connections: 0,
            broadcast_capacity: 256,
            gop_catchup: false,
            max_gop_size: 4 * 1024 * 1024, // 4MB
            handshake_timeout: Duration::from_secs(10),
            idle_stream_timeout: Duration::from_secs(30),
            cleanup_interval: Duration::from_secs(10),
            tcp_nodelay: true,
        }
    }
}

impl IngestConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set broadcast capacity
    pub fn broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity;
        self
    }

    /// Enable keyframe catch-up for late joiners
    pub fn gop_catchup(mut self, enabled: bool) -> Self {
        self.gop_catchup = enabled;
        self
    }

    /// Set handshake timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set idle stream timeout
    pub fn idle_stream_timeout(mut self, timeout: Duration) -> Self {
        self.idle_stream_timeout = timeout;
        self
    }
}
