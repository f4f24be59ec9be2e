//! Negotiation/transport agent seam
//!
//! The session core never touches ICE, DTLS or SRTP directly. It drives a
//! [`PeerTransport`] and consumes the [`TransportEvent`]s that transport
//! publishes onto the session's event queue.
//!
//! ```text
//!   SessionRegistry ──create()──► TransportFactory
//!                                      │
//!                                      ▼
//!   Session task ◄──TransportEvent── PeerTransport ──► remote peer
//!        │                                ▲
//!        └──set_remote/answer/candidate───┘
//! ```

pub mod sdp;
pub mod webrtc_peer;

#[cfg(test)]
pub(crate) mod fake;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::media::{MediaKind, RtpPacket};

pub use self::sdp::{IceCandidate, SdpType, SessionDescription};
pub use self::webrtc_peer::{WebRtcConfig, WebRtcFactory};

/// Connectivity state reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    New,
    Checking,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectivityState {
    /// Whether the transport can no longer carry media
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConnectivityState::Disconnected | ConnectivityState::Failed | ConnectivityState::Closed
        )
    }
}

/// Event published by a transport onto its session's queue
pub enum TransportEvent {
    /// Connectivity changed
    Connectivity(ConnectivityState),
    /// Remote peer started sending a track
    Track(Box<dyn InboundTrack>),
}

impl std::fmt::Debug for TransportEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportEvent::Connectivity(state) => f.debug_tuple("Connectivity").field(state).finish(),
            TransportEvent::Track(track) => f
                .debug_struct("Track")
                .field("ssrc", &track.ssrc())
                .field("kind", &track.kind())
                .finish(),
        }
    }
}

/// Sender half of a session's transport event queue
pub type TransportEvents = mpsc::Sender<TransportEvent>;

/// Codec of a track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecSpec {
    /// MIME type (e.g. `video/VP8`)
    pub mime_type: String,
    /// RTP clock rate
    pub clock_rate: u32,
    /// Audio channel count (0 for video)
    pub channels: u16,
    /// `a=fmtp` parameters
    pub sdp_fmtp_line: String,
}

impl CodecSpec {
    pub fn vp8() -> Self {
        Self {
            mime_type: "video/VP8".into(),
            clock_rate: 90_000,
            channels: 0,
            sdp_fmtp_line: String::new(),
        }
    }

    pub fn opus() -> Self {
        Self {
            mime_type: "audio/opus".into(),
            clock_rate: 48_000,
            channels: 2,
            sdp_fmtp_line: "minptime=10;useinbandfec=1".into(),
        }
    }

    /// Check if this is VP8, ignoring MIME case
    pub fn is_vp8(&self) -> bool {
        self.mime_type.eq_ignore_ascii_case("video/VP8")
    }
}

/// A track received from the remote peer
#[async_trait]
pub trait InboundTrack: Send + Sync {
    /// Synchronization source of the incoming stream
    fn ssrc(&self) -> u32;

    fn kind(&self) -> MediaKind;

    fn codec(&self) -> CodecSpec;

    /// Read the next media unit; `Ok(None)` at end of stream
    async fn read_unit(&self) -> Result<Option<RtpPacket>>;
}

/// Outbound track fed with ready-made RTP packets
#[async_trait]
pub trait RtpSink: Send + Sync {
    async fn write_rtp(&self, packet: &RtpPacket) -> Result<()>;
}

/// Outbound track fed with whole frames; the transport packetizes
#[async_trait]
pub trait SampleSink: Send + Sync {
    async fn write_sample(&self, data: Bytes, duration: Duration) -> Result<()>;
}

/// Native transport handle for one remote peer
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Apply the remote peer's description
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;

    /// Generate an answer to the applied remote offer
    async fn create_answer(&self) -> Result<SessionDescription>;

    /// Apply our own description
    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;

    /// Current local description, including gathered candidates
    async fn local_description(&self) -> Option<SessionDescription>;

    /// Apply a trickled remote candidate
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Reserve one audio and one video receive slot
    async fn add_receive_slots(&self) -> Result<()>;

    /// Attach an outbound track that forwards RTP as-is
    async fn add_relay_track(&self, codec: &CodecSpec) -> Result<Arc<dyn RtpSink>>;

    /// Attach an outbound track that packetizes whole frames
    async fn add_sample_track(&self, codec: &CodecSpec) -> Result<Arc<dyn SampleSink>>;

    /// Ask the sender of `media_ssrc` for a fresh keyframe (picture loss indication)
    async fn request_keyframe(&self, media_ssrc: u32) -> Result<()>;

    /// Release the native handle
    async fn close(&self) -> Result<()>;
}

/// Creates native transport handles
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Create a transport for `peer_id` that publishes onto `events`
    async fn create(&self, peer_id: &str, events: TransportEvents) -> Result<Arc<dyn PeerTransport>>;
}
