//! Media handling
//!
//! This module provides:
//! - VP8 RTP payload descriptor parsing
//! - Reassembly of RTP packets into whole frames for capture

pub mod assembler;
pub mod vp8;

pub use assembler::{FrameAssembler, VideoFrame};
pub use vp8::{Vp8Descriptor, Vp8Error};

/// RTP packet as read from and written to the transport
pub type RtpPacket = webrtc::rtp::packet::Packet;

/// Kind of media carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}
