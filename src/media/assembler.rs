//! RTP to frame assembly
//!
//! Collects VP8 RTP payloads into whole frames. A frame starts with a packet
//! whose descriptor marks the start of partition 0 and ends on the RTP marker
//! bit. Frames with a sequence gap, or that are cut short by a timestamp
//! change, are dropped rather than written half-decoded.

use bytes::{Bytes, BytesMut};

use super::vp8;
use super::RtpPacket;

/// A complete VP8 frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    /// RTP timestamp shared by all packets of the frame
    pub rtp_timestamp: u32,
    /// Frame data with payload descriptors removed
    pub data: Bytes,
    /// Whether the frame is a keyframe
    pub is_keyframe: bool,
}

/// Reassembles VP8 frames from RTP packets
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buf: BytesMut,
    timestamp: Option<u32>,
    last_seq: Option<u16>,
    broken: bool,
    frames: u64,
    dropped: u64,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one packet; returns a frame when the packet completes one
    pub fn push(&mut self, packet: &RtpPacket) -> Option<VideoFrame> {
        let seq = packet.header.sequence_number;
        let ts = packet.header.timestamp;

        let (desc, data) = match vp8::depacketize(&packet.payload) {
            Ok(parts) => parts,
            Err(e) => {
                tracing::trace!(seq = seq, error = %e, "Unparseable VP8 payload");
                self.broken = true;
                self.last_seq = Some(seq);
                return None;
            }
        };

        if self.timestamp != Some(ts) {
            if !self.buf.is_empty() || self.broken {
                self.dropped += 1;
            }
            self.reset(ts);
            if !desc.is_frame_start() {
                self.broken = true;
            }
        } else if let Some(last) = self.last_seq {
            if seq != last.wrapping_add(1) {
                self.broken = true;
            }
        }
        self.last_seq = Some(seq);

        if !self.broken {
            self.buf.extend_from_slice(&data);
        }

        if !packet.header.marker {
            return None;
        }

        let complete = !self.broken && !self.buf.is_empty();
        let data = self.buf.split().freeze();
        self.timestamp = None;

        if !complete {
            self.dropped += 1;
            self.broken = false;
            return None;
        }

        self.frames += 1;
        Some(VideoFrame {
            rtp_timestamp: ts,
            is_keyframe: vp8::is_keyframe(&data),
            data,
        })
    }

    /// Frames completed so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Frames discarded as incomplete
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn reset(&mut self, ts: u32) {
        self.buf.clear();
        self.timestamp = Some(ts);
        self.broken = false;
    }
}
