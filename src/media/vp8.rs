//! VP8 RTP payload parsing (RFC 7741)
//!
//! Payload descriptor:
//! ```text
//!       0 1 2 3 4 5 6 7
//!      +-+-+-+-+-+-+-+-+
//!      |X|R|N|S|R| PID | (REQUIRED)
//!      +-+-+-+-+-+-+-+-+
//! X:   |I|L|T|K| RSV   | (OPTIONAL)
//!      +-+-+-+-+-+-+-+-+
//! I:   |M| PictureID   | (OPTIONAL, 7 or 15 bits)
//!      +-+-+-+-+-+-+-+-+
//! L:   |   TL0PICIDX   | (OPTIONAL)
//!      +-+-+-+-+-+-+-+-+
//! T/K: |TID|Y| KEYIDX  | (OPTIONAL)
//!      +-+-+-+-+-+-+-+-+
//! ```
//!
//! The first byte of a VP8 frame (the frame tag) carries the inverse
//! keyframe flag in bit 0.

use bytes::Bytes;

/// Error type for VP8 payload parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vp8Error {
    /// Payload has no descriptor byte
    EmptyPayload,
    /// Descriptor announces more bytes than the payload holds
    TruncatedDescriptor,
}

impl std::fmt::Display for Vp8Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Vp8Error::EmptyPayload => write!(f, "Empty VP8 payload"),
            Vp8Error::TruncatedDescriptor => write!(f, "Truncated VP8 payload descriptor"),
        }
    }
}

impl std::error::Error for Vp8Error {}

/// Parsed VP8 payload descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Vp8Descriptor {
    /// Non-reference frame
    pub non_reference: bool,
    /// First packet of a VP8 partition
    pub start_of_partition: bool,
    /// Partition index
    pub partition_id: u8,
    /// Picture ID, when present
    pub picture_id: Option<u16>,
    /// Descriptor length in bytes
    pub len: usize,
}

impl Vp8Descriptor {
    /// Parse the descriptor at the start of an RTP payload
    pub fn parse(payload: &[u8]) -> Result<Self, Vp8Error> {
        let first = *payload.first().ok_or(Vp8Error::EmptyPayload)?;

        let mut desc = Vp8Descriptor {
            non_reference: first & 0x20 != 0,
            start_of_partition: first & 0x10 != 0,
            partition_id: first & 0x07,
            picture_id: None,
            len: 1,
        };

        if first & 0x80 == 0 {
            return Ok(desc);
        }

        let ext = *payload.get(desc.len).ok_or(Vp8Error::TruncatedDescriptor)?;
        desc.len += 1;

        if ext & 0x80 != 0 {
            let b = *payload.get(desc.len).ok_or(Vp8Error::TruncatedDescriptor)?;
            desc.len += 1;
            if b & 0x80 != 0 {
                let b2 = *payload.get(desc.len).ok_or(Vp8Error::TruncatedDescriptor)?;
                desc.len += 1;
                desc.picture_id = Some((((b & 0x7F) as u16) << 8) | b2 as u16);
            } else {
                desc.picture_id = Some((b & 0x7F) as u16);
            }
        }
        // TL0PICIDX
        if ext & 0x40 != 0 {
            desc.len += 1;
        }
        // TID/Y/KEYIDX
        if ext & 0x30 != 0 {
            desc.len += 1;
        }

        if desc.len > payload.len() {
            return Err(Vp8Error::TruncatedDescriptor);
        }

        Ok(desc)
    }

    /// Whether this packet starts a new frame
    pub fn is_frame_start(&self) -> bool {
        self.start_of_partition && self.partition_id == 0
    }
}

/// Split an RTP payload into its descriptor and VP8 data
pub fn depacketize(payload: &Bytes) -> Result<(Vp8Descriptor, Bytes), Vp8Error> {
    let desc = Vp8Descriptor::parse(payload)?;
    Ok((desc, payload.slice(desc.len..)))
}

/// Check the frame tag of a complete VP8 frame for a keyframe
pub fn is_keyframe(frame: &[u8]) -> bool {
    frame.first().map(|b| b & 0x01 == 0).unwrap_or(false)
}
