//! IVF header and frame layout
//!
//! File header (all fields little-endian):
//! ```text
//! +--------+---------+----------+--------+-------+--------+----------+----------+--------+--------+
//! | "DKIF" | Version | HdrSize  | FourCC | Width | Height | TB Denom | TB Numer | Frames | Unused |
//! | (4)    | (2)     | (2) = 32 | (4)    | (2)   | (2)    | (4)      | (4)      | (4)    | (4)    |
//! +--------+---------+----------+--------+-------+--------+----------+----------+--------+--------+
//! ```
//!
//! Frame header:
//! ```text
//! +-----------+---------------+
//! | Size (4)  | Timestamp (8) | Data(Size)
//! +-----------+---------------+
//! ```

use std::time::Duration;

use bytes::{Buf, BufMut, Bytes};

use super::error::ContainerError;

/// IVF file signature
pub const IVF_SIGNATURE: [u8; 4] = *b"DKIF";

/// Size of the IVF file header
pub const IVF_HEADER_SIZE: usize = 32;

/// Size of each IVF frame header
pub const FRAME_HEADER_SIZE: usize = 12;

/// FourCC for VP8 payloads
pub const FOURCC_VP8: [u8; 4] = *b"VP80";

/// Frames larger than this are treated as corruption
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Byte offset of the frame count field, rewritten when a writer closes
pub(crate) const FRAME_COUNT_OFFSET: u64 = 24;

/// Parsed IVF file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IvfHeader {
    /// Codec FourCC (e.g. `VP80`)
    pub fourcc: [u8; 4],
    /// Frame width in pixels
    pub width: u16,
    /// Frame height in pixels
    pub height: u16,
    /// Time-base denominator
    pub timebase_denominator: u32,
    /// Time-base numerator
    pub timebase_numerator: u32,
    /// Number of frames declared by the writer
    pub frame_count: u32,
}

impl Default for IvfHeader {
    fn default() -> Self {
        Self::vp8(640, 480)
    }
}

impl IvfHeader {
    /// VP8 header at 30 frames per second
    pub fn vp8(width: u16, height: u16) -> Self {
        Self {
            fourcc: FOURCC_VP8,
            width,
            height,
            timebase_denominator: 30,
            timebase_numerator: 1,
            frame_count: 0,
        }
    }

    /// Set the time base
    pub fn timebase(mut self, numerator: u32, denominator: u32) -> Self {
        self.timebase_numerator = numerator;
        self.timebase_denominator = denominator;
        self
    }

    /// Wall-clock interval between consecutive frames
    ///
    /// One time-base unit (`numerator / denominator` seconds). Returns `None`
    /// when either field is zero.
    pub fn frame_interval(&self) -> Option<Duration> {
        if self.timebase_numerator == 0 || self.timebase_denominator == 0 {
            return None;
        }
        let nanos =
            self.timebase_numerator as u64 * 1_000_000_000 / self.timebase_denominator as u64;
        Some(Duration::from_nanos(nanos))
    }

    /// Parse a header from its 32-byte encoding
    pub fn parse(mut buf: &[u8]) -> Result<Self, ContainerError> {
        if buf.len() < IVF_HEADER_SIZE {
            return Err(ContainerError::TruncatedHeader);
        }

        let mut signature = [0u8; 4];
        buf.copy_to_slice(&mut signature);
        if signature != IVF_SIGNATURE {
            return Err(ContainerError::BadSignature(signature));
        }

        let _version = buf.get_u16_le();
        let header_size = buf.get_u16_le();
        if header_size as usize != IVF_HEADER_SIZE {
            return Err(ContainerError::UnsupportedHeaderSize(header_size));
        }

        let mut fourcc = [0u8; 4];
        buf.copy_to_slice(&mut fourcc);

        Ok(Self {
            fourcc,
            width: buf.get_u16_le(),
            height: buf.get_u16_le(),
            timebase_denominator: buf.get_u32_le(),
            timebase_numerator: buf.get_u32_le(),
            frame_count: buf.get_u32_le(),
        })
    }

    /// Encode the header into its 32-byte form
    pub fn encode(&self) -> [u8; IVF_HEADER_SIZE] {
        let mut out = [0u8; IVF_HEADER_SIZE];
        let mut buf = &mut out[..];
        buf.put_slice(&IVF_SIGNATURE);
        buf.put_u16_le(0);
        buf.put_u16_le(IVF_HEADER_SIZE as u16);
        buf.put_slice(&self.fourcc);
        buf.put_u16_le(self.width);
        buf.put_u16_le(self.height);
        buf.put_u32_le(self.timebase_denominator);
        buf.put_u32_le(self.timebase_numerator);
        buf.put_u32_le(self.frame_count);
        buf.put_u32_le(0);
        out
    }
}

/// Per-frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Payload size in bytes
    pub size: u32,
    /// Presentation timestamp in time-base units
    pub timestamp: u64,
}

impl FrameHeader {
    /// Parse a frame header from its 12-byte encoding
    pub fn parse(mut buf: &[u8]) -> Result<Self, ContainerError> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Err(ContainerError::TruncatedFrameHeader);
        }
        let size = buf.get_u32_le();
        let timestamp = buf.get_u64_le();
        if size > MAX_FRAME_SIZE {
            return Err(ContainerError::FrameTooLarge(size));
        }
        Ok(Self { size, timestamp })
    }

    pub fn encode(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut out = [0u8; FRAME_HEADER_SIZE];
        let mut buf = &mut out[..];
        buf.put_u32_le(self.size);
        buf.put_u64_le(self.timestamp);
        out
    }
}

/// One frame read from a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IvfFrame {
    /// Presentation timestamp in time-base units
    pub timestamp: u64,
    /// Frame payload
    pub data: Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = IvfHeader::vp8(1280, 720);
        let bytes = header.encode();

        assert_eq!(&bytes[0..4], b"DKIF");
        assert_eq!(u16::from_le_bytes([bytes[6], bytes[7]]), 32);
        assert_eq!(&bytes[8..12], b"VP80");
        assert_eq!(u16::from_le_bytes([bytes[12], bytes[13]]), 1280);
        assert_eq!(u32::from_le_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]), 30);
        assert_eq!(u32::from_le_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]), 1);

        assert_eq!(IvfHeader::parse(&bytes).unwrap(), header);
    }

    #[test]
    fn test_bad_signature() {
        let mut bytes = IvfHeader::default().encode();
        bytes[0] = b'X';
        assert!(matches!(
            IvfHeader::parse(&bytes),
            Err(ContainerError::BadSignature(_))
        ));
    }

    #[test]
    fn test_unsupported_header_size() {
        let mut bytes = IvfHeader::default().encode();
        bytes[6] = 64;
        assert!(matches!(
            IvfHeader::parse(&bytes),
            Err(ContainerError::UnsupportedHeaderSize(64))
        ));
    }

    #[test]
    fn test_truncated_header() {
        let bytes = IvfHeader::default().encode();
        assert!(matches!(
            IvfHeader::parse(&bytes[..20]),
            Err(ContainerError::TruncatedHeader)
        ));
    }

    #[test]
    fn test_frame_interval() {
        let header = IvfHeader::vp8(640, 480);
        assert_eq!(header.frame_interval(), Some(Duration::from_nanos(33_333_333)));

        let header = IvfHeader::vp8(640, 480).timebase(1, 1000);
        assert_eq!(header.frame_interval(), Some(Duration::from_millis(1)));

        let header = IvfHeader::vp8(640, 480).timebase(0, 30);
        assert_eq!(header.frame_interval(), None);
    }

    #[test]
    fn test_frame_header_too_large() {
        let header = FrameHeader {
            size: MAX_FRAME_SIZE + 1,
            timestamp: 0,
        };
        assert!(matches!(
            FrameHeader::parse(&header.encode()),
            Err(ContainerError::FrameTooLarge(_))
        ));
    }

    #[test]
    fn test_frame_header_fields() {
        let header = FrameHeader {
            size: 1234,
            timestamp: 42,
        };
        let bytes = header.encode();
        assert_eq!(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]), 1234);
        assert_eq!(FrameHeader::parse(&bytes).unwrap(), header);
    }
}
