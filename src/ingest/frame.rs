//! Ingested frame type

use std::time::Duration;

use bytes::Bytes;

/// One frame pushed by an external publisher
///
/// Cheap to clone; subscribers share the payload through `Bytes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestFrame {
    /// Position in the publisher's stream, starting at 0
    pub index: u64,
    /// Frame data
    pub data: Bytes,
    /// Playback duration declared by the source time base
    pub duration: Duration,
    /// Whether the frame is a keyframe
    pub is_keyframe: bool,
}

impl IngestFrame {
    pub fn new(index: u64, data: Bytes, duration: Duration, is_keyframe: bool) -> Self {
        Self {
            index,
            data,
            duration,
            is_keyframe,
        }
    }

    /// Payload size in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }
}
