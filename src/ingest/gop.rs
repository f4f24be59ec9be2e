//! GOP (Group of Pictures) buffer for late-joiner catch-up
//!
//! Holds the most recent keyframe and every frame since, so a consumer that
//! opts into catch-up can start decoding immediately instead of waiting for
//! the next keyframe.

use std::collections::VecDeque;

use super::frame::IngestFrame;

/// GOP buffer for one ingest stream
#[derive(Debug)]
pub struct GopBuffer {
    /// Maximum buffer size in bytes
    max_size: usize,
    /// Current buffer size in bytes
    current_size: usize,
    /// Buffered frames since last keyframe
    frames: VecDeque<IngestFrame>,
    /// Whether the buffer starts with a keyframe
    has_complete_gop: bool,
}

impl GopBuffer {
    /// Create a new GOP buffer with default max size (4MB)
    pub fn new() -> Self {
        Self::with_max_size(4 * 1024 * 1024)
    }

    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            max_size,
            current_size: 0,
            frames: VecDeque::new(),
            has_complete_gop: false,
        }
    }

    /// Add a frame to the buffer
    ///
    /// A keyframe starts a new GOP. Frames before the first keyframe are not
    /// kept. Returns true if the frame was added, false if it cannot fit.
    pub fn push(&mut self, frame: IngestFrame) -> bool {
        let size = frame.size();

        if frame.is_keyframe {
            self.clear();
            self.has_complete_gop = true;
        } else if !self.has_complete_gop {
            return false;
        }

        // Make room by dropping oldest frames
        while self.current_size + size > self.max_size && !self.frames.is_empty() {
            if let Some(old) = self.frames.pop_front() {
                self.current_size -= old.size();
                // Leading keyframe gone, the rest no longer decodes
                self.has_complete_gop = false;
            }
        }

        if self.current_size + size > self.max_size {
            return false;
        }

        self.frames.push_back(frame);
        self.current_size += size;
        true
    }

    pub fn clear(&mut self) {
        self.frames.clear();
        self.current_size = 0;
        self.has_complete_gop = false;
    }

    /// Check if the buffer starts with a keyframe
    pub fn has_complete_gop(&self) -> bool {
        self.has_complete_gop
    }

    /// Frames a late joiner needs, oldest first
    ///
    /// Empty unless the buffer holds a decodable GOP.
    pub fn catchup(&self) -> Vec<IngestFrame> {
        if !self.has_complete_gop {
            return Vec::new();
        }
        self.frames.iter().cloned().collect()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Current buffer size in bytes
    pub fn size(&self) -> usize {
        self.current_size
    }
}

impl Default for GopBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;

    fn make_frame(index: u64, is_keyframe: bool, size: usize) -> IngestFrame {
        IngestFrame::new(
            index,
            Bytes::from(vec![0u8; size]),
            Duration::from_millis(33),
            is_keyframe,
        )
    }

    #[test]
    fn test_gop_buffer_basic() {
        let mut buffer = GopBuffer::new();
        assert!(!buffer.has_complete_gop());

        buffer.push(make_frame(0, true, 500));
        buffer.push(make_frame(1, false, 200));
        buffer.push(make_frame(2, false, 200));

        assert!(buffer.has_complete_gop());
        assert_eq!(buffer.frame_count(), 3);
        assert_eq!(buffer.size(), 900);
    }

    #[test]
    fn test_frames_before_keyframe_ignored() {
        let mut buffer = GopBuffer::new();
        assert!(!buffer.push(make_frame(0, false, 100)));
        assert_eq!(buffer.frame_count(), 0);
        assert!(buffer.catchup().is_empty());
    }

    #[test]
    fn test_gop_buffer_keyframe_clears() {
        let mut buffer = GopBuffer::new();

        buffer.push(make_frame(0, true, 500));
        buffer.push(make_frame(1, false, 200));
        buffer.push(make_frame(2, false, 200));
        assert_eq!(buffer.frame_count(), 3);

        buffer.push(make_frame(3, true, 500));
        assert_eq!(buffer.frame_count(), 1);
        assert_eq!(buffer.catchup()[0].index, 3);
    }

    #[test]
    fn test_gop_buffer_size_limit() {
        let mut buffer = GopBuffer::with_max_size(500);

        buffer.push(make_frame(0, true, 200));
        buffer.push(make_frame(1, false, 200));

        // Fits by evicting the keyframe, which breaks the GOP
        assert!(buffer.push(make_frame(2, false, 200)));
        assert!(!buffer.has_complete_gop());
        assert!(buffer.catchup().is_empty());

        // A single frame larger than the buffer never fits
        assert!(!buffer.push(make_frame(3, true, 600)));
    }

    #[test]
    fn test_catchup_order() {
        let mut buffer = GopBuffer::new();
        buffer.push(make_frame(10, true, 10));
        buffer.push(make_frame(11, false, 10));

        let indexes: Vec<u64> = buffer.catchup().iter().map(|f| f.index).collect();
        assert_eq!(indexes, vec![10, 11]);
    }
}
