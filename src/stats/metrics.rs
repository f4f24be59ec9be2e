//! Statistics for relay sessions

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Session-level statistics snapshot
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// RTP units read from inbound tracks
    pub units_received: u64,
    /// Payload bytes read from inbound tracks
    pub bytes_received: u64,
    /// Units handed to the relay track
    pub units_relayed: u64,
    /// Units or frames written to outbound tracks
    pub units_sent: u64,
    /// Frames written to the capture file
    pub frames_written: u64,
    /// Keyframes written to the capture file
    pub keyframes: u64,
    /// Frames discarded as incomplete
    pub dropped_frames: u64,
    /// Time since the session was created
    pub duration: Duration,
    /// Receive bitrate estimate (bits/sec)
    pub bitrate: u64,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calculate bitrate from bytes and duration
    pub fn calculate_bitrate(&mut self) {
        let secs = self.duration.as_secs();
        if secs > 0 {
            self.bitrate = (self.bytes_received * 8) / secs;
        }
    }
}

/// Live counters shared between a session's tasks
#[derive(Debug)]
pub struct SessionCounters {
    units_received: AtomicU64,
    bytes_received: AtomicU64,
    units_relayed: AtomicU64,
    units_sent: AtomicU64,
    frames_written: AtomicU64,
    keyframes: AtomicU64,
    dropped_frames: AtomicU64,
    started_at: Instant,
}

impl Default for SessionCounters {
    fn default() -> Self {
        Self {
            units_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            units_relayed: AtomicU64::new(0),
            units_sent: AtomicU64::new(0),
            frames_written: AtomicU64::new(0),
            keyframes: AtomicU64::new(0),
            dropped_frames: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }
}

impl SessionCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self, bytes: usize) {
        self.units_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_relayed(&self) {
        self.units_relayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sent(&self) {
        self.units_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame(&self, is_keyframe: bool) {
        self.frames_written.fetch_add(1, Ordering::Relaxed);
        if is_keyframe {
            self.keyframes.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_dropped(&self, frames: u64) {
        self.dropped_frames.fetch_add(frames, Ordering::Relaxed);
    }

    /// Take a consistent-enough snapshot
    pub fn snapshot(&self) -> SessionStats {
        let mut stats = SessionStats {
            units_received: self.units_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            units_relayed: self.units_relayed.load(Ordering::Relaxed),
            units_sent: self.units_sent.load(Ordering::Relaxed),
            frames_written: self.frames_written.load(Ordering::Relaxed),
            keyframes: self.keyframes.load(Ordering::Relaxed),
            dropped_frames: self.dropped_frames.load(Ordering::Relaxed),
            duration: self.started_at.elapsed(),
            bitrate: 0,
        };
        stats.calculate_bitrate();
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_stats_new() {
        let stats = SessionStats::new();
        assert_eq!(stats.bytes_received, 0);
        assert_eq!(stats.frames_written, 0);
        assert_eq!(stats.keyframes, 0);
        assert_eq!(stats.dropped_frames, 0);
        assert_eq!(stats.bitrate, 0);
    }

    #[test]
    fn test_session_stats_calculate_bitrate() {
        let mut stats = SessionStats::new();
        stats.bytes_received = 1_000_000; // 1 MB
        stats.duration = Duration::from_secs(10);

        stats.calculate_bitrate();

        // 1,000,000 bytes * 8 bits / 10 seconds = 800,000 bps
        assert_eq!(stats.bitrate, 800_000);
    }

    #[test]
    fn test_session_stats_calculate_bitrate_zero_duration() {
        let mut stats = SessionStats::new();
        stats.bytes_received = 1_000_000;
        stats.duration = Duration::from_secs(0);

        stats.calculate_bitrate();

        assert_eq!(stats.bitrate, 0);
    }

    #[test]
    fn test_counters_snapshot() {
        let counters = SessionCounters::new();
        counters.record_received(100);
        counters.record_received(50);
        counters.record_frame(true);
        counters.record_frame(false);
        counters.record_dropped(2);
        counters.record_relayed();
        counters.record_sent();

        let stats = counters.snapshot();
        assert_eq!(stats.units_received, 2);
        assert_eq!(stats.bytes_received, 150);
        assert_eq!(stats.frames_written, 2);
        assert_eq!(stats.keyframes, 1);
        assert_eq!(stats.dropped_frames, 2);
        assert_eq!(stats.units_relayed, 1);
        assert_eq!(stats.units_sent, 1);
    }
}
