//! Inbound track forwarding
//!
//! One forwarder task runs per inbound track. Each unit read from the track
//! is republished to the relay track (when bound) and assembled into frames
//! for the capture file (when bound). End of stream, a read failure or
//! cancellation stops the task and closes the capture file; nothing is
//! propagated to the other sinks.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::keepalive::KeepaliveSet;
use super::track::RelayTrack;
use crate::container::{IvfHeader, IvfWriter};
use crate::media::{FrameAssembler, RtpPacket, VideoFrame};
use crate::stats::SessionCounters;
use crate::transport::InboundTrack;

/// Where a captured track is written
#[derive(Debug, Clone)]
pub struct CaptureTarget {
    pub path: PathBuf,
    pub header: IvfHeader,
}

impl CaptureTarget {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            header: IvfHeader::vp8(640, 480),
        }
    }
}

/// What a finished forwarder did
#[derive(Debug, Clone, Default)]
pub struct ForwardSummary {
    /// Units read from the track
    pub units: u64,
    /// Frames written to the capture file
    pub frames_written: u32,
    /// Capture file, if one was opened
    pub path: Option<PathBuf>,
}

/// Reads one inbound track and feeds its sinks
pub struct Forwarder {
    peer_id: String,
    track: Box<dyn InboundTrack>,
    relay: Option<Arc<RelayTrack>>,
    capture: Option<CaptureTarget>,
    keepalive: KeepaliveSet,
    counters: Arc<SessionCounters>,
}

impl Forwarder {
    pub fn new(
        peer_id: impl Into<String>,
        track: Box<dyn InboundTrack>,
        keepalive: KeepaliveSet,
        counters: Arc<SessionCounters>,
    ) -> Self {
        Self {
            peer_id: peer_id.into(),
            track,
            relay: None,
            capture: None,
            keepalive,
            counters,
        }
    }

    /// Republish every unit on `relay`
    pub fn relay_to(mut self, relay: Arc<RelayTrack>) -> Self {
        self.relay = Some(relay);
        self
    }

    /// Persist assembled frames to `target`
    pub fn capture_to(mut self, target: CaptureTarget) -> Self {
        self.capture = Some(target);
        self
    }

    /// Run until end of stream, read failure or cancellation
    pub async fn run(self, cancel: CancellationToken) -> ForwardSummary {
        let ssrc = self.track.ssrc();
        let mut capture = self.capture.map(Capture::new);

        if let Some(relay) = &self.relay {
            relay.claim_publisher(&self.peer_id).await;
        }
        self.keepalive.insert(ssrc);

        tracing::info!(
            peer = %self.peer_id,
            ssrc = ssrc,
            kind = %self.track.kind(),
            relay = self.relay.is_some(),
            capture = capture.is_some(),
            "Forwarding inbound track"
        );

        let mut units = 0u64;
        loop {
            let unit = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(peer = %self.peer_id, ssrc = ssrc, "Forwarder cancelled");
                    break;
                }
                unit = self.track.read_unit() => unit,
            };

            let packet = match unit {
                Ok(Some(packet)) => packet,
                Ok(None) => {
                    tracing::info!(peer = %self.peer_id, ssrc = ssrc, "Inbound track ended");
                    break;
                }
                Err(e) => {
                    tracing::warn!(peer = %self.peer_id, ssrc = ssrc, error = %e, "Inbound track read failed");
                    break;
                }
            };

            units += 1;
            self.counters.record_received(packet.payload.len());

            if let Some(relay) = &self.relay {
                if relay.publish(&self.peer_id, &packet).await > 0 {
                    self.counters.record_relayed();
                }
            }

            if let Some(capture) = capture.as_mut() {
                capture.push(&self.peer_id, &packet, &self.counters);
            }
        }

        self.keepalive.remove(ssrc);
        if let Some(relay) = &self.relay {
            relay.release_publisher(&self.peer_id).await;
        }

        let (frames_written, path) = match capture {
            Some(capture) => capture.close(&self.peer_id),
            None => (0, None),
        };

        ForwardSummary {
            units,
            frames_written,
            path,
        }
    }
}

/// Capture file, opened on the first complete frame
struct Capture {
    target: CaptureTarget,
    assembler: FrameAssembler,
    writer: Option<IvfWriter<File>>,
    failed: bool,
}

impl Capture {
    fn new(target: CaptureTarget) -> Self {
        Self {
            target,
            assembler: FrameAssembler::new(),
            writer: None,
            failed: false,
        }
    }

    fn push(&mut self, peer_id: &str, packet: &RtpPacket, counters: &SessionCounters) {
        let dropped_before = self.assembler.dropped();
        let frame = self.assembler.push(packet);
        counters.record_dropped(self.assembler.dropped() - dropped_before);

        if let Some(frame) = frame {
            self.write(peer_id, frame, counters);
        }
    }

    fn write(&mut self, peer_id: &str, frame: VideoFrame, counters: &SessionCounters) {
        if self.failed {
            return;
        }

        if self.writer.is_none() {
            match IvfWriter::create(&self.target.path, self.target.header) {
                Ok(writer) => {
                    tracing::info!(peer = %peer_id, path = %self.target.path.display(), "Capture file opened");
                    self.writer = Some(writer);
                }
                Err(e) => {
                    tracing::error!(
                        peer = %peer_id,
                        path = %self.target.path.display(),
                        error = %e,
                        "Failed to open capture file"
                    );
                    self.failed = true;
                    return;
                }
            }
        }

        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        let index = u64::from(writer.frame_count());
        match writer.write_frame(&frame.data, index) {
            Ok(()) => counters.record_frame(frame.is_keyframe),
            Err(e) => {
                tracing::warn!(peer = %peer_id, error = %e, "Capture write failed, closing file");
                self.failed = true;
                if let Some(writer) = self.writer.take() {
                    let _ = writer.close();
                }
            }
        }
    }

    fn close(mut self, peer_id: &str) -> (u32, Option<PathBuf>) {
        let Some(writer) = self.writer.take() else {
            return (0, None);
        };

        let frames = writer.frame_count();
        if let Err(e) = writer.close() {
            tracing::warn!(peer = %peer_id, error = %e, "Failed to finalize capture file");
        }

        tracing::info!(
            peer = %peer_id,
            path = %self.target.path.display(),
            frames = frames,
            "Capture file closed"
        );
        (frames, Some(self.target.path))
    }
}
