//! Outbound pumps for subscribing sessions
//!
//! - [`play_file`]: paced playback of a container file
//! - [`pump_relay`]: relay track units to one subscriber's outbound track
//! - [`pump_ingest`]: ingest stream frames to one subscriber's outbound track

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::track::RelaySubscription;
use crate::container::IvfReader;
use crate::error::Result;
use crate::ingest::IngestCursor;
use crate::stats::SessionCounters;
use crate::transport::{RtpSink, SampleSink};

/// Used when the file header has no usable time base
const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// Play a container file into `sink`, one frame per time-base interval
///
/// Each frame is preceded by a sleep of one interval. Returns the number of
/// frames sent.
pub async fn play_file<R: Read + Send>(
    mut reader: IvfReader<R>,
    sink: Arc<dyn SampleSink>,
    counters: Arc<SessionCounters>,
    cancel: CancellationToken,
) -> Result<u64> {
    let interval = reader
        .header()
        .frame_interval()
        .unwrap_or(DEFAULT_FRAME_INTERVAL);

    let mut sent = 0u64;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(frames = sent, "File playback cancelled");
                return Ok(sent);
            }
            _ = tokio::time::sleep(interval) => {}
        }

        let Some(frame) = reader.next_frame()? else {
            tracing::info!(frames = sent, "All frames parsed and sent");
            return Ok(sent);
        };

        sink.write_sample(frame.data, interval).await?;
        counters.record_sent();
        sent += 1;
    }
}

/// Forward relay units to one subscriber until the relay or session ends
pub async fn pump_relay(
    mut subscription: RelaySubscription,
    sink: Arc<dyn RtpSink>,
    counters: Arc<SessionCounters>,
    cancel: CancellationToken,
) -> u64 {
    let mut sent = 0u64;
    loop {
        let packet = tokio::select! {
            _ = cancel.cancelled() => break,
            packet = subscription.recv() => match packet {
                Some(packet) => packet,
                None => break,
            },
        };

        if let Err(e) = sink.write_rtp(&packet).await {
            tracing::warn!(error = %e, "Relay write failed, stopping subscriber");
            break;
        }
        counters.record_sent();
        sent += 1;
    }

    tracing::debug!(units = sent, lagged = subscription.lagged(), "Relay subscriber stopped");
    sent
}

/// Forward ingest frames to one subscriber until the stream or session ends
pub async fn pump_ingest(
    mut cursor: IngestCursor,
    sink: Arc<dyn SampleSink>,
    counters: Arc<SessionCounters>,
    cancel: CancellationToken,
) -> u64 {
    let mut sent = 0u64;
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = cursor.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        if let Err(e) = sink.write_sample(frame.data, frame.duration).await {
            tracing::warn!(path = %cursor.path(), error = %e, "Ingest write failed, stopping subscriber");
            break;
        }
        counters.record_sent();
        sent += 1;
    }

    tracing::debug!(path = %cursor.path(), frames = sent, "Ingest subscriber stopped");
    sent
}
