//! Periodic keyframe requests
//!
//! Every tick, one picture loss indication goes upstream for each track
//! currently registered, so a subscriber that joined late or lost packets
//! sees a decodable frame within one interval.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::transport::PeerTransport;

/// Set of receiving tracks (by SSRC) the keepalive covers
#[derive(Debug, Clone, Default)]
pub struct KeepaliveSet {
    inner: Arc<Mutex<BTreeSet<u32>>>,
}

impl KeepaliveSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, ssrc: u32) {
        if let Ok(mut set) = self.inner.lock() {
            set.insert(ssrc);
        }
    }

    pub fn remove(&self, ssrc: u32) {
        if let Ok(mut set) = self.inner.lock() {
            set.remove(&ssrc);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|set| set.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<u32> {
        self.inner
            .lock()
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }
}

/// Issue keyframe requests every `interval` until cancelled
///
/// The first request goes out one full interval after start. Returns the
/// number of requests issued.
pub async fn run_keepalive(
    transport: Arc<dyn PeerTransport>,
    tracks: KeepaliveSet,
    interval: Duration,
    cancel: CancellationToken,
) -> u64 {
    let start = tokio::time::Instant::now() + interval;
    let mut ticker = tokio::time::interval_at(start, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut issued = 0u64;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        for ssrc in tracks.snapshot() {
            match transport.request_keyframe(ssrc).await {
                Ok(()) => issued += 1,
                Err(e) => {
                    tracing::debug!(ssrc = ssrc, error = %e, "Keyframe request failed");
                }
            }
        }
    }

    tracing::debug!(requests = issued, "Keepalive stopped");
    issued
}
