//! Shared relay track
//!
//! One source feeds the track; every subscribing session holds a
//! [`RelaySubscription`] on its broadcast channel. The track outlives any
//! single publisher: when a publisher goes away the subscribers stay attached
//! and the next publisher takes over feeding them.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, RwLock};

use crate::media::RtpPacket;
use crate::transport::CodecSpec;

/// Statistics for the relay track
#[derive(Debug, Clone)]
pub struct RelayStats {
    /// Number of attached subscribers
    pub subscriber_count: u32,
    /// Peer currently feeding the track
    pub publisher: Option<String>,
    /// Units broadcast since creation
    pub units_forwarded: u64,
    /// Time since the track was created
    pub age: std::time::Duration,
}

/// The singleton outbound source shared by all relay subscribers
pub struct RelayTrack {
    codec: CodecSpec,
    tx: broadcast::Sender<RtpPacket>,
    publisher: RwLock<Option<String>>,
    subscriber_count: AtomicU32,
    units_forwarded: AtomicU64,
    created_at: Instant,
}

impl RelayTrack {
    pub fn new(codec: CodecSpec, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            codec,
            tx,
            publisher: RwLock::new(None),
            subscriber_count: AtomicU32::new(0),
            units_forwarded: AtomicU64::new(0),
            created_at: Instant::now(),
        }
    }

    /// Codec every subscriber's outbound track must use
    pub fn codec(&self) -> &CodecSpec {
        &self.codec
    }

    /// Make `peer_id` the source of this track
    ///
    /// A publisher arriving while another is active takes over.
    pub async fn claim_publisher(&self, peer_id: &str) {
        let mut publisher = self.publisher.write().await;
        match publisher.as_deref() {
            Some(current) if current == peer_id => {}
            Some(current) => {
                tracing::warn!(
                    previous = %current,
                    peer = %peer_id,
                    subscribers = self.subscriber_count(),
                    "Relay publisher taken over"
                );
                *publisher = Some(peer_id.to_string());
            }
            None => {
                tracing::info!(
                    peer = %peer_id,
                    subscribers = self.subscriber_count(),
                    "Relay publisher registered"
                );
                *publisher = Some(peer_id.to_string());
            }
        }
    }

    /// Detach `peer_id` if it is still the source
    pub async fn release_publisher(&self, peer_id: &str) {
        let mut publisher = self.publisher.write().await;
        if publisher.as_deref() != Some(peer_id) {
            tracing::debug!(peer = %peer_id, current = ?*publisher, "Relay release by non-publisher");
            return;
        }
        *publisher = None;
        tracing::info!(
            peer = %peer_id,
            subscribers = self.subscriber_count(),
            "Relay publisher released, subscribers stay attached"
        );
    }

    /// Current source peer
    pub async fn publisher(&self) -> Option<String> {
        self.publisher.read().await.clone()
    }

    /// Forward one unit from `peer_id`; units from a non-publisher are dropped
    ///
    /// Returns the number of subscribers that received the unit.
    pub async fn publish(&self, peer_id: &str, packet: &RtpPacket) -> usize {
        if self.publisher.read().await.as_deref() != Some(peer_id) {
            return 0;
        }
        self.units_forwarded.fetch_add(1, Ordering::Relaxed);
        // Err only means there is no receiver right now
        self.tx.send(packet.clone()).unwrap_or(0)
    }

    /// Attach a new subscriber at the current position
    pub fn subscribe(self: &Arc<Self>) -> RelaySubscription {
        let rx = self.tx.subscribe();
        let count = self.subscriber_count.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(subscribers = count, "Relay subscriber added");
        RelaySubscription {
            rx,
            track: Arc::clone(self),
            lagged: 0,
        }
    }

    pub fn subscriber_count(&self) -> u32 {
        self.subscriber_count.load(Ordering::Relaxed)
    }

    pub async fn stats(&self) -> RelayStats {
        RelayStats {
            subscriber_count: self.subscriber_count(),
            publisher: self.publisher().await,
            units_forwarded: self.units_forwarded.load(Ordering::Relaxed),
            age: self.created_at.elapsed(),
        }
    }
}

/// Receiving end held by one subscriber pipeline
pub struct RelaySubscription {
    rx: broadcast::Receiver<RtpPacket>,
    track: Arc<RelayTrack>,
    lagged: u64,
}

impl RelaySubscription {
    /// Next unit in publish order; `None` once the track is gone
    ///
    /// A subscriber that falls behind skips the units it missed.
    pub async fn recv(&mut self) -> Option<RtpPacket> {
        loop {
            match self.rx.recv().await {
                Ok(packet) => return Some(packet),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    self.lagged += n;
                    tracing::debug!(skipped = n, "Relay subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Units skipped because this subscriber fell behind
    pub fn lagged(&self) -> u64 {
        self.lagged
    }

    pub fn codec(&self) -> &CodecSpec {
        self.track.codec()
    }
}

impl Drop for RelaySubscription {
    fn drop(&mut self) {
        let prev = self.track.subscriber_count.fetch_sub(1, Ordering::Relaxed);
        tracing::debug!(subscribers = prev.saturating_sub(1), "Relay subscriber removed");
    }
}

/// Holder of the registry's relay track slot
///
/// Empty until the first publisher's track arrives.
#[derive(Default)]
pub struct RelayHub {
    slot: RwLock<Option<Arc<RelayTrack>>>,
    capacity: usize,
}

impl RelayHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            slot: RwLock::new(None),
            capacity,
        }
    }

    /// The relay track, if a publisher has ever created it
    pub async fn current(&self) -> Option<Arc<RelayTrack>> {
        self.slot.read().await.clone()
    }

    /// Return the relay track, creating it with `codec` on first use
    pub async fn get_or_create(&self, codec: &CodecSpec) -> Arc<RelayTrack> {
        let mut slot = self.slot.write().await;
        if let Some(track) = slot.as_ref() {
            return Arc::clone(track);
        }

        tracing::info!(codec = %codec.mime_type, "Relay track created");
        let track = Arc::new(RelayTrack::new(codec.clone(), self.capacity));
        *slot = Some(Arc::clone(&track));
        track
    }
}
