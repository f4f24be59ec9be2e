//! Ingest stream hub
//!
//! Keyed by stream path. Each stream has at most one publisher and any number
//! of cursors. A new cursor starts at the live tail; with catch-up enabled it
//! first replays the current GOP.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, RwLock};

use super::config::IngestConfig;
use super::error::IngestError;
use super::frame::IngestFrame;
use super::gop::GopBuffer;

/// Statistics for one ingest stream
#[derive(Debug, Clone)]
pub struct IngestStats {
    /// Number of attached cursors
    pub subscriber_count: u32,
    /// Whether a publisher is attached
    pub has_publisher: bool,
    /// Frames published since the stream was created
    pub frames_published: u64,
    /// Number of frames in GOP buffer
    pub gop_frame_count: usize,
}

/// Per-path stream state
struct IngestStream {
    tx: broadcast::Sender<IngestFrame>,
    publisher_id: Option<u64>,
    gop: GopBuffer,
    subscriber_count: Arc<AtomicU32>,
    frames_published: u64,
    publisher_disconnected_at: Option<Instant>,
}

impl IngestStream {
    fn new(config: &IngestConfig) -> Self {
        let (tx, _) = broadcast::channel(config.broadcast_capacity.max(1));
        Self {
            tx,
            publisher_id: None,
            gop: GopBuffer::with_max_size(config.max_gop_size),
            subscriber_count: Arc::new(AtomicU32::new(0)),
            frames_published: 0,
            publisher_disconnected_at: None,
        }
    }
}

/// Registry of ingest streams
pub struct IngestHub {
    streams: RwLock<HashMap<String, Arc<RwLock<IngestStream>>>>,
    config: IngestConfig,
}

impl IngestHub {
    pub fn new() -> Self {
        Self::with_config(IngestConfig::default())
    }

    pub fn with_config(config: IngestConfig) -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Register a publisher for a path
    ///
    /// Creates the stream if needed. Fails if the path already has a publisher;
    /// the existing publisher is left untouched.
    pub async fn register_publisher(&self, path: &str, publisher_id: u64) -> Result<(), IngestError> {
        let mut streams = self.streams.write().await;

        if let Some(stream_arc) = streams.get(path) {
            let mut stream = stream_arc.write().await;
            if stream.publisher_id.is_some() {
                return Err(IngestError::AlreadyPublishing(path.to_string()));
            }

            stream.publisher_id = Some(publisher_id);
            stream.publisher_disconnected_at = None;
            stream.gop.clear();

            tracing::info!(
                path = %path,
                publisher_id = publisher_id,
                subscribers = stream.subscriber_count.load(Ordering::Relaxed),
                "Ingest publisher registered (existing stream)"
            );
        } else {
            let mut stream = IngestStream::new(&self.config);
            stream.publisher_id = Some(publisher_id);
            streams.insert(path.to_string(), Arc::new(RwLock::new(stream)));

            tracing::info!(path = %path, publisher_id = publisher_id, "Ingest publisher registered (new stream)");
        }

        Ok(())
    }

    /// Unregister a publisher; cursors stay attached for a successor
    pub async fn unregister_publisher(&self, path: &str, publisher_id: u64) {
        let streams = self.streams.read().await;

        if let Some(stream_arc) = streams.get(path) {
            let mut stream = stream_arc.write().await;

            if stream.publisher_id != Some(publisher_id) {
                tracing::warn!(
                    path = %path,
                    expected = ?stream.publisher_id,
                    actual = publisher_id,
                    "Ingest publisher unregister mismatch"
                );
                return;
            }

            stream.publisher_id = None;
            stream.publisher_disconnected_at = Some(Instant::now());
            stream.gop.clear();

            tracing::info!(
                path = %path,
                publisher_id = publisher_id,
                subscribers = stream.subscriber_count.load(Ordering::Relaxed),
                "Ingest publisher disconnected"
            );
        }
    }

    /// Publish a frame to every cursor on the path
    ///
    /// Returns the number of cursors that received it.
    pub async fn publish(&self, path: &str, frame: IngestFrame) -> usize {
        let streams = self.streams.read().await;

        let Some(stream_arc) = streams.get(path) else {
            return 0;
        };
        let mut stream = stream_arc.write().await;

        stream.frames_published += 1;
        if self.config.gop_catchup {
            stream.gop.push(frame.clone());
        }
        // Err only means there is no receiver right now
        stream.tx.send(frame).unwrap_or(0)
    }

    /// Open a cursor at the live tail of `path`
    pub async fn latest(&self, path: &str) -> Result<IngestCursor, IngestError> {
        let streams = self.streams.read().await;

        let stream_arc = streams
            .get(path)
            .ok_or_else(|| IngestError::StreamNotFound(path.to_string()))?;
        // Write lock so no frame slips between the GOP snapshot and subscribe
        let stream = stream_arc.write().await;

        let rx = stream.tx.subscribe();
        let catchup: VecDeque<IngestFrame> = stream.gop.catchup().into();
        let count = stream.subscriber_count.fetch_add(1, Ordering::Relaxed) + 1;

        tracing::info!(
            path = %path,
            subscribers = count,
            catchup_frames = catchup.len(),
            "Ingest cursor opened"
        );

        Ok(IngestCursor {
            path: path.to_string(),
            rx,
            catchup,
            subscriber_count: Arc::clone(&stream.subscriber_count),
        })
    }

    /// Check if a path currently has a publisher
    pub async fn has_publisher(&self, path: &str) -> bool {
        let streams = self.streams.read().await;
        match streams.get(path) {
            Some(stream_arc) => stream_arc.read().await.publisher_id.is_some(),
            None => false,
        }
    }

    pub async fn stream_stats(&self, path: &str) -> Option<IngestStats> {
        let streams = self.streams.read().await;
        let stream = streams.get(path)?.read().await;
        Some(IngestStats {
            subscriber_count: stream.subscriber_count.load(Ordering::Relaxed),
            has_publisher: stream.publisher_id.is_some(),
            frames_published: stream.frames_published,
            gop_frame_count: stream.gop.frame_count(),
        })
    }

    pub async fn stream_count(&self) -> usize {
        self.streams.read().await.len()
    }

    /// Run cleanup once
    ///
    /// Removes streams without a publisher for longer than
    /// `idle_stream_timeout`. Their cursors see end of stream.
    pub async fn cleanup(&self) {
        let mut streams = self.streams.write().await;
        let now = Instant::now();

        let paths_to_remove: Vec<String> = streams
            .iter()
            .filter_map(|(path, stream_arc)| {
                let stream = stream_arc.try_read().ok()?;
                let idle_since = stream.publisher_disconnected_at?;
                if stream.publisher_id.is_none()
                    && now.duration_since(idle_since) > self.config.idle_stream_timeout
                {
                    Some(path.clone())
                } else {
                    None
                }
            })
            .collect();

        for path in paths_to_remove {
            streams.remove(&path);
            tracing::info!(path = %path, "Ingest stream removed by cleanup");
        }
    }

    /// Spawn background cleanup task
    pub fn spawn_cleanup_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let hub = Arc::clone(self);
        let interval = hub.config.cleanup_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                hub.cleanup().await;
            }
        })
    }
}

impl Default for IngestHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Read position on one ingest stream
pub struct IngestCursor {
    path: String,
    rx: broadcast::Receiver<IngestFrame>,
    catchup: VecDeque<IngestFrame>,
    subscriber_count: Arc<AtomicU32>,
}

impl IngestCursor {
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Next frame; `None` once the stream is removed
    ///
    /// A cursor that falls behind skips to the oldest frame still queued.
    pub async fn recv(&mut self) -> Option<IngestFrame> {
        if let Some(frame) = self.catchup.pop_front() {
            return Some(frame);
        }

        loop {
            match self.rx.recv().await {
                Ok(frame) => return Some(frame),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!(path = %self.path, skipped = n, "Ingest cursor lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for IngestCursor {
    fn drop(&mut self) {
        let prev = self.subscriber_count.fetch_sub(1, Ordering::Relaxed);
        tracing::debug!(path = %self.path, subscribers = prev.saturating_sub(1), "Ingest cursor closed");
    }
}
