//! Session registry implementation
//!
//! The directory of live sessions keyed by peer id. Insert, lookup and remove
//! are serialized by one lock; offer/answer processing runs on each
//! session's own task, outside it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::config::RegistryConfig;
use super::error::RegistryError;
use crate::error::Result;
use crate::ingest::IngestHub;
use crate::relay::{RelayHub, RelayStats};
use crate::session::task::Session;
use crate::session::{SessionAction, SessionHandle, SessionState};
use crate::signaling::SignalMessage;
use crate::stats::SessionCounters;
use crate::transport::{PeerTransport, TransportFactory};

struct RegistryInner {
    sessions: Mutex<HashMap<String, SessionHandle>>,
    factory: Arc<dyn TransportFactory>,
    config: RegistryConfig,
    relay: RelayHub,
    ingest: Option<Arc<IngestHub>>,
    outbox: mpsc::Sender<SignalMessage>,
    next_session_id: AtomicU64,
    shutdown: CancellationToken,
}

/// Registry of peer sessions
///
/// Cheap to clone; clones share the same sessions.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

impl SessionRegistry {
    /// Create a registry whose sessions report to `outbox`
    pub fn new(
        factory: Arc<dyn TransportFactory>,
        config: RegistryConfig,
        outbox: mpsc::Sender<SignalMessage>,
    ) -> Self {
        Self::with_parts(factory, config, outbox, None)
    }

    /// Create a registry that can serve ingest subscriptions from `ingest`
    pub fn with_ingest(
        factory: Arc<dyn TransportFactory>,
        config: RegistryConfig,
        outbox: mpsc::Sender<SignalMessage>,
        ingest: Arc<IngestHub>,
    ) -> Self {
        Self::with_parts(factory, config, outbox, Some(ingest))
    }

    fn with_parts(
        factory: Arc<dyn TransportFactory>,
        config: RegistryConfig,
        outbox: mpsc::Sender<SignalMessage>,
        ingest: Option<Arc<IngestHub>>,
    ) -> Self {
        let relay = RelayHub::new(config.relay_capacity);
        Self {
            inner: Arc::new(RegistryInner {
                sessions: Mutex::new(HashMap::new()),
                factory,
                config,
                relay,
                ingest,
                outbox,
                next_session_id: AtomicU64::new(1),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// Create a session for `peer_id`, or join the one that exists
    ///
    /// Joining is a no-op returning success. On any error the registry is left
    /// unchanged and the new transport, if one was created, is closed.
    pub async fn create_or_join(&self, peer_id: &str, action: SessionAction) -> Result<()> {
        let inner = &self.inner;
        if inner.shutdown.is_cancelled() {
            return Err(RegistryError::ShuttingDown.into());
        }

        let mut sessions = inner.sessions.lock().await;

        if let Some(existing) = sessions.get(peer_id) {
            if !existing.is_closed() {
                tracing::debug!(
                    peer = %peer_id,
                    session_id = existing.session_id(),
                    "Session exists, joining"
                );
                return Ok(());
            }
        }

        let capacity = inner.config.session_queue_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel(capacity);
        let transport = inner.factory.create(peer_id, event_tx).await?;
        let supervised_transport = Arc::clone(&transport);

        let session_id = inner.next_session_id.fetch_add(1, Ordering::Relaxed);
        let cancel = inner.shutdown.child_token();
        let counters = Arc::new(SessionCounters::new());
        let (state_tx, state_rx) = watch::channel(SessionState::Created);

        let mut session = Session::new(
            peer_id,
            session_id,
            action.clone(),
            transport,
            self.clone(),
            state_tx,
            Arc::clone(&counters),
            cancel.clone(),
        );

        if let Err(e) = session.setup().await {
            tracing::warn!(peer = %peer_id, action = %action, error = %e, "Session setup failed");
            session.abort_setup().await;
            return Err(e);
        }

        let (command_tx, command_rx) = mpsc::channel(capacity);
        let handle = SessionHandle::new(
            peer_id,
            session_id,
            action.clone(),
            command_tx,
            state_rx,
            counters,
            cancel.clone(),
        );
        sessions.insert(peer_id.to_string(), handle);

        let task = tokio::spawn(session.run(command_rx, event_rx));
        tokio::spawn(self.clone().supervise(
            peer_id.to_string(),
            session_id,
            task,
            supervised_transport,
            cancel,
        ));

        tracing::info!(
            peer = %peer_id,
            session_id = session_id,
            action = %action,
            sessions = sessions.len(),
            "Session created"
        );

        Ok(())
    }

    /// Clean up after a session task that died without tearing down
    async fn supervise(
        self,
        peer_id: String,
        session_id: u64,
        task: JoinHandle<()>,
        transport: Arc<dyn PeerTransport>,
        cancel: CancellationToken,
    ) {
        let Err(e) = task.await else {
            return;
        };

        tracing::error!(peer = %peer_id, session_id = session_id, error = %e, "Session task failed");
        cancel.cancel();
        if let Err(e) = transport.close().await {
            tracing::warn!(peer = %peer_id, error = %e, "Transport close failed");
        }
        self.remove(&peer_id, session_id).await;
    }

    /// Session for `peer_id`, if one is registered
    pub async fn lookup(&self, peer_id: &str) -> Option<SessionHandle> {
        self.inner.sessions.lock().await.get(peer_id).cloned()
    }

    /// Remove `peer_id` if it still maps to `session_id`
    ///
    /// Called by the session itself on teardown. A newer session that took
    /// over the peer id is left alone.
    pub(crate) async fn remove(&self, peer_id: &str, session_id: u64) -> bool {
        let mut sessions = self.inner.sessions.lock().await;

        match sessions.get(peer_id) {
            Some(handle) if handle.session_id() == session_id => {
                sessions.remove(peer_id);
                tracing::info!(
                    peer = %peer_id,
                    session_id = session_id,
                    sessions = sessions.len(),
                    "Session removed"
                );
                true
            }
            Some(handle) => {
                tracing::debug!(
                    peer = %peer_id,
                    expected = handle.session_id(),
                    actual = session_id,
                    "Session remove mismatch"
                );
                false
            }
            None => false,
        }
    }

    /// Tear down every session and wait for each to finish
    pub async fn close_all(&self) {
        self.inner.shutdown.cancel();

        let handles: Vec<SessionHandle> = self.inner.sessions.lock().await.values().cloned().collect();
        for handle in &handles {
            handle.close();
        }
        for handle in handles {
            handle.wait_for(SessionState::Closed).await;
        }

        tracing::info!("All sessions closed");
    }

    pub async fn len(&self) -> usize {
        self.inner.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Relay track statistics, once a publisher has created it
    pub async fn relay_stats(&self) -> Option<RelayStats> {
        match self.inner.relay.current().await {
            Some(track) => Some(track.stats().await),
            None => None,
        }
    }

    /// Token cancelled when the registry shuts down
    ///
    /// Every session's token is a child of it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    pub(crate) fn relay_hub(&self) -> &RelayHub {
        &self.inner.relay
    }

    pub(crate) fn ingest(&self) -> Option<Arc<IngestHub>> {
        self.inner.ingest.clone()
    }

    pub(crate) fn outbox(&self) -> &mpsc::Sender<SignalMessage> {
        &self.inner.outbox
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;
    use crate::container::{IvfHeader, IvfWriter};
    use crate::error::Error;
    use crate::ingest::IngestFrame;
    use crate::media::assembler::tests::vp8_packet;
    use crate::session::SessionCommand;
    use crate::transport::fake::{FakeFactory, ScriptedTrack, PANIC_SDP};
    use crate::transport::{ConnectivityState, SessionDescription, TransportEvent};

    fn registry(config: RegistryConfig) -> (SessionRegistry, Arc<FakeFactory>, mpsc::Receiver<SignalMessage>) {
        let factory = FakeFactory::new();
        let (outbox, rx) = mpsc::channel(16);
        let registry = SessionRegistry::new(factory.clone(), config, outbox);
        (registry, factory, rx)
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_create_or_join_is_idempotent() {
        let (registry, factory, _outbox) = registry(RegistryConfig::default());

        registry
            .create_or_join("abc", SessionAction::PublishAndRelay)
            .await
            .unwrap();
        registry
            .create_or_join("abc", SessionAction::PublishAndRelay)
            .await
            .unwrap();

        assert_eq!(registry.len().await, 1);
        assert_eq!(factory.created_count(), 1);

        let handle = registry.lookup("abc").await.unwrap();
        assert_eq!(handle.state(), SessionState::Negotiating);
        assert!(factory.transport("abc").unwrap().receive_slots.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_relay_subscriber_before_publisher() {
        let (registry, factory, _outbox) = registry(RegistryConfig::default());

        let result = registry
            .create_or_join("xyz", SessionAction::SubscribeFromRelay)
            .await;

        assert!(matches!(result, Err(Error::Registry(RegistryError::NoRelayTrack))));
        assert!(registry.is_empty().await);
        assert!(factory.transport("xyz").unwrap().is_closed());
    }

    #[tokio::test]
    async fn test_transport_failure_leaves_registry_unchanged() {
        let (registry, factory, _outbox) = registry(RegistryConfig::default());
        factory.fail.store(true, Ordering::SeqCst);

        let result = registry
            .create_or_join("abc", SessionAction::PublishAndRelay)
            .await;

        assert!(matches!(result, Err(Error::Transport(_))));
        assert!(registry.lookup("abc").await.is_none());
    }

    #[tokio::test]
    async fn test_missing_playback_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = RegistryConfig::default().playback_path(dir.path().join("missing.ivf"));
        let (registry, _factory, _outbox) = registry(config);

        let result = registry
            .create_or_join("abc", SessionAction::SubscribeFromFile)
            .await;

        assert!(matches!(result, Err(Error::Container(_))));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_file_subscriber_receives_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.ivf");
        let mut writer = IvfWriter::create(&path, IvfHeader::vp8(320, 240)).unwrap();
        for i in 0..3u8 {
            writer.write_frame(&[i; 8], i as u64).unwrap();
        }
        writer.close().unwrap();

        let (registry, factory, _outbox) = registry(RegistryConfig::default().playback_path(&path));
        registry
            .create_or_join("abc", SessionAction::SubscribeFromFile)
            .await
            .unwrap();

        let sink = factory.transport("abc").unwrap().video_sample_sink().unwrap();
        eventually(|| sink.len() == 3).await;
        assert_eq!(sink.payloads()[2], Bytes::from(vec![2u8; 8]));
    }

    #[tokio::test]
    async fn test_publisher_track_fans_out_to_subscriber() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, factory, _outbox) = registry(RegistryConfig::default().output_dir(dir.path()));

        registry
            .create_or_join("abc", SessionAction::PublishAndRelay)
            .await
            .unwrap();
        let (track, feed) = ScriptedTrack::vp8(1111);
        factory
            .transport("abc")
            .unwrap()
            .emit(TransportEvent::Track(Box::new(track)))
            .await;

        // The relay track appears once the session binds the video track
        tokio::time::timeout(Duration::from_secs(5), async {
            while registry.relay_stats().await.map(|s| s.publisher.is_some()) != Some(true) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        registry
            .create_or_join("xyz", SessionAction::SubscribeFromRelay)
            .await
            .unwrap();
        let sink = factory.transport("xyz").unwrap().relay_sink().unwrap();

        for seq in 10..13u16 {
            feed.send(vp8_packet(seq, 3000, true, &[0x10, 0x9d, 0x01, 0x2a]))
                .await
                .unwrap();
        }

        eventually(|| sink.sequence_numbers().len() == 3).await;
        assert_eq!(sink.sequence_numbers(), vec![10, 11, 12]);
        assert_eq!(registry.relay_stats().await.unwrap().subscriber_count, 1);
    }

    #[tokio::test]
    async fn test_inbound_track_ignored_for_subscriber() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.ivf");
        IvfWriter::create(&path, IvfHeader::vp8(2, 2)).unwrap().close().unwrap();

        let (registry, factory, _outbox) = registry(RegistryConfig::default().playback_path(&path));
        registry
            .create_or_join("abc", SessionAction::SubscribeFromFile)
            .await
            .unwrap();

        let (track, _feed) = ScriptedTrack::vp8(7);
        factory
            .transport("abc")
            .unwrap()
            .emit(TransportEvent::Track(Box::new(track)))
            .await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(registry.relay_stats().await.is_none());
        assert_eq!(factory.transport("abc").unwrap().keyframe_requests(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_removes_session() {
        let (registry, factory, _outbox) = registry(RegistryConfig::default());
        registry
            .create_or_join("abc", SessionAction::PublishAndRelay)
            .await
            .unwrap();
        let handle = registry.lookup("abc").await.unwrap();

        factory
            .transport("abc")
            .unwrap()
            .emit(TransportEvent::Connectivity(ConnectivityState::Disconnected))
            .await;

        assert_eq!(handle.wait_for(SessionState::Closed).await, SessionState::Closed);
        assert!(registry.lookup("abc").await.is_none());
        assert!(factory.transport("abc").unwrap().is_closed());
    }

    #[tokio::test]
    async fn test_crashed_session_is_removed() {
        let (registry, factory, _outbox) = registry(RegistryConfig::default());
        registry
            .create_or_join("abc", SessionAction::PublishAndRelay)
            .await
            .unwrap();
        let handle = registry.lookup("abc").await.unwrap();
        let transport = factory.transport("abc").unwrap();

        let offer = SessionDescription::offer(PANIC_SDP).encode().unwrap();
        handle.submit(SessionCommand::Offer(offer)).unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while registry.lookup("abc").await.is_some() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert!(handle.is_closed());
        assert!(transport.is_closed());

        // The peer can connect again
        registry
            .create_or_join("abc", SessionAction::PublishAndRelay)
            .await
            .unwrap();
        let fresh = registry.lookup("abc").await.unwrap();
        assert_ne!(fresh.session_id(), handle.session_id());
        assert_eq!(fresh.state(), SessionState::Negotiating);
    }

    #[tokio::test]
    async fn test_remove_checks_session_id() {
        let (registry, _factory, _outbox) = registry(RegistryConfig::default());
        registry
            .create_or_join("abc", SessionAction::PublishAndRelay)
            .await
            .unwrap();
        let handle = registry.lookup("abc").await.unwrap();

        assert!(!registry.remove("abc", handle.session_id() + 1).await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_close_all() {
        let (registry, factory, _outbox) = registry(RegistryConfig::default());
        for peer in ["a", "b", "c"] {
            registry
                .create_or_join(peer, SessionAction::PublishAndRelay)
                .await
                .unwrap();
        }

        registry.close_all().await;

        assert!(registry.is_empty().await);
        assert!(factory.transport("b").unwrap().is_closed());
        let result = registry.create_or_join("d", SessionAction::PublishAndRelay).await;
        assert!(matches!(result, Err(Error::Registry(RegistryError::ShuttingDown))));
    }

    #[tokio::test]
    async fn test_capture_end_cancels_shutdown_token() {
        let dir = tempfile::tempdir().unwrap();
        let config = RegistryConfig::default()
            .output_dir(dir.path())
            .exit_on_capture_end(true);
        let (registry, factory, _outbox) = registry(config);
        registry
            .create_or_join("abc", SessionAction::PublishAndRelay)
            .await
            .unwrap();

        factory
            .transport("abc")
            .unwrap()
            .emit(TransportEvent::Connectivity(ConnectivityState::Failed))
            .await;

        tokio::time::timeout(Duration::from_secs(5), registry.shutdown_token().cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_ingest_subscriber() {
        let hub = Arc::new(IngestHub::new());
        hub.register_publisher("cam", 1).await.unwrap();
        let factory = FakeFactory::new();
        let (outbox, _rx) = mpsc::channel(16);
        let registry =
            SessionRegistry::with_ingest(factory.clone(), RegistryConfig::default(), outbox, Arc::clone(&hub));

        registry
            .create_or_join("abc", SessionAction::SubscribeFromIngest("cam".into()))
            .await
            .unwrap();
        let sink = factory.transport("abc").unwrap().video_sample_sink().unwrap();

        for index in 0..2 {
            let frame = IngestFrame::new(index, Bytes::from_static(b"frame"), Duration::from_millis(33), index == 0);
            hub.publish("cam", frame).await;
        }
        eventually(|| sink.len() == 2).await;

        let result = registry
            .create_or_join("def", SessionAction::SubscribeFromIngest("nope".into()))
            .await;
        assert!(matches!(result, Err(Error::Ingest(_))));
    }

    #[tokio::test]
    async fn test_ingest_subscriber_without_hub() {
        let (registry, _factory, _outbox) = registry(RegistryConfig::default());

        let result = registry
            .create_or_join("abc", SessionAction::SubscribeFromIngest("cam".into()))
            .await;
        assert!(matches!(result, Err(Error::Registry(RegistryError::IngestUnavailable))));
    }
}
