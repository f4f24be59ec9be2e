//! Per-session task
//!
//! A session owns its transport and every task it spawns. Its own task
//! consumes signaling commands and transport events one at a time, so the
//! state machine never runs re-entrantly.
//!
//! Teardown order: cancel child tasks, wait for them (forwarders close
//! their capture files), close the transport, leave the registry, publish
//! the terminal state.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::action::SessionAction;
use super::handle::SessionCommand;
use super::state::{SessionState, Transition};
use crate::container::IvfReader;
use crate::error::Result;
use crate::media::MediaKind;
use crate::registry::{RegistryError, SessionRegistry};
use crate::relay::{play_file, pump_ingest, pump_relay, run_keepalive, CaptureTarget, Forwarder, KeepaliveSet};
use crate::signaling::SignalMessage;
use crate::stats::SessionCounters;
use crate::transport::{
    CodecSpec, ConnectivityState, IceCandidate, InboundTrack, PeerTransport, SessionDescription,
    TransportEvent,
};

/// What woke the session loop
enum Step {
    Cancelled,
    Command(Option<SessionCommand>),
    Event(Option<TransportEvent>),
}

/// State owned by one session task
pub(crate) struct Session {
    peer_id: String,
    session_id: u64,
    action: SessionAction,
    transport: Arc<dyn PeerTransport>,
    registry: SessionRegistry,
    state: SessionState,
    state_tx: watch::Sender<SessionState>,
    counters: Arc<SessionCounters>,
    cancel: CancellationToken,
    keepalive: KeepaliveSet,
    tasks: Vec<JoinHandle<()>>,
    video_bound: bool,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        peer_id: &str,
        session_id: u64,
        action: SessionAction,
        transport: Arc<dyn PeerTransport>,
        registry: SessionRegistry,
        state_tx: watch::Sender<SessionState>,
        counters: Arc<SessionCounters>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            peer_id: peer_id.to_string(),
            session_id,
            action,
            transport,
            registry,
            state: SessionState::Created,
            state_tx,
            counters,
            cancel,
            keepalive: KeepaliveSet::new(),
            tasks: Vec::new(),
            video_bound: false,
        }
    }

    /// Role-specific setup; moves the session to `Negotiating`
    pub(crate) async fn setup(&mut self) -> Result<()> {
        match self.action.clone() {
            SessionAction::PublishAndRelay => self.setup_publisher().await?,
            SessionAction::SubscribeFromRelay => self.setup_relay_subscriber().await?,
            SessionAction::SubscribeFromFile => self.setup_file_playback().await?,
            SessionAction::SubscribeFromIngest(path) => self.setup_ingest_subscriber(&path).await?,
        }

        self.transition(Transition::SetupComplete);
        Ok(())
    }

    async fn setup_publisher(&mut self) -> Result<()> {
        self.transport.add_receive_slots().await?;

        let transport = Arc::clone(&self.transport);
        let tracks = self.keepalive.clone();
        let interval = self.registry.config().keepalive_interval;
        let cancel = self.cancel.child_token();
        self.tasks.push(tokio::spawn(async move {
            run_keepalive(transport, tracks, interval, cancel).await;
        }));
        Ok(())
    }

    async fn setup_relay_subscriber(&mut self) -> Result<()> {
        let relay = self
            .registry
            .relay_hub()
            .current()
            .await
            .ok_or(RegistryError::NoRelayTrack)?;

        let sink = self.transport.add_relay_track(relay.codec()).await?;
        let subscription = relay.subscribe();

        let counters = Arc::clone(&self.counters);
        let cancel = self.cancel.child_token();
        self.tasks.push(tokio::spawn(async move {
            pump_relay(subscription, sink, counters, cancel).await;
        }));
        Ok(())
    }

    async fn setup_file_playback(&mut self) -> Result<()> {
        let path = self.registry.config().playback().to_path_buf();
        let (reader, header) = IvfReader::open(&path)?;
        tracing::info!(
            peer = %self.peer_id,
            path = %path.display(),
            width = header.width,
            height = header.height,
            frames = header.frame_count,
            "Playback file opened"
        );

        let sink = self.transport.add_sample_track(&CodecSpec::vp8()).await?;

        let peer_id = self.peer_id.clone();
        let counters = Arc::clone(&self.counters);
        let cancel = self.cancel.child_token();
        self.tasks.push(tokio::spawn(async move {
            if let Err(e) = play_file(reader, sink, counters, cancel).await {
                tracing::warn!(peer = %peer_id, error = %e, "File playback stopped");
            }
        }));
        Ok(())
    }

    async fn setup_ingest_subscriber(&mut self, path: &str) -> Result<()> {
        let hub = self.registry.ingest().ok_or(RegistryError::IngestUnavailable)?;
        let cursor = hub.latest(path).await?;
        let sink = self.transport.add_sample_track(&CodecSpec::vp8()).await?;

        let counters = Arc::clone(&self.counters);
        let cancel = self.cancel.child_token();
        self.tasks.push(tokio::spawn(async move {
            pump_ingest(cursor, sink, counters, cancel).await;
        }));
        Ok(())
    }

    /// Undo a failed setup; the session never enters the registry
    pub(crate) async fn abort_setup(mut self) {
        self.transition(Transition::SetupFailed);
        self.release().await;
        self.publish(self.state);
    }

    /// Drive the session until it becomes terminal
    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut events: mpsc::Receiver<TransportEvent>,
    ) {
        let cancel = self.cancel.clone();
        let mut commands_open = true;

        loop {
            let step = tokio::select! {
                _ = cancel.cancelled() => Step::Cancelled,
                command = commands.recv(), if commands_open => Step::Command(command),
                event = events.recv() => Step::Event(event),
            };

            match step {
                Step::Cancelled => {
                    self.transition(Transition::Shutdown);
                }
                Step::Command(Some(SessionCommand::Offer(encoded))) => self.handle_offer(&encoded).await,
                Step::Command(Some(SessionCommand::Candidate(candidate))) => {
                    self.handle_candidate(candidate).await
                }
                Step::Command(None) => commands_open = false,
                Step::Event(Some(TransportEvent::Connectivity(state))) => self.handle_connectivity(state),
                Step::Event(Some(TransportEvent::Track(track))) => self.handle_track(track).await,
                Step::Event(None) => {
                    tracing::debug!(peer = %self.peer_id, "Transport event queue closed");
                    self.transition(Transition::TransportLost);
                }
            }

            if self.state.is_terminal() {
                break;
            }
        }

        self.teardown().await;
    }

    async fn handle_offer(&mut self, encoded: &str) {
        match self.negotiate(encoded).await {
            Ok(answer) => {
                self.send(SignalMessage::answer(&self.peer_id, answer)).await;
                self.transition(Transition::AnswerSent);
                tracing::debug!(peer = %self.peer_id, "Answer sent");
            }
            Err(e) => {
                tracing::warn!(peer = %self.peer_id, error = %e, "Offer rejected");
                self.send(SignalMessage::error(&self.peer_id, e.to_string())).await;
            }
        }
    }

    /// Apply the offer and produce the encoded local answer
    async fn negotiate(&self, encoded: &str) -> Result<String> {
        let offer = SessionDescription::decode(encoded)?;
        self.transport.set_remote_description(offer).await?;

        let answer = self.transport.create_answer().await?;
        self.transport.set_local_description(answer.clone()).await?;

        // The applied description carries the gathered candidates
        let local = self.transport.local_description().await.unwrap_or(answer);
        local.encode()
    }

    async fn handle_candidate(&mut self, candidate: IceCandidate) {
        if let Err(e) = self.transport.add_ice_candidate(candidate).await {
            tracing::warn!(peer = %self.peer_id, error = %e, "Candidate rejected");
            self.send(SignalMessage::error(&self.peer_id, e.to_string())).await;
        }
    }

    fn handle_connectivity(&mut self, state: ConnectivityState) {
        tracing::debug!(peer = %self.peer_id, state = ?state, "Connectivity changed");

        match state {
            ConnectivityState::Connected => self.transition(Transition::TransportConnected),
            s if s.is_terminal() => self.transition(Transition::TransportLost),
            _ => {}
        }
    }

    async fn handle_track(&mut self, track: Box<dyn InboundTrack>) {
        let ssrc = track.ssrc();
        let kind = track.kind();
        let codec = track.codec();

        if !self.action.is_publisher() {
            tracing::info!(
                peer = %self.peer_id,
                ssrc = ssrc,
                action = %self.action,
                "Ignoring inbound track on non-publishing session"
            );
            return;
        }

        let mut forwarder = Forwarder::new(
            self.peer_id.clone(),
            track,
            self.keepalive.clone(),
            Arc::clone(&self.counters),
        );

        if kind == MediaKind::Video && codec.is_vp8() && !self.video_bound {
            let relay = self.registry.relay_hub().get_or_create(&codec).await;
            let target = CaptureTarget::new(self.registry.config().capture_path(&self.peer_id));
            tracing::info!(
                peer = %self.peer_id,
                ssrc = ssrc,
                path = %target.path.display(),
                "Got VP8 track, capturing and relaying"
            );
            forwarder = forwarder.relay_to(relay).capture_to(target);
            self.video_bound = true;
        }

        let peer_id = self.peer_id.clone();
        let cancel = self.cancel.child_token();
        self.tasks.push(tokio::spawn(async move {
            let summary = forwarder.run(cancel).await;
            tracing::info!(
                peer = %peer_id,
                ssrc = ssrc,
                units = summary.units,
                frames_written = summary.frames_written,
                "Inbound track finished"
            );
        }));
    }

    async fn send(&self, message: SignalMessage) {
        if self.registry.outbox().send(message).await.is_err() {
            tracing::debug!(peer = %self.peer_id, "Outbox closed, message dropped");
        }
    }

    fn transition(&mut self, transition: Transition) {
        let Some(next) = self.state.apply(transition) else {
            tracing::debug!(
                peer = %self.peer_id,
                state = %self.state,
                transition = ?transition,
                "Transition ignored"
            );
            return;
        };

        if next != self.state {
            tracing::info!(peer = %self.peer_id, from = %self.state, to = %next, "Session state changed");
        }
        self.state = next;

        // Terminal states are published once teardown has finished
        if !next.is_terminal() {
            self.publish(next);
        }
    }

    fn publish(&self, state: SessionState) {
        self.state_tx.send_replace(state);
    }

    /// Stop child tasks and release the transport
    async fn release(&mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::warn!(peer = %self.peer_id, error = %e, "Session task panicked");
            }
        }

        if let Err(e) = self.transport.close().await {
            tracing::warn!(peer = %self.peer_id, error = %e, "Transport close failed");
        }
    }

    async fn teardown(mut self) {
        self.release().await;
        self.registry.remove(&self.peer_id, self.session_id).await;
        self.publish(self.state);

        let stats = self.counters.snapshot();
        tracing::info!(
            peer = %self.peer_id,
            session_id = self.session_id,
            state = %self.state,
            units_received = stats.units_received,
            units_sent = stats.units_sent,
            frames_written = stats.frames_written,
            "Session closed"
        );

        if self.action.is_publisher() && self.registry.config().exit_on_capture_end {
            tracing::info!(peer = %self.peer_id, "Capture ended, shutting down");
            self.registry.shutdown_token().cancel();
        }
    }
}
