//! Signaling client
//!
//! Owns the control channel lifecycle: connect with retry, announce the room
//! until acknowledged, route peer messages to the registry, and forward
//! session replies back out.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use super::channel::{ChannelEvent, ControlChannel, ControlConnection, Outbound};
use super::config::SignalingConfig;
use super::message::{MessageType, SignalMessage};
use crate::error::Result;
use crate::registry::SessionRegistry;
use crate::session::{SessionAction, SessionCommand};

/// What woke the connection loop
enum Step {
    Event(Option<ChannelEvent>),
    Reply(Option<SignalMessage>),
    AnnounceRoom,
}

/// Client for the rendezvous service
pub struct SignalingClient {
    config: SignalingConfig,
    channel: Arc<dyn ControlChannel>,
    registry: SessionRegistry,
    outbox: Mutex<mpsc::Receiver<SignalMessage>>,
}

impl SignalingClient {
    /// Create a client
    ///
    /// `outbox` is the receiving half of the queue the registry's sessions
    /// send their replies to.
    pub fn new(
        config: SignalingConfig,
        channel: Arc<dyn ControlChannel>,
        registry: SessionRegistry,
        outbox: mpsc::Receiver<SignalMessage>,
    ) -> Self {
        Self {
            config,
            channel,
            registry,
            outbox: Mutex::new(outbox),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Run until `shutdown` resolves, then close every session
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
            }
            _ = self.run() => {}
        }

        self.registry.close_all().await;
        Ok(())
    }

    /// Connect, serve, reconnect; never returns
    async fn run(&self) {
        let mut outbox = self.outbox.lock().await;

        loop {
            match self.channel.connect().await {
                Ok(connection) => {
                    tracing::info!(url = %self.config.url, "Control channel connected");
                    self.serve(connection, &mut outbox).await;
                    tracing::warn!("Control channel lost, reconnecting");
                }
                Err(e) => {
                    tracing::warn!(
                        url = %self.config.url,
                        error = %e,
                        retry_in_ms = self.config.reconnect_delay.as_millis() as u64,
                        "Control channel connect failed"
                    );
                    tokio::time::sleep(self.config.reconnect_delay).await;
                }
            }
        }
    }

    /// Serve one connection until it drops
    async fn serve(&self, connection: ControlConnection, outbox: &mut mpsc::Receiver<SignalMessage>) {
        let ControlConnection {
            mut events,
            outbound,
        } = connection;

        if !self.announce_room(&outbound).await {
            return;
        }
        let mut room_retry = Some(self.room_retry_timer());
        let mut outbox_open = true;

        loop {
            let step = tokio::select! {
                event = events.recv() => Step::Event(event),
                reply = outbox.recv(), if outbox_open => Step::Reply(reply),
                _ = next_tick(&mut room_retry) => Step::AnnounceRoom,
            };

            match step {
                Step::Event(None) | Step::Event(Some(ChannelEvent::Disconnected)) => return,
                Step::Event(Some(ChannelEvent::RoomCreated(room))) => {
                    tracing::info!(room = %room, "Room created");
                    room_retry = None;
                }
                Step::Event(Some(ChannelEvent::AskToConnect(message))) => {
                    if !self.handle_ask(message, &outbound).await {
                        return;
                    }
                }
                Step::Event(Some(ChannelEvent::MessageToDevice(message))) => {
                    if !self.handle_peer_message(message, &outbound).await {
                        return;
                    }
                }
                Step::Event(Some(ChannelEvent::Log(lines))) => {
                    tracing::trace!(lines = ?lines, "Log from rendezvous service");
                }
                Step::Reply(Some(message)) => {
                    if !self.send(&outbound, message).await {
                        return;
                    }
                }
                Step::Reply(None) => outbox_open = false,
                Step::AnnounceRoom => {
                    tracing::debug!(room = %self.config.device_id, "Room not acknowledged, announcing again");
                    if !self.announce_room(&outbound).await {
                        return;
                    }
                }
            }
        }
    }

    fn room_retry_timer(&self) -> Interval {
        let period = self.config.room_retry_interval;
        let mut timer = tokio::time::interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        timer
    }

    async fn announce_room(&self, outbound: &mpsc::Sender<Outbound>) -> bool {
        outbound
            .send(Outbound::CreateOrJoin(self.config.device_id.clone()))
            .await
            .is_ok()
    }

    /// Handle a connect request; returns `false` if the channel is gone
    async fn handle_ask(&self, message: SignalMessage, outbound: &mpsc::Sender<Outbound>) -> bool {
        let peer_id = message.from.clone();
        if peer_id.is_empty() {
            tracing::warn!("Connect request without a peer id, ignoring");
            return true;
        }

        let result = match message.action().parse::<SessionAction>() {
            Ok(action) => self.registry.create_or_join(&peer_id, action).await,
            Err(e) => Err(e.into()),
        };

        let mut reply = match result {
            Ok(()) => SignalMessage::ready(&peer_id),
            Err(e) => {
                tracing::warn!(peer = %peer_id, action = %message.action(), error = %e, "Connect request failed");
                SignalMessage::error(&peer_id, e.to_string())
            }
        };
        reply.from = message.to;

        self.send(outbound, reply).await
    }

    /// Route an offer or candidate to its session
    ///
    /// Never waits on the session: a full or closed command queue is
    /// reported to the peer instead. Returns `false` if the channel is gone.
    async fn handle_peer_message(&self, message: SignalMessage, outbound: &mpsc::Sender<Outbound>) -> bool {
        let Some(session) = self.registry.lookup(&message.from).await else {
            tracing::debug!(peer = %message.from, kind = ?message.message_type, "No session for peer, dropping message");
            return true;
        };

        let command = match message.message_type {
            MessageType::Offer => SessionCommand::Offer(message.sdp.clone().unwrap_or_default()),
            MessageType::Candidate => SessionCommand::Candidate(message.ice_candidate()),
            other => {
                tracing::debug!(peer = %message.from, kind = ?other, "Ignoring peer message");
                return true;
            }
        };

        match session.submit(command) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(peer = %message.from, error = %e, "Peer message not delivered");
                let mut reply = SignalMessage::error(&message.from, e.to_string());
                reply.from = message.to;
                self.send(outbound, reply).await
            }
        }
    }

    /// Deliver a message to a peer; returns `false` if the channel is gone
    async fn send(&self, outbound: &mpsc::Sender<Outbound>, mut message: SignalMessage) -> bool {
        if message.from.is_empty() {
            message.from = self.config.device_id.clone();
        }
        tracing::debug!(to = %message.to, kind = ?message.message_type, "Sending message to peer");
        outbound.send(Outbound::MessageToBrowser(message)).await.is_ok()
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}
