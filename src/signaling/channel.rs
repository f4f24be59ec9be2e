//! Control channel seam
//!
//! A control channel connection is a pair of queues. The inbound queue
//! closing, or a `Disconnected` event, means the connection is gone.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::message::SignalMessage;
use crate::error::Result;

/// Event received from the rendezvous service
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Connection dropped
    Disconnected,
    /// Our room exists; stop announcing it
    RoomCreated(String),
    /// A peer asks for a session; the action travels in `msg`
    AskToConnect(SignalMessage),
    /// Offer or candidate from a peer
    MessageToDevice(SignalMessage),
    /// Diagnostic lines from the service
    Log(Vec<String>),
}

/// Message sent to the rendezvous service
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Announce (or re-announce) our room
    CreateOrJoin(String),
    /// Deliver a message to a peer
    MessageToBrowser(SignalMessage),
}

/// Live connection to the rendezvous service
pub struct ControlConnection {
    pub events: mpsc::Receiver<ChannelEvent>,
    pub outbound: mpsc::Sender<Outbound>,
}

/// Opens connections to the rendezvous service
#[async_trait]
pub trait ControlChannel: Send + Sync {
    async fn connect(&self) -> Result<ControlConnection>;
}
