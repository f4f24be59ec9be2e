//! Signaling with the rendezvous service
//!
//! ```text
//!   rendezvous ──ChannelEvent──► SignalingClient ──create_or_join()──► SessionRegistry
//!       ▲                             │                                      │
//!       │                             └──SessionCommand──► session task      │
//!       │                                                      │             │
//!       └──────────────Outbound◄──── outbox ◄──────────────────┴─────────────┘
//! ```

pub mod channel;
pub mod client;
pub mod config;
pub mod message;
pub mod websocket;

pub use channel::{ChannelEvent, ControlChannel, ControlConnection, Outbound};
pub use client::SignalingClient;
pub use config::SignalingConfig;
pub use message::{MessageType, SignalMessage};
pub use websocket::WebSocketChannel;
