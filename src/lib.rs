//! WebRTC session orchestration with media relay and IVF capture/playback
//!
//! A device joins a rendezvous service over a control channel, announces
//! its room and answers peers that ask to connect. Every peer gets one
//! session driven by its own task:
//!
//! ```text
//!   rendezvous ◄──► SignalingClient ──► SessionRegistry ──► Session task
//!                                              │                 │
//!                                              ▼                 ▼
//!                                          RelayHub ◄──────► PeerTransport
//!                                              │
//!                          publisher ──► RelayTrack ──► subscribers
//!                                   └──► IvfWriter (capture)
//! ```
//!
//! Sessions take one of four roles:
//!
//! - publish: receive the peer's video, fan it out through the relay and
//!   capture it to an IVF file
//! - subscribe from relay: forward the live publisher's packets
//! - subscribe from file: play an IVF file at its native frame rate
//! - subscribe from ingest: forward frames pushed into the [`ingest`] hub
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rtc_relay::{RegistryConfig, SessionRegistry, SignalingClient, SignalingConfig};
//! use rtc_relay::{WebRtcFactory, WebSocketChannel};
//!
//! # async fn run() -> rtc_relay::Result<()> {
//! let signaling = SignalingConfig::with_url("ws://127.0.0.1:10900/ws");
//! let config = RegistryConfig::default();
//!
//! let factory = Arc::new(WebRtcFactory::new(config.webrtc_config())?);
//! let (outbox, outbox_rx) = tokio::sync::mpsc::channel(signaling.outbox_capacity);
//! let registry = SessionRegistry::new(factory, config, outbox);
//!
//! let channel = Arc::new(WebSocketChannel::new(signaling.url.clone()));
//! let client = SignalingClient::new(signaling, channel, registry, outbox_rx);
//! client
//!     .run_until(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod container;
pub mod error;
pub mod ingest;
pub mod media;
pub mod registry;
pub mod relay;
pub mod session;
pub mod signaling;
pub mod stats;
pub mod transport;

pub use container::{IvfHeader, IvfReader, IvfWriter};
pub use error::{Error, Result};
pub use ingest::{IngestConfig, IngestHub, IngestServer};
pub use registry::{RegistryConfig, RegistryError, SessionRegistry};
pub use session::{SessionAction, SessionHandle, SessionState};
pub use signaling::{SignalingClient, SignalingConfig, WebSocketChannel};
pub use stats::SessionStats;
pub use transport::{WebRtcConfig, WebRtcFactory};
