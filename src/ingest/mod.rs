//! Ingest adapter for externally pushed live streams
//!
//! An external publisher pushes an IVF stream over TCP; the hub fans it out
//! to any number of cursors keyed by stream path.
//!
//! ```text
//!   publisher ──TCP──► IngestServer ──publish()──► IngestHub
//!                                                    │
//!                          ┌─────────────────────────┼──────────────┐
//!                          ▼                         ▼              ▼
//!                    IngestCursor              IngestCursor      ...
//!                    (session sample track)
//! ```
//!
//! One publisher per path. A new cursor starts at the live tail, so a late
//! joiner never replays history unless GOP catch-up is enabled.

pub mod config;
pub mod error;
pub mod frame;
pub mod gop;
pub mod hub;
pub mod server;

pub use config::IngestConfig;
pub use error::IngestError;
pub use frame::IngestFrame;
pub use hub::{IngestCursor, IngestHub, IngestStats};
pub use server::IngestServer;
