//! Media relay between sessions
//!
//! ```text
//!   publisher inbound track ──► Forwarder ──┬──► RelayTrack ──► pump_relay ──► subscriber
//!                                           │                  └► pump_relay ──► subscriber
//!                                           └──► IvfWriter (capture file)
//!
//!   IvfReader ──► play_file ──► subscriber sample track
//!   IngestCursor ──► pump_ingest ──► subscriber sample track
//! ```
//!
//! While a session forwards inbound video, the keepalive task asks the remote
//! sender for a fresh keyframe on every registered track at a fixed interval.

pub mod forwarder;
pub mod keepalive;
pub mod playback;
pub mod track;

pub use forwarder::{CaptureTarget, ForwardSummary, Forwarder};
pub use keepalive::{run_keepalive, KeepaliveSet};
pub use playback::{play_file, pump_ingest, pump_relay};
pub use track::{RelayHub, RelayStats, RelaySubscription, RelayTrack};
