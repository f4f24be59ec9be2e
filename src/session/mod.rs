//! Peer sessions
//!
//! One session per remote peer: its negotiation state machine, its transport
//! handle and the media tasks of its role.

pub mod action;
pub mod handle;
pub mod state;
pub(crate) mod task;

pub use action::SessionAction;
pub use handle::{SessionCommand, SessionHandle};
pub use state::{SessionState, Transition};
