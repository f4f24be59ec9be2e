//! Session registry
//!
//! The registry owns the directory of live sessions and the state they share:
//! the relay track slot, the optional ingest hub and the signaling outbox.
//!
//! # Architecture
//!
//! ```text
//!                       SessionRegistry (Clone)
//!                 ┌──────────────────────────────┐
//!                 │ sessions: Mutex<HashMap<     │
//!                 │   peer id, SessionHandle>>   │
//!                 │ relay: RelayHub              │
//!                 │ outbox: mpsc::Sender         │
//!                 └──────────────┬───────────────┘
//!                                │ create_or_join()
//!          ┌─────────────────────┼─────────────────────┐
//!          ▼                     ▼                     ▼
//!    [Session task]        [Session task]        [Session task]
//!    commands + events     commands + events     commands + events
//!          │                     │                     │
//!          └──── remove(peer, session id) on teardown ─┘
//! ```
//!
//! Sessions remove themselves; nothing outside the crate removes entries.

pub mod config;
pub mod error;
pub mod store;

pub use config::RegistryConfig;
pub use error::RegistryError;
pub use store::SessionRegistry;
