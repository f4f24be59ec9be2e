//! Session statistics

pub mod metrics;

pub use metrics::{SessionCounters, SessionStats};
