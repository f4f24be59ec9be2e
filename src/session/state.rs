//! Session state machine
//!
//! Tracks one peer session from role setup to teardown.
//!
//! ```text
//! Created ──SetupComplete──► Negotiating ──TransportConnected──► Connected
//!    │                          │  ▲                               │
//!    │                          └──┘ AnswerSent                    │
//!    │                          │                                  │
//!    └──SetupFailed──► Failed ◄─┘ SetupFailed                      │
//!                               │                                  │
//!                               └──TransportLost──► Closed ◄───────┘
//! ```

use std::fmt;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Transport created, role setup not finished
    Created,
    /// Role set up, offer/answer exchange in progress
    Negotiating,
    /// Transport reports connectivity
    Connected,
    /// Setup failed; terminal
    Failed,
    /// Transport lost or session shut down; terminal
    Closed,
}

/// Input to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Role-specific setup finished
    SetupComplete,
    /// Remote description applied and local answer sent
    AnswerSent,
    /// Transport reports connected
    TransportConnected,
    /// Transport reports disconnected, failed or closed
    TransportLost,
    /// Setup error before negotiation could start
    SetupFailed,
    /// Local teardown (registry shutdown)
    Shutdown,
}

impl SessionState {
    /// Next state for `transition`, or `None` if it does not apply here
    pub fn apply(self, transition: Transition) -> Option<SessionState> {
        use SessionState::*;
        use Transition::*;

        match (self, transition) {
            (Created, SetupComplete) => Some(Negotiating),
            (Negotiating, AnswerSent) => Some(Negotiating),
            // Renegotiation on a live session keeps it live
            (Connected, AnswerSent) => Some(Connected),
            (Negotiating, TransportConnected) => Some(Connected),
            (Connected, TransportConnected) => Some(Connected),
            (Negotiating | Connected, TransportLost) => Some(Closed),
            (Created | Negotiating, SetupFailed) => Some(Failed),
            (Created | Negotiating | Connected, Shutdown) => Some(Closed),
            _ => None,
        }
    }

    /// `Failed` and `Closed` are terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Failed | SessionState::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Created => "created",
            SessionState::Negotiating => "negotiating",
            SessionState::Connected => "connected",
            SessionState::Failed => "failed",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}
