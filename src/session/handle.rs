//! Cloneable handle to a running session

use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::action::SessionAction;
use super::state::SessionState;
use crate::error::Result;
use crate::registry::RegistryError;
use crate::stats::{SessionCounters, SessionStats};
use crate::transport::IceCandidate;

/// Signaling input routed to a session, processed in arrival order
#[derive(Debug, Clone)]
pub enum SessionCommand {
    /// Remote offer, still base64-encoded
    Offer(String),
    /// Trickled remote candidate
    Candidate(IceCandidate),
}

/// Handle held by the registry and handed out by `lookup`
#[derive(Clone)]
pub struct SessionHandle {
    peer_id: Arc<str>,
    session_id: u64,
    action: SessionAction,
    commands: mpsc::Sender<SessionCommand>,
    state: watch::Receiver<SessionState>,
    counters: Arc<SessionCounters>,
    cancel: CancellationToken,
}

impl SessionHandle {
    pub(crate) fn new(
        peer_id: &str,
        session_id: u64,
        action: SessionAction,
        commands: mpsc::Sender<SessionCommand>,
        state: watch::Receiver<SessionState>,
        counters: Arc<SessionCounters>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            peer_id: Arc::from(peer_id),
            session_id,
            action,
            commands,
            state,
            counters,
            cancel,
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn action(&self) -> &SessionAction {
        &self.action
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Queue a command without waiting
    ///
    /// Fails with `SessionBusy` when the command queue is full and with
    /// `SessionClosed` once the session task has ended.
    pub fn submit(&self, command: SessionCommand) -> Result<()> {
        self.commands.try_send(command).map_err(|e| {
            let peer = self.peer_id.to_string();
            match e {
                TrySendError::Full(_) => RegistryError::SessionBusy(peer).into(),
                TrySendError::Closed(_) => RegistryError::SessionClosed(peer).into(),
            }
        })
    }

    /// Wait until the session reaches `target`
    ///
    /// Returns the state actually reached if the session ends without passing
    /// through `target`.
    pub async fn wait_for(&self, target: SessionState) -> SessionState {
        let mut state = self.state.clone();
        let result = state
            .wait_for(|s| *s == target || s.is_terminal())
            .await
            .map(|s| *s);
        match result {
            Ok(reached) => reached,
            // Sender dropped: the last published value is final
            Err(_) => *state.borrow(),
        }
    }

    pub fn stats(&self) -> SessionStats {
        self.counters.snapshot()
    }

    /// Ask the session to tear down
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Whether the session has ended or is ending
    ///
    /// A session task that died without tearing down drops its command
    /// receiver, which counts as closed too.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.commands.is_closed() || self.state().is_terminal()
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("peer_id", &self.peer_id)
            .field("session_id", &self.session_id)
            .field("action", &self.action)
            .field("state", &self.state())
            .finish()
    }
}
