//! Observable holder for a session's [`ConnectionState`].
//!
//! Writes go through the session manager only; every other component
//! and the presentation layer read through a `watch::Receiver`.

use tokio::sync::watch;

use crate::state::connection::{ConnectionPhase, ConnectionState, StatusCode};

/// Single-writer cell publishing each accepted state change.
#[derive(Debug)]
pub struct StateCell {
    tx: watch::Sender<ConnectionState>,
}

impl StateCell {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::new());
        Self { tx }
    }

    /// Snapshot of the current state.
    pub fn get(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.tx.borrow().phase()
    }

    /// Obtain a receiver that observes every published change.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// Apply [`ConnectionState::set_connection_state`] and notify
    /// observers if it took effect.
    pub fn set(&self, phase: ConnectionPhase, status: Option<StatusCode>) -> bool {
        self.tx
            .send_if_modified(|state| state.set_connection_state(phase, status))
    }

    pub fn set_tunnel_unstable(&self, unstable: bool) -> bool {
        self.tx
            .send_if_modified(|state| state.set_tunnel_unstable(unstable))
    }

    /// Return to `Idle`, clearing a sticky error. Only an explicit
    /// reconnect does this.
    pub fn reset(&self) {
        self.tx.send_replace(ConnectionState::new());
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
