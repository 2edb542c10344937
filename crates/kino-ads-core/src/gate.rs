//! Playback gate
//!
//! Single source of truth for "an ad occupies the screen". Every path that can
//! start content playback reads the gate immediately before touching the surface.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

/// Gate state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    ContentAllowed,
    AdOccupying,
}

impl std::fmt::Display for GateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateState::ContentAllowed => write!(f, "content_allowed"),
            GateState::AdOccupying => write!(f, "ad_occupying"),
        }
    }
}

/// In-memory gate with change notification
#[derive(Debug)]
pub struct PlaybackGate {
    state_tx: watch::Sender<GateState>,
}

impl PlaybackGate {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(GateState::ContentAllowed);
        Self { state_tx }
    }

    pub fn mark_ad_occupying(&self) {
        self.set(GateState::AdOccupying);
    }

    pub fn mark_content_allowed(&self) {
        self.set(GateState::ContentAllowed);
    }

    pub fn is_ad_occupying(&self) -> bool {
        *self.state_tx.borrow() == GateState::AdOccupying
    }

    pub fn state(&self) -> GateState {
        *self.state_tx.borrow()
    }

    /// Subscribe to gate changes
    pub fn subscribe(&self) -> watch::Receiver<GateState> {
        self.state_tx.subscribe()
    }

    fn set(&self, state: GateState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
        if changed {
            debug!(gate = %state, "Playback gate changed");
        }
    }
}

impl Default for PlaybackGate {
    fn default() -> Self {
        Self::new()
    }
}
