//! Session trace
//!
//! Records the coordination decisions of one mounted player:
//! - ad engine lifecycle events as received
//! - gate flips and phase transitions
//! - play/pause commands issued to the content surface
//! - fail-open recoveries

use crate::gate::GateState;
use crate::types::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use tracing::trace;
use uuid::Uuid;

/// Trace event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    /// Ad engine event received
    AdEvent {
        kind: AdEventKind,
        position: AdPosition,
    },

    /// Gate flipped
    Gate {
        state: GateState,
    },

    /// Orchestrator phase changed
    Phase {
        from: PlaybackPhase,
        to: PlaybackPhase,
    },

    /// Play command issued to the content surface
    ContentPlay {
        reason: String,
    },

    /// Pause command issued to the content surface
    ContentPause {
        reason: String,
    },

    /// A play attempt was cancelled at the source
    PlayCancelled {
        reason: String,
    },

    /// Ad engine initialized
    EngineInitialized,

    /// Ad sequence request settled
    SequenceLoaded {
        fallback: bool,
    },

    /// An ad path failure was recovered toward content
    FailOpen {
        code: String,
        message: String,
    },
}

/// Trace event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceRecord {
    /// Unique event ID
    pub id: Uuid,
    /// Mount session ID
    pub session_id: SessionId,
    /// Timestamp
    pub timestamp: DateTime<Utc>,
    /// Sequence number
    pub sequence: u64,
    /// The event
    #[serde(flatten)]
    pub event: TraceEvent,
}

/// Append-only trace of one mount
#[derive(Debug)]
pub struct SessionTrace {
    session_id: SessionId,
    records: Mutex<Vec<TraceRecord>>,
}

impl SessionTrace {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn record(&self, event: TraceEvent) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let sequence = records.len() as u64 + 1;
        trace!(sequence, event = ?event, "Trace event");
        records.push(TraceRecord {
            id: Uuid::new_v4(),
            session_id: self.session_id,
            timestamp: Utc::now(),
            sequence,
            event,
        });
    }

    /// Copy of every record so far
    pub fn records(&self) -> Vec<TraceRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Events only, in order
    pub fn events(&self) -> Vec<TraceEvent> {
        self.records().into_iter().map(|r| r.event).collect()
    }

    /// Number of content play commands issued
    pub fn content_plays(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, TraceEvent::ContentPlay { .. }))
            .count()
    }
}
