//! Kino Ads Core - Ad Break Coordination for Kino
//!
//! This crate reconciles two independently driven timelines, the content video
//! and an external ad SDK, into one viewer experience:
//! - Consent resolution (IAB TCF v2) before any ad request
//! - A playback gate that keeps content paused while an ad holds the screen
//! - Ad session lifecycle: one-time engine setup, sequence request, event table
//! - First user gesture tracking for the autoplay policy
//! - The content play state machine, wired per mounted player
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         PlayerMount                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  StreamLoader ──ready──┐          VideoSurface ──play/playing─┐ │
//! │                        ▼                                      ▼ │
//! │                 ┌──────────────────────────────────────────┐    │
//! │                 │          PlaybackOrchestrator            │    │
//! │                 └──────┬─────────────────────────▲─────────┘    │
//! │                        │ init / load       gate  │              │
//! │                 ┌──────▼─────────────────────────┴─────────┐    │
//! │  AdEngine ─────▶│          AdSessionCoordinator            │    │
//! │   events        │   PlaybackGate   initialized   loaded    │    │
//! │                 └──────┬───────────────────────────────────┘    │
//! │                        │                                        │
//! │  ┌──────────────┐  ┌───▼──────────┐  ┌──────────────────┐       │
//! │  │ Interaction  │  │   Consent    │  │  Session Trace   │       │
//! │  │   Tracker    │  │   Resolver   │  │                  │       │
//! │  └──────────────┘  └──────────────┘  └──────────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod consent;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod events;
pub mod gate;
pub mod interaction;
pub mod mount;
pub mod orchestrator;
pub mod surface;
pub mod trace;
pub mod types;

#[cfg(feature = "sim")]
pub mod sim;

pub use config::{AdSessionConfig, ConsentSettings, DevelopmentMode, DevelopmentOptions, MountProps};
pub use consent::{ConsentProvider, ConsentResolver, ConsentState, TcData, TcResponse};
pub use coordinator::AdSessionCoordinator;
pub use engine::{AdEngine, AppState};
pub use error::{Error, Result};
pub use events::{EventRegistry, Subscription};
pub use gate::{GateState, PlaybackGate};
pub use interaction::{InteractionSource, InteractionTracker};
pub use mount::{Collaborators, PlayerMount};
pub use orchestrator::{PlayVerdict, PlaybackOrchestrator};
pub use surface::{PlayFuture, StreamLoader, VideoSurface};
pub use trace::{SessionTrace, TraceEvent, TraceRecord};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the library version
pub fn init() {
    tracing::info!(version = VERSION, "Kino Ads Core initialized");
}
