//! Core types for Kino Ads

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// Unique identifier for a mounted player session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of the ad currently reported by the ad engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdPosition {
    Preroll,
    Midroll,
    Postroll,
    #[default]
    None,
}

impl AdPosition {
    pub fn is_postroll(&self) -> bool {
        matches!(self, AdPosition::Postroll)
    }

    pub fn is_preroll(&self) -> bool {
        matches!(self, AdPosition::Preroll)
    }
}

impl std::fmt::Display for AdPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdPosition::Preroll => write!(f, "preroll"),
            AdPosition::Midroll => write!(f, "midroll"),
            AdPosition::Postroll => write!(f, "postroll"),
            AdPosition::None => write!(f, "none"),
        }
    }
}

/// Ad engine lifecycle event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdEventKind {
    ContentPauseRequested,
    ContentResumeRequested,
    AdBreakStart,
    AdBreakEnd,
    AdStart,
    AdEnd,
    AdError,
    AdLoad,
    AdPlay,
    AdPause,
}

impl AdEventKind {
    /// Every kind the coordinator subscribes to
    pub const ALL: [AdEventKind; 10] = [
        AdEventKind::ContentPauseRequested,
        AdEventKind::ContentResumeRequested,
        AdEventKind::AdLoad,
        AdEventKind::AdStart,
        AdEventKind::AdEnd,
        AdEventKind::AdBreakEnd,
        AdEventKind::AdBreakStart,
        AdEventKind::AdPlay,
        AdEventKind::AdPause,
        AdEventKind::AdError,
    ];
}

/// Ad engine lifecycle event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AdEvent {
    ContentPauseRequested,
    ContentResumeRequested,
    AdBreakStart,
    AdBreakEnd,
    AdStart,
    AdEnd,
    AdError {
        code: Option<i32>,
        message: Option<String>,
    },
    AdLoad,
    AdPlay,
    AdPause,
}

impl AdEvent {
    pub fn kind(&self) -> AdEventKind {
        match self {
            AdEvent::ContentPauseRequested => AdEventKind::ContentPauseRequested,
            AdEvent::ContentResumeRequested => AdEventKind::ContentResumeRequested,
            AdEvent::AdBreakStart => AdEventKind::AdBreakStart,
            AdEvent::AdBreakEnd => AdEventKind::AdBreakEnd,
            AdEvent::AdStart => AdEventKind::AdStart,
            AdEvent::AdEnd => AdEventKind::AdEnd,
            AdEvent::AdError { .. } => AdEventKind::AdError,
            AdEvent::AdLoad => AdEventKind::AdLoad,
            AdEvent::AdPlay => AdEventKind::AdPlay,
            AdEvent::AdPause => AdEventKind::AdPause,
        }
    }

    pub fn error(code: i32, message: impl Into<String>) -> Self {
        AdEvent::AdError {
            code: Some(code),
            message: Some(message.into()),
        }
    }
}

/// User gestures that satisfy the browser autoplay policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureKind {
    PointerDown,
    TouchStart,
    KeyDown,
}

impl GestureKind {
    pub const ALL: [GestureKind; 3] = [
        GestureKind::PointerDown,
        GestureKind::TouchStart,
        GestureKind::KeyDown,
    ];
}

/// Video surface lifecycle notification kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceEventKind {
    Play,
    Playing,
    Ended,
}

/// Video surface lifecycle notification
#[derive(Debug)]
pub enum SurfaceEvent {
    /// A play attempt; handlers may cancel it
    Play(PlayAttempt),
    /// Frames are being rendered
    Playing,
    /// Content reached its end
    Ended,
}

impl SurfaceEvent {
    pub fn kind(&self) -> SurfaceEventKind {
        match self {
            SurfaceEvent::Play(_) => SurfaceEventKind::Play,
            SurfaceEvent::Playing => SurfaceEventKind::Playing,
            SurfaceEvent::Ended => SurfaceEventKind::Ended,
        }
    }
}

/// A cancellable play attempt on the content surface
#[derive(Debug, Default)]
pub struct PlayAttempt {
    prevented: AtomicBool,
}

impl PlayAttempt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the default media action
    pub fn prevent_default(&self) {
        self.prevented.store(true, Ordering::SeqCst);
    }

    pub fn is_default_prevented(&self) -> bool {
        self.prevented.load(Ordering::SeqCst)
    }
}

/// Orchestrator state machine phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackPhase {
    /// Mounted, waiting for the manifest
    Idle,
    /// Manifest parsed, no play intent yet
    StreamReady,
    /// Ad engine initializing or loading the sequence
    AdSequencePending,
    /// Content is on screen
    ContentPlaying,
    /// An ad occupies the screen
    AdPlaying,
    /// Content reached its end
    Ended,
}

impl PlaybackPhase {
    /// Check if transition to target phase is valid
    pub fn can_transition_to(&self, target: PlaybackPhase) -> bool {
        use PlaybackPhase::*;
        matches!(
            (self, target),
            // From Idle
            (Idle, StreamReady) |
            // From StreamReady
            (StreamReady, AdSequencePending) |
            // From AdSequencePending
            (AdSequencePending, ContentPlaying) | (AdSequencePending, AdPlaying) |
            // From ContentPlaying
            (ContentPlaying, AdPlaying) | (ContentPlaying, Ended) |
            // From AdPlaying
            (AdPlaying, ContentPlaying) | (AdPlaying, Ended) |
            // From Ended
            (Ended, AdPlaying) | (Ended, ContentPlaying)
        )
    }
}

impl std::fmt::Display for PlaybackPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackPhase::Idle => write!(f, "idle"),
            PlaybackPhase::StreamReady => write!(f, "stream_ready"),
            PlaybackPhase::AdSequencePending => write!(f, "ad_sequence_pending"),
            PlaybackPhase::ContentPlaying => write!(f, "content_playing"),
            PlaybackPhase::AdPlaying => write!(f, "ad_playing"),
            PlaybackPhase::Ended => write!(f, "ended"),
        }
    }
}
