//! Error types for Kino Ads

use thiserror::Error;

/// Result type alias for ad coordination operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ad coordination error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // Ad engine errors
    #[error("Ad engine initialization failed: {0}")]
    AdEngineInit(String),

    #[error("Ad sequence load failed: {0}")]
    AdSequenceLoad(String),

    #[error("Ad delivery error (code {code:?}): {message}")]
    AdDelivery { code: Option<i32>, message: String },

    // Surface errors
    #[error("Autoplay blocked: {0}")]
    AutoplayBlocked(String),

    #[error("Play request aborted by a pause")]
    PlaybackAborted,

    // Consent errors
    #[error("Consent transport unavailable: {0}")]
    ConsentUnavailable(String),

    #[error("Consent request timed out after {timeout_ms}ms")]
    ConsentTimeout { timeout_ms: u64 },

    // Stream errors
    #[error("Stream loader not supported on this surface")]
    StreamUnsupported,

    #[error("Failed to attach stream {url}: {reason}")]
    StreamAttach { url: String, reason: String },

    // State machine errors
    #[error("Invalid playback phase transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create an ad delivery error from an engine-reported payload
    pub fn ad_delivery(code: Option<i32>, message: impl Into<String>) -> Self {
        Error::AdDelivery {
            code,
            message: message.into(),
        }
    }

    /// Returns true if content playback can continue after this error
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Error::StreamUnsupported | Error::StreamAttach { .. } | Error::InvalidConfig(_)
        )
    }

    /// Returns the error code for traces
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::AdEngineInit(_) => "AD_ENGINE_INIT",
            Error::AdSequenceLoad(_) => "AD_SEQUENCE_LOAD",
            Error::AdDelivery { .. } => "AD_DELIVERY",
            Error::AutoplayBlocked(_) => "AUTOPLAY_BLOCKED",
            Error::PlaybackAborted => "PLAYBACK_ABORTED",
            Error::ConsentUnavailable(_) => "CONSENT_UNAVAILABLE",
            Error::ConsentTimeout { .. } => "CONSENT_TIMEOUT",
            Error::StreamUnsupported => "STREAM_UNSUPPORTED",
            Error::StreamAttach { .. } => "STREAM_ATTACH",
            Error::InvalidStateTransition { .. } => "INVALID_STATE",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
        }
    }
}
