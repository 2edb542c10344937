//! Session configuration
//!
//! Everything here is resolved once when a player is mounted and is never
//! re-read mid-session; a change of source or content id means a new mount.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Content id used when the embedder does not provide one
pub const DEFAULT_VIDEO_ID: &str = "x8iio7y";

/// Duration hint (seconds) reported to the ad engine
pub const DEFAULT_DURATION_HINT_SECS: u64 = 62;

/// How the ad engine should source its ad sequence
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DevelopmentMode {
    /// Engine-provided fake ads
    Fake,
    /// A custom VMAP document
    CustomSource { url: Url },
    /// Production ad decisioning
    #[default]
    Default,
}

impl DevelopmentMode {
    /// Development options handed to the engine's sequence load
    pub fn to_options(&self) -> DevelopmentOptions {
        match self {
            DevelopmentMode::Fake => DevelopmentOptions {
                use_fake_ad: true,
                vmap_url: String::new(),
            },
            DevelopmentMode::CustomSource { url } => DevelopmentOptions {
                use_fake_ad: false,
                vmap_url: url.to_string(),
            },
            DevelopmentMode::Default => DevelopmentOptions::default(),
        }
    }

    /// Resolve from the embedder's two independent switches.
    ///
    /// The fake-ad switch wins over a custom VMAP URL.
    pub fn resolve(use_fake_ad: bool, custom_vmap_url: Option<&str>) -> Result<Self> {
        if use_fake_ad {
            return Ok(DevelopmentMode::Fake);
        }
        match custom_vmap_url.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => {
                let url = Url::parse(raw)
                    .map_err(|e| Error::InvalidConfig(format!("vmap url {raw:?}: {e}")))?;
                Ok(DevelopmentMode::CustomSource { url })
            }
            None => Ok(DevelopmentMode::Default),
        }
    }
}

impl std::fmt::Display for DevelopmentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DevelopmentMode::Fake => write!(f, "fake"),
            DevelopmentMode::CustomSource { url } => write!(f, "custom({url})"),
            DevelopmentMode::Default => write!(f, "default"),
        }
    }
}

/// Engine-facing development options
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevelopmentOptions {
    pub use_fake_ad: bool,
    pub vmap_url: String,
}

/// Identity and intent of one ad session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdSessionConfig {
    /// Opaque content identifier
    pub video_id: String,
    /// Autoplay requested by the embedder
    pub autoplay: bool,
    /// Duration hint reported to the engine
    #[serde(with = "duration_secs")]
    pub duration_hint: Duration,
    /// Ad sourcing mode
    pub development_mode: DevelopmentMode,
}

impl Default for AdSessionConfig {
    fn default() -> Self {
        Self {
            video_id: DEFAULT_VIDEO_ID.to_string(),
            autoplay: false,
            duration_hint: Duration::from_secs(DEFAULT_DURATION_HINT_SECS),
            development_mode: DevelopmentMode::Default,
        }
    }
}

/// Consent resolution settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsentSettings {
    /// Upper bound on the privacy API round trip
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
    /// TCF API version requested
    pub tcf_version: u8,
}

impl Default for ConsentSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3),
            tcf_version: 2,
        }
    }
}

/// Properties of a mounted player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MountProps {
    /// Stream manifest URL
    pub source_url: Url,
    /// Ad sourcing mode
    #[serde(default)]
    pub development_mode: DevelopmentMode,
    /// Opaque content identifier
    #[serde(default = "default_video_id")]
    pub content_id: String,
    /// Start muted without waiting for a gesture
    #[serde(default)]
    pub autoplay: bool,
    /// Consent resolution settings
    #[serde(default)]
    pub consent: ConsentSettings,
}

fn default_video_id() -> String {
    DEFAULT_VIDEO_ID.to_string()
}

impl MountProps {
    pub fn new(source_url: Url) -> Self {
        Self {
            source_url,
            development_mode: DevelopmentMode::Default,
            content_id: default_video_id(),
            autoplay: false,
            consent: ConsentSettings::default(),
        }
    }

    pub fn with_autoplay(mut self, autoplay: bool) -> Self {
        self.autoplay = autoplay;
        self
    }

    pub fn with_development_mode(mut self, mode: DevelopmentMode) -> Self {
        self.development_mode = mode;
        self
    }

    pub fn with_content_id(mut self, content_id: impl Into<String>) -> Self {
        self.content_id = content_id.into();
        self
    }

    /// Parse props from a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let props: MountProps =
            serde_json::from_str(json).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        props.validate()?;
        Ok(props)
    }

    pub fn validate(&self) -> Result<()> {
        if self.content_id.trim().is_empty() {
            return Err(Error::InvalidConfig("content id must not be empty".into()));
        }
        if self.consent.timeout.is_zero() {
            return Err(Error::InvalidConfig("consent timeout must be non-zero".into()));
        }
        Ok(())
    }

    /// Ad session configuration derived from these props
    pub fn session_config(&self) -> AdSessionConfig {
        AdSessionConfig {
            video_id: self.content_id.clone(),
            autoplay: self.autoplay,
            development_mode: self.development_mode.clone(),
            ..Default::default()
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
