//! Ad engine capability and the session snapshot handed to it

use crate::config::{AdSessionConfig, DevelopmentOptions};
use crate::consent::ConsentState;
use crate::events::Subscription;
use crate::surface::VideoSurface;
use crate::types::{AdEvent, AdEventKind, AdPosition};
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Handler for ad lifecycle events
pub type AdEventHandler = Arc<dyn Fn(&AdEvent) + Send + Sync>;

/// The external ad-delivery SDK
#[async_trait]
pub trait AdEngine: Send + Sync {
    /// One-time setup against the rendering surface
    async fn initialize(&self, surface: Arc<dyn VideoSurface>) -> Result<()>;

    /// Request the ad sequence for this session
    async fn load_ad_sequence(&self, state: AppState, options: DevelopmentOptions) -> Result<()>;

    /// Position of the current ad, if any
    fn current_ad_position(&self) -> AdPosition;

    /// Subscribe to one lifecycle event kind
    fn subscribe(&self, kind: AdEventKind, handler: AdEventHandler) -> Subscription;
}

/// Session snapshot handed to the engine's sequence load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    pub consent: ConsentState,
    pub video: VideoState,
    pub environment: EnvironmentState,
    pub player: PlayerState,
}

impl AppState {
    /// Build the snapshot for `config` with resolved `consent`
    pub fn build(config: &AdSessionConfig, consent: ConsentState) -> Self {
        Self {
            consent,
            video: VideoState {
                id: config.video_id.clone(),
                is_autoplay: config.autoplay,
                r#type: "STREAM".to_string(),
                is_current_time_dvr: false,
                is_seekable: false,
                view_id: String::new(),
                duration: config.duration_hint.as_secs(),
                publisher_id: String::new(),
                publisher_type: "player".to_string(),
                publisher_reference: "x1alda".to_string(),
                stream_tech: "hls.js".to_string(),
                owner_id: String::new(),
                created_time: Utc::now().timestamp_millis(),
                mime_type: "application/x-mpegURL".to_string(),
            },
            environment: EnvironmentState::default(),
            player: PlayerState {
                is_player_controls_enabled: false,
            },
        }
    }
}

/// Identity of the content being watched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoState {
    pub id: String,
    pub is_autoplay: bool,
    pub r#type: String,
    #[serde(rename = "isCurrentTimeDVR")]
    pub is_current_time_dvr: bool,
    pub is_seekable: bool,
    pub view_id: String,
    /// Seconds
    pub duration: u64,
    pub publisher_id: String,
    pub publisher_type: String,
    pub publisher_reference: String,
    pub stream_tech: String,
    pub owner_id: String,
    /// Milliseconds since the Unix epoch
    pub created_time: i64,
    pub mime_type: String,
}

/// Environment placeholders; the engine fills what it can detect itself
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentState {
    pub app_name: String,
    pub locale: String,
    pub top_domain: String,
    pub embedder: String,
    pub client_type: String,
    pub device_id: String,
    pub traffic_segment: u32,
    pub v1st: String,
    pub is3rd_party_cookies_available: bool,
    pub os_family: String,
    pub os_name: String,
    pub ua_family: String,
    pub ua_name: String,
    pub ua_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub is_player_controls_enabled: bool,
}
