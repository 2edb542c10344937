//! Collaborator capabilities: the content video surface and the stream loader

use crate::events::Subscription;
use crate::types::{SurfaceEvent, SurfaceEventKind};
use crate::Result;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, error, warn};
use url::Url;

/// Pending outcome of a play command
pub type PlayFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// Handler for surface lifecycle notifications
pub type SurfaceHandler = Arc<dyn Fn(&SurfaceEvent) + Send + Sync>;

/// The content video element
///
/// `play` issues the command synchronously and returns a future that rejects
/// when the browser blocks autoplay, mirroring `HTMLMediaElement.play()`.
pub trait VideoSurface: Send + Sync {
    fn play(&self) -> PlayFuture;

    fn pause(&self);

    fn set_muted(&self, muted: bool);

    fn is_muted(&self) -> bool;

    fn is_paused(&self) -> bool;

    /// Subscribe to `play`, `playing` or `ended`
    fn subscribe(&self, kind: SurfaceEventKind, handler: SurfaceHandler) -> Subscription;
}

/// Issue a play command and log its rejection without waiting for it
pub fn play_detached(surface: &dyn VideoSurface, context: &'static str) {
    let pending = surface.play();
    tokio::spawn(async move {
        match pending.await {
            Ok(()) => debug!(context, "Play command resolved"),
            Err(e) if e.is_recoverable() => {
                warn!(context, error = %e, code = e.error_code(), "Play command rejected")
            }
            Err(e) => error!(context, error = %e, code = e.error_code(), "Play command failed"),
        }
    });
}

/// Stream ingestion (manifest parsing and media attachment)
pub trait StreamLoader: Send + Sync {
    /// Whether the loader can run on this platform
    fn is_supported(&self) -> bool {
        true
    }

    /// Start loading `source` into `surface`
    fn attach(&self, surface: Arc<dyn VideoSurface>, source: &Url) -> Result<()>;

    /// Subscribe to the one-time "manifest parsed" notification
    fn on_ready(&self, handler: Arc<dyn Fn() + Send + Sync>) -> Subscription;
}
