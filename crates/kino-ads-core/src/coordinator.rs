//! Ad Session Coordinator - owns the ad engine lifecycle
//!
//! Coordinates:
//! - One-time engine initialization and handler subscription
//! - Consent resolution and the ad sequence request
//! - The playback gate, flipped by ad lifecycle events
//! - Play/pause commands on the content surface in reaction to the engine
//!
//! The two latches (`initialized`, `sequence_loaded`) only ever go from false to
//! true. Every surface write re-reads the gate and the latches first; nothing
//! read before an await is trusted after it.

use crate::{
    config::AdSessionConfig,
    consent::ConsentResolver,
    engine::{AdEngine, AppState},
    events::Subscription,
    gate::{GateState, PlaybackGate},
    interaction::InteractionTracker,
    surface::{play_detached, VideoSurface},
    trace::{SessionTrace, TraceEvent},
    types::*,
    Error, Result,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, instrument, warn};

/// Ad session for a single mounted player
pub struct AdSessionCoordinator {
    /// Session configuration
    config: AdSessionConfig,
    /// Ad SDK
    engine: Arc<dyn AdEngine>,
    /// Content surface
    surface: Arc<dyn VideoSurface>,
    /// Consent resolution
    consent: ConsentResolver,
    /// First-gesture latch, read for the autoplay fallback
    interaction: Arc<InteractionTracker>,
    /// Ad occupancy
    gate: PlaybackGate,
    /// Engine `initialize` has been called
    initialized: AtomicBool,
    /// Sequence request settled (loaded or failed open)
    sequence_loaded: AtomicBool,
    /// A cancelled user play waits for the ads to let content through
    deferred_play: AtomicBool,
    /// Cleared on teardown; late results stop writing to the surface
    active: AtomicBool,
    /// Position recorded at the last ad start
    started_position: Mutex<Option<AdPosition>>,
    /// Engine handler registrations
    subscriptions: Mutex<Vec<Subscription>>,
    /// Decision trace
    trace: Arc<SessionTrace>,
}

impl AdSessionCoordinator {
    pub fn new(
        config: AdSessionConfig,
        engine: Arc<dyn AdEngine>,
        surface: Arc<dyn VideoSurface>,
        consent: ConsentResolver,
        interaction: Arc<InteractionTracker>,
        trace: Arc<SessionTrace>,
    ) -> Self {
        Self {
            config,
            engine,
            surface,
            consent,
            interaction,
            gate: PlaybackGate::new(),
            initialized: AtomicBool::new(false),
            sequence_loaded: AtomicBool::new(false),
            deferred_play: AtomicBool::new(false),
            active: AtomicBool::new(true),
            started_position: Mutex::new(None),
            subscriptions: Mutex::new(Vec::new()),
            trace,
        }
    }

    pub fn config(&self) -> &AdSessionConfig {
        &self.config
    }

    pub fn gate(&self) -> &PlaybackGate {
        &self.gate
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn is_sequence_loaded(&self) -> bool {
        self.sequence_loaded.load(Ordering::Acquire)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Remember a user play that was cancelled while ads were pending
    pub fn defer_play(&self) {
        self.deferred_play.store(true, Ordering::Release);
    }

    pub fn is_play_deferred(&self) -> bool {
        self.deferred_play.load(Ordering::Acquire)
    }

    /// Content started on its own; nothing is owed to the viewer anymore
    pub fn clear_deferred_play(&self) {
        self.deferred_play.store(false, Ordering::Release);
    }

    pub fn current_ad_position(&self) -> AdPosition {
        self.engine.current_ad_position()
    }

    /// Initialize the engine once and subscribe the handler table.
    ///
    /// Returns `true` when this call performed the initialization. The latch is
    /// set before the engine call, so concurrent callers return `false` at once.
    #[instrument(skip(self), fields(video_id = %self.config.video_id))]
    pub async fn ensure_initialized(self: &Arc<Self>) -> Result<bool> {
        if self.initialized.swap(true, Ordering::AcqRel) {
            debug!("Ad engine already initialized");
            return Ok(false);
        }

        self.engine
            .initialize(self.surface.clone())
            .await
            .map_err(|e| match e {
                Error::AdEngineInit(_) => e,
                other => Error::AdEngineInit(other.to_string()),
            })?;

        if !self.is_active() {
            debug!("Session torn down during initialization, skipping subscriptions");
            return Ok(true);
        }

        info!("Ad engine initialized");
        self.trace.record(TraceEvent::EngineInitialized);
        self.subscribe_handlers();
        Ok(true)
    }

    fn subscribe_handlers(self: &Arc<Self>) {
        let subscriptions: Vec<Subscription> = AdEventKind::ALL
            .iter()
            .map(|&kind| {
                let coordinator = Arc::downgrade(self);
                self.engine.subscribe(
                    kind,
                    Arc::new(move |event: &AdEvent| {
                        if let Some(coordinator) = coordinator.upgrade() {
                            coordinator.handle_event(event);
                        }
                    }),
                )
            })
            .collect();

        debug!(count = subscriptions.len(), "Ad event handlers subscribed");
        self.lock_subscriptions().extend(subscriptions);
    }

    /// Resolve consent and request the ad sequence, once per session
    #[instrument(skip(self), fields(video_id = %self.config.video_id))]
    pub async fn request_ad_sequence(&self) -> Result<()> {
        if self.is_sequence_loaded() {
            debug!("Ad sequence already settled");
            return Ok(());
        }

        let consent = self.consent.resolve().await;

        if self.is_sequence_loaded() || !self.is_active() {
            debug!("Ad sequence settled while resolving consent");
            return Ok(());
        }

        let state = AppState::build(&self.config, consent);
        let options = self.config.development_mode.to_options();
        info!(
            mode = %self.config.development_mode,
            autoplay = self.config.autoplay,
            consent_transport = self.consent.has_transport(),
            "Loading ad sequence"
        );

        self.engine
            .load_ad_sequence(state, options)
            .await
            .map_err(|e| match e {
                Error::AdSequenceLoad(_) => e,
                other => Error::AdSequenceLoad(other.to_string()),
            })?;

        if self.sequence_loaded.swap(true, Ordering::AcqRel) {
            debug!("Ad sequence already settled by an ad error, ignoring late load");
            return Ok(());
        }

        info!("Ad sequence loaded");
        self.trace.record(TraceEvent::SequenceLoaded { fallback: false });

        if self.config.autoplay && self.interaction.has_interacted() {
            let position = self.engine.current_ad_position();
            if position.is_preroll() {
                debug!("Preroll active, the engine resumes content when it ends");
            } else {
                self.play_content("autoplay after sequence load");
            }
        }

        Ok(())
    }

    /// Recover an ad path failure toward content.
    ///
    /// Shared by engine-reported ad errors and errors returned from
    /// initialization or sequence load.
    pub fn fail_open(&self, error: &Error) {
        warn!(code = error.error_code(), error = %error, "Ad path failed, falling back to content");
        self.trace.record(TraceEvent::FailOpen {
            code: error.error_code().to_string(),
            message: error.to_string(),
        });

        self.set_gate(GateState::ContentAllowed);

        let first = !self.sequence_loaded.swap(true, Ordering::AcqRel);
        if first {
            self.trace.record(TraceEvent::SequenceLoaded { fallback: true });
        }

        if self.is_play_deferred() {
            self.play_content("ad error released deferred play");
        } else if first && self.config.autoplay && self.interaction.has_interacted() {
            self.play_content("ad error fallback");
        }
    }

    /// React to one ad lifecycle event
    pub fn handle_event(&self, event: &AdEvent) {
        if !self.is_active() {
            debug!(kind = ?event.kind(), "Ignoring ad event after teardown");
            return;
        }

        let position = self.engine.current_ad_position();
        self.trace.record(TraceEvent::AdEvent {
            kind: event.kind(),
            position,
        });

        match event {
            AdEvent::ContentPauseRequested => {
                info!(%position, "Content pause requested");
                self.set_gate(GateState::AdOccupying);
                self.pause_content("content pause requested");
            }
            AdEvent::ContentResumeRequested => {
                info!(%position, "Content resume requested");
                self.set_gate(GateState::ContentAllowed);
                if position.is_postroll() {
                    debug!("Postroll finished, content stays paused");
                } else {
                    self.play_content("content resume requested");
                }
            }
            AdEvent::AdBreakStart => {
                info!(%position, "Ad break started");
                self.set_gate(GateState::AdOccupying);
            }
            AdEvent::AdStart => {
                info!(%position, "Ad started");
                *self.lock_started_position() = Some(position);
                self.set_gate(GateState::AdOccupying);
                if !self.surface.is_paused() {
                    self.pause_content("ad started over content");
                }
            }
            AdEvent::AdBreakEnd => {
                info!("Ad break ended");
                self.set_gate(GateState::ContentAllowed);
                if self.is_play_deferred() && !position.is_postroll() {
                    self.play_content("ad break ended");
                }
            }
            AdEvent::AdEnd => {
                let ended = self.lock_started_position().take().unwrap_or(position);
                info!(position = %ended, "Ad ended");
                if ended.is_postroll() {
                    debug!("Postroll ad ended, gate stays closed");
                } else {
                    self.set_gate(GateState::ContentAllowed);
                }
            }
            AdEvent::AdError { code, message } => {
                let message = message.clone().unwrap_or_else(|| "unknown ad error".to_string());
                self.fail_open(&Error::ad_delivery(*code, message));
            }
            AdEvent::AdLoad => debug!("Ad loaded"),
            AdEvent::AdPlay => debug!("Ad is playing"),
            AdEvent::AdPause => debug!("Ad is paused"),
        }
    }

    /// Issue a content play if the gate is clear. Returns true if issued.
    ///
    /// An issued play settles any deferred user play.
    pub(crate) fn play_content(&self, reason: &'static str) -> bool {
        if !self.is_active() {
            debug!(reason, "Session torn down, not playing content");
            return false;
        }
        if self.gate.is_ad_occupying() {
            debug!(reason, "Ad occupies the screen, not playing content");
            return false;
        }

        self.deferred_play.store(false, Ordering::Release);
        self.trace.record(TraceEvent::ContentPlay {
            reason: reason.to_string(),
        });
        play_detached(self.surface.as_ref(), reason);
        true
    }

    pub(crate) fn pause_content(&self, reason: &'static str) {
        if !self.is_active() {
            return;
        }
        self.trace.record(TraceEvent::ContentPause {
            reason: reason.to_string(),
        });
        self.surface.pause();
    }

    fn set_gate(&self, state: GateState) {
        if self.gate.state() == state {
            return;
        }
        match state {
            GateState::AdOccupying => self.gate.mark_ad_occupying(),
            GateState::ContentAllowed => self.gate.mark_content_allowed(),
        }
        self.trace.record(TraceEvent::Gate { state });
    }

    /// Release engine subscriptions; later results become no-ops
    pub fn teardown(&self) {
        self.active.store(false, Ordering::Release);
        let released: Vec<Subscription> = self.lock_subscriptions().drain(..).collect();
        debug!(count = released.len(), "Ad event handlers released");
    }

    fn lock_subscriptions(&self) -> std::sync::MutexGuard<'_, Vec<Subscription>> {
        self.subscriptions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_started_position(&self) -> std::sync::MutexGuard<'_, Option<AdPosition>> {
        self.started_position.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
