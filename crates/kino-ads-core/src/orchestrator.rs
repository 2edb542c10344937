//! Playback Orchestrator - content play lifecycle against the ad session
//!
//! Decides at every content play attempt whether it may proceed or must be
//! intercepted to run the ad sequence first. Phase changes between content and
//! ads follow the playback gate; the orchestrator never polls.

use crate::{
    coordinator::AdSessionCoordinator,
    gate::GateState,
    interaction::InteractionTracker,
    surface::VideoSurface,
    trace::{SessionTrace, TraceEvent},
    types::*,
    Error, Result,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Outcome of intercepting a play attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayVerdict {
    /// Content may play
    Proceed,
    /// Cancelled: an ad occupies the screen
    Blocked,
    /// Cancelled: the ad sequence must run first
    Deferred,
}

/// Content playback state machine for one mount
pub struct PlaybackOrchestrator {
    /// Ad session
    coordinator: Arc<AdSessionCoordinator>,
    /// Content surface
    surface: Arc<dyn VideoSurface>,
    /// First-gesture latch
    interaction: Arc<InteractionTracker>,
    /// Current phase
    phase_tx: watch::Sender<PlaybackPhase>,
    /// Content reached its end and has not played since
    content_ended: AtomicBool,
    /// Cleared on teardown
    active: AtomicBool,
    /// Decision trace
    trace: Arc<SessionTrace>,
}

impl PlaybackOrchestrator {
    pub fn new(
        coordinator: Arc<AdSessionCoordinator>,
        surface: Arc<dyn VideoSurface>,
        interaction: Arc<InteractionTracker>,
        trace: Arc<SessionTrace>,
    ) -> Self {
        let (phase_tx, _) = watch::channel(PlaybackPhase::Idle);
        Self {
            coordinator,
            surface,
            interaction,
            phase_tx,
            content_ended: AtomicBool::new(false),
            active: AtomicBool::new(true),
            trace,
        }
    }

    /// Get current phase
    pub fn phase(&self) -> PlaybackPhase {
        *self.phase_tx.borrow()
    }

    /// Subscribe to phase changes
    pub fn subscribe_phase(&self) -> watch::Receiver<PlaybackPhase> {
        self.phase_tx.subscribe()
    }

    pub fn coordinator(&self) -> &Arc<AdSessionCoordinator> {
        &self.coordinator
    }

    /// A cancelled user play has not been honoured yet
    pub fn is_resume_pending(&self) -> bool {
        self.coordinator.is_play_deferred()
    }

    fn set_phase(&self, to: PlaybackPhase) -> Result<()> {
        let from = self.phase();
        if from == to {
            return Ok(());
        }
        if !from.can_transition_to(to) {
            return Err(Error::InvalidStateTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        self.phase_tx.send_replace(to);
        self.trace.record(TraceEvent::Phase { from, to });
        info!(%from, %to, "Phase transition");
        Ok(())
    }

    fn transition(&self, to: PlaybackPhase) {
        if let Err(e) = self.set_phase(to) {
            debug!(error = %e, "Phase transition skipped");
        }
    }

    /// Manifest parsed: take the autoplay path or wait for a play attempt
    #[instrument(skip(self))]
    pub async fn handle_stream_ready(&self) {
        if !self.is_active() {
            return;
        }
        info!("Stream ready");
        self.transition(PlaybackPhase::StreamReady);

        if !self.coordinator.config().autoplay {
            debug!("No autoplay, ads load on the first play attempt");
            return;
        }

        // Muted autoplay is allowed without a gesture
        self.surface.set_muted(true);
        self.interaction.record_interaction();
        self.start_ad_sequence().await;
    }

    /// Decide on a play attempt, cancelling it at the source when needed.
    ///
    /// Runs synchronously inside the surface's `play` notification.
    pub fn intercept_play(&self, attempt: &PlayAttempt) -> PlayVerdict {
        if !self.is_active() {
            return PlayVerdict::Proceed;
        }

        if self.coordinator.gate().is_ad_occupying() {
            self.cancel(attempt, "ad is currently playing");
            return PlayVerdict::Blocked;
        }

        if !self.coordinator.is_sequence_loaded() {
            self.cancel(attempt, "loading ads first");
            self.interaction.record_interaction();
            self.coordinator.defer_play();
            return PlayVerdict::Deferred;
        }

        PlayVerdict::Proceed
    }

    fn cancel(&self, attempt: &PlayAttempt, reason: &'static str) {
        attempt.prevent_default();
        self.surface.pause();
        self.trace.record(TraceEvent::PlayCancelled {
            reason: reason.to_string(),
        });
        info!(reason, "Content play cancelled");
    }

    /// Play notification: intercept, then run the ad sequence if deferred
    pub async fn handle_play(&self, attempt: &PlayAttempt) -> PlayVerdict {
        let verdict = self.intercept_play(attempt);
        if verdict == PlayVerdict::Deferred {
            self.start_ad_sequence().await;
        }
        verdict
    }

    /// Initialize the engine and load the sequence, failing open on error
    pub async fn start_ad_sequence(&self) {
        self.transition(PlaybackPhase::AdSequencePending);

        if let Err(e) = self.run_ad_sequence().await {
            warn!(error = %e, "Ad sequence failed");
            self.coordinator.fail_open(&e);
        }

        self.resume_if_pending("ad sequence settled");
    }

    async fn run_ad_sequence(&self) -> Result<()> {
        if !self.coordinator.ensure_initialized().await? {
            debug!("Ad session already started");
            return Ok(());
        }
        self.coordinator.request_ad_sequence().await
    }

    /// Honour a deferred user play once ads allow it.
    ///
    /// While the engine reports a preroll, the play is left to the engine's
    /// content-resume or ad-break-end.
    fn resume_if_pending(&self, reason: &'static str) {
        if !self.is_active() || !self.is_resume_pending() || !self.coordinator.is_sequence_loaded() {
            return;
        }
        if self.coordinator.gate().is_ad_occupying() {
            debug!(reason, "Deferred play waits for the ad to finish");
            return;
        }

        let position = self.coordinator.current_ad_position();
        if position.is_postroll() || position.is_preroll() {
            debug!(reason, %position, "Deferred play left to the ad engine");
            return;
        }

        self.coordinator.play_content(reason);
    }

    /// Playing notification; pauses again if an ad holds the screen
    pub fn handle_playing(&self) {
        if !self.is_active() {
            return;
        }
        if self.coordinator.gate().is_ad_occupying() {
            info!("Pausing content - ad is playing");
            self.coordinator.pause_content("content started under an ad");
            return;
        }
        self.coordinator.clear_deferred_play();
        self.content_ended.store(false, Ordering::Release);
        self.transition(PlaybackPhase::ContentPlaying);
    }

    /// Ended notification
    pub fn handle_ended(&self) {
        if self.is_active() {
            self.content_ended.store(true, Ordering::Release);
            self.transition(PlaybackPhase::Ended);
        }
    }

    fn on_gate_changed(&self, state: GateState) {
        if !self.is_active() {
            return;
        }
        match state {
            GateState::AdOccupying => self.transition(PlaybackPhase::AdPlaying),
            GateState::ContentAllowed => {
                if self.content_ended.load(Ordering::Acquire) {
                    self.transition(PlaybackPhase::Ended);
                } else {
                    self.resume_if_pending("ad break cleared");
                }
            }
        }
    }

    /// Follow gate changes until the orchestrator is dropped
    pub fn spawn_gate_watcher(self: &Arc<Self>) -> JoinHandle<()> {
        let mut gate_rx = self.coordinator.gate().subscribe();
        let orchestrator: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            while gate_rx.changed().await.is_ok() {
                let state = *gate_rx.borrow_and_update();
                match orchestrator.upgrade() {
                    Some(orchestrator) => orchestrator.on_gate_changed(state),
                    None => break,
                }
            }
        })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }
}

#[cfg(all(test, feature = "sim"))]
mod tests {
    use super::*;
    use crate::config::AdSessionConfig;
    use crate::consent::ConsentResolver;
    use crate::events::Subscription;
    use crate::sim::{settle, AdScript, ScriptedAdEngine, SimSurface};

    struct Fixture {
        orchestrator: Arc<PlaybackOrchestrator>,
        engine: Arc<ScriptedAdEngine>,
        surface: Arc<SimSurface>,
        interaction: Arc<InteractionTracker>,
        _watcher: JoinHandle<()>,
        _playing: Subscription,
    }

    fn fixture(autoplay: bool, script: AdScript) -> Fixture {
        let engine = Arc::new(ScriptedAdEngine::new(script));
        let surface = Arc::new(SimSurface::new());
        let interaction = Arc::new(InteractionTracker::new());
        let trace = Arc::new(SessionTrace::new(SessionId::new()));
        let coordinator = Arc::new(AdSessionCoordinator::new(
            AdSessionConfig {
                autoplay,
                ..Default::default()
            },
            engine.clone(),
            surface.clone(),
            ConsentResolver::unavailable(),
            interaction.clone(),
            trace.clone(),
        ));
        let orchestrator = Arc::new(PlaybackOrchestrator::new(
            coordinator,
            surface.clone(),
            interaction.clone(),
            trace,
        ));
        let watcher = orchestrator.spawn_gate_watcher();
        let weak = Arc::downgrade(&orchestrator);
        let playing = surface.subscribe(
            SurfaceEventKind::Playing,
            Arc::new(move |_: &SurfaceEvent| {
                if let Some(orchestrator) = weak.upgrade() {
                    orchestrator.handle_playing();
                }
            }),
        );
        Fixture {
            orchestrator,
            engine,
            surface,
            interaction,
            _watcher: watcher,
            _playing: playing,
        }
    }

    #[tokio::test]
    async fn test_autoplay_ready_mutes_and_forces_interaction() {
        let f = fixture(true, AdScript::empty());
        f.orchestrator.handle_stream_ready().await;

        assert!(f.surface.is_muted());
        assert!(f.interaction.has_interacted());
        assert_eq!(f.engine.initialize_calls(), 1);
        assert_eq!(f.engine.load_calls(), 1);
        assert!(f.orchestrator.coordinator().is_sequence_loaded());
        // no preroll, no break: content starts right after the load
        assert_eq!(f.surface.play_calls(), 1);
    }

    #[tokio::test]
    async fn test_ready_without_autoplay_waits() {
        let f = fixture(false, AdScript::no_ads());
        f.orchestrator.handle_stream_ready().await;

        assert_eq!(f.orchestrator.phase(), PlaybackPhase::StreamReady);
        assert_eq!(f.engine.initialize_calls(), 0);
        assert!(!f.surface.is_muted());
        assert!(!f.interaction.has_interacted());
    }

    #[tokio::test]
    async fn test_play_under_ad_is_blocked() {
        let f = fixture(false, AdScript::no_ads());
        f.orchestrator.coordinator().gate().mark_ad_occupying();

        let attempt = PlayAttempt::new();
        assert_eq!(f.orchestrator.intercept_play(&attempt), PlayVerdict::Blocked);
        assert!(attempt.is_default_prevented());
        assert!(f.surface.is_paused());
        assert_eq!(f.engine.initialize_calls(), 0);
    }

    #[tokio::test]
    async fn test_first_play_is_deferred_until_loaded() {
        let f = fixture(false, AdScript::empty());
        f.orchestrator.handle_stream_ready().await;

        let attempt = PlayAttempt::new();
        let verdict = f.orchestrator.handle_play(&attempt).await;

        assert_eq!(verdict, PlayVerdict::Deferred);
        assert!(attempt.is_default_prevented());
        assert!(f.interaction.has_interacted());
        assert_eq!(f.surface.play_calls(), 1);
        assert!(!f.orchestrator.is_resume_pending());

        // once loaded, play attempts go through untouched
        let second = PlayAttempt::new();
        assert_eq!(f.orchestrator.intercept_play(&second), PlayVerdict::Proceed);
        assert!(!second.is_default_prevented());
    }

    #[tokio::test]
    async fn test_deferred_play_waits_for_break_end() {
        let f = fixture(false, AdScript::no_ads());
        f.orchestrator.handle_stream_ready().await;
        f.orchestrator.handle_play(&PlayAttempt::new()).await;
        settle().await;

        assert!(f.orchestrator.coordinator().gate().is_ad_occupying());
        assert_eq!(f.surface.play_calls(), 0);
        assert!(f.orchestrator.is_resume_pending());

        f.engine.emit(AdEvent::AdBreakEnd);
        settle().await;

        assert_eq!(f.surface.play_calls(), 1);
        assert!(!f.surface.is_paused());
        assert_eq!(f.orchestrator.phase(), PlaybackPhase::ContentPlaying);
    }

    #[tokio::test]
    async fn test_playing_under_ad_is_corrected() {
        let f = fixture(false, AdScript::no_ads());
        f.orchestrator.coordinator().gate().mark_ad_occupying();

        f.orchestrator.handle_playing();
        assert!(f.surface.is_paused());
        assert_ne!(f.orchestrator.phase(), PlaybackPhase::ContentPlaying);
    }

    #[tokio::test]
    async fn test_load_failure_fails_open() {
        let f = fixture(false, AdScript::load_failure());
        f.orchestrator.handle_stream_ready().await;
        f.orchestrator.handle_play(&PlayAttempt::new()).await;

        assert!(f.orchestrator.coordinator().is_sequence_loaded());
        assert!(!f.orchestrator.coordinator().gate().is_ad_occupying());
        assert_eq!(f.surface.play_calls(), 1);
    }

    #[tokio::test]
    async fn test_init_failure_fails_open_for_autoplay() {
        let f = fixture(true, AdScript::no_ads());
        f.engine.fail_initialize("sdk script blocked");
        f.orchestrator.handle_stream_ready().await;

        assert!(f.orchestrator.coordinator().is_sequence_loaded());
        assert_eq!(f.engine.load_calls(), 0);
        assert_eq!(f.surface.play_calls(), 1);
    }

    #[tokio::test]
    async fn test_gate_drives_ad_phase() {
        let f = fixture(true, AdScript::preroll());
        f.orchestrator.handle_stream_ready().await;
        settle().await;

        assert_eq!(f.orchestrator.phase(), PlaybackPhase::AdPlaying);
    }

    #[tokio::test]
    async fn test_deferred_play_holds_while_preroll_reported() {
        let f = fixture(false, AdScript::no_ads());
        f.orchestrator.handle_stream_ready().await;
        f.orchestrator.handle_play(&PlayAttempt::new()).await;

        f.engine.set_position(AdPosition::Preroll);
        f.engine.emit(AdEvent::AdStart);
        f.engine.emit(AdEvent::AdEnd);
        settle().await;

        assert!(!f.orchestrator.coordinator().gate().is_ad_occupying());
        assert_eq!(f.surface.play_calls(), 0);
        assert!(f.orchestrator.is_resume_pending());
    }

    #[tokio::test]
    async fn test_closed_break_after_content_end_returns_to_ended() {
        let f = fixture(true, AdScript::empty());
        f.orchestrator.handle_stream_ready().await;
        settle().await;
        assert_eq!(f.orchestrator.phase(), PlaybackPhase::ContentPlaying);

        f.orchestrator.handle_ended();
        f.orchestrator.coordinator().gate().mark_ad_occupying();
        settle().await;
        assert_eq!(f.orchestrator.phase(), PlaybackPhase::AdPlaying);

        f.orchestrator.coordinator().gate().mark_content_allowed();
        settle().await;
        assert_eq!(f.orchestrator.phase(), PlaybackPhase::Ended);
        assert_eq!(f.surface.play_calls(), 1);
    }

    #[tokio::test]
    async fn test_deactivated_orchestrator_ignores_play() {
        let f = fixture(false, AdScript::no_ads());
        f.orchestrator.deactivate();

        let attempt = PlayAttempt::new();
        assert_eq!(f.orchestrator.intercept_play(&attempt), PlayVerdict::Proceed);
        assert!(!attempt.is_default_prevented());
    }
}
