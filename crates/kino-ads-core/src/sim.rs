//! In-process collaborators for driving a player without a browser
//!
//! - [`SimSurface`]: records commands, emits play/playing/ended, can block autoplay
//! - [`SimStreamLoader`]: fires its ready notification on demand
//! - [`ScriptedAdEngine`]: replays an [`AdScript`] of engine events
//! - [`StaticConsentProvider`]: answers `getTCData` with a fixed payload
//! - [`SimContainer`]: emits user gestures
//!
//! Used by the CLI `simulate` command and by the test suites.

use crate::{
    config::DevelopmentOptions,
    consent::{ConsentProvider, TcData, TcResponse},
    engine::{AdEngine, AdEventHandler, AppState},
    events::{EventRegistry, Subscription},
    interaction::InteractionSource,
    surface::{PlayFuture, StreamLoader, SurfaceHandler, VideoSurface},
    types::*,
    Error, Result,
};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;
use url::Url;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Let spawned tasks and watch notifications run to quiescence
pub async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

// ============================================================================
// Surface
// ============================================================================

/// Command observed by the simulated surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceCommand {
    /// Programmatic `play()`
    Play,
    /// The viewer pressed play on the controls
    UserPlay,
    Pause,
    Mute(bool),
}

#[derive(Debug)]
struct SurfaceState {
    paused: bool,
    muted: bool,
    ended: bool,
}

/// Simulated content video element
pub struct SimSurface {
    registry: EventRegistry<SurfaceEventKind, SurfaceEvent>,
    state: Mutex<SurfaceState>,
    commands: Mutex<Vec<SurfaceCommand>>,
    block_unmuted_autoplay: AtomicBool,
}

impl SimSurface {
    pub fn new() -> Self {
        Self {
            registry: EventRegistry::new(),
            state: Mutex::new(SurfaceState {
                paused: true,
                muted: false,
                ended: false,
            }),
            commands: Mutex::new(Vec::new()),
            block_unmuted_autoplay: AtomicBool::new(false),
        }
    }

    /// Reject programmatic unmuted `play()` like a browser autoplay policy
    pub fn with_autoplay_policy(self) -> Self {
        self.block_unmuted_autoplay.store(true, Ordering::SeqCst);
        self
    }

    /// The viewer presses play
    pub fn user_play(&self) -> Result<()> {
        lock(&self.commands).push(SurfaceCommand::UserPlay);
        self.start_playback(true)
    }

    /// Content reaches its end
    pub fn end_content(&self) {
        {
            let mut state = lock(&self.state);
            state.paused = true;
            state.ended = true;
        }
        self.registry.emit(SurfaceEventKind::Ended, &SurfaceEvent::Ended);
    }

    pub fn commands(&self) -> Vec<SurfaceCommand> {
        lock(&self.commands).clone()
    }

    pub fn last_command(&self) -> Option<SurfaceCommand> {
        lock(&self.commands).last().copied()
    }

    /// Number of programmatic `play()` calls
    pub fn play_calls(&self) -> usize {
        lock(&self.commands)
            .iter()
            .filter(|c| **c == SurfaceCommand::Play)
            .count()
    }

    pub fn handler_count(&self) -> usize {
        self.registry.len()
    }

    fn start_playback(&self, gesture: bool) -> Result<()> {
        {
            let state = lock(&self.state);
            if !state.paused {
                return Ok(());
            }
            if !gesture && !state.muted && self.block_unmuted_autoplay.load(Ordering::SeqCst) {
                return Err(Error::AutoplayBlocked(
                    "play() failed because the user didn't interact with the document first".into(),
                ));
            }
        }

        let event = SurfaceEvent::Play(PlayAttempt::new());
        self.registry.emit(SurfaceEventKind::Play, &event);
        if let SurfaceEvent::Play(attempt) = &event {
            if attempt.is_default_prevented() {
                debug!("Play prevented by a handler");
                lock(&self.state).paused = true;
                return Err(Error::PlaybackAborted);
            }
        }

        {
            let mut state = lock(&self.state);
            state.paused = false;
            state.ended = false;
        }
        self.registry.emit(SurfaceEventKind::Playing, &SurfaceEvent::Playing);
        Ok(())
    }
}

impl Default for SimSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoSurface for SimSurface {
    fn play(&self) -> PlayFuture {
        lock(&self.commands).push(SurfaceCommand::Play);
        let result = self.start_playback(false);
        Box::pin(async move { result })
    }

    fn pause(&self) {
        lock(&self.commands).push(SurfaceCommand::Pause);
        lock(&self.state).paused = true;
    }

    fn set_muted(&self, muted: bool) {
        lock(&self.commands).push(SurfaceCommand::Mute(muted));
        lock(&self.state).muted = muted;
    }

    fn is_muted(&self) -> bool {
        lock(&self.state).muted
    }

    fn is_paused(&self) -> bool {
        lock(&self.state).paused
    }

    fn subscribe(&self, kind: SurfaceEventKind, handler: SurfaceHandler) -> Subscription {
        self.registry.subscribe(kind, handler)
    }
}

// ============================================================================
// Stream loader
// ============================================================================

/// Stream loader whose manifest parsing completes on demand
pub struct SimStreamLoader {
    registry: EventRegistry<(), ()>,
    supported: bool,
    attach_error: Option<String>,
    attached: Mutex<Option<Url>>,
    ready_fired: AtomicBool,
}

impl SimStreamLoader {
    pub fn new() -> Self {
        Self {
            registry: EventRegistry::new(),
            supported: true,
            attach_error: None,
            attached: Mutex::new(None),
            ready_fired: AtomicBool::new(false),
        }
    }

    /// A loader that cannot run on this platform
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new()
        }
    }

    /// A loader whose media attachment fails
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            attach_error: Some(reason.into()),
            ..Self::new()
        }
    }

    pub fn attached_source(&self) -> Option<Url> {
        lock(&self.attached).clone()
    }

    /// Complete manifest parsing; fires `ready` once per attach
    pub fn finish_parsing(&self) -> bool {
        if self.attached_source().is_none() || self.ready_fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.registry.emit((), &());
        true
    }

    pub fn handler_count(&self) -> usize {
        self.registry.len()
    }
}

impl Default for SimStreamLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamLoader for SimStreamLoader {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn attach(&self, _surface: Arc<dyn VideoSurface>, source: &Url) -> Result<()> {
        if !self.supported {
            return Err(Error::StreamUnsupported);
        }
        if let Some(reason) = &self.attach_error {
            return Err(Error::InvalidConfig(reason.clone()));
        }
        *lock(&self.attached) = Some(source.clone());
        self.ready_fired.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn on_ready(&self, handler: Arc<dyn Fn() + Send + Sync>) -> Subscription {
        self.registry.subscribe((), Arc::new(move |_: &()| handler()))
    }
}

// ============================================================================
// Ad engine
// ============================================================================

/// One step of an ad script
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    /// Emit an engine event
    Emit(AdEvent),
    /// Change the reported ad position
    Position(AdPosition),
    /// Suspend, letting other tasks run
    Yield,
}

/// Scripted engine behaviour
#[derive(Debug, Clone)]
pub struct AdScript {
    /// Replayed inside `load_ad_sequence`
    pub during_load: Vec<ScriptStep>,
    /// Queued for [`ScriptedAdEngine::advance`]
    pub after_load: Vec<ScriptStep>,
    /// Error returned by `load_ad_sequence`
    pub load_error: Option<String>,
}

impl AdScript {
    /// No break at all; the sequence loads and content may start
    pub fn empty() -> Self {
        Self {
            during_load: vec![ScriptStep::Yield],
            after_load: Vec::new(),
            load_error: None,
        }
    }

    /// A break opens during load and closes later without any ad
    pub fn no_ads() -> Self {
        Self {
            during_load: vec![ScriptStep::Yield, ScriptStep::Emit(AdEvent::AdBreakStart)],
            after_load: vec![ScriptStep::Emit(AdEvent::AdBreakEnd)],
            load_error: None,
        }
    }

    /// One preroll ad, as served by the engine's fake-ad mode
    pub fn preroll() -> Self {
        use AdEvent::*;
        use ScriptStep::*;
        Self {
            during_load: vec![
                Yield,
                Position(AdPosition::Preroll),
                Emit(AdLoad),
                Emit(AdBreakStart),
                Emit(ContentPauseRequested),
                Emit(AdStart),
                Emit(AdPlay),
            ],
            after_load: vec![
                Emit(AdEnd),
                Emit(ContentResumeRequested),
                Emit(AdBreakEnd),
                Position(AdPosition::None),
            ],
            load_error: None,
        }
    }

    /// Two preroll ads in one break
    pub fn preroll_pod() -> Self {
        use AdEvent::*;
        use ScriptStep::*;
        Self {
            during_load: vec![
                Yield,
                Position(AdPosition::Preroll),
                Emit(AdLoad),
                Emit(AdBreakStart),
                Emit(ContentPauseRequested),
                Emit(AdStart),
                Emit(AdPlay),
            ],
            after_load: vec![
                Emit(AdEnd),
                Emit(AdLoad),
                Emit(AdStart),
                Emit(AdPlay),
                Emit(AdEnd),
                Emit(ContentResumeRequested),
                Emit(AdBreakEnd),
                Position(AdPosition::None),
            ],
            load_error: None,
        }
    }

    /// The engine reports an error while loading
    pub fn ad_error() -> Self {
        Self {
            during_load: vec![
                ScriptStep::Yield,
                ScriptStep::Emit(AdEvent::error(303, "No ads VAST response after wrappers")),
            ],
            after_load: Vec::new(),
            load_error: None,
        }
    }

    /// The sequence request itself fails
    pub fn load_failure() -> Self {
        Self {
            during_load: vec![ScriptStep::Yield],
            after_load: Vec::new(),
            load_error: Some("VMAP request failed".into()),
        }
    }

    /// No preroll; a postroll plays once content ends
    pub fn postroll() -> Self {
        use AdEvent::*;
        use ScriptStep::*;
        Self {
            during_load: vec![Yield],
            after_load: vec![
                Position(AdPosition::Postroll),
                Emit(AdBreakStart),
                Emit(ContentPauseRequested),
                Emit(AdStart),
                Emit(AdEnd),
                Emit(ContentResumeRequested),
                Emit(AdBreakEnd),
            ],
            load_error: None,
        }
    }

    /// Preset by name, for the CLI
    pub fn named(name: &str) -> Option<Self> {
        match name {
            "empty" => Some(Self::empty()),
            "no-ads" => Some(Self::no_ads()),
            "preroll" => Some(Self::preroll()),
            "preroll-pod" => Some(Self::preroll_pod()),
            "ad-error" => Some(Self::ad_error()),
            "load-failure" => Some(Self::load_failure()),
            "postroll" => Some(Self::postroll()),
            _ => None,
        }
    }

    pub const NAMES: [&'static str; 7] = [
        "empty",
        "no-ads",
        "preroll",
        "preroll-pod",
        "ad-error",
        "load-failure",
        "postroll",
    ];
}

/// Ad engine replaying an [`AdScript`]
pub struct ScriptedAdEngine {
    registry: EventRegistry<AdEventKind, AdEvent>,
    position: Mutex<AdPosition>,
    script: Mutex<AdScript>,
    queued: Mutex<VecDeque<ScriptStep>>,
    init_error: Mutex<Option<String>>,
    initialize_calls: AtomicUsize,
    load_calls: AtomicUsize,
    last_request: Mutex<Option<(AppState, DevelopmentOptions)>>,
}

impl ScriptedAdEngine {
    pub fn new(script: AdScript) -> Self {
        Self {
            registry: EventRegistry::new(),
            position: Mutex::new(AdPosition::None),
            script: Mutex::new(script),
            queued: Mutex::new(VecDeque::new()),
            init_error: Mutex::new(None),
            initialize_calls: AtomicUsize::new(0),
            load_calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Make the next `initialize` fail
    pub fn fail_initialize(&self, reason: impl Into<String>) {
        *lock(&self.init_error) = Some(reason.into());
    }

    pub fn set_position(&self, position: AdPosition) {
        *lock(&self.position) = position;
    }

    /// Emit an event to subscribed handlers, in subscription order
    pub fn emit(&self, event: AdEvent) -> usize {
        self.registry.emit(event.kind(), &event)
    }

    /// Run the next queued post-load step. Returns false when drained.
    pub fn advance(&self) -> bool {
        let step = lock(&self.queued).pop_front();
        match step {
            Some(step) => {
                self.apply(&step);
                true
            }
            None => false,
        }
    }

    pub fn pending_steps(&self) -> usize {
        lock(&self.queued).len()
    }

    /// Next queued post-load step, if any
    pub fn peek_step(&self) -> Option<ScriptStep> {
        lock(&self.queued).front().cloned()
    }

    pub fn initialize_calls(&self) -> usize {
        self.initialize_calls.load(Ordering::SeqCst)
    }

    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    pub fn handler_count(&self) -> usize {
        self.registry.len()
    }

    /// State and options of the last sequence request
    pub fn last_request(&self) -> Option<(AppState, DevelopmentOptions)> {
        lock(&self.last_request).clone()
    }

    fn apply(&self, step: &ScriptStep) {
        match step {
            ScriptStep::Emit(event) => {
                debug!(kind = ?event.kind(), "Scripted ad event");
                self.emit(event.clone());
            }
            ScriptStep::Position(position) => self.set_position(*position),
            ScriptStep::Yield => {}
        }
    }
}

#[async_trait]
impl AdEngine for ScriptedAdEngine {
    async fn initialize(&self, _surface: Arc<dyn VideoSurface>) -> Result<()> {
        self.initialize_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        match lock(&self.init_error).take() {
            Some(reason) => Err(Error::AdEngineInit(reason)),
            None => Ok(()),
        }
    }

    async fn load_ad_sequence(&self, state: AppState, options: DevelopmentOptions) -> Result<()> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_request) = Some((state, options));

        let script = lock(&self.script).clone();
        for step in &script.during_load {
            if *step == ScriptStep::Yield {
                tokio::task::yield_now().await;
            } else {
                self.apply(step);
            }
        }
        lock(&self.queued).extend(script.after_load);

        match script.load_error {
            Some(reason) => Err(Error::AdSequenceLoad(reason)),
            None => Ok(()),
        }
    }

    fn current_ad_position(&self) -> AdPosition {
        *lock(&self.position)
    }

    fn subscribe(&self, kind: AdEventKind, handler: AdEventHandler) -> Subscription {
        self.registry.subscribe(kind, handler)
    }
}

// ============================================================================
// Consent and gestures
// ============================================================================

/// Consent transport answering with a fixed payload
pub struct StaticConsentProvider {
    response: TcResponse,
    delay: Duration,
    calls: AtomicUsize,
}

impl StaticConsentProvider {
    pub fn new(data: TcData, success: bool) -> Self {
        Self {
            response: TcResponse { data, success },
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Answer after `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConsentProvider for StaticConsentProvider {
    async fn get_tc_data(&self, _version: u8) -> Result<TcResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.response.clone())
    }
}

/// Player container emitting user gestures
#[derive(Default)]
pub struct SimContainer {
    registry: EventRegistry<GestureKind, GestureKind>,
}

impl SimContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gesture(&self, kind: GestureKind) -> usize {
        self.registry.emit(kind, &kind)
    }

    pub fn handler_count(&self) -> usize {
        self.registry.len()
    }
}

impl InteractionSource for SimContainer {
    fn subscribe(
        &self,
        kind: GestureKind,
        handler: Arc<dyn Fn(&GestureKind) + Send + Sync>,
    ) -> Subscription {
        self.registry.subscribe(kind, handler)
    }
}
