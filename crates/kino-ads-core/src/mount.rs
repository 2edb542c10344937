//! Player mount - the session object of one mounted player
//!
//! Mounting builds the coordinator, orchestrator and interaction tracker, wires
//! them to the collaborators' notifications and attaches the stream. Dropping
//! the mount (or calling [`PlayerMount::unmount`]) releases every subscription
//! and discards all latches; a new mount starts again from `Idle`.

use crate::{
    config::MountProps,
    consent::{ConsentProvider, ConsentResolver},
    coordinator::AdSessionCoordinator,
    engine::AdEngine,
    events::Subscription,
    interaction::{InteractionSource, InteractionTracker},
    orchestrator::{PlayVerdict, PlaybackOrchestrator},
    surface::{StreamLoader, VideoSurface},
    trace::SessionTrace,
    types::*,
    Error, Result,
};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// External capabilities a player is mounted against
#[derive(Clone)]
pub struct Collaborators {
    pub surface: Arc<dyn VideoSurface>,
    pub loader: Arc<dyn StreamLoader>,
    pub engine: Arc<dyn AdEngine>,
    pub consent: Option<Arc<dyn ConsentProvider>>,
    pub container: Arc<dyn InteractionSource>,
}

/// A mounted player
pub struct PlayerMount {
    /// Unique session ID
    id: SessionId,
    /// Mount properties
    props: MountProps,
    /// Content lifecycle
    orchestrator: Arc<PlaybackOrchestrator>,
    /// First-gesture latch
    interaction: Arc<InteractionTracker>,
    /// Decision trace
    trace: Arc<SessionTrace>,
    /// Surface and loader registrations
    subscriptions: Vec<Subscription>,
    /// Gate follower task
    gate_watcher: Option<JoinHandle<()>>,
}

impl PlayerMount {
    /// Mount a player. Must run inside a tokio runtime.
    #[instrument(skip_all, fields(source = %props.source_url, content_id = %props.content_id))]
    pub fn mount(props: MountProps, collaborators: Collaborators) -> Result<Self> {
        props.validate()?;

        let id = SessionId::new();
        let trace = Arc::new(SessionTrace::new(id));
        let interaction = Arc::new(InteractionTracker::new());
        let consent = ConsentResolver::new(collaborators.consent.clone(), props.consent.clone());

        let coordinator = Arc::new(AdSessionCoordinator::new(
            props.session_config(),
            collaborators.engine.clone(),
            collaborators.surface.clone(),
            consent,
            interaction.clone(),
            trace.clone(),
        ));
        let orchestrator = Arc::new(PlaybackOrchestrator::new(
            coordinator,
            collaborators.surface.clone(),
            interaction.clone(),
            trace.clone(),
        ));

        let mut subscriptions = Self::wire_surface(&orchestrator, collaborators.surface.as_ref());
        interaction.arm(collaborators.container.as_ref());
        let gate_watcher = orchestrator.spawn_gate_watcher();

        let loader = collaborators.loader.clone();
        if loader.is_supported() {
            subscriptions.push(loader.on_ready(Self::ready_handler(&orchestrator)));
        }

        let mount = Self {
            id,
            props,
            orchestrator,
            interaction,
            trace,
            subscriptions,
            gate_watcher: Some(gate_watcher),
        };

        // A failed attach drops the mount, which releases everything wired above
        if loader.is_supported() {
            loader
                .attach(collaborators.surface.clone(), &mount.props.source_url)
                .map_err(|e| match e {
                    Error::StreamAttach { .. } | Error::StreamUnsupported => e,
                    other => Error::StreamAttach {
                        url: mount.props.source_url.to_string(),
                        reason: other.to_string(),
                    },
                })?;
        } else {
            let err = Error::StreamUnsupported;
            warn!(error = %err, code = err.error_code(), "Player stays idle");
        }

        info!(
            session_id = %mount.id,
            autoplay = mount.props.autoplay,
            mode = %mount.props.development_mode,
            "Player mounted"
        );
        Ok(mount)
    }

    fn wire_surface(
        orchestrator: &Arc<PlaybackOrchestrator>,
        surface: &dyn VideoSurface,
    ) -> Vec<Subscription> {
        let on_play = {
            let orchestrator = Arc::downgrade(orchestrator);
            surface.subscribe(
                SurfaceEventKind::Play,
                Arc::new(move |event: &SurfaceEvent| {
                    let (Some(orchestrator), SurfaceEvent::Play(attempt)) =
                        (orchestrator.upgrade(), event)
                    else {
                        return;
                    };
                    if orchestrator.intercept_play(attempt) == PlayVerdict::Deferred {
                        tokio::spawn(async move { orchestrator.start_ad_sequence().await });
                    }
                }),
            )
        };

        let on_playing = {
            let orchestrator = Arc::downgrade(orchestrator);
            surface.subscribe(
                SurfaceEventKind::Playing,
                Arc::new(move |_: &SurfaceEvent| {
                    if let Some(orchestrator) = orchestrator.upgrade() {
                        orchestrator.handle_playing();
                    }
                }),
            )
        };

        let on_ended = {
            let orchestrator = Arc::downgrade(orchestrator);
            surface.subscribe(
                SurfaceEventKind::Ended,
                Arc::new(move |_: &SurfaceEvent| {
                    if let Some(orchestrator) = orchestrator.upgrade() {
                        orchestrator.handle_ended();
                    }
                }),
            )
        };

        vec![on_play, on_playing, on_ended]
    }

    fn ready_handler(orchestrator: &Arc<PlaybackOrchestrator>) -> Arc<dyn Fn() + Send + Sync> {
        let orchestrator: Weak<PlaybackOrchestrator> = Arc::downgrade(orchestrator);
        Arc::new(move || {
            if let Some(orchestrator) = orchestrator.upgrade() {
                tokio::spawn(async move { orchestrator.handle_stream_ready().await });
            }
        })
    }

    /// Get session ID
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn props(&self) -> &MountProps {
        &self.props
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.orchestrator.phase()
    }

    pub fn orchestrator(&self) -> &Arc<PlaybackOrchestrator> {
        &self.orchestrator
    }

    pub fn coordinator(&self) -> &Arc<AdSessionCoordinator> {
        self.orchestrator.coordinator()
    }

    pub fn interaction(&self) -> &Arc<InteractionTracker> {
        &self.interaction
    }

    pub fn trace(&self) -> &Arc<SessionTrace> {
        &self.trace
    }

    /// Tear the player down
    pub fn unmount(self) {}

    fn teardown(&mut self) {
        self.orchestrator.deactivate();
        self.orchestrator.coordinator().teardown();
        self.interaction.disarm();
        let released = self.subscriptions.len();
        self.subscriptions.clear();
        if let Some(watcher) = self.gate_watcher.take() {
            watcher.abort();
        }
        debug!(released, "Player subscriptions released");
        info!(session_id = %self.id, "Player unmounted");
    }
}

impl Drop for PlayerMount {
    fn drop(&mut self) {
        self.teardown();
    }
}
