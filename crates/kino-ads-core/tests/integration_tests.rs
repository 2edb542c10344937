//! Integration tests for Kino Ads Core

use kino_ads_core::{
    sim::{
        settle, AdScript, ScriptedAdEngine, SimContainer, SimStreamLoader, SimSurface,
        StaticConsentProvider,
    },
    AdEvent, Collaborators, ConsentState, DevelopmentMode, Error, GestureKind, MountProps,
    PlaybackPhase, PlayerMount, TcData, TraceEvent, VideoSurface,
};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};
use url::Url;

const STREAM_URL: &str = "https://test-streams.mux.dev/x36xhzz/x36xhzz.m3u8";

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    surface: Arc<SimSurface>,
    loader: Arc<SimStreamLoader>,
    engine: Arc<ScriptedAdEngine>,
    container: Arc<SimContainer>,
    consent: Option<Arc<StaticConsentProvider>>,
}

impl Harness {
    fn new(script: AdScript) -> Self {
        Self::with_surface(script, SimSurface::new())
    }

    fn with_surface(script: AdScript, surface: SimSurface) -> Self {
        Self {
            surface: Arc::new(surface),
            loader: Arc::new(SimStreamLoader::new()),
            engine: Arc::new(ScriptedAdEngine::new(script)),
            container: Arc::new(SimContainer::new()),
            consent: None,
        }
    }

    fn with_consent(mut self, provider: StaticConsentProvider) -> Self {
        self.consent = Some(Arc::new(provider));
        self
    }

    fn collaborators(&self) -> Collaborators {
        Collaborators {
            surface: self.surface.clone(),
            loader: self.loader.clone(),
            engine: self.engine.clone(),
            consent: self
                .consent
                .clone()
                .map(|c| c as Arc<dyn kino_ads_core::ConsentProvider>),
            container: self.container.clone(),
        }
    }

    fn mount(&self, props: MountProps) -> PlayerMount {
        PlayerMount::mount(props, self.collaborators()).unwrap()
    }

    /// Parse the manifest and let the ready path run
    async fn stream_ready(&self) {
        assert!(self.loader.finish_parsing());
        settle().await;
    }

    /// Replay the next queued engine step
    async fn advance(&self) {
        assert!(self.engine.advance());
        settle().await;
    }
}

fn props() -> MountProps {
    MountProps::new(Url::parse(STREAM_URL).unwrap())
}

// =============================================================================
// Autoplay path
// =============================================================================

#[tokio::test]
async fn test_autoplay_fake_preroll_resumes_content_once() {
    let h = Harness::new(AdScript::preroll());
    let mount = h.mount(
        props()
            .with_autoplay(true)
            .with_development_mode(DevelopmentMode::Fake)
            .with_content_id("x8iio7y"),
    );
    assert_eq!(mount.phase(), PlaybackPhase::Idle);

    h.stream_ready().await;

    assert!(h.surface.is_muted());
    assert!(mount.interaction().has_interacted());
    assert_eq!(h.engine.initialize_calls(), 1);
    assert_eq!(h.engine.load_calls(), 1);

    let (state, options) = h.engine.last_request().unwrap();
    assert!(options.use_fake_ad);
    assert_eq!(options.vmap_url, "");
    assert_eq!(state.video.id, "x8iio7y");
    assert!(state.video.is_autoplay);

    // preroll on screen: content held back
    assert!(mount.coordinator().gate().is_ad_occupying());
    assert_eq!(h.surface.play_calls(), 0);
    assert_eq!(mount.phase(), PlaybackPhase::AdPlaying);

    // ad-end
    h.advance().await;
    assert_eq!(h.surface.play_calls(), 0);

    // content-resume-requested, ad-break-end, position reset
    while h.engine.advance() {}
    settle().await;

    assert_eq!(h.surface.play_calls(), 1);
    assert_eq!(mount.trace().content_plays(), 1);
    assert!(!h.surface.is_paused());
    assert_eq!(mount.phase(), PlaybackPhase::ContentPlaying);
}

#[tokio::test]
async fn test_autoplay_without_ads_starts_content() {
    let h = Harness::new(AdScript::empty());
    let mount = h.mount(props().with_autoplay(true));
    h.stream_ready().await;

    assert!(mount.coordinator().is_sequence_loaded());
    assert_eq!(h.surface.play_calls(), 1);
    assert_eq!(mount.phase(), PlaybackPhase::ContentPlaying);
}

#[tokio::test]
async fn test_ad_error_during_load_falls_back_to_content() {
    let h = Harness::new(AdScript::ad_error());
    let mount = h.mount(props().with_autoplay(true));
    h.stream_ready().await;

    assert!(mount.coordinator().is_sequence_loaded());
    assert!(!mount.coordinator().gate().is_ad_occupying());
    assert_eq!(h.surface.play_calls(), 1);
    assert!(!h.surface.is_paused());

    let events = mount.trace().events();
    assert!(events.iter().any(|e| matches!(e, TraceEvent::FailOpen { code, .. } if code == "AD_DELIVERY")));
    assert!(events.contains(&TraceEvent::SequenceLoaded { fallback: true }));
    assert!(!events.contains(&TraceEvent::SequenceLoaded { fallback: false }));
}

#[tokio::test]
async fn test_initialization_failure_never_strands_viewer() {
    let h = Harness::new(AdScript::preroll());
    h.engine.fail_initialize("ad sdk blocked by extension");
    let mount = h.mount(props().with_autoplay(true));
    h.stream_ready().await;

    assert_eq!(h.engine.load_calls(), 0);
    assert!(mount.coordinator().is_sequence_loaded());
    assert_eq!(h.surface.play_calls(), 1);
    assert_eq!(mount.phase(), PlaybackPhase::ContentPlaying);
}

// =============================================================================
// User gesture path
// =============================================================================

#[tokio::test]
async fn test_user_play_waits_for_ad_break_end() {
    let h = Harness::new(AdScript::no_ads());
    let mount = h.mount(props());
    h.stream_ready().await;

    assert_eq!(mount.phase(), PlaybackPhase::StreamReady);
    assert_eq!(h.engine.initialize_calls(), 0);

    // the click is cancelled at the source
    assert_err!(h.surface.user_play());
    assert!(h.surface.is_paused());
    assert!(mount.interaction().has_interacted());
    settle().await;

    assert_eq!(h.engine.initialize_calls(), 1);
    assert_eq!(h.engine.load_calls(), 1);
    assert!(mount.coordinator().gate().is_ad_occupying());
    assert_eq!(h.surface.play_calls(), 0);

    // ad-break-end without any ad
    h.advance().await;

    assert_eq!(h.surface.play_calls(), 1);
    assert!(!h.surface.is_paused());
    assert_eq!(mount.phase(), PlaybackPhase::ContentPlaying);
}

#[tokio::test]
async fn test_user_play_waits_for_preroll_content_resume() {
    let h = Harness::new(AdScript::preroll());
    let mount = h.mount(props());
    h.stream_ready().await;

    assert_err!(h.surface.user_play());
    settle().await;
    assert!(mount.coordinator().gate().is_ad_occupying());
    assert_eq!(mount.phase(), PlaybackPhase::AdPlaying);

    // ad-end clears the gate but the break is still a preroll
    h.advance().await;
    assert!(!mount.coordinator().gate().is_ad_occupying());
    assert_eq!(h.surface.play_calls(), 0);
    assert!(h.surface.is_paused());

    while h.engine.advance() {}
    settle().await;

    assert_eq!(h.surface.play_calls(), 1);
    assert_eq!(mount.trace().content_plays(), 1);
    assert!(!h.surface.is_paused());
    assert_eq!(mount.phase(), PlaybackPhase::ContentPlaying);
}

#[tokio::test]
async fn test_user_play_holds_through_preroll_pod() {
    let h = Harness::new(AdScript::preroll_pod());
    let mount = h.mount(props());
    h.stream_ready().await;

    assert_err!(h.surface.user_play());
    settle().await;
    assert!(mount.coordinator().gate().is_ad_occupying());

    // first ad-end: the gap before the second ad
    h.advance().await;
    assert_eq!(h.surface.play_calls(), 0);
    assert!(h.surface.is_paused());

    // ad-load, ad-start
    h.advance().await;
    h.advance().await;
    assert!(mount.coordinator().gate().is_ad_occupying());
    assert!(h.surface.is_paused());
    assert_eq!(mount.phase(), PlaybackPhase::AdPlaying);

    // ad-play, second ad-end
    h.advance().await;
    h.advance().await;
    assert_eq!(h.surface.play_calls(), 0);
    assert!(h.surface.is_paused());

    // content-resume-requested
    h.advance().await;
    assert_eq!(h.surface.play_calls(), 1);

    // ad-break-end, position reset
    while h.engine.advance() {}
    settle().await;

    assert_eq!(h.surface.play_calls(), 1);
    assert_eq!(mount.trace().content_plays(), 1);
    assert!(!h.surface.is_paused());
    assert_eq!(mount.phase(), PlaybackPhase::ContentPlaying);
}

#[tokio::test]
async fn test_play_under_ad_never_reaches_surface() {
    let h = Harness::new(AdScript::preroll());
    let mount = h.mount(props().with_autoplay(true));
    h.stream_ready().await;
    assert!(mount.coordinator().gate().is_ad_occupying());

    for _ in 0..3 {
        assert_err!(h.surface.user_play());
    }
    settle().await;

    assert!(h.surface.is_paused());
    assert_eq!(h.surface.play_calls(), 0);
    let cancelled = mount
        .trace()
        .events()
        .into_iter()
        .filter(|e| matches!(e, TraceEvent::PlayCancelled { .. }))
        .count();
    assert_eq!(cancelled, 3);
}

#[tokio::test]
async fn test_repeated_clicks_while_loading_start_one_session() {
    let h = Harness::new(AdScript::no_ads());
    let _mount = h.mount(props());
    h.stream_ready().await;

    assert_err!(h.surface.user_play());
    assert_err!(h.surface.user_play());
    settle().await;

    assert_eq!(h.engine.initialize_calls(), 1);
    assert_eq!(h.engine.load_calls(), 1);
    assert_eq!(h.engine.handler_count(), 10);
}

#[tokio::test]
async fn test_blocked_autoplay_waits_for_next_gesture() {
    let h = Harness::with_surface(AdScript::empty(), SimSurface::new().with_autoplay_policy());
    let mount = h.mount(props());
    h.stream_ready().await;

    assert_err!(h.surface.user_play());
    settle().await;

    // the deferred resume is a programmatic unmuted play: rejected
    assert_eq!(h.surface.play_calls(), 1);
    assert!(h.surface.is_paused());
    assert!(mount.coordinator().is_sequence_loaded());
    assert!(!mount.coordinator().gate().is_ad_occupying());

    assert_ok!(h.surface.user_play());
    settle().await;
    assert!(!h.surface.is_paused());
    assert_eq!(mount.phase(), PlaybackPhase::ContentPlaying);
}

#[tokio::test]
async fn test_gesture_listeners_disarm_after_first_firing() {
    let h = Harness::new(AdScript::empty());
    let mount = h.mount(props());
    assert_eq!(h.container.handler_count(), 3);

    assert_eq!(h.container.gesture(GestureKind::TouchStart), 1);
    assert!(mount.interaction().has_interacted());
    assert_eq!(h.container.gesture(GestureKind::TouchStart), 0);
    assert_eq!(h.container.handler_count(), 2);
}

// =============================================================================
// Postroll
// =============================================================================

#[tokio::test]
async fn test_postroll_does_not_resume_content() {
    let h = Harness::new(AdScript::postroll());
    let mount = h.mount(props().with_autoplay(true));
    h.stream_ready().await;
    assert_eq!(h.surface.play_calls(), 1);

    h.surface.end_content();
    settle().await;
    assert_eq!(mount.phase(), PlaybackPhase::Ended);

    // position, ad-break-start
    h.advance().await;
    h.advance().await;
    assert_eq!(mount.phase(), PlaybackPhase::AdPlaying);

    while h.engine.advance() {}
    settle().await;

    assert_eq!(h.surface.play_calls(), 1);
    assert!(h.surface.is_paused());
    assert!(!mount.coordinator().gate().is_ad_occupying());
    assert_eq!(mount.phase(), PlaybackPhase::Ended);
}

#[tokio::test]
async fn test_postroll_ad_end_keeps_phase_until_break_clears() {
    let h = Harness::new(AdScript::postroll());
    let mount = h.mount(props().with_autoplay(true));
    h.stream_ready().await;
    h.surface.end_content();
    settle().await;

    // position, ad-break-start, content-pause, ad-start, ad-end
    for _ in 0..5 {
        h.advance().await;
    }
    assert!(mount.coordinator().gate().is_ad_occupying());
    assert_eq!(mount.phase(), PlaybackPhase::AdPlaying);

    // content-resume-requested
    h.advance().await;
    assert_eq!(mount.phase(), PlaybackPhase::Ended);
    assert_eq!(h.surface.play_calls(), 1);
}

// =============================================================================
// Consent
// =============================================================================

#[tokio::test]
async fn test_absent_consent_transport_sends_default() {
    let h = Harness::new(AdScript::empty());
    let _mount = h.mount(props().with_autoplay(true));
    h.stream_ready().await;

    let (state, _) = h.engine.last_request().unwrap();
    assert_eq!(state.consent, ConsentState::default());
    assert_eq!(state.consent.tcf_consent, "");
    assert!(!state.consent.has_consent_for_google);
    assert!(!state.consent.has_consent_for_dailymotion);
    assert!(!state.consent.is_gdpr_applicable);
}

#[tokio::test]
async fn test_consent_reaches_sequence_request() {
    let data: TcData = serde_json::from_str(
        r#"{
            "tcString": "CPyJ0AAPyJ0AAAHABBENCZCsAP_AAH_AAAqIJNNX",
            "gdprApplies": true,
            "vendor": { "consents": { "755": true, "573": true } }
        }"#,
    )
    .unwrap();
    let h = Harness::new(AdScript::empty()).with_consent(StaticConsentProvider::new(data, true));
    let _mount = h.mount(props().with_autoplay(true));
    h.stream_ready().await;

    let (state, _) = h.engine.last_request().unwrap();
    assert_eq!(state.consent.tcf_consent, "CPyJ0AAPyJ0AAAHABBENCZCsAP_AAH_AAAqIJNNX");
    assert!(state.consent.has_consent_for_google);
    assert!(state.consent.has_consent_for_dailymotion);
    assert!(state.consent.is_gdpr_applicable);
    assert_eq!(h.consent.as_ref().unwrap().calls(), 1);
}

#[tokio::test]
async fn test_custom_vmap_source_reaches_engine() {
    let vmap = Url::parse("https://ads.example.com/vmap/preroll.xml").unwrap();
    let h = Harness::new(AdScript::empty());
    let _mount = h.mount(
        props()
            .with_autoplay(true)
            .with_development_mode(DevelopmentMode::CustomSource { url: vmap }),
    );
    h.stream_ready().await;

    let (_, options) = h.engine.last_request().unwrap();
    assert!(!options.use_fake_ad);
    assert_eq!(options.vmap_url, "https://ads.example.com/vmap/preroll.xml");
}

// =============================================================================
// Mount lifecycle
// =============================================================================

#[tokio::test]
async fn test_unmount_releases_every_subscription() {
    let h = Harness::new(AdScript::preroll());
    let mount = h.mount(props().with_autoplay(true));
    h.stream_ready().await;

    assert!(h.engine.handler_count() > 0);
    assert!(h.surface.handler_count() > 0);
    assert!(h.loader.handler_count() > 0);
    assert!(h.container.handler_count() > 0);

    mount.unmount();

    assert_eq!(h.engine.handler_count(), 0);
    assert_eq!(h.surface.handler_count(), 0);
    assert_eq!(h.loader.handler_count(), 0);
    assert_eq!(h.container.handler_count(), 0);

    // engine events after teardown reach nobody
    assert_eq!(h.engine.emit(AdEvent::ContentResumeRequested), 0);
    assert_eq!(h.surface.play_calls(), 0);
}

#[tokio::test]
async fn test_remount_starts_fresh() {
    let h = Harness::new(AdScript::empty());
    let first = h.mount(props().with_autoplay(true));
    h.stream_ready().await;
    assert!(first.coordinator().is_sequence_loaded());
    first.unmount();

    let second = h.mount(props().with_content_id("x8j2k1m"));
    assert_eq!(second.phase(), PlaybackPhase::Idle);
    assert!(!second.coordinator().is_initialized());
    assert!(!second.coordinator().is_sequence_loaded());
    assert!(!second.interaction().has_interacted());
    assert_eq!(second.coordinator().config().video_id, "x8j2k1m");
}

#[tokio::test]
async fn test_unsupported_loader_stays_idle() {
    let h = Harness {
        loader: Arc::new(SimStreamLoader::unsupported()),
        ..Harness::new(AdScript::empty())
    };
    let mount = h.mount(props().with_autoplay(true));

    assert!(h.loader.attached_source().is_none());
    assert!(!h.loader.finish_parsing());
    settle().await;
    assert_eq!(mount.phase(), PlaybackPhase::Idle);
    assert_eq!(h.engine.initialize_calls(), 0);
}

#[tokio::test]
async fn test_attach_failure_releases_the_mount() {
    let h = Harness {
        loader: Arc::new(SimStreamLoader::failing("media source closed")),
        ..Harness::new(AdScript::empty())
    };

    let Some(err) = PlayerMount::mount(props(), h.collaborators()).err() else {
        panic!("mount succeeded with a failing loader");
    };
    match &err {
        Error::StreamAttach { url, reason } => {
            assert_eq!(url, STREAM_URL);
            assert!(reason.contains("media source closed"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!err.is_recoverable());
    assert_eq!(err.error_code(), "STREAM_ATTACH");

    assert_eq!(h.surface.handler_count(), 0);
    assert_eq!(h.loader.handler_count(), 0);
    assert_eq!(h.container.handler_count(), 0);
}

#[tokio::test]
async fn test_invalid_props_are_rejected() {
    let h = Harness::new(AdScript::empty());
    let result = PlayerMount::mount(props().with_content_id(" "), h.collaborators());
    assert_eq!(result.err().map(|e| e.error_code()), Some("INVALID_CONFIG"));
}

#[test]
fn test_surface_trait_object() {
    let surface: Arc<dyn VideoSurface> = Arc::new(SimSurface::new());
    surface.set_muted(true);
    assert!(surface.is_muted());
    assert!(surface.is_paused());
}
