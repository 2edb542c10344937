//! CLI command implementations

use crate::output::{self, SimulationReport};
use crate::SimulateArgs;
use anyhow::{anyhow, Context};
use kino_ads_core::{
    config::ConsentSettings,
    sim::{
        settle, AdScript, ScriptStep, ScriptedAdEngine, SimContainer, SimStreamLoader,
        SimSurface, StaticConsentProvider,
    },
    AdPosition, Collaborators, ConsentProvider, ConsentResolver, DevelopmentMode, MountProps,
    PlayerMount, TcData, VideoSurface,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

/// Public HLS test stream
pub const DEFAULT_STREAM: &str = "https://test-streams.mux.dev/x36xhzz/x36xhzz.m3u8";

fn read_tc_data(path: &Path) -> anyhow::Result<TcData> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading consent document {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing consent document {}", path.display()))
}

fn mount_props(args: &SimulateArgs) -> anyhow::Result<MountProps> {
    if let Some(path) = &args.config {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading mount config {}", path.display()))?;
        return Ok(MountProps::from_json(&raw)?);
    }

    let mode = DevelopmentMode::resolve(args.fake, args.vmap_url.as_deref())?;
    let props = MountProps::new(Url::parse(&args.source)?)
        .with_autoplay(args.autoplay)
        .with_development_mode(mode)
        .with_content_id(args.content_id.as_str());
    props.validate()?;
    Ok(props)
}

/// Run a scripted ad session and print its trace
pub async fn simulate(args: SimulateArgs, format: &str) -> anyhow::Result<()> {
    let script = AdScript::named(&args.scenario).ok_or_else(|| {
        anyhow!(
            "unknown scenario '{}', expected one of: {}",
            args.scenario,
            AdScript::NAMES.join(", ")
        )
    })?;
    let props = mount_props(&args)?;

    let surface = Arc::new(if args.block_autoplay {
        SimSurface::new().with_autoplay_policy()
    } else {
        SimSurface::new()
    });
    let loader = Arc::new(SimStreamLoader::new());
    let engine = Arc::new(ScriptedAdEngine::new(script));
    let consent = match &args.consent {
        Some(path) => {
            let provider = StaticConsentProvider::new(read_tc_data(path)?, true);
            Some(Arc::new(provider) as Arc<dyn ConsentProvider>)
        }
        None => None,
    };

    let mount = PlayerMount::mount(
        props,
        Collaborators {
            surface: surface.clone(),
            loader: loader.clone(),
            engine: engine.clone(),
            consent,
            container: Arc::new(SimContainer::new()),
        },
    )?;

    info!(scenario = %args.scenario, "Manifest parsed");
    loader.finish_parsing();
    settle().await;

    if !mount.props().autoplay {
        info!("Viewer presses play");
        if let Err(e) = surface.user_play() {
            debug!(error = %e, "Play attempt intercepted");
        }
        settle().await;
    }

    // Content must reach its end before a postroll break opens
    while let Some(step) = engine.peek_step() {
        if step == ScriptStep::Position(AdPosition::Postroll) && !surface.is_paused() {
            info!("Content reached its end");
            surface.end_content();
            settle().await;
        }
        engine.advance();
        settle().await;
    }

    if !surface.is_paused() {
        info!("Content reached its end");
        surface.end_content();
        settle().await;
    }

    let report = SimulationReport {
        session_id: mount.id(),
        scenario: args.scenario,
        phase: mount.phase(),
        content_plays: mount.trace().content_plays(),
        surface_commands: surface.commands(),
        trace: mount.trace().records(),
    };
    mount.unmount();

    println!("{}", output::render_report(&report, format));
    Ok(())
}

/// Resolve a TCF data document into the consent tuple
pub async fn consent(input: &Path, success: bool, format: &str) -> anyhow::Result<()> {
    let provider = StaticConsentProvider::new(read_tc_data(input)?, success);
    let resolver = ConsentResolver::new(Some(Arc::new(provider)), ConsentSettings::default());
    let state = resolver.resolve().await;

    println!("{}", output::render_consent(&state, format));
    Ok(())
}
