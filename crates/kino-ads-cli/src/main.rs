//! Kino Ads CLI - Scripted Ad Session Runner
//!
//! Features:
//! - Run a player mount against a scripted ad engine and print its decision trace
//! - Resolve a TCF `getTCData` document into the consent tuple sent with ad requests

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod output;

/// Kino Ads CLI - Ad break coordination toolkit
#[derive(Parser)]
#[command(name = "kino-ads")]
#[command(author = "Purple Squirrel Media")]
#[command(version)]
#[command(about = "Simulate ad sessions and inspect consent payloads", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json, table)
    #[arg(short, long, default_value = "text")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mount a simulated player and replay an ad scenario
    Simulate(SimulateArgs),

    /// Resolve a TCF data document into a consent state
    Consent {
        /// Path to a getTCData JSON document
        input: PathBuf,

        /// Treat the CMP round trip as unsuccessful
        #[arg(long)]
        failed: bool,
    },
}

#[derive(Args)]
pub struct SimulateArgs {
    /// Stream manifest URL
    #[arg(short, long, default_value = commands::DEFAULT_STREAM)]
    pub source: String,

    /// Start muted without waiting for a play click
    #[arg(short, long)]
    pub autoplay: bool,

    /// Ask the engine for fake ads
    #[arg(long)]
    pub fake: bool,

    /// Custom VMAP document URL (ignored with --fake)
    #[arg(long)]
    pub vmap_url: Option<String>,

    /// Content identifier
    #[arg(short, long, default_value = kino_ads_core::config::DEFAULT_VIDEO_ID)]
    pub content_id: String,

    /// Ad scenario (empty, no-ads, preroll, preroll-pod, ad-error, load-failure, postroll)
    #[arg(long, default_value = "preroll")]
    pub scenario: String,

    /// Mount props JSON file; overrides the source and ad flags
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// getTCData JSON document served by the consent provider
    #[arg(long)]
    pub consent: Option<PathBuf>,

    /// Reject unmuted programmatic plays like a browser autoplay policy
    #[arg(long)]
    pub block_autoplay: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_writer(std::io::stderr)
        .init();

    kino_ads_core::init();

    match cli.command {
        Commands::Simulate(args) => {
            commands::simulate(args, &cli.format).await?;
        }
        Commands::Consent { input, failed } => {
            commands::consent(&input, !failed, &cli.format).await?;
        }
    }

    Ok(())
}
