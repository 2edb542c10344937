//! Output formatting for CLI

use console::style;
use kino_ads_core::{
    sim::SurfaceCommand, ConsentState, PlaybackPhase, SessionId, TraceEvent, TraceRecord,
};
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format options
pub enum OutputFormat {
    Text,
    Json,
    Table,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "table" => OutputFormat::Table,
            _ => OutputFormat::Text,
        }
    }
}

/// Outcome of one simulated session
#[derive(Serialize)]
pub struct SimulationReport {
    pub session_id: SessionId,
    pub scenario: String,
    pub phase: PlaybackPhase,
    pub content_plays: usize,
    pub surface_commands: Vec<SurfaceCommand>,
    pub trace: Vec<TraceRecord>,
}

#[derive(Tabled)]
struct TraceRow {
    #[tabled(rename = "#")]
    sequence: u64,
    time: String,
    event: &'static str,
    detail: String,
}

fn describe(event: &TraceEvent) -> (&'static str, String) {
    match event {
        TraceEvent::AdEvent { kind, position } => ("ad_event", format!("{kind:?} at {position}")),
        TraceEvent::Gate { state } => ("gate", format!("{state:?}")),
        TraceEvent::Phase { from, to } => ("phase", format!("{from} -> {to}")),
        TraceEvent::ContentPlay { reason } => ("content_play", reason.clone()),
        TraceEvent::ContentPause { reason } => ("content_pause", reason.clone()),
        TraceEvent::PlayCancelled { reason } => ("play_cancelled", reason.clone()),
        TraceEvent::EngineInitialized => ("engine_initialized", String::new()),
        TraceEvent::SequenceLoaded { fallback } => (
            "sequence_loaded",
            if *fallback { "fallback".to_string() } else { String::new() },
        ),
        TraceEvent::FailOpen { code, message } => ("fail_open", format!("{code}: {message}")),
    }
}

fn rows(trace: &[TraceRecord]) -> Vec<TraceRow> {
    trace
        .iter()
        .map(|record| {
            let (event, detail) = describe(&record.event);
            TraceRow {
                sequence: record.sequence,
                time: record.timestamp.format("%H:%M:%S%.3f").to_string(),
                event,
                detail,
            }
        })
        .collect()
}

/// Format a simulation report
pub fn render_report(report: &SimulationReport, format: &str) -> String {
    match OutputFormat::from(format) {
        OutputFormat::Json => format_json(report),
        OutputFormat::Table => Table::new(rows(&report.trace)).to_string(),
        OutputFormat::Text => {
            let mut out = format!(
                "{} {} ({})\n",
                style("Session").bold(),
                report.session_id,
                report.scenario
            );
            for row in rows(&report.trace) {
                let event = match row.event {
                    "fail_open" | "play_cancelled" => style(row.event).yellow(),
                    "content_play" => style(row.event).green(),
                    _ => style(row.event).cyan(),
                };
                out.push_str(&format!(
                    "  {:>3}  {}  {:<20} {}\n",
                    row.sequence, row.time, event, row.detail
                ));
            }
            out.push_str(&format!(
                "\nFinal phase: {}\nContent plays: {}\nSurface commands: {}",
                report.phase,
                report.content_plays,
                report.surface_commands.len()
            ));
            out
        }
    }
}

/// Format a resolved consent state
pub fn render_consent(state: &ConsentState, format: &str) -> String {
    match OutputFormat::from(format) {
        OutputFormat::Json => format_json(state),
        OutputFormat::Table | OutputFormat::Text => {
            let tc_string = if state.tcf_consent.is_empty() {
                "(none)"
            } else {
                state.tcf_consent.as_str()
            };
            format!(
                "TC string:          {}\nGDPR applies:       {}\nGoogle (755):       {}\nDailymotion (573):  {}",
                tc_string,
                state.is_gdpr_applicable,
                state.has_consent_for_google,
                state.has_consent_for_dailymotion
            )
        }
    }
}

fn format_json<T: Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
}
