//! Plain-text rendering of dashboard state

use pipedash_core::{
    stage_states, AnalysisResults, AnalysisStatus, ModelDetails, RunState, StageList, StageState,
};
use pipedash_monitor::DashboardState;
use std::fmt::Write;

const BAR_WIDTH: usize = 30;

pub fn connection_badge(state: &DashboardState, forced: bool) -> String {
    if state.channel_lost {
        format!("⚠ Status stream lost ({}); :reconnect to retry", state.backend_url)
    } else if state.is_connected && !state.simulation_mode {
        format!("● Connected to {}", state.backend_url)
    } else if forced {
        "○ Simulation mode (forced)".to_string()
    } else if !state.probed {
        format!("… Checking {}", state.backend_url)
    } else {
        format!("○ Simulation mode ({} unreachable)", state.backend_url)
    }
}

pub fn progress_bar(progress: u8) -> String {
    let progress = progress.min(100) as usize;
    let filled = progress * BAR_WIDTH / 100;
    format!(
        "[{}{}] {:>3}%",
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled),
        progress
    )
}

fn stage_name<'a>(status: &AnalysisStatus, stages: &'a StageList) -> Option<&'a str> {
    let id = status.current_agent.as_deref()?;
    stages
        .position(id)
        .and_then(|i| stages.get(i))
        .map(|stage| stage.name.as_str())
}

/// One line per snapshot, suitable for a scrolling log
pub fn status_line(status: &AnalysisStatus, stages: &StageList) -> String {
    let mut line = format!(
        "{:<9} {}",
        status.status.to_string(),
        progress_bar(status.progress)
    );
    if let Some(name) = stage_name(status, stages) {
        let _ = write!(line, "  {}", name);
    }
    if let Some(error) = status.error.as_deref() {
        let _ = write!(line, "  {}", error);
    }
    line
}

fn stage_icon(state: StageState) -> &'static str {
    match state {
        StageState::Idle | StageState::Pending => "·",
        StageState::Active => "▶",
        StageState::Completed => "✓",
        StageState::Error => "✗",
    }
}

/// Stage-by-stage view of a snapshot
pub fn pipeline(status: &AnalysisStatus, stages: &StageList) -> String {
    let mut out = String::new();
    for (stage, state) in stage_states(status, stages) {
        let _ = writeln!(
            out,
            "  {} {:<24} {:<10} {}",
            stage_icon(state),
            stage.name,
            state.to_string(),
            stage.description
        );
    }
    if status.status == RunState::Error {
        let _ = writeln!(
            out,
            "  Error: {}",
            status.error.as_deref().unwrap_or("Analysis failed")
        );
    }
    out
}

pub fn stage_table(stages: &StageList) -> String {
    let mut out = String::new();
    for (index, stage) in stages.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. {:<24} {:<22} {:>5.1}s  {}",
            index + 1,
            stage.name,
            stage.id,
            stage.dwell.as_secs_f64(),
            stage.description
        );
    }
    out
}

fn section(out: &mut String, title: &str) {
    let _ = writeln!(out, "\n== {} ==", title);
}

/// Results tabs (answer, EDA, sources, model, logs) one after another
pub fn results(results: &AnalysisResults) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Query: {}", results.query);
    if let Some(seconds) = results.processing_time {
        let _ = writeln!(out, "Processing time: {:.1}s", seconds);
    }

    section(&mut out, "Answer");
    let _ = writeln!(out, "{}", results.final_answer.trim());

    if !results.eda_output.trim().is_empty() {
        section(&mut out, "EDA");
        let _ = writeln!(out, "{}", results.eda_output.trim());
    }

    section(&mut out, "Sources");
    let entries = results.scraped_data.entries();
    if entries.is_empty() {
        let _ = writeln!(out, "No sources");
    }
    for (index, entry) in entries.iter().enumerate() {
        let _ = writeln!(out, "{}. {}", index + 1, entry.replace('\n', " "));
    }

    if let Some(model) = &results.model_info {
        section(&mut out, "Model");
        match model {
            ModelDetails::Metrics(info) => {
                let _ = writeln!(out, "Type:     {}", info.model_type);
                let _ = writeln!(out, "Accuracy: {:.1}%", info.accuracy * 100.0);
                let _ = writeln!(out, "Features: {}", info.features_used);
            }
            ModelDetails::Summary(text) => {
                let _ = writeln!(out, "{}", text.trim());
            }
        }
    }

    if !results.agent_logs.is_empty() {
        section(&mut out, "Logs");
        for entry in &results.agent_logs {
            let _ = writeln!(
                out,
                "{} {:<22} {:<10} {}",
                entry.timestamp.format("%H:%M:%S"),
                entry.agent,
                entry.status,
                entry.action
            );
        }
    }

    out
}
