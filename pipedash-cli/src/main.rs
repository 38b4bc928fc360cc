//! pipedash
//!
//! Terminal dashboard for the multi-agent analysis backend:
//! - `run`: submit one query and follow it to completion
//! - `watch`: interactive session reading queries from stdin
//! - `health`: probe the backend once
//! - `stages`: list the pipeline stages

use anyhow::{bail, Result};
use clap::Parser;
use pipedash_client::ApiClient;
use pipedash_core::{RunState, Settings, StageList, Transport};
use pipedash_monitor::{AnalysisMonitor, DashboardState, MonitorEvent, MonitorHandle};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

mod render;

#[derive(Parser, Debug)]
#[command(name = "pipedash")]
#[command(about = "Follow multi-agent analysis runs from the terminal")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Backend base URL (overrides config and environment)
    #[arg(long, global = true)]
    backend_url: Option<String>,

    /// Live status transport: stream or poll
    #[arg(long, global = true)]
    transport: Option<Transport>,

    /// Always use the local simulator
    #[arg(long, global = true)]
    simulate: bool,

    /// Settings file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Machine-readable output and JSON logs
    #[arg(long, global = true)]
    json: bool,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run one analysis and follow it to completion
    Run {
        /// Query text
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },
    /// Check whether the backend is reachable
    Health,
    /// List the pipeline stages
    Stages,
    /// Read queries from stdin; `:reconnect` and `:quit` are commands
    Watch,
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("pipedash=info".parse()?)
        .add_directive("pipedash_monitor=warn".parse()?)
        .add_directive("pipedash_client=warn".parse()?);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn load_settings(args: &Args) -> Result<Settings> {
    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(url) = &args.backend_url {
        settings.backend.url = Some(url.clone());
    }
    if let Some(transport) = args.transport {
        settings.stream.transport = transport;
    }
    if args.simulate {
        settings.simulation.force = true;
    }
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    // /etc/pipedash/environment or .env, if present
    let env_file = pipedash_core::config::load_environment();

    let args = Args::parse();
    init_tracing(args.json)?;
    if let Some(path) = env_file {
        debug!(path = %path.display(), "Environment file applied");
    }

    let settings = load_settings(&args)?;

    match &args.command {
        Commands::Stages => stages(args.json),
        Commands::Health => health(&settings, args.json).await,
        Commands::Run { query } => run(settings, &query.join(" "), args.json).await,
        Commands::Watch => watch(settings, args.json).await,
    }
}

fn stages(json: bool) -> Result<()> {
    let stages = StageList::default_pipeline();
    if json {
        let list: Vec<_> = stages.iter().collect();
        println!("{}", serde_json::to_string_pretty(&list)?);
    } else {
        print!("{}", render::stage_table(&stages));
    }
    Ok(())
}

async fn health(settings: &Settings, json: bool) -> Result<()> {
    let client = ApiClient::from_settings(settings)?;
    let result = client.health().await;

    if json {
        let body = match &result {
            Ok(health) => json!({
                "backend_url": client.base_url(),
                "connected": true,
                "status": health.status,
                "service": health.service,
                "pipeline_running": health.pipeline_running,
            }),
            Err(e) => json!({
                "backend_url": client.base_url(),
                "connected": false,
                "error": e.to_string(),
            }),
        };
        println!("{}", serde_json::to_string_pretty(&body)?);
    }

    match result {
        Ok(health) => {
            if !json {
                println!(
                    "● {} is healthy ({})",
                    client.base_url(),
                    health.service.as_deref().unwrap_or("unknown service")
                );
            }
            Ok(())
        }
        Err(e) => bail!("Backend {} unreachable: {}", client.base_url(), e),
    }
}

fn spawn_monitor(settings: Settings) -> Result<MonitorHandle> {
    let client = ApiClient::from_settings(&settings)?;
    Ok(AnalysisMonitor::spawn(settings, client))
}

/// Wait for the startup probe so the first run picks the right source
async fn wait_probed(handle: &MonitorHandle, timeout: Duration) -> DashboardState {
    match tokio::time::timeout(timeout, handle.wait_for(|s| s.probed)).await {
        Ok(Ok(state)) => state,
        _ => {
            warn!("Startup health check did not finish in time");
            handle.snapshot()
        }
    }
}

fn state_json(state: &DashboardState) -> serde_json::Value {
    json!({
        "backend_url": state.backend_url,
        "is_connected": state.is_connected,
        "simulation_mode": state.simulation_mode,
        "run_active": state.run_active,
        "channel_lost": state.channel_lost,
        "source": state.source.map(|s| s.to_string()),
        "status": state.status,
        "results": state.results,
    })
}

fn event_json(event: &MonitorEvent) -> serde_json::Value {
    match event {
        MonitorEvent::RunStarted { run_id, source } => {
            json!({"event": "run_started", "run_id": run_id, "source": source.to_string()})
        }
        MonitorEvent::Status(status) => json!({"event": "status", "status": status}),
        MonitorEvent::Results(results) => json!({"event": "results", "results": results}),
        MonitorEvent::Connection {
            connected,
            simulation_mode,
        } => json!({
            "event": "connection",
            "connected": connected,
            "simulation_mode": simulation_mode,
        }),
        MonitorEvent::RunEnded { run_id } => json!({"event": "run_ended", "run_id": run_id}),
        MonitorEvent::ChannelLost { run_id } => json!({"event": "channel_lost", "run_id": run_id}),
    }
}

/// Print one event. Returns true when it ends a run or loses its status stream.
fn print_event(event: &MonitorEvent, stages: &StageList, handle: &MonitorHandle, json: bool) -> bool {
    if json {
        println!("{}", event_json(event));
        return matches!(
            event,
            MonitorEvent::RunEnded { .. } | MonitorEvent::ChannelLost { .. }
        );
    }

    match event {
        MonitorEvent::RunStarted { source, .. } => println!("Starting analysis ({})", source),
        MonitorEvent::Status(status) if status.status != RunState::Idle => {
            println!("{}", render::status_line(status, stages));
        }
        MonitorEvent::Status(_) | MonitorEvent::Results(_) => {}
        MonitorEvent::Connection { .. } => {
            println!("{}", render::connection_badge(&handle.snapshot(), false));
        }
        MonitorEvent::RunEnded { .. } => {
            let state = handle.snapshot();
            print!("\n{}", render::pipeline(&state.status, stages));
            if let Some(results) = &state.results {
                println!("{}", render::results(results));
            }
            return true;
        }
        MonitorEvent::ChannelLost { .. } => {
            let state = handle.snapshot();
            println!("{}", render::connection_badge(&state, false));
            println!("Last status: {}", render::status_line(&state.status, stages));
            return true;
        }
    }
    false
}

async fn run(settings: Settings, query: &str, json: bool) -> Result<()> {
    let forced = settings.simulation.force;
    let probe_budget = settings.health_timeout() + Duration::from_secs(1);
    let handle = spawn_monitor(settings)?;
    let stages = StageList::default_pipeline();

    if !forced {
        wait_probed(&handle, probe_budget).await;
    }
    if !json {
        println!("{}", render::connection_badge(&handle.snapshot(), forced));
    }

    let mut events = handle.subscribe();
    if !handle.start_analysis(query).await? {
        bail!("Query is empty");
    }
    info!(query = %query, "Analysis submitted");

    loop {
        match events.recv().await {
            Ok(event) => {
                if print_event(&event, &stages, &handle, json) {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Dropped monitor events");
            }
            Err(broadcast::error::RecvError::Closed) => bail!("Monitor stopped unexpectedly"),
        }
    }

    let state = handle.snapshot();
    handle.shutdown().await;

    if json {
        println!("{}", state_json(&state));
    }

    if state.channel_lost {
        bail!(
            "Status stream lost; last status: {} ({}%)",
            state.status.status,
            state.status.progress
        );
    }

    match state.status.status {
        RunState::Completed => Ok(()),
        RunState::Error => bail!(
            "Analysis failed: {}",
            state.status.error.as_deref().unwrap_or("Analysis failed")
        ),
        other => bail!("Analysis ended without a result (last status: {})", other),
    }
}

async fn watch(settings: Settings, json: bool) -> Result<()> {
    let forced = settings.simulation.force;
    let handle = spawn_monitor(settings)?;
    let stages = StageList::default_pipeline();
    let mut events = handle.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    if !json {
        println!("{}", render::connection_badge(&handle.snapshot(), forced));
        println!("Enter a query, :reconnect or :quit");
    }

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match line.trim() {
                    ":quit" | ":q" => break,
                    ":reconnect" => handle.reconnect().await?,
                    ":status" => {
                        let state = handle.snapshot();
                        if json {
                            println!("{}", state_json(&state));
                        } else {
                            println!("{}", render::connection_badge(&state, forced));
                            print!("{}", render::pipeline(&state.status, &stages));
                        }
                    }
                    query => {
                        if !handle.start_analysis(query).await? {
                            debug!("Ignoring blank input");
                        }
                    }
                }
            }
            event = events.recv() => match event {
                Ok(event) => {
                    print_event(&event, &stages, &handle, json);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Dropped monitor events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    handle.shutdown().await;
    info!("Session closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_flags_override_config_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[backend]\nurl = \"http://from-file:8000\"\n\n[stream]\ntransport = \"stream\""
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let args = Args::parse_from([
            "pipedash",
            "--config",
            &path,
            "--transport",
            "poll",
            "--simulate",
            "health",
        ]);
        let settings = load_settings(&args).unwrap();
        assert_eq!(settings.backend.url.as_deref(), Some("http://from-file:8000"));
        assert_eq!(settings.stream.transport, Transport::Poll);
        assert!(settings.simulation.force);

        let args = Args::parse_from([
            "pipedash",
            "--config",
            &path,
            "--backend-url",
            "http://cli:9000",
            "stages",
        ]);
        let settings = load_settings(&args).unwrap();
        assert_eq!(settings.backend_url(), "http://cli:9000");
        assert!(!settings.simulation.force);
    }

    #[test]
    fn test_run_joins_query_words() {
        let args = Args::parse_from(["pipedash", "run", "Cricket", "trends", "in", "2025"]);
        match args.command {
            Commands::Run { query } => assert_eq!(query.join(" "), "Cricket trends in 2025"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_event_json_shape() {
        let event = MonitorEvent::Status(pipedash_core::AnalysisStatus::running("eda_agent", 67));
        let value = event_json(&event);
        assert_eq!(value["event"], "status");
        assert_eq!(value["status"]["status"], "running");
        assert_eq!(value["status"]["progress"], 67);
    }

    #[test]
    fn test_channel_lost_ends_json_run() {
        let run_id = uuid::Uuid::new_v4();
        let event = MonitorEvent::ChannelLost { run_id };
        let value = event_json(&event);
        assert_eq!(value["event"], "channel_lost");
        assert_eq!(value["run_id"], run_id.to_string());
    }
}
