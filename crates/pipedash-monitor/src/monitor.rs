//! Analysis monitor actor
//!
//! The actor owns everything about the current run: the status source
//! stream, the in-flight health probe and the periodic health interval.
//! Callers talk to it through a cloneable [`MonitorHandle`] and observe it
//! through a `watch` channel (latest [`DashboardState`]) or an ordered
//! `broadcast` of [`MonitorEvent`]s.

use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use pipedash_client::ApiClient;
use pipedash_core::{
    AnalysisResults, AnalysisStatus, Error, Result, RunState, Settings, StageList, Transport,
};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::health;
use crate::policy::ReconnectPolicy;
use crate::sources::{
    PollSource, RunStream, RunUpdate, Simulator, SourceKind, StatusSource, StreamSource,
};

const COMMAND_BUFFER: usize = 16;
const EVENT_BUFFER: usize = 256;

/// Everything a dashboard needs to render
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardState {
    pub status: AnalysisStatus,
    pub results: Option<AnalysisResults>,
    /// Backend reachability as of the last probe or channel event
    pub is_connected: bool,
    /// Runs go to the local simulator
    pub simulation_mode: bool,
    pub run_active: bool,
    /// The live channel of the active run gave up; the last snapshot is
    /// stale until `reconnect`
    pub channel_lost: bool,
    /// Source following the current or last run
    pub source: Option<SourceKind>,
    /// At least one health probe has completed
    pub probed: bool,
    pub backend_url: String,
}

impl DashboardState {
    fn new(backend_url: String, simulation_mode: bool) -> Self {
        Self {
            status: AnalysisStatus::idle(),
            results: None,
            is_connected: false,
            simulation_mode,
            run_active: false,
            channel_lost: false,
            source: None,
            probed: false,
            backend_url,
        }
    }
}

/// Ordered notifications from the monitor
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    RunStarted { run_id: Uuid, source: SourceKind },
    Status(AnalysisStatus),
    Results(AnalysisResults),
    Connection { connected: bool, simulation_mode: bool },
    /// Reconnect budget spent; the run stays active on its last snapshot
    ChannelLost { run_id: Uuid },
    RunEnded { run_id: Uuid },
}

enum Command {
    Start {
        query: String,
        respond_to: oneshot::Sender<bool>,
    },
    Reconnect,
    Shutdown,
}

/// Handle to the monitor actor
#[derive(Clone)]
pub struct MonitorHandle {
    sender: mpsc::Sender<Command>,
    state: watch::Receiver<DashboardState>,
    events: broadcast::Sender<MonitorEvent>,
    backend_url: String,
}

impl MonitorHandle {
    /// Start a run for `query`, superseding any run in flight.
    ///
    /// Returns `false` for a blank query, which is ignored.
    pub async fn start_analysis(&self, query: &str) -> Result<bool> {
        if query.trim().is_empty() {
            return Ok(false);
        }

        let (tx, rx) = oneshot::channel();
        self.sender
            .send(Command::Start {
                query: query.to_string(),
                respond_to: tx,
            })
            .await
            .map_err(|_| Error::internal("Monitor channel closed"))?;

        rx.await.map_err(|_| Error::internal("Monitor dropped"))
    }

    /// Probe the backend now and re-attach to a live run
    pub async fn reconnect(&self) -> Result<()> {
        self.sender
            .send(Command::Reconnect)
            .await
            .map_err(|_| Error::internal("Monitor channel closed"))
    }

    pub fn snapshot(&self) -> DashboardState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<DashboardState> {
        self.state.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    /// Wait until the state satisfies `predicate`
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&DashboardState) -> bool,
    ) -> Result<DashboardState> {
        let mut rx = self.watch();
        let state = rx
            .wait_for(predicate)
            .await
            .map_err(|_| Error::internal("Monitor dropped"))?;
        Ok(state.clone())
    }

    /// Stop the actor. Idempotent.
    pub async fn shutdown(&self) {
        let _ = self.sender.send(Command::Shutdown).await;
    }

    pub fn backend_url(&self) -> &str {
        &self.backend_url
    }
}

struct ActiveRun {
    id: Uuid,
    query: String,
    source: SourceKind,
    /// `None` once a live channel has given up; the backend may still be
    /// working and `reconnect` can re-attach.
    stream: Option<RunStream>,
    accepted: bool,
}

impl ActiveRun {
    fn is_live(&self) -> bool {
        self.source != SourceKind::Simulated
    }
}

/// The monitor actor
pub struct AnalysisMonitor {
    settings: Settings,
    client: ApiClient,
    live: Box<dyn StatusSource>,
    simulator: Simulator,
    receiver: mpsc::Receiver<Command>,
    state: watch::Sender<DashboardState>,
    events: broadcast::Sender<MonitorEvent>,

    run: Option<ActiveRun>,
    probe: Option<BoxFuture<'static, bool>>,
    health: Option<Interval>,
}

impl AnalysisMonitor {
    pub fn new(settings: Settings, client: ApiClient) -> (Self, MonitorHandle) {
        let stages = StageList::default_pipeline();
        let live: Box<dyn StatusSource> = match settings.stream.transport {
            Transport::Stream => Box::new(StreamSource::new(
                client.clone(),
                stages.clone(),
                ReconnectPolicy::from_settings(&settings),
            )),
            Transport::Poll => Box::new(PollSource::from_settings(
                client.clone(),
                stages.clone(),
                &settings,
            )),
        };
        let simulator = Simulator::new(stages, settings.simulation.clone());

        let backend_url = client.base_url().to_string();
        let (sender, receiver) = mpsc::channel(COMMAND_BUFFER);
        let (state_tx, state_rx) = watch::channel(DashboardState::new(
            backend_url.clone(),
            settings.simulation.force,
        ));
        let (events, _) = broadcast::channel(EVENT_BUFFER);

        let handle = MonitorHandle {
            sender,
            state: state_rx,
            events: events.clone(),
            backend_url,
        };

        let monitor = Self {
            settings,
            client,
            live,
            simulator,
            receiver,
            state: state_tx,
            events,
            run: None,
            probe: None,
            health: None,
        };

        (monitor, handle)
    }

    /// Create the actor and run it on the current runtime
    pub fn spawn(settings: Settings, client: ApiClient) -> MonitorHandle {
        let (monitor, handle) = Self::new(settings, client);
        tokio::spawn(monitor.run());
        handle
    }

    pub async fn run(mut self) {
        info!(
            backend = %self.client.base_url(),
            transport = %self.live.kind(),
            "Analysis monitor started"
        );

        // first tick fires immediately and performs the startup probe
        let mut interval = tokio::time::interval(self.settings.health_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.health = Some(interval);

        loop {
            let probing = !self.live_channel_open();
            tokio::select! {
                command = self.receiver.recv() => match command {
                    Some(Command::Start { query, respond_to }) => {
                        let started = self.start(&query);
                        let _ = respond_to.send(started);
                    }
                    Some(Command::Reconnect) => self.reconnect(),
                    Some(Command::Shutdown) | None => break,
                },
                _ = next_tick(&mut self.health), if probing => {
                    debug!("Periodic health check");
                    self.start_probe();
                }
                healthy = next_probe(&mut self.probe) => self.apply_probe(healthy),
                update = next_update(&mut self.run) => match update {
                    Some(update) => self.apply_update(update),
                    None => self.channel_closed(),
                },
            }
        }

        self.teardown();
        info!("Analysis monitor stopped");
    }

    fn live_channel_open(&self) -> bool {
        self.run
            .as_ref()
            .map(|run| run.is_live() && run.stream.is_some())
            .unwrap_or(false)
    }

    fn start(&mut self, query: &str) -> bool {
        if query.trim().is_empty() {
            return false;
        }

        if let Some(old) = self.run.take() {
            info!(run_id = %old.id, "Superseding run in flight");
            self.emit(MonitorEvent::RunEnded { run_id: old.id });
        }

        let snapshot = self.state.borrow().clone();
        let simulate =
            self.settings.simulation.force || snapshot.simulation_mode || !snapshot.is_connected;

        let (source, stream) = if simulate {
            (SourceKind::Simulated, self.simulator.begin_run(query))
        } else {
            (self.live.kind(), self.live.begin_run(query))
        };

        let id = Uuid::new_v4();
        info!(run_id = %id, source = %source, query = %query, "Starting analysis");

        self.run = Some(ActiveRun {
            id,
            query: query.to_string(),
            source,
            stream: Some(stream),
            accepted: false,
        });

        let idle = AnalysisStatus::idle();
        self.state.send_modify(|state| {
            state.results = None;
            state.status = idle.clone();
            state.run_active = true;
            state.channel_lost = false;
            state.source = Some(source);
        });
        self.emit(MonitorEvent::RunStarted { run_id: id, source });
        self.emit(MonitorEvent::Status(idle));
        true
    }

    fn reconnect(&mut self) {
        info!("Reconnecting to backend");
        self.start_probe();

        match self.run.as_mut() {
            Some(run) if run.is_live() && run.accepted => {
                if let Some(stream) = self.live.resume() {
                    info!(run_id = %run.id, "Re-opening status channel");
                    run.stream = Some(stream);
                    self.state.send_modify(|state| state.channel_lost = false);
                }
            }
            Some(_) => {}
            None => {
                if self.state.borrow().status.status == RunState::Error {
                    let idle = AnalysisStatus::idle();
                    self.state.send_modify(|state| state.status = idle.clone());
                    self.emit(MonitorEvent::Status(idle));
                }
            }
        }
    }

    fn start_probe(&mut self) {
        let client = self.client.clone();
        self.probe = Some(async move { health::probe(&client).await }.boxed());
    }

    fn apply_probe(&mut self, healthy: bool) {
        let simulation_mode = self.settings.simulation.force || !healthy;
        self.set_connection(healthy, simulation_mode);
        self.state.send_modify(|state| state.probed = true);
    }

    fn set_connection(&mut self, connected: bool, simulation_mode: bool) {
        let changed = self.state.send_if_modified(|state| {
            let changed =
                state.is_connected != connected || state.simulation_mode != simulation_mode;
            state.is_connected = connected;
            state.simulation_mode = simulation_mode;
            changed
        });
        if changed {
            self.emit(MonitorEvent::Connection {
                connected,
                simulation_mode,
            });
        }
    }

    fn apply_update(&mut self, update: RunUpdate) {
        match update {
            RunUpdate::Accepted => {
                if let Some(run) = self.run.as_mut() {
                    run.accepted = true;
                }
                // the live channel now reports reachability
                self.probe = None;
            }
            RunUpdate::Unavailable(reason) => {
                warn!(reason = %reason, "Backend unavailable, falling back to simulation");
                self.set_connection(false, true);
                if let Some(run) = self.run.as_mut() {
                    run.source = SourceKind::Simulated;
                    run.stream = Some(self.simulator.begin_run(&run.query));
                }
                self.state
                    .send_modify(|state| state.source = Some(SourceKind::Simulated));
            }
            RunUpdate::Connection(connected) => {
                let simulation_mode = self.state.borrow().simulation_mode;
                self.set_connection(connected, simulation_mode);
            }
            RunUpdate::Status(status) => self.apply_status(status),
            RunUpdate::Results(results) => {
                self.state
                    .send_modify(|state| state.results = Some(results.clone()));
                self.emit(MonitorEvent::Results(results));
            }
        }
    }

    fn apply_status(&mut self, status: AnalysisStatus) {
        if status.status == RunState::Idle {
            debug!("Ignoring idle snapshot during a run");
            return;
        }

        let current = self.state.borrow().status.clone();
        let status = keep_progress(&current, status);
        let terminal = status.is_terminal();

        self.state
            .send_modify(|state| state.status = status.clone());
        self.emit(MonitorEvent::Status(status));

        if terminal {
            self.end_run();
        }
    }

    /// A run stream ended without a terminal snapshot
    fn channel_closed(&mut self) {
        let Some(run) = self.run.as_mut() else {
            return;
        };

        if run.is_live() && run.accepted {
            warn!(run_id = %run.id, "Status channel abandoned, keeping last snapshot");
            run.stream = None;
            let run_id = run.id;
            self.state.send_modify(|state| state.channel_lost = true);
            self.emit(MonitorEvent::ChannelLost { run_id });
            self.resume_probing();
        } else {
            warn!(run_id = %run.id, "Run ended without a terminal snapshot");
            self.end_run();
        }
    }

    fn end_run(&mut self) {
        let Some(run) = self.run.take() else {
            return;
        };

        info!(run_id = %run.id, source = %run.source, "Run finished");
        self.state.send_modify(|state| {
            state.run_active = false;
            state.channel_lost = false;
        });
        self.emit(MonitorEvent::RunEnded { run_id: run.id });

        if run.is_live() {
            self.resume_probing();
        }
    }

    /// Probe now and restart the periodic schedule from here
    fn resume_probing(&mut self) {
        self.start_probe();
        if let Some(interval) = self.health.as_mut() {
            interval.reset();
        }
    }

    fn emit(&self, event: MonitorEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    /// Release the run stream, pending probe and health interval
    fn teardown(&mut self) {
        if let Some(run) = self.run.take() {
            debug!(run_id = %run.id, "Dropping run in flight");
        }
        self.probe = None;
        self.health = None;
    }
}

impl Drop for AnalysisMonitor {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Progress never goes backwards within a run
fn keep_progress(current: &AnalysisStatus, mut next: AnalysisStatus) -> AnalysisStatus {
    if next.status == RunState::Running
        && current.status == RunState::Running
        && next.progress < current.progress
    {
        debug!(
            current = current.progress,
            received = next.progress,
            "Holding progress"
        );
        next.progress = current.progress;
    }
    next
}

async fn next_tick(health: &mut Option<Interval>) {
    match health.as_mut() {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn next_probe(probe: &mut Option<BoxFuture<'static, bool>>) -> bool {
    let healthy = match probe.as_mut() {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    };
    *probe = None;
    healthy
}

async fn next_update(run: &mut Option<ActiveRun>) -> Option<RunUpdate> {
    match run.as_mut().and_then(|run| run.stream.as_mut()) {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}
