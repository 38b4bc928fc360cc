//! Status sources
//!
//! Every way of following a run (server push, polling, local simulation)
//! implements [`StatusSource`]: `begin_run(query)` returns a stream of
//! [`RunUpdate`]s that ends after a terminal snapshot, or earlier if the
//! transport gives up.

use futures::stream::{BoxStream, StreamExt};
use pipedash_client::{ApiClient, SubmitOutcome};
use pipedash_core::{AnalysisResults, AnalysisStatus, RunState};
use std::fmt;
use tracing::{error, info, warn};

pub mod poll;
pub mod simulator;
pub mod stream;

pub use poll::PollSource;
pub use simulator::Simulator;
pub use stream::StreamSource;

/// One item produced while following a run
#[derive(Debug, Clone, PartialEq)]
pub enum RunUpdate {
    /// The backend accepted the submission
    Accepted,
    /// The backend could not be reached; the caller should fall back
    Unavailable(String),
    /// The live channel opened (`true`) or dropped (`false`)
    Connection(bool),
    Status(AnalysisStatus),
    Results(AnalysisResults),
}

pub type RunStream = BoxStream<'static, RunUpdate>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Stream,
    Poll,
    Simulated,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Stream => write!(f, "stream"),
            SourceKind::Poll => write!(f, "poll"),
            SourceKind::Simulated => write!(f, "simulated"),
        }
    }
}

/// Something that can drive a run to a terminal snapshot
pub trait StatusSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Start a run for `query` and follow it
    fn begin_run(&self, query: &str) -> RunStream;

    /// Re-attach to the run the backend is already executing, with a
    /// fresh retry budget. Sources without a backend return `None`.
    fn resume(&self) -> Option<RunStream> {
        None
    }
}

/// Submit `query`, then hand over to `follow` once accepted.
///
/// A rejection ends the run with an error snapshot carrying the server's
/// detail. A transport failure yields [`RunUpdate::Unavailable`].
pub(crate) fn submit_then_follow(client: ApiClient, query: String, follow: RunStream) -> RunStream {
    async_stream::stream! {
        match client.submit(&query).await {
            Ok(SubmitOutcome::Accepted(body)) => {
                info!(task_id = ?body.task_id, "Analysis started");
                yield RunUpdate::Accepted;
            }
            Ok(SubmitOutcome::Rejected { status, detail }) => {
                warn!(status, detail = %detail, "Analysis submission rejected");
                yield RunUpdate::Status(AnalysisStatus::failed(detail));
                return;
            }
            Err(e) => {
                info!(error = %e, "Backend not available for submission");
                yield RunUpdate::Unavailable(e.to_string());
                return;
            }
        }

        let mut follow = follow;
        while let Some(update) = follow.next().await {
            yield update;
        }
    }
    .boxed()
}

/// Updates that close a run on a terminal snapshot.
///
/// Results are published before the completed snapshot. A completed run
/// whose results cannot be fetched ends in error instead.
pub(crate) async fn finish_run(
    client: &ApiClient,
    status: AnalysisStatus,
    embedded: Option<AnalysisResults>,
) -> Vec<RunUpdate> {
    if status.status != RunState::Completed {
        return vec![RunUpdate::Status(status)];
    }

    let results = match embedded {
        Some(results) => Ok(results),
        None => client.results().await,
    };

    match results {
        Ok(results) => vec![RunUpdate::Results(results), RunUpdate::Status(status)],
        Err(e) => {
            error!(error = %e, "Run completed but results could not be fetched");
            vec![RunUpdate::Status(
                status.into_failed(format!("Failed to fetch results: {}", e)),
            )]
        }
    }
}
