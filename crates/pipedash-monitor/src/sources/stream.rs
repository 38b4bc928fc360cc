//! Server-push status source (`GET /api/stream`)

use futures::StreamExt;
use pipedash_client::{ApiClient, StatusEvent};
use pipedash_core::StageList;
use tracing::{debug, info, warn};

use super::{finish_run, submit_then_follow, RunStream, RunUpdate, SourceKind, StatusSource};
use crate::policy::ReconnectPolicy;

/// Follows a run over Server-Sent Events, reconnecting with backoff
#[derive(Debug, Clone)]
pub struct StreamSource {
    client: ApiClient,
    stages: StageList,
    policy: ReconnectPolicy,
}

impl StreamSource {
    pub fn new(client: ApiClient, stages: StageList, policy: ReconnectPolicy) -> Self {
        Self {
            client,
            stages,
            policy,
        }
    }

    /// Stream snapshots of the run in progress.
    ///
    /// Any channel failure (refused connection, non-2xx, broken body, or
    /// the server closing before a terminal snapshot) costs one attempt.
    /// Once the budget is spent the stream ends without a terminal
    /// snapshot.
    fn follow(&self) -> RunStream {
        let client = self.client.clone();
        let stages = self.stages.clone();
        let policy = self.policy;

        async_stream::stream! {
            let mut attempts: u32 = 0;
            loop {
                match client.open_stream().await {
                    Ok(mut events) => {
                        attempts = 0;
                        info!("Status stream opened");
                        yield RunUpdate::Connection(true);

                        while let Some(event) = events.next().await {
                            let event = match event {
                                Ok(event) => event,
                                Err(e) => {
                                    warn!(error = %e, "Status stream failed");
                                    break;
                                }
                            };

                            let parsed = match StatusEvent::parse(&event) {
                                Ok(parsed) => parsed,
                                Err(e) => {
                                    warn!(error = %e, data = %event.data, "Dropping malformed status event");
                                    continue;
                                }
                            };
                            debug!(status = %parsed.status.status, progress = parsed.status.progress, "Received status update");

                            let status = parsed.status.normalize(&stages);
                            if status.is_terminal() {
                                for update in finish_run(&client, status, parsed.results).await {
                                    yield update;
                                }
                                return;
                            }
                            yield RunUpdate::Status(status);
                        }
                        warn!("Status stream closed before the run finished");
                    }
                    Err(e) => warn!(error = %e, "Could not open status stream"),
                }

                yield RunUpdate::Connection(false);

                if !policy.allows(attempts) {
                    warn!(attempts, "Giving up on the status stream");
                    return;
                }
                attempts += 1;
                let delay = policy.delay_for(attempts);
                info!(
                    attempt = attempts,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Reconnecting status stream"
                );
                tokio::time::sleep(delay).await;
            }
        }
        .boxed()
    }
}

impl StatusSource for StreamSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Stream
    }

    fn begin_run(&self, query: &str) -> RunStream {
        submit_then_follow(self.client.clone(), query.to_string(), self.follow())
    }

    fn resume(&self) -> Option<RunStream> {
        Some(self.follow())
    }
}
