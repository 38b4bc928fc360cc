//! Polling status source (`GET /api/status`)

use futures::StreamExt;
use pipedash_client::ApiClient;
use pipedash_core::{RunState, Settings, StageList};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{finish_run, submit_then_follow, RunStream, RunUpdate, SourceKind, StatusSource};
use crate::policy::ReconnectPolicy;

/// Follows a run by polling its status
#[derive(Debug, Clone)]
pub struct PollSource {
    client: ApiClient,
    stages: StageList,
    policy: ReconnectPolicy,
    first_delay: Duration,
    interval: Duration,
}

impl PollSource {
    pub fn new(
        client: ApiClient,
        stages: StageList,
        policy: ReconnectPolicy,
        first_delay: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            client,
            stages,
            policy,
            first_delay,
            interval,
        }
    }

    pub fn from_settings(client: ApiClient, stages: StageList, settings: &Settings) -> Self {
        Self::new(
            client,
            stages,
            ReconnectPolicy::from_settings(settings),
            settings.first_poll_delay(),
            settings.poll_interval(),
        )
    }

    fn follow(&self) -> RunStream {
        let client = self.client.clone();
        let stages = self.stages.clone();
        let policy = self.policy;
        let first_delay = self.first_delay;
        let interval = self.interval;

        async_stream::stream! {
            tokio::time::sleep(first_delay).await;

            let mut failures: u32 = 0;
            loop {
                match client.status().await {
                    Ok(status) => {
                        if failures > 0 {
                            yield RunUpdate::Connection(true);
                        }
                        failures = 0;

                        let status = status.normalize(&stages);
                        if status.is_terminal() {
                            for update in finish_run(&client, status, None).await {
                                yield update;
                            }
                            return;
                        }
                        if status.status == RunState::Idle {
                            // backend has not picked the run up yet
                            debug!("Backend still idle");
                        } else {
                            yield RunUpdate::Status(status);
                        }
                        tokio::time::sleep(interval).await;
                    }
                    Err(e) => {
                        warn!(error = %e, "Status poll failed");
                        yield RunUpdate::Connection(false);

                        if !policy.allows(failures) {
                            warn!(failures, "Giving up polling");
                            return;
                        }
                        failures += 1;
                        let delay = policy.delay_for(failures);
                        info!(attempt = failures, delay_ms = delay.as_millis() as u64, "Retrying status poll");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        .boxed()
    }
}

impl StatusSource for PollSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Poll
    }

    fn begin_run(&self, query: &str) -> RunStream {
        submit_then_follow(self.client.clone(), query.to_string(), self.follow())
    }

    fn resume(&self) -> Option<RunStream> {
        Some(self.follow())
    }
}
