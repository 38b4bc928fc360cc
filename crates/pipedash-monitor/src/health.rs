//! Backend health probe

use pipedash_client::ApiClient;
use pipedash_core::Error;
use tracing::{debug, info, warn};

/// Probe `GET /health` once.
///
/// Any 2xx within the client's health timeout counts as reachable.
/// Everything else (refused, non-2xx, timeout) counts as unreachable.
pub async fn probe(client: &ApiClient) -> bool {
    match client.health().await {
        Ok(health) => {
            debug!(
                service = ?health.service,
                pipeline_running = ?health.pipeline_running,
                "Backend healthy"
            );
            true
        }
        Err(Error::Timeout(_)) => {
            warn!(
                timeout_ms = client.timeouts().health.as_millis() as u64,
                "Backend health check timed out"
            );
            false
        }
        Err(e) => {
            info!(error = %e, "Backend not available, using simulation mode");
            false
        }
    }
}
