//! API client for the analysis backend
//!
//! | Endpoint | Method | Purpose |
//! |----------|--------|---------|
//! | `/health` | GET | Liveness probe |
//! | `/api/analyze` | POST | Start a run with `{query}` |
//! | `/api/status` | GET | Current status snapshot |
//! | `/api/results` | GET | Results of a completed run |
//! | `/api/stream` | GET | `text/event-stream` of status snapshots |

use futures::StreamExt;
use pipedash_core::{AnalysisResults, AnalysisStatus, Error, Result, Settings};
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::sse::{self, EventStream, SseEvent};

/// Backend endpoint paths
pub mod endpoints {
    pub const HEALTH: &str = "/health";
    pub const ANALYZE: &str = "/api/analyze";
    pub const STATUS: &str = "/api/status";
    pub const RESULTS: &str = "/api/results";
    pub const STREAM: &str = "/api/stream";
}

/// Detail reported when a rejection carries none
pub const DEFAULT_REJECTION: &str = "Failed to start analysis";

/// Per-request time budgets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientTimeouts {
    pub health: Duration,
    pub submit: Duration,
    pub request: Duration,
}

impl Default for ClientTimeouts {
    fn default() -> Self {
        Self {
            health: Duration::from_secs(3),
            submit: Duration::from_secs(10),
            request: Duration::from_secs(10),
        }
    }
}

impl From<&Settings> for ClientTimeouts {
    fn from(settings: &Settings) -> Self {
        Self {
            health: settings.health_timeout(),
            submit: settings.submit_timeout(),
            request: settings.request_timeout(),
        }
    }
}

/// Analyze request body
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeRequest<'a> {
    pub query: &'a str,
}

/// Analyze response body on acceptance
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalyzeResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
}

/// Health check response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HealthResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub pipeline_running: Option<bool>,
    #[serde(default)]
    pub timestamp: Option<f64>,
}

/// Outcome of `POST /api/analyze`
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    Accepted(AnalyzeResponse),
    /// Application-level refusal with the server's `detail`
    Rejected { status: u16, detail: String },
}

/// One snapshot pushed on the stream. A completion payload may embed
/// the results directly.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusEvent {
    #[serde(flatten)]
    pub status: AnalysisStatus,
    #[serde(default)]
    pub results: Option<AnalysisResults>,
}

impl StatusEvent {
    pub fn parse(event: &SseEvent) -> Result<Self> {
        Ok(serde_json::from_str(&event.data)?)
    }
}

/// API client
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    timeouts: ClientTimeouts,
}

impl ApiClient {
    pub fn new(base_url: &str, timeouts: ClientTimeouts) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeouts.submit)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeouts,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(&settings.backend_url(), ClientTimeouts::from(settings))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeouts(&self) -> ClientTimeouts {
        self.timeouts
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Liveness probe. Any non-2xx answer counts as a failure.
    pub async fn health(&self) -> Result<HealthResponse> {
        let url = self.url(endpoints::HEALTH);
        debug!(url = %url, "Checking backend health");

        let response = self
            .client
            .get(&url)
            .header(header::ACCEPT, "application/json")
            .timeout(self.timeouts.health)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::http(format!("health check returned HTTP {}", response.status())));
        }

        Ok(response.json::<HealthResponse>().await?)
    }

    /// Submit a query. Transport failures are errors; a non-2xx answer is
    /// a [`SubmitOutcome::Rejected`].
    pub async fn submit(&self, query: &str) -> Result<SubmitOutcome> {
        let url = self.url(endpoints::ANALYZE);
        info!(url = %url, "Submitting analysis");

        let response = self
            .client
            .post(&url)
            .json(&AnalyzeRequest { query })
            .timeout(self.timeouts.submit)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let body = response.json::<AnalyzeResponse>().await.unwrap_or_default();
            return Ok(SubmitOutcome::Accepted(body));
        }

        let body = response.text().await.unwrap_or_default();
        let detail = rejection_detail(&body);
        warn!(status = %status, detail = %detail, "Backend rejected analysis");
        Ok(SubmitOutcome::Rejected {
            status: status.as_u16(),
            detail,
        })
    }

    /// Current status snapshot
    pub async fn status(&self) -> Result<AnalysisStatus> {
        let response = self
            .client
            .get(self.url(endpoints::STATUS))
            .timeout(self.timeouts.request)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(response.json::<AnalysisStatus>().await?)
    }

    /// Results of the completed run
    pub async fn results(&self) -> Result<AnalysisResults> {
        let response = self
            .client
            .get(self.url(endpoints::RESULTS))
            .timeout(self.timeouts.request)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(response.json::<AnalysisResults>().await?)
    }

    /// Open the push channel. Resolves once the server has answered with
    /// a 2xx; the body is then decoded lazily.
    ///
    /// Only the wait for response headers is bounded by the request
    /// timeout. The body itself may stay open for the whole run.
    pub async fn open_stream(&self) -> Result<EventStream> {
        let url = self.url(endpoints::STREAM);
        debug!(url = %url, "Opening status stream");

        let request = self
            .client
            .get(&url)
            .header(header::ACCEPT, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .send();

        let response = tokio::time::timeout(self.timeouts.request, request)
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "stream did not answer within {}ms",
                    self.timeouts.request.as_millis()
                ))
            })??;

        if response.status() != StatusCode::OK {
            return Err(Error::stream(format!(
                "stream request returned HTTP {}",
                response.status()
            )));
        }

        Ok(sse::decode(response.bytes_stream().boxed()))
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::http(format!("HTTP {}: {}", status, rejection_detail(&body))))
}

/// Extract FastAPI-style `{"detail": ...}` from an error body.
fn rejection_detail(body: &str) -> String {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").cloned());

    match detail {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => s,
        Some(serde_json::Value::Null) | None => DEFAULT_REJECTION.to_string(),
        Some(serde_json::Value::String(_)) => DEFAULT_REJECTION.to_string(),
        Some(other) => other.to_string(),
    }
}
