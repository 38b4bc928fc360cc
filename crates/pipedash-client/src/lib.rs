//! HTTP client for the analysis backend
//!
//! Wraps the backend's REST endpoints and its Server-Sent Events status
//! stream. Everything returns [`pipedash_core::Result`]; transport
//! failures map to [`pipedash_core::Error::Http`], `Timeout` or `Stream`.

pub mod api;
pub mod sse;

pub use api::{
    endpoints, AnalyzeResponse, ApiClient, ClientTimeouts, HealthResponse, StatusEvent,
    SubmitOutcome,
};
pub use sse::{EventStream, SseDecoder, SseEvent};
