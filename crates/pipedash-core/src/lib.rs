//! Core types and utilities for pipedash
//!
//! # Modules
//!
//! - `config`: Layered settings and backend URL resolution
//! - `error`: Error types and Result alias
//! - `results`: Terminal results bundle of a run
//! - `stages`: The fixed, ordered pipeline stage list
//! - `status`: Status snapshots and their invariants
//! - `view`: Per-stage view state for rendering

pub mod config;
pub mod error;
pub mod results;
pub mod stages;
pub mod status;
pub mod view;

// Re-exports
pub use config::{Settings, Transport};
pub use error::{Error, Result};
pub use results::{AgentLogEntry, AnalysisResults, ModelDetails, ModelInfo, ScrapedData};
pub use stages::{AgentStage, StageList};
pub use status::{AnalysisStatus, RunState};
pub use view::{stage_states, StageState};
