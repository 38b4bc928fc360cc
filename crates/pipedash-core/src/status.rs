//! Analysis status snapshots
//!
//! A snapshot is a complete description of a run, never a delta. Live
//! sources and the simulator both produce this exact shape.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::stages::StageList;

/// Message used when an error snapshot carries no text
pub const DEFAULT_ERROR_MESSAGE: &str = "Analysis failed";

/// Lifecycle state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Completed,
    Error,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Error)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::Running => write!(f, "running"),
            RunState::Completed => write!(f, "completed"),
            RunState::Error => write!(f, "error"),
        }
    }
}

/// Snapshot of run progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AnalysisStatus {
    pub status: RunState,
    #[serde(default)]
    pub current_agent: Option<String>,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub error: Option<String>,
    /// Seconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

fn now_secs() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

impl AnalysisStatus {
    /// Pre-run rest state
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn running(agent: impl Into<String>, progress: u8) -> Self {
        Self {
            status: RunState::Running,
            current_agent: Some(agent.into()),
            progress: progress.min(100),
            error: None,
            timestamp: Some(now_secs()),
        }
    }

    pub fn completed(agent: impl Into<String>) -> Self {
        Self {
            status: RunState::Completed,
            current_agent: Some(agent.into()),
            progress: 100,
            error: None,
            timestamp: Some(now_secs()),
        }
    }

    /// Error snapshot; an empty message falls back to the default text
    pub fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            status: RunState::Error,
            current_agent: None,
            progress: 0,
            error: Some(if message.trim().is_empty() {
                DEFAULT_ERROR_MESSAGE.to_string()
            } else {
                message
            }),
            timestamp: Some(now_secs()),
        }
    }

    /// Turn this snapshot into an error, keeping agent and progress
    pub fn into_failed(self, message: impl Into<String>) -> Self {
        let failed = Self::failed(message);
        Self {
            current_agent: self.current_agent,
            progress: self.progress,
            ..failed
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Repair an inbound snapshot so it satisfies the snapshot invariants.
    pub fn normalize(mut self, stages: &StageList) -> Self {
        if self.progress > 100 {
            self.progress = 100;
        }

        if let Some(agent) = self.current_agent.as_deref() {
            if !stages.contains(agent) {
                warn!(agent = %agent, "Snapshot names an unknown stage, clearing current_agent");
                self.current_agent = None;
            }
        }

        match self.status {
            RunState::Completed => {
                self.progress = 100;
                self.error = None;
            }
            RunState::Error => {
                let missing = self
                    .error
                    .as_deref()
                    .map(|e| e.trim().is_empty())
                    .unwrap_or(true);
                if missing {
                    self.error = Some(DEFAULT_ERROR_MESSAGE.to_string());
                }
            }
            RunState::Idle | RunState::Running => {}
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_default() {
        let status = AnalysisStatus::idle();
        assert_eq!(status.status, RunState::Idle);
        assert_eq!(status.progress, 0);
        assert!(status.current_agent.is_none());
        assert!(status.error.is_none());
        assert!(status.timestamp.is_none());
    }

    #[test]
    fn test_completed_implies_full_progress() {
        let status = AnalysisStatus::completed("report_agent");
        assert_eq!(status.progress, 100);
        assert!(status.is_terminal());
    }

    #[test]
    fn test_failed_always_has_message() {
        assert_eq!(
            AnalysisStatus::failed("").error.as_deref(),
            Some(DEFAULT_ERROR_MESSAGE)
        );
        assert_eq!(
            AnalysisStatus::failed("invalid query").error.as_deref(),
            Some("invalid query")
        );
    }

    #[test]
    fn test_into_failed_keeps_progress() {
        let status = AnalysisStatus::running("eda_agent", 50).into_failed("boom");
        assert_eq!(status.status, RunState::Error);
        assert_eq!(status.progress, 50);
        assert_eq!(status.current_agent.as_deref(), Some("eda_agent"));
        assert_eq!(status.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_deserialize_backend_snapshot() {
        let raw = r#"{
            "status": "running",
            "current_agent": "scraper_agent",
            "progress": 20,
            "error": null,
            "timestamp": 1735689600.25,
            "is_running": true
        }"#;
        let status: AnalysisStatus = serde_json::from_str(raw).unwrap();
        assert_eq!(status.status, RunState::Running);
        assert_eq!(status.current_agent.as_deref(), Some("scraper_agent"));
        assert_eq!(status.progress, 20);
        assert_eq!(status.timestamp, Some(1735689600.25));
    }

    #[test]
    fn test_normalize_repairs_invariants() {
        let stages = StageList::default_pipeline();

        let completed = AnalysisStatus {
            status: RunState::Completed,
            current_agent: Some("report_agent".into()),
            progress: 80,
            error: None,
            timestamp: None,
        }
        .normalize(&stages);
        assert_eq!(completed.progress, 100);

        let errored = AnalysisStatus {
            status: RunState::Error,
            current_agent: None,
            progress: 40,
            error: None,
            timestamp: None,
        }
        .normalize(&stages);
        assert_eq!(errored.error.as_deref(), Some(DEFAULT_ERROR_MESSAGE));

        let unknown = AnalysisStatus {
            status: RunState::Running,
            current_agent: Some("mystery_agent".into()),
            progress: 120,
            error: None,
            timestamp: None,
        }
        .normalize(&stages);
        assert!(unknown.current_agent.is_none());
        assert_eq!(unknown.progress, 100);
    }

    #[test]
    fn test_run_state_serialization() {
        assert_eq!(serde_json::to_string(&RunState::Completed).unwrap(), "\"completed\"");
        assert_eq!(RunState::Error.to_string(), "error");
    }
}
