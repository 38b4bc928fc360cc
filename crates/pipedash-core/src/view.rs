//! Per-stage view state derived from a snapshot

use serde::Serialize;
use std::fmt;

use crate::stages::{AgentStage, StageList};
use crate::status::{AnalysisStatus, RunState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageState {
    Idle,
    Pending,
    Active,
    Completed,
    Error,
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageState::Idle => write!(f, "Waiting"),
            StageState::Pending => write!(f, "Pending"),
            StageState::Active => write!(f, "Running"),
            StageState::Completed => write!(f, "Completed"),
            StageState::Error => write!(f, "Error"),
        }
    }
}

/// State of every stage for the given snapshot, in pipeline order.
pub fn stage_states<'a>(
    status: &AnalysisStatus,
    stages: &'a StageList,
) -> Vec<(&'a AgentStage, StageState)> {
    let current = status
        .current_agent
        .as_deref()
        .and_then(|id| stages.position(id));

    stages
        .iter()
        .enumerate()
        .map(|(index, stage)| {
            let state = match status.status {
                RunState::Idle => StageState::Idle,
                RunState::Error => StageState::Error,
                RunState::Completed => StageState::Completed,
                RunState::Running => match current {
                    Some(pos) if pos == index => StageState::Active,
                    Some(pos) if pos > index => StageState::Completed,
                    _ => StageState::Pending,
                },
            };
            (stage, state)
        })
        .collect()
}
