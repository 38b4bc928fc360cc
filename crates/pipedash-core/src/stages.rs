//! Pipeline stage list
//!
//! The ordered list of agents the backend runs. Both the live and the
//! simulated paths read the same list so visualization never depends on
//! where a snapshot came from.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One step of the analysis pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStage {
    pub id: String,
    pub name: String,
    pub description: String,
    /// How long the simulator dwells on this stage
    #[serde(with = "millis")]
    pub dwell: Duration,
}

impl AgentStage {
    pub fn new(id: &str, name: &str, description: &str, dwell_ms: u64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            dwell: Duration::from_millis(dwell_ms),
        }
    }
}

/// Fixed, ordered stage configuration
#[derive(Debug, Clone, PartialEq)]
pub struct StageList {
    stages: Vec<AgentStage>,
}

impl StageList {
    /// Build a list from explicit stages. An empty list is rejected.
    pub fn new(stages: Vec<AgentStage>) -> crate::Result<Self> {
        if stages.is_empty() {
            return Err(crate::Error::invalid_argument("stage list cannot be empty"));
        }
        Ok(Self { stages })
    }

    /// The six agents of the analysis backend
    pub fn default_pipeline() -> Self {
        Self {
            stages: vec![
                AgentStage::new(
                    "prompt_agent",
                    "Prompt Agent",
                    "Parses and validates the query",
                    2000,
                ),
                AgentStage::new(
                    "scraper_agent",
                    "Web Scraper",
                    "Searches and collects data from web sources",
                    3000,
                ),
                AgentStage::new(
                    "data_cleaning_agent",
                    "Data Cleaner",
                    "Preprocesses and cleans raw data",
                    2500,
                ),
                AgentStage::new(
                    "eda_agent",
                    "EDA Agent",
                    "Performs exploratory data analysis",
                    4000,
                ),
                AgentStage::new(
                    "model_training_agent",
                    "ML Trainer",
                    "Trains machine learning models",
                    5000,
                ),
                AgentStage::new(
                    "report_agent",
                    "Report Generator",
                    "Generates final analysis report",
                    3000,
                ),
            ],
        }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AgentStage> {
        self.stages.iter()
    }

    pub fn get(&self, index: usize) -> Option<&AgentStage> {
        self.stages.get(index)
    }

    pub fn first(&self) -> &AgentStage {
        &self.stages[0]
    }

    pub fn last(&self) -> &AgentStage {
        &self.stages[self.stages.len() - 1]
    }

    /// Position of a stage id in the pipeline
    pub fn position(&self, id: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    /// Progress reported while the stage at `index` runs:
    /// `round(100 * (index + 1) / len)`, capped at 100.
    pub fn progress_for(&self, index: usize) -> u8 {
        let pct = 100.0 * (index + 1) as f64 / self.stages.len() as f64;
        pct.round().min(100.0) as u8
    }
}

impl Default for StageList {
    fn default() -> Self {
        Self::default_pipeline()
    }
}

impl<'a> IntoIterator for &'a StageList {
    type Item = &'a AgentStage;
    type IntoIter = std::slice::Iter<'a, AgentStage>;

    fn into_iter(self) -> Self::IntoIter {
        self.stages.iter()
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
