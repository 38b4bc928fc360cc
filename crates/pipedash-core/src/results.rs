//! Terminal artifact bundle of a run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Everything a completed run hands back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AnalysisResults {
    pub query: String,
    #[serde(default)]
    pub final_answer: String,
    #[serde(default)]
    pub eda_output: String,
    #[serde(default, alias = "scrape_results")]
    pub scraped_data: ScrapedData,
    /// Preview of the cleaned text handed to the EDA stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleaned_data: Option<String>,
    #[serde(default)]
    pub model_info: Option<ModelDetails>,
    /// Seconds from submission to completion
    #[serde(default)]
    pub processing_time: Option<f64>,
    #[serde(default)]
    pub agent_logs: Vec<AgentLogEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_sources: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub characters_processed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_actions: Option<u64>,
}

/// Scraped sources, either itemized or as one raw text block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScrapedData {
    Sources(Vec<String>),
    Text(String),
}

impl Default for ScrapedData {
    fn default() -> Self {
        ScrapedData::Sources(Vec::new())
    }
}

impl ScrapedData {
    /// One entry per source. Raw text is split on the backend's
    /// `Title:` markers, falling back to non-empty lines.
    pub fn entries(&self) -> Vec<String> {
        match self {
            ScrapedData::Sources(items) => items.clone(),
            ScrapedData::Text(text) => {
                if text.contains("Title:") {
                    text.split("Title:")
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(|s| format!("Title: {}", s))
                        .collect()
                } else {
                    text.lines()
                        .map(str::trim)
                        .filter(|l| !l.is_empty())
                        .map(String::from)
                        .collect()
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ScrapedData::Sources(items) => items.is_empty(),
            ScrapedData::Text(text) => text.trim().is_empty(),
        }
    }
}

/// Model metadata: structured metrics or a free-text summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModelDetails {
    Metrics(ModelInfo),
    Summary(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub accuracy: f64,
    pub model_type: String,
    pub features_used: u32,
}

/// Per-stage completion entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentLogEntry {
    pub agent: String,
    pub action: String,
    pub timestamp: DateTime<Utc>,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_backend_results() {
        let raw = r###"{
            "query": "Cricket trends in 2025",
            "scrape_results": "Title: A\nURL: http://a\nSnippet: x\nTitle: B\nURL: http://b\nSnippet: y",
            "cleaned_data": "Title A URL",
            "eda_output": "## Exploratory Data Analysis",
            "model_info": "RandomForest trained on 40 samples",
            "final_answer": "Cricket is growing",
            "processing_time": null,
            "data_sources": 2,
            "characters_processed": 11,
            "agent_actions": 6
        }"###;
        let results: AnalysisResults = serde_json::from_str(raw).unwrap();
        assert_eq!(results.query, "Cricket trends in 2025");
        assert_eq!(results.scraped_data.entries().len(), 2);
        assert!(matches!(results.model_info, Some(ModelDetails::Summary(_))));
        assert_eq!(results.data_sources, Some(2));
        assert!(results.agent_logs.is_empty());
        assert!(results.processing_time.is_none());
        assert_eq!(results.eda_output, "## Exploratory Data Analysis");
    }

    #[test]
    fn test_deserialize_structured_results() {
        let raw = r#"{
            "query": "q",
            "final_answer": "a",
            "eda_output": "e",
            "scraped_data": ["one", "two"],
            "model_info": {"accuracy": 0.892, "model_type": "Random Forest Classifier", "features_used": 12},
            "processing_time": 19.5,
            "agent_logs": [
                {"agent": "eda_agent", "action": "done", "timestamp": "2025-01-01T00:00:00Z", "status": "completed"}
            ]
        }"#;
        let results: AnalysisResults = serde_json::from_str(raw).unwrap();
        assert_eq!(
            results.scraped_data,
            ScrapedData::Sources(vec!["one".into(), "two".into()])
        );
        match results.model_info {
            Some(ModelDetails::Metrics(info)) => assert_eq!(info.features_used, 12),
            other => panic!("unexpected model info: {:?}", other),
        }
        assert_eq!(results.agent_logs[0].agent, "eda_agent");
    }

    #[test]
    fn test_scraped_text_without_markers() {
        let data = ScrapedData::Text("first\n\n second \n".into());
        assert_eq!(data.entries(), vec!["first".to_string(), "second".to_string()]);
        assert!(!data.is_empty());
        assert!(ScrapedData::default().is_empty());
    }
}
