//! Local fallback pipeline
//!
//! Walks the stage list on a timer and fabricates results shaped exactly
//! like the backend's. It never fails and never retries.

use chrono::Utc;
use futures::StreamExt;
use pipedash_core::config::SimulationSettings;
use pipedash_core::{
    AgentLogEntry, AgentStage, AnalysisResults, AnalysisStatus, ModelDetails, ModelInfo,
    ScrapedData, StageList,
};
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

use super::{RunStream, RunUpdate, SourceKind, StatusSource};

#[derive(Debug, Clone)]
pub struct Simulator {
    stages: StageList,
    settings: SimulationSettings,
}

impl Simulator {
    pub fn new(stages: StageList, settings: SimulationSettings) -> Self {
        Self { stages, settings }
    }

    /// Nominal run length: warm-up plus every stage dwell, scaled
    pub fn expected_duration(&self) -> Duration {
        self.stages
            .iter()
            .map(|s| self.settings.scaled(s.dwell))
            .fold(self.settings.warmup(), |acc, d| acc + d)
    }
}

impl StatusSource for Simulator {
    fn kind(&self) -> SourceKind {
        SourceKind::Simulated
    }

    fn begin_run(&self, query: &str) -> RunStream {
        let stages = self.stages.clone();
        let settings = self.settings.clone();
        let query = query.to_string();

        async_stream::stream! {
            info!(stages = stages.len(), "Starting simulated analysis");
            let started = Instant::now();

            yield RunUpdate::Status(AnalysisStatus::running(stages.first().id.clone(), 0));
            tokio::time::sleep(settings.warmup()).await;

            for (index, stage) in stages.iter().enumerate() {
                yield RunUpdate::Status(AnalysisStatus::running(
                    stage.id.clone(),
                    stages.progress_for(index),
                ));
                tokio::time::sleep(settings.scaled(stage.dwell)).await;
            }

            let elapsed = started.elapsed();
            yield RunUpdate::Results(simulated_results(&query, &stages, elapsed));
            yield RunUpdate::Status(AnalysisStatus::completed(stages.last().id.clone()));
        }
        .boxed()
    }
}

fn simulated_results(query: &str, stages: &StageList, elapsed: Duration) -> AnalysisResults {
    let final_answer = format!(
        "Based on the analysis of \"{query}\", here are the key findings:\n\n\
         • Market trends show significant growth potential in this area\n\
         • Data analysis reveals 3 primary factors driving current patterns\n\
         • Recommended approach: focus on user engagement and data-driven optimization\n\
         • Success probability: 87% based on historical patterns\n\n\
         This analysis combines web scraping, statistical modeling, and AI-powered insights \
         to provide actionable recommendations."
    );

    let eda_output = "## Exploratory Data Analysis Results\n\n\
        **Data Distribution:**\n\
        - Total samples: 1,247\n\
        - Categories identified: 5\n\
        - Missing values: 2.3%\n\n\
        **Key Statistics:**\n\
        - Mean engagement: 73.2%\n\
        - Standard deviation: 12.8\n\
        - Correlation strength: 0.84\n\n\
        **Insights:**\n\
        - Strong positive correlation between variables A and B\n\
        - Seasonal patterns detected in the data\n\
        - Outliers represent 4.1% of total dataset"
        .to_string();

    let scraped_data = ScrapedData::Sources(vec![
        "Market research data from 15 authoritative sources".to_string(),
        "Industry reports and trend analysis".to_string(),
        "User behavior patterns and engagement metrics".to_string(),
        "Competitive landscape analysis".to_string(),
        "Expert opinions and forecasts".to_string(),
    ]);

    let now = Utc::now();
    let agent_logs = stages
        .iter()
        .map(|stage| AgentLogEntry {
            agent: stage.id.clone(),
            action: stage_action(stage),
            timestamp: now,
            status: "completed".to_string(),
        })
        .collect();

    AnalysisResults {
        query: query.to_string(),
        final_answer,
        eda_output,
        scraped_data,
        cleaned_data: None,
        model_info: Some(ModelDetails::Metrics(ModelInfo {
            accuracy: 0.892,
            model_type: "Random Forest Classifier".to_string(),
            features_used: 12,
        })),
        processing_time: Some(elapsed.as_secs_f64()),
        agent_logs,
        data_sources: Some(15),
        characters_processed: None,
        agent_actions: Some(stages.len() as u64),
    }
}

fn stage_action(stage: &AgentStage) -> String {
    match stage.id.as_str() {
        "prompt_agent" => "Query processed and validated".to_string(),
        "scraper_agent" => "Web scraping completed - 15 sources".to_string(),
        "data_cleaning_agent" => "Data preprocessing and cleaning".to_string(),
        "eda_agent" => "Exploratory data analysis performed".to_string(),
        "model_training_agent" => "ML model trained (89.2% accuracy)".to_string(),
        "report_agent" => "Final report generated".to_string(),
        _ => format!("{} completed", stage.name),
    }
}
