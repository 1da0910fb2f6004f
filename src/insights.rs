use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dataset::DailyFailureRate;
use crate::models::ForecastPoint;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Execution-time distribution of one step (the numbers behind a box plot).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecutionStats {
    pub step_name: String,
    pub runs: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    pub mean: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NextRunPrediction {
    pub window_size: usize,
    pub success_probability: f64,
    pub failure_probability: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub source: String,
    pub generated_at: DateTime<Utc>,
    pub total_records: usize,
    pub skipped_records: usize,
    pub step_execution: Vec<StepExecutionStats>,
    pub daily_failure_rates: Vec<DailyFailureRate>,
    pub next_run: Option<NextRunPrediction>,
    pub forecast_interval_width: f64,
    pub forecast: Vec<ForecastPoint>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub source: String,
    pub trained_at: DateTime<Utc>,
    pub total_records: usize,
    pub skipped_records: usize,
    pub distinct_statuses: usize,
    pub classifier_accuracy: Option<f64>,
    pub sequence_windows: usize,
    pub sequence_accuracy: Option<f64>,
    pub forecast_days: usize,
    pub regressor_features: usize,
    pub top_features: Vec<FeatureImportance>,
    pub artifacts: Vec<String>,
}

/// One line of the batch prediction output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRow {
    #[serde(rename = "Row")]
    pub row: usize,
    #[serde(rename = "StepName")]
    pub step_name: String,
    #[serde(rename = "JobName")]
    pub job_name: String,
    #[serde(rename = "StartedAt")]
    pub started_at: String,
    #[serde(rename = "ExecutionTime")]
    pub execution_time: f64,
    #[serde(rename = "PredictedSuccess")]
    pub predicted_success: u8,
}
