use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::dataset::{DeriveOptions, InvalidRecordPolicy, StatusOrdering};
use crate::error::RuncastError;
use crate::models::{ForestParams, SequenceParams};

const CANDIDATES: [&str; 4] = ["runcast.toml", "runcast.json", "runcast.yaml", "runcast.yml"];
const MAX_HORIZON_DAYS: u32 = 3650;

/// Configuration file structure for runcast.
///
/// Every section is optional; missing keys fall back to the defaults the
/// pipeline was tuned with.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Derivation settings
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Model training parameters
    #[serde(default)]
    pub training: TrainingConfig,

    /// Forecast horizon and interval
    #[serde(default)]
    pub forecast: ForecastConfig,

    /// Output and run log preferences
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PipelineConfig {
    /// Number of consecutive runs fed to the sequence model
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// What to do with malformed timestamps and negative durations
    #[serde(default)]
    pub invalid_records: InvalidRecordPolicy,

    /// How status codes are assigned
    #[serde(default)]
    pub status_ordering: StatusOrdering,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TrainingConfig {
    /// Share of rows held out for accuracy reporting
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,

    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Trees per random forest
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,

    /// Maximum tree depth, unlimited when absent
    #[serde(default)]
    pub max_depth: Option<usize>,

    #[serde(default = "default_sequence_epochs")]
    pub sequence_epochs: usize,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ForecastConfig {
    /// Days forecast past the last observed date
    #[serde(default = "default_horizon_days")]
    pub horizon_days: u32,

    /// Coverage of the uncertainty interval, e.g. 0.8
    #[serde(default = "default_interval_width")]
    pub interval_width: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Pretty-print JSON output
    #[serde(default)]
    pub pretty: bool,

    /// Run log file, appended to on every run
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Minimum level written to the run log
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            invalid_records: InvalidRecordPolicy::default(),
            status_ordering: StatusOrdering::default(),
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_fraction: default_test_fraction(),
            seed: default_seed(),
            n_estimators: default_n_estimators(),
            max_depth: None,
            sequence_epochs: default_sequence_epochs(),
            batch_size: default_batch_size(),
            learning_rate: default_learning_rate(),
        }
    }
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon_days: default_horizon_days(),
            interval_width: default_interval_width(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            pretty: false,
            log_file: None,
            log_level: default_log_level(),
        }
    }
}

fn default_window_size() -> usize {
    10
}

fn default_test_fraction() -> f64 {
    0.2
}

fn default_seed() -> u64 {
    42
}

fn default_n_estimators() -> usize {
    100
}

fn default_sequence_epochs() -> usize {
    50
}

fn default_batch_size() -> usize {
    32
}

fn default_learning_rate() -> f64 {
    0.05
}

fn default_horizon_days() -> u32 {
    30
}

fn default_interval_width() -> f64 {
    0.8
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./runcast.toml, ./runcast.json, ./runcast.yaml, ./runcast.yml
    /// 3. `<config dir>/runcast/runcast.toml`
    ///
    /// Returns default configuration if no file is found. The loaded
    /// configuration is validated before it is returned.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let found = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::discover(Path::new(".")).or_else(|| {
                dirs::config_dir()
                    .map(|dir| dir.join("runcast").join("runcast.toml"))
                    .filter(|path| path.exists())
            }),
        };

        let config = match found {
            Some(path) => {
                log::debug!("Loading configuration from {}", path.display());
                Self::load_from_path(&path)?
            }
            None => Self::default(),
        };

        config.validate()?;
        Ok(config)
    }

    /// First candidate file present in `dir`.
    fn discover(dir: &Path) -> Option<PathBuf> {
        CANDIDATES
            .iter()
            .map(|candidate| dir.join(candidate))
            .find(|path| path.exists())
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }

    /// Rejects values the pipeline cannot run with.
    pub fn validate(&self) -> crate::error::Result<()> {
        let invalid = |message: String| Err(RuncastError::Config(message));

        let training = &self.training;
        if !(training.test_fraction > 0.0 && training.test_fraction < 1.0) {
            return invalid(format!(
                "test-fraction must be between 0 and 1 (exclusive), got {}",
                training.test_fraction
            ));
        }
        if training.n_estimators == 0 {
            return invalid("n-estimators must be at least 1".to_string());
        }
        if training.max_depth == Some(0) {
            return invalid("max-depth must be at least 1 when set".to_string());
        }
        if training.batch_size == 0 {
            return invalid("batch-size must be at least 1".to_string());
        }
        if !(training.learning_rate.is_finite() && training.learning_rate > 0.0) {
            return invalid(format!(
                "learning-rate must be a positive number, got {}",
                training.learning_rate
            ));
        }

        let forecast = &self.forecast;
        if !(1..=MAX_HORIZON_DAYS).contains(&forecast.horizon_days) {
            return invalid(format!(
                "horizon-days must be between 1 and {MAX_HORIZON_DAYS}, got {}",
                forecast.horizon_days
            ));
        }
        if !(forecast.interval_width > 0.0 && forecast.interval_width < 1.0) {
            return invalid(format!(
                "interval-width must be between 0 and 1 (exclusive), got {}",
                forecast.interval_width
            ));
        }

        if log::LevelFilter::from_str(&self.output.log_level).is_err() {
            return invalid(format!("unknown log-level '{}'", self.output.log_level));
        }

        Ok(())
    }

    pub fn derive_options(&self) -> DeriveOptions {
        DeriveOptions {
            policy: self.pipeline.invalid_records,
            status_ordering: self.pipeline.status_ordering,
        }
    }

    pub fn forest_params(&self) -> ForestParams {
        ForestParams {
            n_estimators: self.training.n_estimators,
            max_depth: self.training.max_depth,
            seed: self.training.seed,
        }
    }

    pub fn sequence_params(&self) -> SequenceParams {
        SequenceParams {
            epochs: self.training.sequence_epochs,
            batch_size: self.training.batch_size,
            learning_rate: self.training.learning_rate,
            seed: self.training.seed,
        }
    }

    /// Run log level; `validate` guarantees it parses.
    pub fn log_level(&self) -> log::LevelFilter {
        log::LevelFilter::from_str(&self.output.log_level).unwrap_or(log::LevelFilter::Info)
    }
}
