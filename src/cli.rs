use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::analysis::build_report;
use crate::config::Config;
use crate::dataset::{
    derive_features, format_timestamp, load_records, FeatureSchema, FeatureSet,
    InvalidRecordPolicy,
};
use crate::insights::PredictionRow;
use crate::models::{
    artifact_path, ArtifactKind, ArtifactPayload, Classifier, ClassifierArtifact,
    ForecastArtifact, ModelArtifact, RegressorArtifact, SequenceArtifact,
};
use crate::optimizer::OptimizationReport;
use crate::output::{
    bright_green, cyan, export_derived, export_html, export_json, export_predictions,
    print_analysis_summary, print_training_summary, PhaseProgress,
};
use crate::run_log::RunLog;
use crate::training::{Trainer, TrainingOptions};

const DEFAULT_MODELS: &str = "workflow_models";

#[derive(Parser)]
#[command(name = "runcast")]
#[command(author, version, about = "CI/CD Workflow Run Forecasting", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./runcast.toml and friends)
    #[arg(short, long, global = true, env = "RUNCAST_CONFIG")]
    config: Option<PathBuf>,

    /// Abort on, or skip, records with malformed timestamps or negative durations
    #[arg(long, global = true, value_enum)]
    invalid_records: Option<InvalidRecordPolicy>,

    /// Append run log entries to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Train the classifier, sequence model, forecaster and regressor
    Train {
        /// Step log CSV
        data: PathBuf,

        /// Artifact base path; `_rf.json`, `_rnn.json`, ... are appended
        #[arg(short, long, default_value = DEFAULT_MODELS)]
        out: PathBuf,

        #[arg(short, long)]
        window_size: Option<usize>,
    },

    /// Report step timings, failure trend, next-run outlook and run forecast
    Analyze {
        data: PathBuf,

        #[arg(short, long, default_value = DEFAULT_MODELS)]
        models: PathBuf,

        #[arg(long, default_value = "workflow_analysis_report.html")]
        html: PathBuf,

        /// Also write the report as JSON
        #[arg(long)]
        json: Option<PathBuf>,

        /// Days to forecast
        #[arg(long)]
        horizon: Option<u32>,
    },

    /// Recommend workflow optimizations from the execution-time regressor
    Optimize {
        data: PathBuf,

        #[arg(short, long, default_value = DEFAULT_MODELS)]
        models: PathBuf,

        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Emit JSON instead of the text report
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Predict step success for every record of a CSV
    Predict {
        data: PathBuf,

        #[arg(short, long, default_value = DEFAULT_MODELS)]
        models: PathBuf,

        /// Prediction CSV (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export the derived features, daily counts and windows
    Derive {
        data: PathBuf,

        #[arg(short, long, default_value = "derived")]
        out_dir: PathBuf,

        #[arg(short, long)]
        window_size: Option<usize>,
    },
}

fn create_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(io::stdout().lock()),
    })
}

/// Loads an artifact that training may legitimately have skipped.
fn load_optional_artifact<T: ArtifactPayload>(
    base: &Path,
    kind: ArtifactKind,
    run_log: &mut RunLog,
) -> Result<Option<T>> {
    let path = artifact_path(base, kind);
    if !path.exists() {
        run_log.warn(&format!("No {kind} at {}", path.display()))?;
        return Ok(None);
    }
    load_artifact(base, kind).map(Some)
}

fn load_artifact<T: ArtifactPayload>(base: &Path, kind: ArtifactKind) -> Result<T> {
    let path = artifact_path(base, kind);
    let artifact = ModelArtifact::<T>::load(&path)
        .with_context(|| format!("Failed to load {kind} from {}", path.display()))?;
    Ok(artifact.payload)
}

impl Cli {
    /// Configuration with command-line overrides applied.
    fn config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        if let Some(policy) = self.invalid_records {
            config.pipeline.invalid_records = policy;
        }
        if let Some(log_file) = &self.log_file {
            config.output.log_file = Some(log_file.clone());
        }
        config.output.pretty |= self.pretty;
        Ok(config)
    }

    fn load_features(data: &Path, config: &Config, run_log: &mut RunLog) -> Result<FeatureSet> {
        let records = load_records(data)
            .with_context(|| format!("Failed to load step log {}", data.display()))?;
        let features = derive_features(&records, config.derive_options())?;

        run_log.record_issues(&features.issues)?;
        run_log.info(&format!(
            "Loaded {} records from {} ({} skipped)",
            features.len(),
            data.display(),
            features.issues.len()
        ))?;
        Ok(features)
    }

    fn execute_train(
        config: &Config,
        run_log: &mut RunLog,
        data: &Path,
        out: &Path,
    ) -> Result<()> {
        let progress = PhaseProgress::start(&["Loading step log", "Training models", "Saving artifacts"]);
        let features = Self::load_features(data, config, run_log)?;

        let progress = progress.advance();
        let models = Trainer::new(&features, TrainingOptions::from(config)).train_all(run_log)?;

        let progress = progress.advance();
        let summary = models.save(out, &data.display().to_string(), &features, run_log)?;
        progress.finish();

        print_training_summary(&summary);
        Ok(())
    }

    fn execute_analyze(
        config: &Config,
        run_log: &mut RunLog,
        data: &Path,
        models: &Path,
        html: &Path,
        json: Option<&Path>,
    ) -> Result<()> {
        let progress = PhaseProgress::start(&["Loading step log", "Loading models", "Building report"]);
        let features = Self::load_features(data, config, run_log)?;

        let progress = progress.advance();
        let sequence: Option<SequenceArtifact> =
            load_optional_artifact(models, ArtifactKind::SequenceModel, run_log)?;
        if let Some(sequence) = &sequence {
            if sequence.model.width() != sequence.window_size {
                anyhow::bail!(
                    "sequence model was fitted on windows of {} but its artifact declares {}",
                    sequence.model.width(),
                    sequence.window_size
                );
            }
        }
        let forecast: ForecastArtifact = load_artifact(models, ArtifactKind::Forecaster)?;

        let progress = progress.advance();
        let report = build_report(
            &data.display().to_string(),
            &features,
            sequence.as_ref(),
            &forecast,
            config.forecast.horizon_days,
        )?;
        progress.finish();

        let mut html_out = create_output(Some(html))?;
        export_html(&report, &mut html_out)?;
        html_out.flush()?;
        run_log.info(&format!("HTML report written to {}", html.display()))?;

        if let Some(json) = json {
            let mut json_out = create_output(Some(json))?;
            export_json(&report, config.output.pretty, &mut json_out)?;
            json_out.flush()?;
            run_log.info(&format!("JSON report written to {}", json.display()))?;
        }

        print_analysis_summary(&report);
        eprintln!("{} {}", bright_green("Report saved to"), cyan(html.display()));
        Ok(())
    }

    fn execute_optimize(
        config: &Config,
        run_log: &mut RunLog,
        data: &Path,
        models: &Path,
        output: Option<&Path>,
        json: bool,
    ) -> Result<()> {
        let features = Self::load_features(data, config, run_log)?;
        let regressor: RegressorArtifact = load_artifact(models, ArtifactKind::Regressor)?;

        let refs: Vec<_> = features.features.iter().collect();
        let unknown = regressor.schema.encode(&refs).unknown_values;
        if unknown > 0 {
            run_log.warn(&format!(
                "{unknown} step, status or job values were not seen when the regressor was trained"
            ))?;
        }

        let report = OptimizationReport::generate(&regressor.feature_importances(), &features);

        let mut out = create_output(output)?;
        if json {
            export_json(&report, config.output.pretty, &mut out)?;
        } else {
            write!(out, "{}", report.render_text())?;
        }
        out.flush()?;

        if let Some(path) = output {
            run_log.info(&format!("Optimization report written to {}", path.display()))?;
        }
        Ok(())
    }

    fn execute_predict(
        config: &Config,
        run_log: &mut RunLog,
        data: &Path,
        models: &Path,
        output: Option<&Path>,
    ) -> Result<()> {
        let features = Self::load_features(data, config, run_log)?;
        let classifier: ClassifierArtifact = load_artifact(models, ArtifactKind::Classifier)?;
        classifier.schema.ensure_matches(&FeatureSchema::classifier())?;
        if classifier.model.n_features() != classifier.schema.len() {
            anyhow::bail!(
                "classifier expects {} features but its schema names {}",
                classifier.model.n_features(),
                classifier.schema.len()
            );
        }

        // Statuses must carry the codes the classifier was trained with.
        let mut unseen = 0;
        let recoded: Vec<_> = features
            .features
            .iter()
            .map(|feature| {
                let mut feature = feature.clone();
                feature.status_encoded = classifier
                    .status_encoder
                    .encode(&feature.status)
                    .unwrap_or_else(|| {
                        unseen += 1;
                        classifier.status_encoder.encode_lenient(&feature.status)
                    });
                feature
            })
            .collect();
        if unseen > 0 {
            run_log.warn(&format!(
                "{unseen} records have a status the classifier was not trained on"
            ))?;
        }

        let refs: Vec<_> = recoded.iter().collect();
        let predictions = classifier.model.predict(&classifier.schema.encode(&refs).rows);

        let rows: Vec<PredictionRow> = recoded
            .iter()
            .zip(predictions)
            .map(|(feature, predicted_success)| PredictionRow {
                row: feature.row,
                step_name: feature.step_name.clone(),
                job_name: feature.job_name.clone(),
                started_at: format_timestamp(feature.started_at),
                execution_time: feature.execution_time,
                predicted_success,
            })
            .collect();

        export_predictions(&rows, create_output(output)?)?;
        run_log.info(&format!("Predicted {} records", rows.len()))?;
        Ok(())
    }

    fn execute_derive(
        config: &Config,
        run_log: &mut RunLog,
        data: &Path,
        out_dir: &Path,
    ) -> Result<()> {
        let features = Self::load_features(data, config, run_log)?;
        let paths = export_derived(
            &features,
            config.pipeline.window_size,
            config.output.pretty,
            out_dir,
        )?;
        for path in &paths {
            run_log.info(&format!("Wrote {}", path.display()))?;
        }
        Ok(())
    }

    fn run(&self, config: &Config, run_log: &mut RunLog) -> Result<()> {
        match &self.command {
            Commands::Train { data, out, .. } => Self::execute_train(config, run_log, data, out),
            Commands::Analyze {
                data,
                models,
                html,
                json,
                ..
            } => Self::execute_analyze(config, run_log, data, models, html, json.as_deref()),
            Commands::Optimize {
                data,
                models,
                output,
                json,
            } => Self::execute_optimize(config, run_log, data, models, output.as_deref(), *json),
            Commands::Predict {
                data,
                models,
                output,
            } => Self::execute_predict(config, run_log, data, models, output.as_deref()),
            Commands::Derive { data, out_dir, .. } => {
                Self::execute_derive(config, run_log, data, out_dir)
            }
        }
    }

    pub fn execute(&self) -> Result<()> {
        let mut config = self.config()?;
        match &self.command {
            Commands::Train {
                window_size: Some(size),
                ..
            }
            | Commands::Derive {
                window_size: Some(size),
                ..
            } => config.pipeline.window_size = *size,
            Commands::Analyze {
                horizon: Some(days),
                ..
            } => config.forecast.horizon_days = *days,
            _ => {}
        }
        config.validate()?;

        let mut run_log = RunLog::open(config.output.log_file.as_deref(), config.log_level())
            .context("Failed to open run log")?;
        if let Some(path) = run_log.path() {
            info!("Appending run log to {}", path.display());
        }

        let result = self.run(&config, &mut run_log);
        if let Err(err) = &result {
            run_log.error(&format!("{err:#}"))?;
        }
        run_log.close()?;

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_train_with_global_flags() {
        let cli = Cli::try_parse_from([
            "runcast",
            "train",
            "steps.csv",
            "--out",
            "models/ci",
            "--invalid-records",
            "skip",
            "--pretty",
        ])
        .unwrap();

        assert_eq!(cli.invalid_records, Some(InvalidRecordPolicy::Skip));
        assert!(cli.pretty);
        match cli.command {
            Commands::Train { data, out, window_size } => {
                assert_eq!(data, PathBuf::from("steps.csv"));
                assert_eq!(out, PathBuf::from("models/ci"));
                assert_eq!(window_size, None);
            }
            _ => panic!("expected train"),
        }
    }

    #[test]
    fn test_analyze_defaults() {
        let cli = Cli::try_parse_from(["runcast", "analyze", "steps.csv"]).unwrap();
        match cli.command {
            Commands::Analyze { models, html, json, horizon, .. } => {
                assert_eq!(models, PathBuf::from(DEFAULT_MODELS));
                assert_eq!(html, PathBuf::from("workflow_analysis_report.html"));
                assert!(json.is_none());
                assert!(horizon.is_none());
            }
            _ => panic!("expected analyze"),
        }
    }

    #[test]
    fn test_end_to_end_train_predict_derive() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("steps.csv");

        let mut csv = String::from("JobID,StepName,JobName,Status,Conclusion,Attempt,StartedAt,CompletedAt\n");
        for i in 0..30u32 {
            let conclusion = if i % 4 == 3 { "failure" } else { "success" };
            csv.push_str(&format!(
                "{i},step-{},build,completed,{conclusion},1,2024-01-0{} 10:{:02}:00 +0000 UTC,2024-01-0{} 10:{:02}:{:02} +0000 UTC\n",
                i % 3,
                1 + i / 10,
                i % 10,
                1 + i / 10,
                i % 10,
                5 + i % 7,
            ));
        }
        std::fs::write(&data, csv).unwrap();

        let mut config = Config::default();
        config.training.n_estimators = 5;
        config.training.sequence_epochs = 3;
        config.pipeline.window_size = 5;
        let mut run_log = RunLog::open(Some(&dir.path().join("run.log")), log::LevelFilter::Info).unwrap();

        let base = dir.path().join("models");
        Cli::execute_train(&config, &mut run_log, &data, &base).unwrap();

        let predictions = dir.path().join("predictions.csv");
        Cli::execute_predict(&config, &mut run_log, &data, &base, Some(&predictions)).unwrap();
        let written = std::fs::read_to_string(&predictions).unwrap();
        assert_eq!(written.lines().count(), 31);
        assert!(written.starts_with("Row,StepName,JobName,StartedAt,ExecutionTime,PredictedSuccess"));

        let report = dir.path().join("optimization.txt");
        Cli::execute_optimize(&config, &mut run_log, &data, &base, Some(&report), false).unwrap();
        assert!(std::fs::read_to_string(&report)
            .unwrap()
            .contains("5. Failure Prevention Strategies:"));

        let html = dir.path().join("report.html");
        let json = dir.path().join("report.json");
        Cli::execute_analyze(&config, &mut run_log, &data, &base, &html, Some(&json)).unwrap();
        assert!(std::fs::read_to_string(&html).unwrap().contains("Run Forecast"));
        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json).unwrap()).unwrap();
        assert_eq!(parsed["forecast"].as_array().unwrap().len(), 30);

        Cli::execute_derive(&config, &mut run_log, &data, &dir.path().join("derived")).unwrap();
        assert!(dir.path().join("derived/windows.json").exists());

        run_log.close().unwrap();
        let log = std::fs::read_to_string(dir.path().join("run.log")).unwrap();
        assert!(log.contains("Loaded 30 records"));
    }

    #[test]
    fn test_short_log_trains_and_analyzes_without_sequence_model() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("steps.csv");

        let mut csv = String::from("JobID,StepName,JobName,Status,Conclusion,Attempt,StartedAt,CompletedAt\n");
        for i in 0..6u32 {
            csv.push_str(&format!(
                "{i},step-{},build,completed,success,1,2024-01-01 10:{i:02}:00 +0000 UTC,2024-01-01 10:{i:02}:30 +0000 UTC\n",
                i % 2,
            ));
        }
        std::fs::write(&data, csv).unwrap();

        let mut config = Config::default();
        config.training.n_estimators = 5;
        let mut run_log = RunLog::open(None, log::LevelFilter::Info).unwrap();
        let base = dir.path().join("models");

        Cli::execute_train(&config, &mut run_log, &data, &base).unwrap();
        assert!(dir.path().join("models_rf.json").exists());
        assert!(!dir.path().join("models_rnn.json").exists());

        let json = dir.path().join("report.json");
        Cli::execute_analyze(&config, &mut run_log, &data, &base, &dir.path().join("report.html"), Some(&json)).unwrap();
        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json).unwrap()).unwrap();
        assert!(parsed["next_run"].is_null());
    }

    #[test]
    fn test_missing_columns_abort_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("steps.csv");
        std::fs::write(&data, "StepName,Status\nBuild,completed\n").unwrap();

        let config = Config::default();
        let mut run_log = RunLog::open(None, log::LevelFilter::Info).unwrap();
        let err = Cli::execute_derive(&config, &mut run_log, &data, &dir.path().join("out")).unwrap_err();

        assert!(format!("{err:#}").contains("Missing required columns"));
    }
}
