use std::path::Path;

use chrono::Utc;

use crate::config::Config;
use crate::dataset::{
    build_windows, daily_counts, take, FeatureSchema, FeatureSet, SequenceWindow, Split,
};
use crate::error::{Result, RuncastError};
use crate::insights::TrainingSummary;
use crate::models::{
    accuracy, artifact_path, ArtifactKind, Classifier, ClassifierArtifact, ForecastArtifact,
    ForestParams, ModelArtifact, RandomForestClassifier, RandomForestRegressor, Regressor,
    RegressorArtifact, SequenceArtifact, SequenceParams, SequencePredictor, TimeSeriesForecaster,
    TrendForecaster, WindowLogisticModel,
};
use crate::run_log::RunLog;

const TOP_FEATURES_SHOWN: usize = 5;

#[derive(Debug, Clone, Copy)]
pub struct TrainingOptions {
    pub window_size: usize,
    pub test_fraction: f64,
    pub seed: u64,
    pub forest: ForestParams,
    pub sequence: SequenceParams,
    pub interval_width: f64,
}

impl From<&Config> for TrainingOptions {
    fn from(config: &Config) -> Self {
        Self {
            window_size: config.pipeline.window_size,
            test_fraction: config.training.test_fraction,
            seed: config.training.seed,
            forest: config.forest_params(),
            sequence: config.sequence_params(),
            interval_width: config.forecast.interval_width,
        }
    }
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// The trained models, ready to be saved. The sequence model is missing when
/// the log is too short to fill a single window.
pub struct TrainedModels {
    pub classifier: ClassifierArtifact,
    pub sequence: Option<SequenceArtifact>,
    pub forecast: ForecastArtifact,
    pub regressor: RegressorArtifact,
}

/// Fits every model on one derived step log.
pub struct Trainer<'a> {
    features: &'a FeatureSet,
    options: TrainingOptions,
}

impl<'a> Trainer<'a> {
    pub fn new(features: &'a FeatureSet, options: TrainingOptions) -> Self {
        Self { features, options }
    }

    /// Success classifier over `[StatusEncoded, ExecutionTime]`, scored on a
    /// held-out split.
    pub fn train_classifier(&self, run_log: &mut RunLog) -> Result<ClassifierArtifact> {
        let schema = FeatureSchema::classifier();
        let refs: Vec<_> = self.features.features.iter().collect();
        let x = schema.encode(&refs).rows;
        let y = self.features.success_labels();

        let split = Split::shuffled(x.len(), self.options.test_fraction, self.options.seed);
        let mut model = RandomForestClassifier::new(self.options.forest);
        model.fit(&take(&x, &split.train), &take(&y, &split.train))?;

        let test_accuracy = (!split.test.is_empty()).then(|| {
            let predicted = model.predict(&take(&x, &split.test));
            accuracy(&take(&y, &split.test), &predicted)
        });
        if let Some(acc) = test_accuracy {
            run_log.info(&format!("Random forest classifier accuracy: {acc:.4}"))?;
        }

        Ok(ClassifierArtifact {
            schema,
            status_encoder: self.features.encoder.clone(),
            model,
            test_accuracy,
        })
    }

    /// Next-run predictor over sliding windows of the time-ordered log.
    pub fn train_sequence_model(&self, run_log: &mut RunLog) -> Result<SequenceArtifact> {
        let width = self.options.window_size;
        let sorted = self.features.sorted_by_start();
        let windows = build_windows(&sorted, width);
        if windows.is_empty() {
            return Err(RuncastError::InsufficientData(format!(
                "a window size of {width} needs at least {} records, got {}",
                width + 1,
                sorted.len()
            )));
        }

        let split = Split::shuffled(windows.len(), self.options.test_fraction, self.options.seed);
        let mut model = WindowLogisticModel::new(self.options.sequence);
        model.fit(&take(&windows, &split.train))?;

        let test_accuracy = if split.test.is_empty() {
            None
        } else {
            let test: Vec<SequenceWindow> = take(&windows, &split.test);
            let expected: Vec<u8> = test.iter().map(|w| w.label).collect();
            let predicted = test
                .iter()
                .map(|w| model.predict(&w.steps).map(|p| u8::from(p > 0.5)))
                .collect::<Result<Vec<u8>>>()?;
            Some(accuracy(&expected, &predicted))
        };
        if let Some(acc) = test_accuracy {
            run_log.info(&format!(
                "Sequence model accuracy over {} windows: {acc:.4}",
                split.test.len()
            ))?;
        }

        Ok(SequenceArtifact {
            window_size: width,
            status_encoder: self.features.encoder.clone(),
            model,
            test_accuracy,
        })
    }

    pub fn train_forecaster(&self, run_log: &mut RunLog) -> Result<ForecastArtifact> {
        let history = daily_counts(&self.features.sorted_by_start());
        let mut model = TrendForecaster::new(self.options.interval_width);
        model.fit(&history)?;
        run_log.info(&format!(
            "Forecaster trained on {} days of run counts",
            history.len()
        ))?;
        Ok(ForecastArtifact { model, history })
    }

    /// Execution-time regressor over one-hot step, status and job columns.
    pub fn train_regressor(&self, run_log: &mut RunLog) -> Result<RegressorArtifact> {
        let schema = FeatureSchema::one_hot(&self.features.features);
        let refs: Vec<_> = self.features.features.iter().collect();
        let x = schema.encode(&refs).rows;
        let y: Vec<f64> = self.features.features.iter().map(|f| f.execution_time).collect();

        let mut model = RandomForestRegressor::new(self.options.forest);
        model.fit(&x, &y)?;

        let predicted = model.predict(&x);
        let mae = mean_absolute_error(&y, &predicted);
        run_log.info(&format!(
            "Execution-time regressor trained on {} features (training MAE {mae:.2}s)",
            schema.len()
        ))?;

        Ok(RegressorArtifact { schema, model })
    }

    pub fn train_all(&self, run_log: &mut RunLog) -> Result<TrainedModels> {
        if self.features.is_empty() {
            return Err(RuncastError::InsufficientData(
                "no valid records to train on".to_string(),
            ));
        }

        let encoding: Vec<String> = self
            .features
            .encoder
            .statuses()
            .map(|(status, code)| format!("{status}={code}"))
            .collect();
        run_log.info(&format!("Status encoding: {}", encoding.join(", ")))?;

        let classifier = self.train_classifier(run_log)?;
        let sequence = match self.train_sequence_model(run_log) {
            Ok(sequence) => Some(sequence),
            Err(RuncastError::InsufficientData(reason)) => {
                run_log.warn(&format!("Skipping the sequence model: {reason}"))?;
                None
            }
            Err(err) => return Err(err),
        };

        Ok(TrainedModels {
            classifier,
            sequence,
            forecast: self.train_forecaster(run_log)?,
            regressor: self.train_regressor(run_log)?,
        })
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean_absolute_error(expected: &[f64], predicted: &[f64]) -> f64 {
    if expected.is_empty() {
        return 0.0;
    }
    let total: f64 = expected
        .iter()
        .zip(predicted)
        .map(|(e, p)| (e - p).abs())
        .sum();
    total / expected.len() as f64
}

impl TrainedModels {
    /// Saves the artifacts next to `base` and summarizes the run.
    ///
    /// Without a sequence model, a `_rnn.json` left by an earlier run is
    /// removed so it cannot be paired with the new encoder.
    pub fn save(
        self,
        base: &Path,
        source: &str,
        features: &FeatureSet,
        run_log: &mut RunLog,
    ) -> Result<TrainingSummary> {
        let mut paths = vec![
            artifact_path(base, ArtifactKind::Classifier),
            artifact_path(base, ArtifactKind::Forecaster),
            artifact_path(base, ArtifactKind::Regressor),
        ];
        let sequence_path = artifact_path(base, ArtifactKind::SequenceModel);

        let mut top_features = self.regressor.feature_importances();
        top_features.sort_by(|a, b| crate::models::cmp_f64(b.importance, a.importance));
        top_features.truncate(TOP_FEATURES_SHOWN);

        let summary = TrainingSummary {
            source: source.to_string(),
            trained_at: Utc::now(),
            total_records: features.len(),
            skipped_records: features.issues.len(),
            distinct_statuses: features.encoder.len(),
            classifier_accuracy: self.classifier.test_accuracy,
            sequence_windows: self
                .sequence
                .as_ref()
                .map_or(0, |s| features.len().saturating_sub(s.window_size)),
            sequence_accuracy: self.sequence.as_ref().and_then(|s| s.test_accuracy),
            forecast_days: self.forecast.history.len(),
            regressor_features: self.regressor.schema.len(),
            top_features,
            artifacts: Vec::new(),
        };

        ModelArtifact::new(self.classifier).save(&paths[0])?;
        ModelArtifact::new(self.forecast).save(&paths[1])?;
        ModelArtifact::new(self.regressor).save(&paths[2])?;
        match self.sequence {
            Some(sequence) => {
                ModelArtifact::new(sequence).save(&sequence_path)?;
                paths.insert(1, sequence_path);
            }
            None if sequence_path.exists() => {
                std::fs::remove_file(&sequence_path)?;
                run_log.warn(&format!("Removed stale {}", sequence_path.display()))?;
            }
            None => {}
        }

        for path in &paths {
            run_log.info(&format!("Saved {}", path.display()))?;
        }
        Ok(TrainingSummary {
            artifacts: paths.iter().map(|p| p.display().to_string()).collect(),
            ..summary
        })
    }
}
