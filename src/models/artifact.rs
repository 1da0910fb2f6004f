use std::fmt;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::forecast::TrendForecaster;
use super::forest::{RandomForestClassifier, RandomForestRegressor};
use super::sequence::WindowLogisticModel;
use super::Regressor;
use crate::dataset::{DailyCount, FeatureSchema, StatusEncoder};
use crate::error::{Result, RuncastError};
use crate::insights::FeatureImportance;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    Classifier,
    SequenceModel,
    Forecaster,
    Regressor,
}

impl ArtifactKind {
    /// File suffix appended to the artifact base path.
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Classifier => "rf",
            Self::SequenceModel => "rnn",
            Self::Forecaster => "prophet",
            Self::Regressor => "regression",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Classifier => "classifier",
            Self::SequenceModel => "sequence model",
            Self::Forecaster => "forecaster",
            Self::Regressor => "regressor",
        };
        f.write_str(name)
    }
}

/// `<base>_<suffix>.json`, e.g. `workflow_models_rf.json`.
pub fn artifact_path(base: &Path, kind: ArtifactKind) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!("_{}.json", kind.suffix()));
    PathBuf::from(name)
}

/// Payload types that can be stored as a model artifact.
pub trait ArtifactPayload: Serialize + DeserializeOwned {
    const KIND: ArtifactKind;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierArtifact {
    pub schema: FeatureSchema,
    pub status_encoder: StatusEncoder,
    pub model: RandomForestClassifier,
    pub test_accuracy: Option<f64>,
}

impl ArtifactPayload for ClassifierArtifact {
    const KIND: ArtifactKind = ArtifactKind::Classifier;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceArtifact {
    pub window_size: usize,
    pub status_encoder: StatusEncoder,
    pub model: WindowLogisticModel,
    pub test_accuracy: Option<f64>,
}

impl ArtifactPayload for SequenceArtifact {
    const KIND: ArtifactKind = ArtifactKind::SequenceModel;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastArtifact {
    pub model: TrendForecaster,
    pub history: Vec<DailyCount>,
}

impl ArtifactPayload for ForecastArtifact {
    const KIND: ArtifactKind = ArtifactKind::Forecaster;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressorArtifact {
    pub schema: FeatureSchema,
    pub model: RandomForestRegressor,
}

impl RegressorArtifact {
    /// Importances paired with their column names, in schema order.
    pub fn feature_importances(&self) -> Vec<FeatureImportance> {
        self.schema
            .columns()
            .zip(self.model.feature_importances())
            .map(|(feature, importance)| FeatureImportance {
                feature: feature.to_string(),
                importance: *importance,
            })
            .collect()
    }
}

impl ArtifactPayload for RegressorArtifact {
    const KIND: ArtifactKind = ArtifactKind::Regressor;
}

#[derive(Deserialize)]
struct ArtifactHeader {
    kind: ArtifactKind,
    format_version: u32,
}

/// JSON envelope around a trained model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact<T> {
    pub kind: ArtifactKind,
    pub format_version: u32,
    pub created_at: DateTime<Utc>,
    pub payload: T,
}

impl<T: ArtifactPayload> ModelArtifact<T> {
    pub fn new(payload: T) -> Self {
        Self {
            kind: T::KIND,
            format_version: FORMAT_VERSION,
            created_at: Utc::now(),
            payload,
        }
    }

    /// Writes the artifact as JSON, replacing any existing file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        debug!("Saved {} to {}", self.kind, path.display());
        Ok(())
    }

    /// Reads an artifact, checking that it holds the expected kind of model
    /// in a supported format version.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;

        let header: ArtifactHeader = serde_json::from_str(&contents)?;
        if header.kind != T::KIND {
            return Err(RuncastError::Model(format!(
                "{} holds a {}, expected a {}",
                path.display(),
                header.kind,
                T::KIND
            )));
        }
        if header.format_version != FORMAT_VERSION {
            return Err(RuncastError::Model(format!(
                "{} uses artifact format {}, this build reads format {FORMAT_VERSION}",
                path.display(),
                header.format_version
            )));
        }

        let artifact: Self = serde_json::from_str(&contents)?;
        debug!("Loaded {} from {}", artifact.kind, path.display());
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Classifier, ForestParams, TimeSeriesForecaster};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn trained_classifier() -> ClassifierArtifact {
        let x: Vec<Vec<f64>> = (0..20).map(|i| vec![0.0, f64::from(i)]).collect();
        let y: Vec<u8> = (0..20).map(|i| u8::from(i < 10)).collect();
        let mut model = RandomForestClassifier::new(ForestParams {
            n_estimators: 5,
            ..ForestParams::default()
        });
        model.fit(&x, &y).unwrap();

        ClassifierArtifact {
            schema: FeatureSchema::classifier(),
            status_encoder: StatusEncoder::default(),
            model,
            test_accuracy: Some(1.0),
        }
    }

    #[test]
    fn test_artifact_path_appends_suffix() {
        let base = Path::new("out/workflow_models");
        assert_eq!(
            artifact_path(base, ArtifactKind::Classifier),
            PathBuf::from("out/workflow_models_rf.json")
        );
        assert_eq!(
            artifact_path(base, ArtifactKind::Forecaster),
            PathBuf::from("out/workflow_models_prophet.json")
        );
    }

    #[test]
    fn test_saved_classifier_predicts_identically() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("models_rf.json");
        let artifact = ModelArtifact::new(trained_classifier());

        artifact.save(&path).unwrap();
        let loaded = ModelArtifact::<ClassifierArtifact>::load(&path).unwrap();

        let probe: Vec<Vec<f64>> = (0..20).map(|i| vec![0.0, f64::from(i) + 0.25]).collect();
        assert_eq!(
            loaded.payload.model.predict(&probe),
            artifact.payload.model.predict(&probe)
        );
        assert_eq!(loaded.kind, ArtifactKind::Classifier);
        assert_eq!(loaded.payload.test_accuracy, Some(1.0));
    }

    #[test]
    fn test_load_rejects_wrong_kind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("models_prophet.json");

        let history = vec![DailyCount {
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            count: 3,
        }];
        let mut model = TrendForecaster::new(0.8);
        model.fit(&history).unwrap();
        ModelArtifact::new(ForecastArtifact { model, history })
            .save(&path)
            .unwrap();

        let err = ModelArtifact::<ClassifierArtifact>::load(&path).unwrap_err();
        assert!(err.to_string().contains("expected a classifier"));
    }

    #[test]
    fn test_load_rejects_unknown_format_version() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("models_rf.json");
        let mut artifact = ModelArtifact::new(trained_classifier());
        artifact.format_version = FORMAT_VERSION + 1;
        artifact.save(&path).unwrap();

        let err = ModelArtifact::<ClassifierArtifact>::load(&path).unwrap_err();
        assert!(err.to_string().contains("artifact format"));
    }

    #[test]
    fn test_load_propagates_io_and_json_errors() {
        let dir = TempDir::new().unwrap();

        let missing = ModelArtifact::<ClassifierArtifact>::load(&dir.path().join("absent.json"));
        assert!(matches!(missing, Err(RuncastError::Io(_))));

        let garbage = dir.path().join("garbage.json");
        fs::write(&garbage, "{not json").unwrap();
        let result = ModelArtifact::<ClassifierArtifact>::load(&garbage);
        assert!(matches!(result, Err(RuncastError::Json(_))));
    }
}
