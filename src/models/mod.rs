//! Predictive models behind the capability traits the pipeline feeds.

mod artifact;
mod forecast;
mod forest;
mod sequence;
mod tree;

use std::cmp::Ordering;

pub use artifact::{
    artifact_path, ArtifactKind, ArtifactPayload, ClassifierArtifact, ForecastArtifact,
    ModelArtifact, RegressorArtifact, SequenceArtifact,
};
pub use forecast::{ForecastPoint, TrendForecaster};
pub use forest::{ForestParams, RandomForestClassifier, RandomForestRegressor};
pub use sequence::{SequenceParams, WindowLogisticModel};

use crate::dataset::{DailyCount, SequenceWindow, WINDOW_CHANNELS};
use crate::error::{Result, RuncastError};

/// Binary success/failure classifier over tabular rows.
pub trait Classifier {
    fn fit(&mut self, x: &[Vec<f64>], y: &[u8]) -> Result<()>;
    fn predict(&self, x: &[Vec<f64>]) -> Vec<u8>;
}

/// Regressor exposing per-feature importances, used by the optimizer.
pub trait Regressor {
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<()>;
    fn predict(&self, x: &[Vec<f64>]) -> Vec<f64>;
    fn feature_importances(&self) -> &[f64];
}

/// Predicts the success probability of the run following a window.
pub trait SequencePredictor {
    fn fit(&mut self, windows: &[SequenceWindow]) -> Result<()>;
    /// Probability in `[0, 1]`; errors when the window shape does not match
    /// the one the model was trained on.
    fn predict(&self, window: &[[f64; WINDOW_CHANNELS]]) -> Result<f64>;
}

/// Forecasts daily run volume.
pub trait TimeSeriesForecaster {
    fn fit(&mut self, series: &[DailyCount]) -> Result<()>;
    /// One point per day after the last observed date.
    fn forecast(&self, horizon_days: u32) -> Result<Vec<ForecastPoint>>;
}

pub(crate) fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// Checks that `x` is a non-empty rectangular matrix with one row per
/// target and returns its width.
pub(crate) fn validate_matrix(x: &[Vec<f64>], targets: usize) -> Result<usize> {
    let Some(first) = x.first() else {
        return Err(RuncastError::InsufficientData(
            "no rows to train on".to_string(),
        ));
    };

    if x.len() != targets {
        return Err(RuncastError::Model(format!(
            "{} feature rows but {targets} targets",
            x.len()
        )));
    }

    let width = first.len();
    if let Some(pos) = x.iter().position(|row| row.len() != width) {
        return Err(RuncastError::Model(format!(
            "row {pos} has {} features, expected {width}",
            x[pos].len()
        )));
    }

    Ok(width)
}

/// Share of matching labels; `0.0` for empty input.
#[allow(clippy::cast_precision_loss)]
pub fn accuracy(expected: &[u8], predicted: &[u8]) -> f64 {
    if expected.is_empty() {
        return 0.0;
    }
    let hits = expected
        .iter()
        .zip(predicted)
        .filter(|(a, b)| a == b)
        .count();
    hits as f64 / expected.len() as f64
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_accuracy() {
        assert_eq!(accuracy(&[1, 0, 1, 1], &[1, 1, 1, 0]), 0.5);
        assert_eq!(accuracy(&[], &[]), 0.0);
    }

    #[test]
    fn test_validate_matrix() {
        assert_eq!(validate_matrix(&[vec![1.0, 2.0], vec![3.0, 4.0]], 2).unwrap(), 2);
        assert!(validate_matrix(&[], 0).is_err());
        assert!(validate_matrix(&[vec![1.0]], 2).is_err());
    }
}
