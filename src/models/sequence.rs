use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::SequencePredictor;
use crate::dataset::{SequenceWindow, WINDOW_CHANNELS};
use crate::error::{Result, RuncastError};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SequenceParams {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub seed: u64,
}

impl Default for SequenceParams {
    fn default() -> Self {
        Self {
            epochs: 50,
            batch_size: 32,
            learning_rate: 0.05,
            seed: 42,
        }
    }
}

/// Logistic regression over a standardized, flattened `W × 2` window.
///
/// Each channel (encoded status, execution time) is standardized with the
/// mean and deviation seen during training, the window is flattened
/// step-major and a single sigmoid unit yields the success probability of
/// the next run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowLogisticModel {
    params: SequenceParams,
    width: usize,
    means: [f64; WINDOW_CHANNELS],
    stds: [f64; WINDOW_CHANNELS],
    weights: Vec<f64>,
    bias: f64,
}

impl WindowLogisticModel {
    pub fn new(params: SequenceParams) -> Self {
        Self {
            params,
            width: 0,
            means: [0.0; WINDOW_CHANNELS],
            stds: [1.0; WINDOW_CHANNELS],
            weights: Vec::new(),
            bias: 0.0,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    fn flatten(&self, steps: &[[f64; WINDOW_CHANNELS]]) -> Vec<f64> {
        steps
            .iter()
            .flat_map(|step| {
                (0..WINDOW_CHANNELS).map(move |c| (step[c] - self.means[c]) / self.stds[c])
            })
            .collect()
    }

    fn logit(&self, inputs: &[f64]) -> f64 {
        self.bias
            + self
                .weights
                .iter()
                .zip(inputs)
                .map(|(w, x)| w * x)
                .sum::<f64>()
    }

    #[allow(clippy::cast_precision_loss)]
    fn standardize_from(&mut self, windows: &[SequenceWindow]) {
        let steps: Vec<&[f64; WINDOW_CHANNELS]> = windows.iter().flat_map(|w| &w.steps).collect();
        let n = steps.len() as f64;

        for c in 0..WINDOW_CHANNELS {
            let mean = steps.iter().map(|s| s[c]).sum::<f64>() / n;
            let var = steps.iter().map(|s| (s[c] - mean).powi(2)).sum::<f64>() / n;
            let std = var.sqrt();
            self.means[c] = mean;
            self.stds[c] = if std > f64::EPSILON { std } else { 1.0 };
        }
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl SequencePredictor for WindowLogisticModel {
    #[allow(clippy::cast_precision_loss)]
    fn fit(&mut self, windows: &[SequenceWindow]) -> Result<()> {
        let Some(first) = windows.first() else {
            return Err(RuncastError::InsufficientData(
                "no sequence windows to train on".to_string(),
            ));
        };

        let width = first.width();
        if width == 0 || windows.iter().any(|w| w.width() != width) {
            return Err(RuncastError::Model(format!(
                "sequence windows must all have the same non-zero width (first has {width})"
            )));
        }

        self.width = width;
        self.standardize_from(windows);
        self.weights = vec![0.0; width * WINDOW_CHANNELS];
        self.bias = 0.0;

        let inputs: Vec<Vec<f64>> = windows.iter().map(|w| self.flatten(&w.steps)).collect();
        let labels: Vec<f64> = windows.iter().map(|w| f64::from(w.label.min(1))).collect();

        let mut order: Vec<usize> = (0..windows.len()).collect();
        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let batch_size = self.params.batch_size.max(1);

        for _ in 0..self.params.epochs {
            order.shuffle(&mut rng);

            for batch in order.chunks(batch_size) {
                let mut grad_w = vec![0.0; self.weights.len()];
                let mut grad_b = 0.0;

                for &idx in batch {
                    let error = sigmoid(self.logit(&inputs[idx])) - labels[idx];
                    for (g, x) in grad_w.iter_mut().zip(&inputs[idx]) {
                        *g += error * x;
                    }
                    grad_b += error;
                }

                let step = self.params.learning_rate / batch.len() as f64;
                for (w, g) in self.weights.iter_mut().zip(&grad_w) {
                    *w -= step * g;
                }
                self.bias -= step * grad_b;
            }
        }

        log::debug!(
            "Trained window model on {} windows of width {width}",
            windows.len()
        );

        Ok(())
    }

    fn predict(&self, window: &[[f64; WINDOW_CHANNELS]]) -> Result<f64> {
        if self.width == 0 {
            return Err(RuncastError::Model("sequence model has not been fitted".to_string()));
        }
        if window.len() != self.width {
            return Err(RuncastError::Model(format!(
                "expected a window of {} steps, got {}",
                self.width,
                window.len()
            )));
        }

        Ok(sigmoid(self.logit(&self.flatten(window))).clamp(0.0, 1.0))
    }
}
