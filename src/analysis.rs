use chrono::Utc;
use indexmap::IndexMap;
use log::{info, warn};

use crate::dataset::{daily_failure_rates, latest_window, DerivedFeatures, FeatureSet};
use crate::error::Result;
use crate::insights::{AnalysisReport, NextRunPrediction, StepExecutionStats};
use crate::models::{
    cmp_f64, ForecastArtifact, SequenceArtifact, SequencePredictor, TimeSeriesForecaster,
};

/// Builds the analysis report for a derived step log.
///
/// The sequence model, when one was trained, scores the most recent
/// `window_size` runs. The forecaster projects run volume `horizon_days`
/// past its training data.
///
/// # Errors
///
/// Propagates model errors, e.g. a forecaster artifact that was never fitted.
pub fn build_report(
    source: &str,
    features: &FeatureSet,
    sequence: Option<&SequenceArtifact>,
    forecast: &ForecastArtifact,
    horizon_days: u32,
) -> Result<AnalysisReport> {
    let sorted = features.sorted_by_start();

    let scored = sequence.map(|s| (s, latest_window(&sorted, s.window_size, &s.status_encoder)));
    let next_run = match scored {
        None => {
            warn!("No sequence model was trained; skipping next-run prediction");
            None
        }
        Some((sequence, Some(window))) => {
            let success_probability = sequence.model.predict(&window)?;
            info!("Next run success probability: {success_probability:.3}");
            Some(NextRunPrediction {
                window_size: sequence.window_size,
                success_probability,
                failure_probability: 1.0 - success_probability,
            })
        }
        Some((sequence, None)) => {
            warn!(
                "Only {} records available, the sequence model needs {}; skipping next-run prediction",
                sorted.len(),
                sequence.window_size
            );
            None
        }
    };

    let points = forecast.model.forecast(horizon_days)?;
    if let Some(last) = forecast.model.last_observed() {
        info!("Forecasting {horizon_days} days after {last}");
    }

    Ok(AnalysisReport {
        source: source.to_string(),
        generated_at: Utc::now(),
        total_records: features.len(),
        skipped_records: features.issues.len(),
        step_execution: step_execution_stats(&features.features),
        daily_failure_rates: daily_failure_rates(&sorted),
        next_run,
        forecast_interval_width: forecast.model.interval_width(),
        forecast: points,
    })
}

/// Execution-time summaries per step, in order of first appearance.
#[allow(clippy::cast_precision_loss)]
pub fn step_execution_stats(features: &[DerivedFeatures]) -> Vec<StepExecutionStats> {
    let mut by_step: IndexMap<&str, Vec<f64>> = IndexMap::new();
    for feature in features {
        by_step
            .entry(feature.step_name.as_str())
            .or_default()
            .push(feature.execution_time);
    }

    by_step
        .into_iter()
        .map(|(step, mut times)| {
            times.sort_by(|a, b| cmp_f64(*a, *b));
            StepExecutionStats {
                step_name: step.to_string(),
                runs: times.len(),
                min: times[0],
                q1: quantile(&times, 0.25),
                median: quantile(&times, 0.5),
                q3: quantile(&times, 0.75),
                max: times[times.len() - 1],
                mean: times.iter().sum::<f64>() / times.len() as f64,
            }
        })
        .collect()
}

/// Linearly interpolated quantile of sorted, non-empty values.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}
