use log::warn;
use serde::{Deserialize, Serialize};

use super::features::{DerivedFeatures, StatusEncoder};

/// Number of values per step in a window: encoded status and execution time.
pub const WINDOW_CHANNELS: usize = 2;

/// `W` consecutive feature vectors and the outcome of the step after them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceWindow {
    pub steps: Vec<[f64; WINDOW_CHANNELS]>,
    pub label: u8,
}

impl SequenceWindow {
    pub fn width(&self) -> usize {
        self.steps.len()
    }
}

/// Slides a window of `width` records over features already ordered by
/// start time.
///
/// Window `i` covers records `[i, i + width)` and is labelled with the
/// success of record `i + width`, so `max(len - width, 0)` windows are
/// produced. A zero width or too few records yields an empty dataset.
pub fn build_windows(sorted: &[&DerivedFeatures], width: usize) -> Vec<SequenceWindow> {
    if width == 0 || sorted.len() <= width {
        return Vec::new();
    }

    sorted
        .windows(width + 1)
        .map(|run| SequenceWindow {
            steps: run[..width].iter().map(|feature| feature.vector()).collect(),
            label: run[width].success,
        })
        .collect()
}

/// The most recent `width` records re-encoded with a saved encoder, ready
/// to be scored by a sequence model. `None` when there are fewer than
/// `width` records.
pub fn latest_window(
    sorted: &[&DerivedFeatures],
    width: usize,
    encoder: &StatusEncoder,
) -> Option<Vec<[f64; WINDOW_CHANNELS]>> {
    if width == 0 || sorted.len() < width {
        return None;
    }

    let window = sorted[sorted.len() - width..]
        .iter()
        .map(|feature| {
            let code = encoder.encode(&feature.status).unwrap_or_else(|| {
                warn!(
                    "Status '{}' (row {}) was not seen during training",
                    feature.status, feature.row
                );
                encoder.encode_lenient(&feature.status)
            });
            [f64::from(code), feature.execution_time]
        })
        .collect();

    Some(window)
}
