use std::fs::File;
use std::io::Read;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RuncastError};

/// Columns every step log must provide. Additional columns are ignored.
pub const REQUIRED_COLUMNS: [&str; 7] = [
    "StepName",
    "JobName",
    "Status",
    "Conclusion",
    "Attempt",
    "StartedAt",
    "CompletedAt",
];

/// One executed CI step as logged by the exporter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStepRecord {
    /// 1-based data row in the source file (the header is row 0)
    pub row: usize,
    pub step_name: String,
    pub job_name: String,
    pub status: String,
    pub conclusion: String,
    /// Run attempt; `None` when the column is not numeric
    pub attempt: Option<u32>,
    pub started_at: String,
    pub completed_at: String,
}

#[derive(Debug, Deserialize)]
struct RawStepRow {
    #[serde(rename = "StepName")]
    step_name: String,
    #[serde(rename = "JobName")]
    job_name: String,
    #[serde(rename = "Status")]
    status: String,
    #[serde(rename = "Conclusion")]
    conclusion: String,
    #[serde(rename = "Attempt")]
    attempt: String,
    #[serde(rename = "StartedAt")]
    started_at: String,
    #[serde(rename = "CompletedAt")]
    completed_at: String,
}

impl RawStepRow {
    fn into_record(self, row: usize) -> WorkflowStepRecord {
        WorkflowStepRecord {
            row,
            step_name: self.step_name,
            job_name: self.job_name,
            status: self.status,
            conclusion: self.conclusion,
            attempt: parse_attempt(&self.attempt),
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }
}

/// Whole-number attempts, including float renderings such as `2.0`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_attempt(value: &str) -> Option<u32> {
    let value = value.trim();
    if let Ok(attempt) = value.parse::<u32>() {
        return Some(attempt);
    }

    let attempt = value.parse::<f64>().ok()?;
    (attempt.is_finite() && attempt.fract() == 0.0 && (0.0..=f64::from(u32::MAX)).contains(&attempt))
        .then_some(attempt as u32)
}

/// Loads step records from a CSV file.
///
/// # Errors
///
/// Returns [`RuncastError::MissingColumns`] before reading any row when the
/// header lacks one of [`REQUIRED_COLUMNS`], or a CSV/IO error when the file
/// cannot be read.
pub fn load_records(path: &Path) -> Result<Vec<WorkflowStepRecord>> {
    let file = File::open(path)?;
    let records = read_records(file)?;
    debug!("Loaded {} step records from {}", records.len(), path.display());
    Ok(records)
}

/// Reads step records from any CSV source.
///
/// # Errors
///
/// See [`load_records`].
pub fn read_records<R: Read>(source: R) -> Result<Vec<WorkflowStepRecord>> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::Headers).from_reader(source);

    check_columns(reader.headers()?)?;

    reader
        .deserialize::<RawStepRow>()
        .enumerate()
        .map(|(idx, row)| Ok(row?.into_record(idx + 1)))
        .collect()
}

fn check_columns(headers: &csv::StringRecord) -> Result<()> {
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|column| !headers.iter().any(|header| header == **column))
        .map(|column| (*column).to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(RuncastError::MissingColumns(missing))
    }
}
