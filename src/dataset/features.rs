use std::fmt;

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::record::WorkflowStepRecord;
use super::timestamp::parse_timestamp;
use crate::error::{Result, RuncastError};

/// What to do with a record whose timestamps are malformed or whose
/// execution time is negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum InvalidRecordPolicy {
    /// Fail the run on the first invalid record
    #[default]
    Abort,
    /// Drop invalid records and report each one as a [`RecordIssue`]
    Skip,
}

/// Order in which status codes are assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusOrdering {
    /// Lexicographic order of the distinct statuses
    #[default]
    Sorted,
    /// Order in which statuses first appear in the log
    FirstSeen,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeriveOptions {
    pub policy: InvalidRecordPolicy,
    pub status_ordering: StatusOrdering,
}

/// Categorical status → dense integer code.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusEncoder {
    codes: IndexMap<String, u32>,
}

impl StatusEncoder {
    pub fn fit<'a, I>(statuses: I, ordering: StatusOrdering) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut distinct: Vec<&str> = Vec::new();
        for status in statuses {
            if !distinct.contains(&status) {
                distinct.push(status);
            }
        }

        if ordering == StatusOrdering::Sorted {
            distinct.sort_unstable();
        }

        #[allow(clippy::cast_possible_truncation)]
        let codes = distinct
            .into_iter()
            .enumerate()
            .map(|(code, status)| (status.to_string(), code as u32))
            .collect();

        Self { codes }
    }

    pub fn encode(&self, status: &str) -> Option<u32> {
        self.codes.get(status).copied()
    }

    /// Encodes a status, mapping anything unseen to the first unused code.
    pub fn encode_lenient(&self, status: &str) -> u32 {
        #[allow(clippy::cast_possible_truncation)]
        self.encode(status).unwrap_or(self.codes.len() as u32)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn statuses(&self) -> impl Iterator<Item = (&str, u32)> {
        self.codes.iter().map(|(status, code)| (status.as_str(), *code))
    }
}

/// Features derived from a single valid step record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedFeatures {
    pub row: usize,
    pub step_name: String,
    pub job_name: String,
    pub status: String,
    pub conclusion: String,
    pub attempt: Option<u32>,
    pub started_at: NaiveDateTime,
    pub completed_at: NaiveDateTime,
    /// `completed_at - started_at` in seconds
    pub execution_time: f64,
    pub status_encoded: u32,
    /// 1 when the conclusion is `success`, else 0
    pub success: u8,
}

impl DerivedFeatures {
    /// `true` only for an explicit `failure` conclusion (skipped or
    /// cancelled steps are neither successes nor failures here).
    pub fn failed(&self) -> bool {
        self.conclusion == "failure"
    }

    pub fn vector(&self) -> [f64; 2] {
        [f64::from(self.status_encoded), self.execution_time]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum IssueKind {
    MalformedTimestamp { field: String, value: String },
    NegativeExecutionTime { seconds: f64 },
}

/// A record that was dropped under [`InvalidRecordPolicy::Skip`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordIssue {
    pub row: usize,
    pub step_name: String,
    pub kind: IssueKind,
}

impl fmt::Display for RecordIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            IssueKind::MalformedTimestamp { field, value } => write!(
                f,
                "row {} ({}): malformed {field} timestamp '{value}'",
                self.row, self.step_name
            ),
            IssueKind::NegativeExecutionTime { seconds } => write!(
                f,
                "row {} ({}): negative execution time {seconds}s",
                self.row, self.step_name
            ),
        }
    }
}

/// Output of [`derive_features`]. Features are kept in source order; use
/// [`FeatureSet::sorted_by_start`] wherever temporal order matters.
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    pub features: Vec<DerivedFeatures>,
    pub encoder: StatusEncoder,
    pub issues: Vec<RecordIssue>,
}

impl FeatureSet {
    /// Features ordered by start time. The sort is stable, so records that
    /// started at the same instant keep their source order.
    pub fn sorted_by_start(&self) -> Vec<&DerivedFeatures> {
        let mut sorted: Vec<&DerivedFeatures> = self.features.iter().collect();
        sorted.sort_by_key(|feature| feature.started_at);
        sorted
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn success_labels(&self) -> Vec<u8> {
        self.features.iter().map(|f| f.success).collect()
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn mean_execution_time(&self) -> Option<f64> {
        if self.features.is_empty() {
            return None;
        }
        let total: f64 = self.features.iter().map(|f| f.execution_time).sum();
        Some(total / self.features.len() as f64)
    }
}

struct TimedRecord<'a> {
    record: &'a WorkflowStepRecord,
    started_at: NaiveDateTime,
    completed_at: NaiveDateTime,
    execution_time: f64,
}

/// Derives execution times, status codes and success labels.
///
/// # Errors
///
/// Under [`InvalidRecordPolicy::Abort`] the first malformed timestamp
/// yields [`RuncastError::Parse`] and the first negative execution time
/// yields [`RuncastError::DataQuality`]. Under `Skip` those records are
/// dropped and listed in [`FeatureSet::issues`].
pub fn derive_features(records: &[WorkflowStepRecord], options: DeriveOptions) -> Result<FeatureSet> {
    let mut timed = Vec::with_capacity(records.len());
    let mut issues = Vec::new();

    for record in records {
        match time_record(record) {
            Ok(entry) => timed.push(entry),
            Err(err) => match options.policy {
                InvalidRecordPolicy::Abort => return Err(err),
                InvalidRecordPolicy::Skip => issues.push(to_issue(record, err)),
            },
        }
    }

    let encoder = StatusEncoder::fit(
        timed.iter().map(|entry| entry.record.status.as_str()),
        options.status_ordering,
    );

    let features = timed
        .into_iter()
        .map(|entry| DerivedFeatures {
            row: entry.record.row,
            step_name: entry.record.step_name.clone(),
            job_name: entry.record.job_name.clone(),
            status: entry.record.status.clone(),
            conclusion: entry.record.conclusion.clone(),
            attempt: entry.record.attempt,
            started_at: entry.started_at,
            completed_at: entry.completed_at,
            execution_time: entry.execution_time,
            status_encoded: encoder.encode_lenient(&entry.record.status),
            success: u8::from(entry.record.conclusion == "success"),
        })
        .collect();

    Ok(FeatureSet {
        features,
        encoder,
        issues,
    })
}

fn time_record(record: &WorkflowStepRecord) -> Result<TimedRecord<'_>> {
    let started_at = parse_field(record, "StartedAt", &record.started_at)?;
    let completed_at = parse_field(record, "CompletedAt", &record.completed_at)?;

    #[allow(clippy::cast_precision_loss)]
    let execution_time = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;

    if execution_time < 0.0 {
        return Err(RuncastError::DataQuality {
            row: record.row,
            step: record.step_name.clone(),
            seconds: execution_time,
        });
    }

    Ok(TimedRecord {
        record,
        started_at,
        completed_at,
        execution_time,
    })
}

fn parse_field(record: &WorkflowStepRecord, field: &'static str, value: &str) -> Result<NaiveDateTime> {
    parse_timestamp(value).map_err(|source| RuncastError::Parse {
        row: record.row,
        field,
        value: value.to_string(),
        source,
    })
}

fn to_issue(record: &WorkflowStepRecord, err: RuncastError) -> RecordIssue {
    let kind = match err {
        RuncastError::Parse { field, value, .. } => IssueKind::MalformedTimestamp {
            field: field.to_string(),
            value,
        },
        RuncastError::DataQuality { seconds, .. } => IssueKind::NegativeExecutionTime { seconds },
        // time_record only produces the two variants above
        other => IssueKind::MalformedTimestamp {
            field: "unknown".to_string(),
            value: other.to_string(),
        },
    };

    RecordIssue {
        row: record.row,
        step_name: record.step_name.clone(),
        kind,
    }
}
