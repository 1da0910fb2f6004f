use std::collections::BTreeSet;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use super::features::DerivedFeatures;
use crate::error::{Result, RuncastError};

pub const STATUS_ENCODED: &str = "StatusEncoded";
pub const EXECUTION_TIME: &str = "ExecutionTime";
pub const ATTEMPT: &str = "Attempt";
pub const STEP_PREFIX: &str = "StepName_";
pub const STATUS_PREFIX: &str = "Status_";
pub const JOB_PREFIX: &str = "JobName_";

/// Ordered, named feature columns a model was trained on.
///
/// Matrices are always built through a schema so a saved model never
/// depends on positional column order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSchema {
    columns: IndexSet<String>,
}

/// Feature matrix plus the number of categorical values the schema did
/// not know about (ignored, as an unseen one-hot column would be).
#[derive(Debug, Clone, Default)]
pub struct EncodedMatrix {
    pub rows: Vec<Vec<f64>>,
    pub unknown_values: usize,
}

impl FeatureSchema {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// `[StatusEncoded, ExecutionTime]`, the input of the step classifier.
    pub fn classifier() -> Self {
        Self::new([STATUS_ENCODED, EXECUTION_TIME])
    }

    /// `Attempt` followed by one-hot step, status and job columns, each
    /// group sorted by value.
    pub fn one_hot(features: &[DerivedFeatures]) -> Self {
        let steps: BTreeSet<&str> = features.iter().map(|f| f.step_name.as_str()).collect();
        let statuses: BTreeSet<&str> = features.iter().map(|f| f.status.as_str()).collect();
        let jobs: BTreeSet<&str> = features.iter().map(|f| f.job_name.as_str()).collect();

        let columns = std::iter::once(ATTEMPT.to_string())
            .chain(steps.into_iter().map(|s| format!("{STEP_PREFIX}{s}")))
            .chain(statuses.into_iter().map(|s| format!("{STATUS_PREFIX}{s}")))
            .chain(jobs.into_iter().map(|s| format!("{JOB_PREFIX}{s}")));

        Self::new(columns)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Fails unless `actual` has exactly the same columns in the same order.
    pub fn ensure_matches(&self, actual: &Self) -> Result<()> {
        // IndexSet equality ignores order
        if self.columns.iter().eq(actual.columns.iter()) {
            return Ok(());
        }

        let missing: Vec<&str> = self
            .columns()
            .filter(|c| !actual.columns.contains(*c))
            .collect();
        let unexpected: Vec<&str> = actual
            .columns()
            .filter(|c| !self.columns.contains(*c))
            .collect();

        Err(RuncastError::SchemaMismatch(format!(
            "missing [{}], unexpected [{}]",
            missing.join(", "),
            unexpected.join(", ")
        )))
    }

    /// Encodes features against this schema. Named scalar columns take the
    /// feature's value, one-hot columns are 1 when the category matches and
    /// 0 otherwise. A non-numeric attempt encodes as 0.
    pub fn encode(&self, features: &[&DerivedFeatures]) -> EncodedMatrix {
        let mut unknown_values = 0;

        let rows = features
            .iter()
            .map(|feature| {
                let mut row = vec![0.0; self.columns.len()];
                for (idx, column) in self.columns.iter().enumerate() {
                    row[idx] = match column.as_str() {
                        STATUS_ENCODED => f64::from(feature.status_encoded),
                        EXECUTION_TIME => feature.execution_time,
                        ATTEMPT => feature.attempt.map_or(0.0, f64::from),
                        _ => 0.0,
                    };
                }

                for (prefix, value) in [
                    (STEP_PREFIX, &feature.step_name),
                    (STATUS_PREFIX, &feature.status),
                    (JOB_PREFIX, &feature.job_name),
                ] {
                    if !self.has_group(prefix) {
                        continue;
                    }
                    match self.columns.get_index_of(&format!("{prefix}{value}")) {
                        Some(idx) => row[idx] = 1.0,
                        None => unknown_values += 1,
                    }
                }

                row
            })
            .collect();

        EncodedMatrix {
            rows,
            unknown_values,
        }
    }

    fn has_group(&self, prefix: &str) -> bool {
        self.columns.iter().any(|c| c.starts_with(prefix))
    }
}
