//! Step log loading and the feature/label derivation pipeline.

mod daily;
mod features;
mod record;
mod schema;
mod split;
mod timestamp;
mod windows;

pub use daily::{daily_counts, daily_failure_rates, DailyCount, DailyFailureRate};
pub use features::{
    derive_features, DeriveOptions, DerivedFeatures, FeatureSet, InvalidRecordPolicy, RecordIssue,
    StatusEncoder, StatusOrdering,
};
pub use record::load_records;
pub use schema::{FeatureSchema, STEP_PREFIX};
pub use split::{take, Split};
pub use timestamp::format_timestamp;
pub use windows::{build_windows, latest_window, SequenceWindow, WINDOW_CHANNELS};

#[cfg(test)]
pub(crate) use features::tests as fixtures;
#[cfg(test)]
pub(crate) use features::IssueKind;
