use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::features::DerivedFeatures;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyFailureRate {
    pub date: NaiveDate,
    pub runs: usize,
    pub failures: usize,
    pub failure_rate: f64,
}

/// Counts records per calendar day of their start time, ascending by date.
/// Days without records are not filled in.
pub fn daily_counts(features: &[&DerivedFeatures]) -> Vec<DailyCount> {
    let mut counts: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for feature in features {
        *counts.entry(feature.started_at.date()).or_insert(0) += 1;
    }

    counts
        .into_iter()
        .map(|(date, count)| DailyCount { date, count })
        .collect()
}

/// Share of non-successful records per day.
pub fn daily_failure_rates(features: &[&DerivedFeatures]) -> Vec<DailyFailureRate> {
    let mut days: BTreeMap<NaiveDate, (usize, usize)> = BTreeMap::new();
    for feature in features {
        let (runs, failures) = days.entry(feature.started_at.date()).or_insert((0, 0));
        *runs += 1;
        if feature.success == 0 {
            *failures += 1;
        }
    }

    days.into_iter()
        .map(|(date, (runs, failures))| {
            #[allow(clippy::cast_precision_loss)]
            let failure_rate = failures as f64 / runs as f64;
            DailyFailureRate {
                date,
                runs,
                failures,
                failure_rate,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::features::tests::record;
    use crate::dataset::features::{derive_features, DeriveOptions};

    fn multi_day_set() -> crate::dataset::features::FeatureSet {
        let records = vec![
            record(1, "a", "A", "success", "2024-03-02 23:59:00 +0000 UTC", "2024-03-03 00:01:00 +0000 UTC"),
            record(2, "b", "A", "failure", "2024-03-01 10:00:00 +0000 UTC", "2024-03-01 10:00:05 +0000 UTC"),
            record(3, "c", "A", "success", "2024-03-01 11:00:00 +0000 UTC", "2024-03-01 11:00:05 +0000 UTC"),
            record(4, "d", "A", "skipped", "2024-03-05 08:00:00 +0200 UTC", "2024-03-05 08:00:05 +0200 UTC"),
            record(5, "e", "A", "success", "2024-03-01 12:00:00 +0000 UTC", "2024-03-01 12:00:05 +0000 UTC"),
        ];
        derive_features(&records, DeriveOptions::default()).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_daily_counts_group_by_start_date() {
        let set = multi_day_set();
        let counts = daily_counts(&set.sorted_by_start());

        assert_eq!(
            counts,
            vec![
                DailyCount { date: date(2024, 3, 1), count: 3 },
                DailyCount { date: date(2024, 3, 2), count: 1 },
                DailyCount { date: date(2024, 3, 5), count: 1 },
            ]
        );
    }

    #[test]
    fn test_daily_counts_sum_to_record_count() {
        let set = derive_features(
            &crate::dataset::features::tests::sequential_records(3000),
            DeriveOptions::default(),
        )
        .unwrap();
        let sorted = set.sorted_by_start();
        let counts = daily_counts(&sorted);

        let total: usize = counts.iter().map(|c| c.count).sum();
        assert_eq!(total, 3000);

        let mut dates: Vec<NaiveDate> = sorted.iter().map(|f| f.started_at.date()).collect();
        dates.dedup();
        assert_eq!(counts.len(), dates.len());
    }

    #[test]
    fn test_daily_counts_empty_input() {
        assert!(daily_counts(&[]).is_empty());
    }

    #[test]
    fn test_daily_failure_rates_count_non_success_as_failure() {
        let set = multi_day_set();
        let rates = daily_failure_rates(&set.sorted_by_start());

        assert_eq!(rates.len(), 3);
        assert_eq!(rates[0].runs, 3);
        assert_eq!(rates[0].failures, 1);
        assert!((rates[0].failure_rate - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(rates[1].failure_rate, 0.0);
        // "skipped" is not a success
        assert_eq!(rates[2].failure_rate, 1.0);
    }
}
