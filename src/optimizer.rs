//! Rule-based workflow optimization advice.
//!
//! The rules read the regressor's feature importances (execution time
//! explained by step, status and job indicators) together with the derived
//! step log itself.

use indexmap::IndexMap;
use serde::Serialize;

use crate::dataset::{DerivedFeatures, FeatureSet, STEP_PREFIX};
use crate::insights::FeatureImportance;
use crate::models::cmp_f64;
use crate::output::create_plain_table;

const BOTTLENECK_COUNT: usize = 5;
const PARALLELIZATION_MIN_STEPS: usize = 2;
const CACHING_MIN_IMPORTANCE: f64 = 0.1;
const SLOW_RUN_SECONDS: f64 = 300.0;
const FAILURE_RATE_LIMIT: f64 = 0.1;
const FAILING_STEPS_SHOWN: usize = 3;

/// The five most important features, most important first. Ties keep
/// their input order.
pub fn identify_bottlenecks(importances: &[FeatureImportance]) -> Vec<FeatureImportance> {
    let mut ranked = importances.to_vec();
    ranked.sort_by(|a, b| cmp_f64(b.importance, a.importance));
    ranked.truncate(BOTTLENECK_COUNT);
    ranked
}

fn step_name(feature: &str) -> Option<&str> {
    feature.strip_prefix(STEP_PREFIX)
}

pub fn suggest_parallelization(bottlenecks: &[FeatureImportance]) -> String {
    let steps: Vec<&str> = bottlenecks
        .iter()
        .filter_map(|b| step_name(&b.feature))
        .collect();

    if steps.len() > PARALLELIZATION_MIN_STEPS {
        let shown: Vec<&str> = steps.into_iter().take(3).collect();
        return format!(
            "Consider parallelizing steps related to: {}",
            shown.join(", ")
        );
    }
    "No significant parallelization opportunities identified.".to_string()
}

pub fn recommend_caching(bottlenecks: &[FeatureImportance]) -> String {
    let steps: Vec<&str> = bottlenecks
        .iter()
        .filter(|b| b.importance > CACHING_MIN_IMPORTANCE)
        .filter_map(|b| step_name(&b.feature))
        .collect();

    if steps.is_empty() {
        return "No significant caching opportunities identified.".to_string();
    }
    format!("Consider implementing caching for: {}", steps.join(", "))
}

/// Advice from the mean step execution time in seconds; no data is
/// treated as sufficient.
pub fn resource_allocation_advice(mean_execution_time: Option<f64>) -> String {
    match mean_execution_time {
        Some(mean) if mean > SLOW_RUN_SECONDS => {
            "Consider upgrading to a higher-capacity runner or optimizing resource-intensive steps."
                .to_string()
        }
        _ => "Current resource allocation appears sufficient.".to_string(),
    }
}

/// Share of steps concluded as `failure`.
#[allow(clippy::cast_precision_loss)]
pub fn failure_rate(features: &[DerivedFeatures]) -> f64 {
    if features.is_empty() {
        return 0.0;
    }
    let failed = features.iter().filter(|f| f.failed()).count();
    failed as f64 / features.len() as f64
}

pub fn failure_prevention_strategies(features: &[DerivedFeatures]) -> String {
    if failure_rate(features) <= FAILURE_RATE_LIMIT {
        return "Current failure rate is within acceptable limits.".to_string();
    }

    let mut failures: IndexMap<&str, usize> = IndexMap::new();
    for feature in features.iter().filter(|f| f.failed()) {
        *failures.entry(feature.step_name.as_str()).or_default() += 1;
    }
    let mut ranked: Vec<(&str, usize)> = failures.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));

    let advice: Vec<String> = ranked
        .iter()
        .take(FAILING_STEPS_SHOWN)
        .map(|(step, count)| format!("{step} ({count} failures)"))
        .collect();

    format!(
        "High failure rate detected. Focus on these steps: {}. Review error logs and consider implementing retry mechanisms for flaky tests.",
        advice.join(", ")
    )
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizationReport {
    pub bottlenecks: Vec<FeatureImportance>,
    pub parallelization: String,
    pub caching: String,
    pub resources: String,
    pub failure_prevention: String,
}

impl OptimizationReport {
    pub fn generate(importances: &[FeatureImportance], features: &FeatureSet) -> Self {
        let bottlenecks = identify_bottlenecks(importances);
        Self {
            parallelization: suggest_parallelization(&bottlenecks),
            caching: recommend_caching(&bottlenecks),
            resources: resource_allocation_advice(features.mean_execution_time()),
            failure_prevention: failure_prevention_strategies(&features.features),
            bottlenecks,
        }
    }

    pub fn render_text(&self) -> String {
        let mut out = String::from("Workflow Optimization Recommendations:\n\n");
        out.push_str("1. Bottleneck Analysis:\n");
        out.push_str(&self.bottleneck_table());
        out.push_str("\n\n");

        let sections = [
            ("2. Parallelization Opportunities:", &self.parallelization),
            ("3. Caching Recommendations:", &self.caching),
            ("4. Resource Allocation Advice:", &self.resources),
            ("5. Failure Prevention Strategies:", &self.failure_prevention),
        ];
        for (title, body) in sections {
            out.push_str(&format!("{title}\n{body}\n\n"));
        }
        out
    }

    fn bottleneck_table(&self) -> String {
        if self.bottlenecks.is_empty() {
            return "No feature importances available.".to_string();
        }

        let mut table = create_plain_table(&["feature", "importance"]);
        for b in &self.bottlenecks {
            table.add_row(vec![b.feature.clone(), format!("{:.6}", b.importance)]);
        }
        table.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fixtures::record;
    use crate::dataset::{derive_features, DeriveOptions};

    fn importance(feature: &str, importance: f64) -> FeatureImportance {
        FeatureImportance {
            feature: feature.to_string(),
            importance,
        }
    }

    fn features_with_conclusions(conclusions: &[(&str, &str)]) -> FeatureSet {
        let records: Vec<_> = conclusions
            .iter()
            .enumerate()
            .map(|(i, (step, conclusion))| {
                record(
                    i + 1,
                    step,
                    "completed",
                    conclusion,
                    "2024-01-01 10:00:00 +0000 UTC",
                    "2024-01-01 10:00:30 +0000 UTC",
                )
            })
            .collect();
        derive_features(&records, DeriveOptions::default()).unwrap()
    }

    #[test]
    fn test_identify_bottlenecks_keeps_top_five_in_order() {
        let importances = vec![
            importance("Attempt", 0.05),
            importance("StepName_Build", 0.30),
            importance("StepName_Test", 0.20),
            importance("Status_completed", 0.20),
            importance("JobName_ci", 0.10),
            importance("StepName_Lint", 0.15),
        ];

        let top = identify_bottlenecks(&importances);

        let names: Vec<&str> = top.iter().map(|b| b.feature.as_str()).collect();
        assert_eq!(
            names,
            ["StepName_Build", "StepName_Test", "Status_completed", "StepName_Lint", "JobName_ci"]
        );
    }

    #[test]
    fn test_parallelization_lists_three_important_steps() {
        let bottlenecks = vec![
            importance("StepName_Build", 0.15),
            importance("StepName_Test", 0.15),
            importance("StepName_Deploy", 0.15),
        ];

        assert_eq!(
            suggest_parallelization(&bottlenecks),
            "Consider parallelizing steps related to: Build, Test, Deploy"
        );
    }

    #[test]
    fn test_parallelization_needs_more_than_two_steps() {
        let bottlenecks = vec![
            importance("StepName_Build", 0.5),
            importance("StepName_Test", 0.3),
            importance("Attempt", 0.2),
        ];

        assert_eq!(
            suggest_parallelization(&bottlenecks),
            "No significant parallelization opportunities identified."
        );
    }

    #[test]
    fn test_caching_uses_importance_threshold() {
        let bottlenecks = vec![
            importance("StepName_Build", 0.4),
            importance("Status_completed", 0.3),
            importance("StepName_Test", 0.1),
        ];
        assert_eq!(
            recommend_caching(&bottlenecks),
            "Consider implementing caching for: Build"
        );

        let weak = vec![importance("StepName_Test", 0.1)];
        assert_eq!(
            recommend_caching(&weak),
            "No significant caching opportunities identified."
        );
    }

    #[test]
    fn test_resource_allocation_threshold() {
        assert_eq!(
            resource_allocation_advice(Some(300.0)),
            "Current resource allocation appears sufficient."
        );
        assert_eq!(
            resource_allocation_advice(Some(301.0)),
            "Consider upgrading to a higher-capacity runner or optimizing resource-intensive steps."
        );
        assert_eq!(
            resource_allocation_advice(None),
            "Current resource allocation appears sufficient."
        );
    }

    #[test]
    fn test_failure_rate_at_limit_is_acceptable() {
        let mut conclusions = vec![("Build", "success"); 9];
        conclusions.push(("Test", "failure"));
        let set = features_with_conclusions(&conclusions);

        assert!((failure_rate(&set.features) - 0.1).abs() < 1e-12);
        assert_eq!(
            failure_prevention_strategies(&set.features),
            "Current failure rate is within acceptable limits."
        );
    }

    #[test]
    fn test_high_failure_rate_lists_top_failing_steps() {
        let set = features_with_conclusions(&[
            ("Lint", "failure"),
            ("Test", "failure"),
            ("Test", "failure"),
            ("Deploy", "failure"),
            ("Build", "failure"),
            ("Build", "success"),
            ("Test", "skipped"),
        ]);

        assert_eq!(
            failure_prevention_strategies(&set.features),
            "High failure rate detected. Focus on these steps: Test (2 failures), Lint (1 failures), Deploy (1 failures). Review error logs and consider implementing retry mechanisms for flaky tests."
        );
    }

    #[test]
    fn test_render_text_has_all_sections() {
        let set = features_with_conclusions(&[("Build", "success"), ("Test", "success")]);
        let importances = vec![importance("StepName_Build", 0.7), importance("StepName_Test", 0.3)];

        let report = OptimizationReport::generate(&importances, &set);
        let text = report.render_text();

        assert!(text.starts_with("Workflow Optimization Recommendations:"));
        for section in [
            "1. Bottleneck Analysis:",
            "2. Parallelization Opportunities:",
            "3. Caching Recommendations:",
            "4. Resource Allocation Advice:",
            "5. Failure Prevention Strategies:",
        ] {
            assert!(text.contains(section), "missing {section}");
        }
        let build_row = text
            .lines()
            .find(|line| line.contains("StepName_Build"))
            .unwrap();
        assert!(build_row.starts_with('|'));
        assert!(build_row.contains("0.700000"));
        assert!(text.contains("| feature"));
        assert!(text.contains("Consider implementing caching for: Build, Test"));
    }
}
