use std::fmt::Write;

use comfy_table::Cell;

use crate::insights::{AnalysisReport, TrainingSummary};

use super::styling::{bright, bright_green, bright_red, bright_yellow, cyan, dim};
use super::tables::{
    color_coded_duration_cell, color_coded_failure_cell, color_coded_success_cell,
    create_cyan_header, create_table,
};

/// Prints the outcome of a training run to stdout.
pub fn print_training_summary(summary: &TrainingSummary) {
    println!("{}", render_training_summary(summary));
}

/// Prints a human-readable analysis report to stdout.
///
/// Displays color-coded tables showing:
/// - Overview: source, record counts
/// - Execution time by step: run counts, median, quartiles and extremes
/// - Daily failure trend
/// - Next run prediction from the latest window of runs
/// - Run forecast with its uncertainty interval
pub fn print_analysis_summary(report: &AnalysisReport) {
    println!("{}", render_analysis_summary(report));
}

fn add_section_header(output: &mut String, emoji: &str, title: &str) {
    let _ = writeln!(output, "{} {}", bright(emoji), bright(title).underlined());
}

#[allow(clippy::format_push_string)]
fn render_training_summary(summary: &TrainingSummary) -> String {
    let mut output = String::new();

    add_section_header(&mut output, "📊", "Training Overview");
    output.push_str(&format!(
        "  {} {}\n  {} {}\n  {} {}\n  {} {}\n  {} {}\n\n",
        dim("Source:"),
        cyan(&summary.source),
        dim("Records used:"),
        bright_yellow(summary.total_records),
        dim("Records skipped:"),
        if summary.skipped_records > 0 {
            bright_red(summary.skipped_records)
        } else {
            bright_green(summary.skipped_records)
        },
        dim("Distinct statuses:"),
        bright_yellow(summary.distinct_statuses),
        dim("Trained at:"),
        dim(summary.trained_at.format("%Y-%m-%d %H:%M UTC"))
    ));

    add_section_header(&mut output, "🧠", "Models");
    let mut models_table = create_table();
    models_table.set_header(create_cyan_header(&["Model", "Trained On", "Held-out Accuracy"]));
    models_table.add_row(vec![
        Cell::new("Random forest classifier"),
        Cell::new(format!("{} records", summary.total_records)),
        summary
            .classifier_accuracy
            .map_or_else(|| Cell::new("n/a"), color_coded_success_cell),
    ]);
    models_table.add_row(vec![
        Cell::new("Sequence model"),
        Cell::new(format!("{} windows", summary.sequence_windows)),
        summary
            .sequence_accuracy
            .map_or_else(|| Cell::new("n/a"), color_coded_success_cell),
    ]);
    models_table.add_row(vec![
        Cell::new("Run forecaster"),
        Cell::new(format!("{} days", summary.forecast_days)),
        Cell::new("n/a"),
    ]);
    models_table.add_row(vec![
        Cell::new("Execution-time regressor"),
        Cell::new(format!("{} features", summary.regressor_features)),
        Cell::new("n/a"),
    ]);
    output.push_str(&format!("{models_table}\n\n"));

    if !summary.top_features.is_empty() {
        add_section_header(&mut output, "🐢", "Top Execution-Time Drivers");
        let mut features_table = create_table();
        features_table.set_header(create_cyan_header(&["#", "Feature", "Importance"]));
        for (idx, feature) in summary.top_features.iter().enumerate() {
            features_table.add_row(vec![
                Cell::new(idx + 1),
                Cell::new(&feature.feature),
                Cell::new(format!("{:.4}", feature.importance)),
            ]);
        }
        output.push_str(&format!("{features_table}\n\n"));
    }

    add_section_header(&mut output, "💾", "Artifacts");
    for artifact in &summary.artifacts {
        let _ = writeln!(output, "  {} {}", cyan("•"), artifact);
    }

    output
}

#[allow(clippy::format_push_string)]
fn render_analysis_summary(report: &AnalysisReport) -> String {
    let mut output = String::new();

    add_section_header(&mut output, "📊", "Overview");
    output.push_str(&format!(
        "  {} {}\n  {} {}\n  {} {}\n  {} {}\n\n",
        dim("Source:"),
        cyan(&report.source),
        dim("Records analyzed:"),
        bright_yellow(report.total_records),
        dim("Records skipped:"),
        if report.skipped_records > 0 {
            bright_red(report.skipped_records)
        } else {
            bright_green(report.skipped_records)
        },
        dim("Analysis date:"),
        dim(report.generated_at.format("%Y-%m-%d %H:%M UTC"))
    ));

    if report.step_execution.is_empty() {
        output.push_str(&format!("{}\n", bright_yellow("No step data found.")));
        return output;
    }

    add_section_header(&mut output, "⏱️", "Execution Time by Step");
    let mut steps_table = create_table();
    steps_table.set_header(create_cyan_header(&[
        "Step", "Runs", "Min", "Q1", "Median", "Q3", "Max", "Mean",
    ]));
    for stats in &report.step_execution {
        steps_table.add_row(vec![
            Cell::new(&stats.step_name),
            Cell::new(stats.runs),
            color_coded_duration_cell(stats.min),
            color_coded_duration_cell(stats.q1),
            color_coded_duration_cell(stats.median),
            color_coded_duration_cell(stats.q3),
            color_coded_duration_cell(stats.max),
            color_coded_duration_cell(stats.mean),
        ]);
    }
    output.push_str(&format!("{steps_table}\n\n"));

    add_section_header(&mut output, "📉", "Daily Failure Trend");
    let mut trend_table = create_table();
    trend_table.set_header(create_cyan_header(&["Date", "Runs", "Failures", "Failure Rate"]));
    for day in &report.daily_failure_rates {
        trend_table.add_row(vec![
            Cell::new(day.date),
            Cell::new(day.runs),
            Cell::new(day.failures),
            color_coded_failure_cell(day.failure_rate),
        ]);
    }
    output.push_str(&format!("{trend_table}\n\n"));

    add_section_header(&mut output, "🔮", "Next Run Prediction");
    match &report.next_run {
        Some(next) => {
            let _ = writeln!(
                output,
                "  {} {}\n  {} {}\n  {} {}\n",
                dim("Based on the last runs:"),
                bright_yellow(next.window_size),
                dim("Success probability:"),
                bright_green(format!("{:.1}%", next.success_probability * 100.0)),
                dim("Failure probability:"),
                bright_red(format!("{:.1}%", next.failure_probability * 100.0)),
            );
        }
        None => {
            let _ = writeln!(
                output,
                "  {}\n",
                bright_yellow("Not enough runs for a next-run prediction.")
            );
        }
    }

    add_section_header(&mut output, "📈", "Run Forecast");
    let mut forecast_table = create_table();
    let interval = format!("{:.0}% Interval", report.forecast_interval_width * 100.0);
    forecast_table.set_header(create_cyan_header(&["Date", "Predicted Runs", &interval]));
    for point in &report.forecast {
        forecast_table.add_row(vec![
            Cell::new(point.date),
            Cell::new(format!("{:.1}", point.predicted)),
            Cell::new(format!("{:.1} to {:.1}", point.lower, point.upper)),
        ]);
    }
    output.push_str(&format!("{forecast_table}\n"));

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DailyFailureRate;
    use crate::insights::{FeatureImportance, NextRunPrediction, StepExecutionStats};
    use crate::models::ForecastPoint;
    use chrono::{NaiveDate, Utc};

    fn create_test_report(next_run: Option<NextRunPrediction>) -> AnalysisReport {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        AnalysisReport {
            source: "all_steps.csv".to_string(),
            generated_at: Utc::now(),
            total_records: 120,
            skipped_records: 2,
            step_execution: vec![StepExecutionStats {
                step_name: "Run tests".to_string(),
                runs: 60,
                min: 12.0,
                q1: 30.0,
                median: 45.0,
                q3: 90.0,
                max: 400.0,
                mean: 70.0,
            }],
            daily_failure_rates: vec![DailyFailureRate {
                date,
                runs: 60,
                failures: 6,
                failure_rate: 0.1,
            }],
            next_run,
            forecast_interval_width: 0.8,
            forecast: vec![ForecastPoint {
                date: date.succ_opt().unwrap(),
                predicted: 58.0,
                lower: 50.5,
                upper: 65.5,
            }],
        }
    }

    #[test]
    fn test_render_analysis_summary_sections() {
        let output = render_analysis_summary(&create_test_report(Some(NextRunPrediction {
            window_size: 10,
            success_probability: 0.75,
            failure_probability: 0.25,
        })));

        assert!(output.contains("all_steps.csv"));
        assert!(output.contains("Execution Time by Step"));
        assert!(output.contains("Run tests"));
        assert!(output.contains("6.7min"));
        assert!(output.contains("Daily Failure Trend"));
        assert!(output.contains("2024-03-01"));
        assert!(output.contains("10.0%"));
        assert!(output.contains("75.0%"));
        assert!(output.contains("80% Interval"));
        assert!(output.contains("2024-03-02"));
        assert!(output.contains("58.0"));
    }

    #[test]
    fn test_render_analysis_summary_without_prediction() {
        let output = render_analysis_summary(&create_test_report(None));
        assert!(output.contains("Not enough runs"));
    }

    #[test]
    fn test_render_analysis_summary_empty() {
        let mut report = create_test_report(None);
        report.step_execution.clear();

        let output = render_analysis_summary(&report);

        assert!(output.contains("No step data found"));
        assert!(!output.contains("Run Forecast"));
    }

    #[test]
    fn test_render_training_summary() {
        let summary = TrainingSummary {
            source: "all_steps.csv".to_string(),
            trained_at: Utc::now(),
            total_records: 500,
            skipped_records: 0,
            distinct_statuses: 3,
            classifier_accuracy: Some(0.92),
            sequence_windows: 490,
            sequence_accuracy: None,
            forecast_days: 21,
            regressor_features: 14,
            top_features: vec![FeatureImportance {
                feature: "StepName_Build".to_string(),
                importance: 0.4321,
            }],
            artifacts: vec!["workflow_models_rf.json".to_string()],
        };

        let output = render_training_summary(&summary);

        assert!(output.contains("Records used:"));
        assert!(output.contains("92.0%"));
        assert!(output.contains("490 windows"));
        assert!(output.contains("21 days"));
        assert!(output.contains("StepName_Build"));
        assert!(output.contains("0.4321"));
        assert!(output.contains("workflow_models_rf.json"));
    }
}
