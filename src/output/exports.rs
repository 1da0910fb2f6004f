use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::dataset::{
    build_windows, daily_counts, format_timestamp, DailyCount, DerivedFeatures, FeatureSet,
};
use crate::insights::{AnalysisReport, PredictionRow};

/// Writes any report as JSON followed by a newline.
pub fn export_json<T: Serialize + ?Sized>(
    value: &T,
    pretty: bool,
    output: &mut dyn Write,
) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    writeln!(output, "{json}")?;
    Ok(())
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn failure_class(rate: f64) -> &'static str {
    if rate <= 0.1 {
        "good"
    } else if rate < 0.25 {
        "warning"
    } else {
        "bad"
    }
}

/// Self-contained HTML page with the four analysis sections as tables.
pub fn export_html(report: &AnalysisReport, output: &mut dyn Write) -> Result<()> {
    let generated = report.generated_at.format("%Y-%m-%d %H:%M UTC");

    writeln!(output, "<!DOCTYPE html>")?;
    writeln!(output, "<html lang=\"en\">")?;
    writeln!(output, "<head>")?;
    writeln!(output, "    <meta charset=\"UTF-8\">")?;
    writeln!(output, "    <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">")?;
    writeln!(output, "    <title>Workflow Analysis Report - {}</title>", escape_html(&report.source))?;
    writeln!(output, "    <style>")?;
    writeln!(output, "        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; margin: 40px; background: #f5f5f5; }}")?;
    writeln!(output, "        .container {{ max-width: 1200px; margin: 0 auto; background: white; padding: 30px; border-radius: 8px; box-shadow: 0 2px 10px rgba(0,0,0,0.1); }}")?;
    writeln!(output, "        h1 {{ color: #2c3e50; border-bottom: 3px solid #3498db; padding-bottom: 10px; }}")?;
    writeln!(output, "        h2 {{ color: #34495e; margin-top: 30px; }}")?;
    writeln!(output, "        .summary {{ background: #ecf0f1; padding: 20px; border-radius: 5px; margin: 20px 0; }}")?;
    writeln!(output, "        table {{ width: 100%; border-collapse: collapse; margin: 20px 0; }}")?;
    writeln!(output, "        th, td {{ padding: 12px; text-align: left; border-bottom: 1px solid #ddd; }}")?;
    writeln!(output, "        th {{ background: #3498db; color: white; }}")?;
    writeln!(output, "        tr:nth-child(even) {{ background: #f8f9fa; }}")?;
    writeln!(output, "        .good {{ color: #27ae60; }}")?;
    writeln!(output, "        .warning {{ color: #f39c12; }}")?;
    writeln!(output, "        .bad {{ color: #e74c3c; }}")?;
    writeln!(output, "    </style>")?;
    writeln!(output, "</head>")?;
    writeln!(output, "<body>")?;
    writeln!(output, "    <div class=\"container\">")?;
    writeln!(output, "        <h1>Workflow Analysis Report</h1>")?;
    writeln!(output, "        <div class=\"summary\">")?;
    writeln!(output, "            <p><strong>Source:</strong> {}</p>", escape_html(&report.source))?;
    writeln!(output, "            <p><strong>Records analyzed:</strong> {}</p>", report.total_records)?;
    writeln!(output, "            <p><strong>Records skipped:</strong> {}</p>", report.skipped_records)?;
    writeln!(output, "            <p><strong>Generated:</strong> {generated}</p>")?;
    writeln!(output, "        </div>")?;

    writeln!(output, "        <h2>Execution Time by Step</h2>")?;
    writeln!(output, "        <table>")?;
    writeln!(output, "            <thead>")?;
    writeln!(output, "                <tr><th>Step</th><th>Runs</th><th>Min</th><th>Q1</th><th>Median</th><th>Q3</th><th>Max</th><th>Mean</th></tr>")?;
    writeln!(output, "            </thead>")?;
    writeln!(output, "            <tbody>")?;
    for stats in &report.step_execution {
        writeln!(
            output,
            "                <tr><td>{}</td><td>{}</td><td>{:.1}s</td><td>{:.1}s</td><td>{:.1}s</td><td>{:.1}s</td><td>{:.1}s</td><td>{:.1}s</td></tr>",
            escape_html(&stats.step_name),
            stats.runs,
            stats.min,
            stats.q1,
            stats.median,
            stats.q3,
            stats.max,
            stats.mean
        )?;
    }
    writeln!(output, "            </tbody>")?;
    writeln!(output, "        </table>")?;

    writeln!(output, "        <h2>Daily Failure Trend</h2>")?;
    writeln!(output, "        <table>")?;
    writeln!(output, "            <thead>")?;
    writeln!(output, "                <tr><th>Date</th><th>Runs</th><th>Failures</th><th>Failure Rate</th></tr>")?;
    writeln!(output, "            </thead>")?;
    writeln!(output, "            <tbody>")?;
    for day in &report.daily_failure_rates {
        writeln!(
            output,
            "                <tr><td>{}</td><td>{}</td><td>{}</td><td class=\"{}\">{:.1}%</td></tr>",
            day.date,
            day.runs,
            day.failures,
            failure_class(day.failure_rate),
            day.failure_rate * 100.0
        )?;
    }
    writeln!(output, "            </tbody>")?;
    writeln!(output, "        </table>")?;

    writeln!(output, "        <h2>Next Run Prediction</h2>")?;
    match &report.next_run {
        Some(next) => {
            writeln!(output, "        <table>")?;
            writeln!(output, "            <thead>")?;
            writeln!(output, "                <tr><th>Window</th><th>Success Probability</th><th>Failure Probability</th></tr>")?;
            writeln!(output, "            </thead>")?;
            writeln!(output, "            <tbody>")?;
            writeln!(
                output,
                "                <tr><td>last {} runs</td><td class=\"good\">{:.1}%</td><td class=\"bad\">{:.1}%</td></tr>",
                next.window_size,
                next.success_probability * 100.0,
                next.failure_probability * 100.0
            )?;
            writeln!(output, "            </tbody>")?;
            writeln!(output, "        </table>")?;
        }
        None => {
            writeln!(output, "        <p>Not enough runs for a next-run prediction.</p>")?;
        }
    }

    writeln!(output, "        <h2>Run Forecast</h2>")?;
    writeln!(output, "        <table>")?;
    writeln!(output, "            <thead>")?;
    writeln!(
        output,
        "                <tr><th>Date</th><th>Predicted Runs</th><th>Lower ({0:.0}%)</th><th>Upper ({0:.0}%)</th></tr>",
        report.forecast_interval_width * 100.0
    )?;
    writeln!(output, "            </thead>")?;
    writeln!(output, "            <tbody>")?;
    for point in &report.forecast {
        writeln!(
            output,
            "                <tr><td>{}</td><td>{:.1}</td><td>{:.1}</td><td>{:.1}</td></tr>",
            point.date, point.predicted, point.lower, point.upper
        )?;
    }
    writeln!(output, "            </tbody>")?;
    writeln!(output, "        </table>")?;

    writeln!(output, "        <footer style=\"margin-top: 40px; padding-top: 20px; border-top: 1px solid #ddd; color: #666; text-align: center;\">")?;
    writeln!(output, "            <p>Report generated by runcast v{} on {generated}</p>", env!("CARGO_PKG_VERSION"))?;
    writeln!(output, "        </footer>")?;
    writeln!(output, "    </div>")?;
    writeln!(output, "</body>")?;
    writeln!(output, "</html>")?;

    Ok(())
}

/// Writes batch predictions as CSV.
pub fn export_predictions<W: Write>(rows: &[PredictionRow], output: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(output);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct FeatureRow<'a> {
    #[serde(rename = "Row")]
    row: usize,
    #[serde(rename = "StepName")]
    step_name: &'a str,
    #[serde(rename = "JobName")]
    job_name: &'a str,
    #[serde(rename = "Status")]
    status: &'a str,
    #[serde(rename = "Conclusion")]
    conclusion: &'a str,
    #[serde(rename = "Attempt")]
    attempt: Option<u32>,
    #[serde(rename = "StartedAt")]
    started_at: String,
    #[serde(rename = "CompletedAt")]
    completed_at: String,
    #[serde(rename = "ExecutionTime")]
    execution_time: f64,
    #[serde(rename = "StatusEncoded")]
    status_encoded: u32,
    #[serde(rename = "Success")]
    success: u8,
}

impl<'a> From<&'a DerivedFeatures> for FeatureRow<'a> {
    fn from(feature: &'a DerivedFeatures) -> Self {
        Self {
            row: feature.row,
            step_name: &feature.step_name,
            job_name: &feature.job_name,
            status: &feature.status,
            conclusion: &feature.conclusion,
            attempt: feature.attempt,
            started_at: format_timestamp(feature.started_at),
            completed_at: format_timestamp(feature.completed_at),
            execution_time: feature.execution_time,
            status_encoded: feature.status_encoded,
            success: feature.success,
        }
    }
}

#[derive(Serialize)]
struct DailyCountRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Count")]
    count: usize,
}

fn export_features<W: Write>(sorted: &[&DerivedFeatures], output: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(output);
    for feature in sorted {
        writer.serialize(FeatureRow::from(*feature))?;
    }
    writer.flush()?;
    Ok(())
}

fn export_daily_counts<W: Write>(counts: &[DailyCount], output: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(output);
    for day in counts {
        writer.serialize(DailyCountRow {
            date: day.date.to_string(),
            count: day.count,
        })?;
    }
    writer.flush()?;
    Ok(())
}

fn create_file(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

/// Writes `features.csv`, `daily_counts.csv` and `windows.json` into `dir`
/// and returns their paths.
pub fn export_derived(
    features: &FeatureSet,
    window_size: usize,
    pretty: bool,
    dir: &Path,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory {}", dir.display()))?;

    let sorted = features.sorted_by_start();

    let features_path = dir.join("features.csv");
    export_features(&sorted, create_file(&features_path)?)?;

    let daily_path = dir.join("daily_counts.csv");
    export_daily_counts(&daily_counts(&sorted), create_file(&daily_path)?)?;

    let windows_path = dir.join("windows.json");
    let mut windows_file = create_file(&windows_path)?;
    export_json(
        build_windows(&sorted, window_size).as_slice(),
        pretty,
        &mut windows_file,
    )?;
    windows_file.flush()?;

    Ok(vec![features_path, daily_path, windows_path])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fixtures::sequential_records;
    use crate::dataset::{derive_features, DailyFailureRate, DeriveOptions, SequenceWindow};
    use crate::insights::{NextRunPrediction, StepExecutionStats};
    use crate::models::ForecastPoint;
    use chrono::{NaiveDate, Utc};

    fn create_test_report() -> AnalysisReport {
        let date = NaiveDate::from_ymd_opt(2024, 5, 6).unwrap();
        AnalysisReport {
            source: "steps<prod>.csv".to_string(),
            generated_at: Utc::now(),
            total_records: 10,
            skipped_records: 1,
            step_execution: vec![StepExecutionStats {
                step_name: "Set up job".to_string(),
                runs: 10,
                min: 1.0,
                q1: 2.0,
                median: 3.0,
                q3: 4.0,
                max: 5.0,
                mean: 3.0,
            }],
            daily_failure_rates: vec![DailyFailureRate {
                date,
                runs: 10,
                failures: 3,
                failure_rate: 0.3,
            }],
            next_run: Some(NextRunPrediction {
                window_size: 10,
                success_probability: 0.9,
                failure_probability: 0.1,
            }),
            forecast_interval_width: 0.8,
            forecast: vec![ForecastPoint {
                date: date.succ_opt().unwrap(),
                predicted: 11.0,
                lower: 8.0,
                upper: 14.0,
            }],
        }
    }

    #[test]
    fn test_export_json() {
        let report = create_test_report();
        let mut output = Vec::new();
        export_json(&report, false, &mut output).unwrap();
        let json_str = String::from_utf8(output).unwrap();
        assert!(json_str.contains("Set up job"));
        assert!(json_str.contains("\"success_probability\":0.9"));
        assert_eq!(json_str.lines().count(), 1);
    }

    #[test]
    fn test_export_json_pretty() {
        let report = create_test_report();
        let mut output = Vec::new();
        export_json(&report, true, &mut output).unwrap();
        let json_str = String::from_utf8(output).unwrap();
        assert!(json_str.lines().count() > 1);
        assert!(json_str.contains("  "));
    }

    #[test]
    fn test_export_html_structure() {
        let report = create_test_report();
        let mut output = Vec::new();
        export_html(&report, &mut output).unwrap();
        let html = String::from_utf8(output).unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("</html>"));
        assert_eq!(html.matches("<table>").count(), 4);
        for section in [
            "Execution Time by Step",
            "Daily Failure Trend",
            "Next Run Prediction",
            "Run Forecast",
        ] {
            assert!(html.contains(section), "missing {section}");
        }
        assert!(html.contains("steps&lt;prod&gt;.csv"));
        assert!(html.contains("class=\"bad\">30.0%"));
        assert!(html.contains("Lower (80%)"));
    }

    #[test]
    fn test_export_html_without_prediction() {
        let mut report = create_test_report();
        report.next_run = None;
        let mut output = Vec::new();
        export_html(&report, &mut output).unwrap();
        let html = String::from_utf8(output).unwrap();
        assert_eq!(html.matches("<table>").count(), 3);
        assert!(html.contains("Not enough runs"));
    }

    #[test]
    fn test_export_predictions_csv() {
        let rows = vec![PredictionRow {
            row: 3,
            step_name: "Build, test".to_string(),
            job_name: "ci".to_string(),
            started_at: "2024-01-01 00:00:00 +0000 UTC".to_string(),
            execution_time: 12.5,
            predicted_success: 1,
        }];
        let mut output = Vec::new();
        export_predictions(&rows, &mut output).unwrap();
        let csv = String::from_utf8(output).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("Row,StepName,JobName,StartedAt,ExecutionTime,PredictedSuccess")
        );
        assert_eq!(
            lines.next(),
            Some("3,\"Build, test\",ci,2024-01-01 00:00:00 +0000 UTC,12.5,1")
        );
    }

    #[test]
    fn test_export_derived_writes_three_files() {
        let set = derive_features(&sequential_records(12), DeriveOptions::default()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("derived");

        let paths = export_derived(&set, 10, false, &out).unwrap();
        assert_eq!(paths.len(), 3);

        let features = std::fs::read_to_string(out.join("features.csv")).unwrap();
        assert_eq!(features.lines().count(), 13);
        assert!(features.starts_with("Row,StepName,JobName,Status,Conclusion,Attempt,StartedAt"));

        let daily = std::fs::read_to_string(out.join("daily_counts.csv")).unwrap();
        assert_eq!(daily, "Date,Count\n2024-01-01,12\n");

        let windows: Vec<SequenceWindow> =
            serde_json::from_str(&std::fs::read_to_string(out.join("windows.json")).unwrap())
                .unwrap();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].width(), 10);
    }
}
