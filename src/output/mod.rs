mod exports;
mod progress;
mod styling;
mod summary;
mod tables;

pub use exports::{export_derived, export_html, export_json, export_predictions};
pub use progress::PhaseProgress;
pub use styling::{bright_green, cyan, dim, magenta_bold};
pub use summary::{print_analysis_summary, print_training_summary};
pub use tables::create_plain_table;

/// Prints the `runcast` banner to stderr.
///
/// Displays the tool name, version, and description at the start of execution.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("🔮 runcast"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("CI/CD Workflow Run Forecasting")
    );
}
