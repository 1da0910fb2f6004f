use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::{ASCII_MARKDOWN, UTF8_FULL};
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};

/// Table and cell creation helpers
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Uncolored ASCII table for reports that end up in plain text files.
pub fn create_plain_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(ASCII_MARKDOWN).set_header(header.to_vec());
    table
}

pub fn create_cyan_header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(*label).fg(TableColor::Cyan))
        .collect()
}

/// Probability or accuracy in `[0, 1]`, shown as a percentage.
pub fn color_coded_success_cell(share: f64) -> Cell {
    let rate = share * 100.0;
    let text = format!("{rate:.1}%");
    if rate > 80.0 {
        Cell::new(text).fg(TableColor::Green)
    } else if rate >= 50.0 {
        Cell::new(text).fg(TableColor::Yellow)
    } else {
        Cell::new(text).fg(TableColor::Red)
    }
}

/// Step execution time; anything over the five minute slow-run limit is red.
pub fn color_coded_duration_cell(seconds: f64) -> Cell {
    let text = if seconds < 60.0 {
        format!("{seconds:.1}s")
    } else {
        format!("{:.1}min", seconds / 60.0)
    };
    if seconds <= 120.0 {
        Cell::new(text).fg(TableColor::Green)
    } else if seconds <= 300.0 {
        Cell::new(text).fg(TableColor::Yellow)
    } else {
        Cell::new(text).fg(TableColor::Red)
    }
}

/// Failure share in `[0, 1]`; the 10% acceptable-rate limit marks yellow.
pub fn color_coded_failure_cell(share: f64) -> Cell {
    let rate = share * 100.0;
    let text = format!("{rate:.1}%");
    if rate >= 25.0 {
        Cell::new(text).fg(TableColor::Red)
    } else if rate > 10.0 {
        Cell::new(text).fg(TableColor::Yellow)
    } else {
        Cell::new(text).fg(TableColor::Green)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_table_is_ascii() {
        let mut table = create_plain_table(&["feature", "importance"]);
        table.add_row(vec!["Attempt", "0.250000"]);

        let text = table.to_string();
        assert!(text.is_ascii());
        assert!(text.lines().any(|line| line.contains("Attempt") && line.contains("0.250000")));
    }

    #[test]
    fn test_duration_cell_switches_units() {
        assert_eq!(color_coded_duration_cell(42.0).content(), "42.0s");
        assert_eq!(color_coded_duration_cell(90.0).content(), "1.5min");
    }

    #[test]
    fn test_share_cells_render_percentages() {
        assert_eq!(color_coded_success_cell(0.875).content(), "87.5%");
        assert_eq!(color_coded_failure_cell(0.1).content(), "10.0%");
    }
}
