use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::styling::{bright, bright_green, bright_yellow};

/// Progress tracking for multi-phase operations
pub struct PhaseProgress {
    pb: ProgressBar,
    phases: &'static [&'static str],
    current: usize,
}

impl PhaseProgress {
    /// Prints the phase header and starts a spinner for the first phase.
    pub fn start(phases: &'static [&'static str]) -> Self {
        eprintln!("{}  {}", bright("⚙️"), bright("Phases").underlined());
        let pb = create_spinner(bright_yellow(label(phases, 0)).to_string());
        Self {
            pb,
            phases,
            current: 0,
        }
    }

    /// Marks the current phase done and moves to the next one.
    pub fn advance(self) -> Self {
        self.pb
            .finish_with_message(bright_green(format!("{} ✓", label(self.phases, self.current))).to_string());
        let current = self.current + 1;
        let pb = create_spinner(bright_yellow(label(self.phases, current)).to_string());
        Self {
            pb,
            phases: self.phases,
            current,
        }
    }

    pub fn finish(self) {
        self.pb
            .finish_with_message(bright_green(format!("{} ✓", label(self.phases, self.current))).to_string());
        eprintln!();
    }
}

fn label(phases: &[&str], index: usize) -> String {
    let name = phases.get(index).copied().unwrap_or("Finishing");
    format!("Phase {}/{}: {name}", index + 1, phases.len())
}

fn create_spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    if let Ok(style) = ProgressStyle::default_spinner().template("  {msg} {spinner}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
