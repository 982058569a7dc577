//! Progress reporting with indicatif

use std::cell::RefCell;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

use crate::pipeline::{FitObserver, FitStage, FitWarning};

use super::styling::{print_step_header, print_warning};

/// Create a spinner for indeterminate progress
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(spinner) = ProgressStyle::default_spinner().template("    {spinner:.cyan} {msg}") {
        pb.set_style(spinner.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Create a progress bar counting scored records
pub fn create_progress_bar(len: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(bar) =
        ProgressStyle::default_bar().template("    {msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
    {
        pb.set_style(bar.progress_chars("█▓▒░"));
    }
    pb.set_message(message.to_string());
    pb
}

/// Finish a progress bar with a success message
pub fn finish_with_success(pb: &ProgressBar, message: &str) {
    pb.finish_with_message(format!("✅ {}", message));
}

/// Finish a progress bar with a warning message
pub fn finish_with_warning(pb: &ProgressBar, message: &str) {
    pb.finish_with_message(format!("⚠️  {}", message));
}

/// Renders each fit stage as a numbered step with a spinner.
pub struct StageProgress {
    step_offset: usize,
    active: RefCell<Option<(ProgressBar, Instant)>>,
}

impl StageProgress {
    /// `step_offset` numbers the first fit stage after steps already shown.
    pub fn new(step_offset: usize) -> Self {
        Self {
            step_offset,
            active: RefCell::new(None),
        }
    }

    /// Stop a spinner left running by a failed stage.
    pub fn abandon(&self) {
        if let Some((pb, _)) = self.active.borrow_mut().take() {
            finish_with_warning(&pb, "Stage failed");
        }
    }
}

impl FitObserver for StageProgress {
    fn stage_started(&self, stage: FitStage) {
        let index = FitStage::ALL
            .iter()
            .position(|s| *s == stage)
            .unwrap_or(0);
        print_step_header(self.step_offset + index + 1, stage.title());
        let spinner = create_spinner(&format!("Running {}...", stage.title().to_lowercase()));
        *self.active.borrow_mut() = Some((spinner, Instant::now()));
    }

    fn stage_finished(&self, stage: FitStage) {
        if let Some((pb, started)) = self.active.borrow_mut().take() {
            finish_with_success(
                &pb,
                &format!("{} done in {:.2}s", stage.title(), started.elapsed().as_secs_f64()),
            );
        }
    }

    fn warning(&self, warning: &FitWarning) {
        print_warning(&warning.to_string());
    }
}
