use indicatif::{ProgressBar, ProgressStyle};
use photomig_core::ProgressReporter;
use std::cell::RefCell;
use std::time::Duration;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// CLI progress reporter using indicatif progress bars.
///
/// - Scan phase: spinner (source size unknown upfront)
/// - Batches: one bar per batch, sized to the batch
pub struct CliReporter {
    label: &'static str,
    bar: RefCell<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            bar: RefCell::new(None),
        }
    }

    fn set_bar(&self, pb: ProgressBar) {
        if let Some(old) = self.bar.borrow_mut().replace(pb) {
            old.finish_and_clear();
        }
    }

    fn finish_bar(&self) {
        if let Some(pb) = self.bar.borrow_mut().take() {
            pb.finish_and_clear();
        }
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars(TICK_CHARS)
}

fn batch_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "  {spinner:.cyan} {prefix} [{bar:30.cyan/dim}] {pos}/{len} {wide_msg:.dim}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("━╸─")
    .tick_chars(TICK_CHARS)
}

impl ProgressReporter for CliReporter {
    fn on_scan_start(&self) {
        let pb = ProgressBar::new_spinner();
        pb.set_style(spinner_style());
        pb.set_message("Scanning source...");
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_scan_complete(&self, total_files: usize, groups: usize, pending: usize) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Scan complete: {} files, {} groups, {} pending",
            total_files, groups, pending
        );
    }

    fn on_batch_start(&self, batch: usize, total_batches: usize, items: usize) {
        let pb = ProgressBar::new(items as u64);
        pb.set_style(batch_style());
        pb.set_prefix(format!("{} {}/{}", self.label, batch + 1, total_batches));
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_item(&self, path: &str) {
        if let Some(pb) = self.bar.borrow().as_ref() {
            pb.set_message(path.to_string());
            pb.inc(1);
        }
    }

    fn on_batch_complete(&self, _batch: usize, _total_batches: usize) {
        self.finish_bar();
    }

    fn on_pass_complete(&self, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m {} pass complete in {:.2}s",
            self.label, duration_secs
        );
    }
}
