/// Trait for reporting pass progress.
///
/// The CLI implements it with indicatif bars. All methods have default
/// no-op implementations.
pub trait ProgressReporter {
    fn on_scan_start(&self) {}
    fn on_scan_complete(&self, _total_files: usize, _groups: usize, _pending: usize) {}
    fn on_batch_start(&self, _batch: usize, _total_batches: usize, _items: usize) {}
    fn on_item(&self, _path: &str) {}
    fn on_batch_complete(&self, _batch: usize, _total_batches: usize) {}
    fn on_pass_complete(&self, _duration_secs: f64) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
