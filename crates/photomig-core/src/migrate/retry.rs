use super::{MigrationSummary, Migrator};
use crate::cancel::PassOutcome;
use crate::error::Result;
use crate::progress::ProgressReporter;
use crate::storage::{FileRecord, FileStatus};
use std::time::Instant;
use tracing::{info, warn};

impl<'a> Migrator<'a> {
    /// Records eligible for retry. Unsupported files are never retried.
    pub fn retry_candidates(&self) -> Result<Vec<FileRecord>> {
        Ok(self.store.list_by_status(FileStatus::Failed)?)
    }

    /// Re-run every failed record through the single-group upload step.
    ///
    /// Files are re-stat'ed through the reader and regrouped, so a still and
    /// its motion clip that both failed go up together again.
    pub fn retry_failed(
        &self,
        reporter: &dyn ProgressReporter,
    ) -> Result<PassOutcome<MigrationSummary>> {
        let started = Instant::now();
        let failed = self.retry_candidates()?;
        info!("{} failed files eligible for retry", failed.len());

        let mut summary = MigrationSummary {
            dry_run: self.options.dry_run,
            total_files: failed.len(),
            ..MigrationSummary::default()
        };
        if self.options.dry_run {
            self.journal
                .note(&format!("dry run: {} failed files would be retried", failed.len()));
            return Ok(PassOutcome::Completed(summary));
        }

        let mut entries = Vec::with_capacity(failed.len());
        for record in &failed {
            match self.reader.stat(&record.source_path) {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    let message = format!("source no longer readable: {}", err);
                    warn!(path = %record.source_path, "{}", message);
                    let updated = FileRecord {
                        error_message: Some(message.clone()),
                        ..record.clone()
                    };
                    self.store.upsert_file(&updated)?;
                    self.journal
                        .record(&record.source_path, FileStatus::Failed.as_str(), Some(&message));
                    summary.failed += 1;
                }
            }
        }

        let groups = self.grouper.group(entries);
        summary.total_groups = groups.len();
        summary.paired_groups = groups.iter().filter(|g| g.is_paired()).count();
        reporter.on_scan_complete(failed.len(), groups.len(), groups.len());

        let outcome = self.run_batches(&groups, &mut summary, reporter)?;
        summary.duration_secs = started.elapsed().as_secs_f64();
        reporter.on_pass_complete(summary.duration_secs);
        self.journal.note(&format!(
            "retry finished: {} success, {} failed, {} unsupported",
            summary.success, summary.failed, summary.unsupported
        ));
        Ok(outcome.map(|_| summary))
    }
}
