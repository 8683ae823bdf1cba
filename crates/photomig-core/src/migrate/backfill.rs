use super::{MigrationSummary, Migrator};
use crate::cancel::PassOutcome;
use crate::error::Result;
use crate::fingerprint::fingerprint;
use crate::progress::ProgressReporter;
use crate::storage::FileStatus;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of a backfill pass over files that have no recorded outcome.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BackfillSummary {
    pub dry_run: bool,
    pub unrecorded: usize,
    /// (source path, destination asset id) pairs whose content was already
    /// present at the destination.
    pub linked: Vec<(String, String)>,
    /// Source paths that need an upload.
    pub to_upload: Vec<String>,
    pub read_failures: usize,
    pub upload: MigrationSummary,
}

impl<'a> Migrator<'a> {
    /// Reconcile origin files missing from the store.
    ///
    /// Content already at the destination is linked by checksum without an
    /// upload. Everything else goes through the regular group upload step.
    /// A dry run reports both lists and records nothing.
    pub fn backfill(&self, reporter: &dyn ProgressReporter) -> Result<PassOutcome<BackfillSummary>> {
        let started = Instant::now();
        reporter.on_scan_start();

        let mut unrecorded = Vec::new();
        for entry in self.reader.list_files()? {
            if self.store.get_file(&entry.path)?.is_none() {
                unrecorded.push(entry);
            }
        }
        info!("{} source files have no recorded outcome", unrecorded.len());

        let mut summary = BackfillSummary {
            dry_run: self.options.dry_run,
            unrecorded: unrecorded.len(),
            ..BackfillSummary::default()
        };
        if unrecorded.is_empty() {
            reporter.on_scan_complete(0, 0, 0);
            return Ok(PassOutcome::Completed(summary));
        }

        let by_checksum: HashMap<String, String> = self
            .client
            .list_all_assets()?
            .into_iter()
            .filter_map(|asset| asset.checksum.map(|checksum| (checksum, asset.id)))
            .collect();
        debug!("{} destination checksums indexed", by_checksum.len());

        let mut pending = Vec::new();
        for entry in unrecorded {
            let data = match self.reader.read_file(&entry.path) {
                Ok(data) => data,
                Err(err) => {
                    let message = format!("read error: {}", err);
                    warn!(path = %entry.path, "{}", message);
                    summary.read_failures += 1;
                    if !self.options.dry_run {
                        self.record(
                            &entry,
                            None,
                            FileStatus::Failed,
                            None,
                            Some(&message),
                            None,
                        )?;
                    }
                    continue;
                }
            };
            let digest = fingerprint(&data);
            drop(data);

            match by_checksum.get(&digest) {
                Some(asset_id) => {
                    if !self.options.dry_run {
                        self.record(
                            &entry,
                            Some(digest),
                            FileStatus::Success,
                            Some(asset_id),
                            None,
                            None,
                        )?;
                    }
                    summary.linked.push((entry.path.clone(), asset_id.clone()));
                }
                None => {
                    summary.to_upload.push(entry.path.clone());
                    pending.push(entry);
                }
            }
        }

        let groups = self.grouper.group(pending);
        reporter.on_scan_complete(summary.unrecorded, groups.len(), groups.len());
        info!(
            "Backfill: {} linked by checksum, {} files in {} groups to upload",
            summary.linked.len(),
            summary.to_upload.len(),
            groups.len()
        );

        if self.options.dry_run {
            self.journal.note(&format!(
                "dry run: {} would be linked, {} would be uploaded",
                summary.linked.len(),
                summary.to_upload.len()
            ));
            return Ok(PassOutcome::Completed(summary));
        }

        let mut upload = MigrationSummary {
            total_files: summary.to_upload.len(),
            total_groups: groups.len(),
            paired_groups: groups.iter().filter(|g| g.is_paired()).count(),
            ..MigrationSummary::default()
        };
        let outcome = self.run_batches(&groups, &mut upload, reporter)?;
        upload.duration_secs = started.elapsed().as_secs_f64();
        reporter.on_pass_complete(upload.duration_secs);
        summary.upload = upload;

        self.journal.note(&format!(
            "backfill finished: {} linked, {} uploaded, {} failed",
            summary.linked.len(),
            summary.upload.success,
            summary.upload.failed + summary.read_failures
        ));
        Ok(outcome.map(|_| summary))
    }
}
