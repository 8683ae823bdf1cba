//! Migration orchestration: enumerate, group, skip what is already done,
//! upload batch by batch and record every outcome.

pub mod albums;
pub mod backfill;
pub mod retry;

use crate::cancel::{CancelToken, PassOutcome};
use crate::config::AppConfig;
use crate::destination::{AssetUpload, DestinationClient, PairedPayload, UploadOutcome};
use crate::error::Result;
use crate::fingerprint::fingerprint;
use crate::grouper::{AssetGroup, Grouper};
use crate::journal::PassJournal;
use crate::progress::ProgressReporter;
use crate::reader::{file_name, ContentReader, FileEntry};
use crate::storage::{FileRecord, FileStatus, ProgressStore};
use serde::Serialize;
use std::collections::HashMap;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub use albums::AlbumSummary;
pub use backfill::BackfillSummary;

#[derive(Debug, Clone)]
pub struct MigrationOptions {
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub dry_run: bool,
}

impl MigrationOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            batch_size: config.migration.batch_size.max(1),
            batch_delay: config.batch_delay(),
            dry_run: config.migration.dry_run,
        }
    }
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            batch_size: 100,
            batch_delay: Duration::from_secs(1),
            dry_run: false,
        }
    }
}

/// What a pass would do, computed without touching the destination or the
/// store.
#[derive(Debug, Clone)]
pub struct MigrationPlan {
    pub total_files: usize,
    pub total_groups: usize,
    pub paired_groups: usize,
    /// Groups whose primary is already recorded as success.
    pub skipped: usize,
    pub pending: Vec<AssetGroup>,
}

impl MigrationPlan {
    pub fn pending_files(&self) -> usize {
        self.pending.iter().map(|g| g.files().count()).sum()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationSummary {
    pub dry_run: bool,
    pub total_files: usize,
    pub total_groups: usize,
    pub paired_groups: usize,
    pub skipped: usize,
    pub attempted_groups: usize,
    /// Recorded file outcomes.
    pub success: usize,
    pub failed: usize,
    pub unsupported: usize,
    pub duplicates: usize,
    pub duration_secs: f64,
}

impl MigrationSummary {
    fn from_plan(plan: &MigrationPlan, dry_run: bool) -> Self {
        Self {
            dry_run,
            total_files: plan.total_files,
            total_groups: plan.total_groups,
            paired_groups: plan.paired_groups,
            skipped: plan.skipped,
            ..Self::default()
        }
    }

    fn tally(&mut self, outcome: &GroupOutcome) {
        self.attempted_groups += 1;
        for status in outcome.statuses() {
            match status {
                FileStatus::Success => self.success += 1,
                FileStatus::Failed => self.failed += 1,
                FileStatus::Unsupported => self.unsupported += 1,
            }
        }
        if outcome.duplicate {
            self.duplicates += 1;
        }
    }
}

/// Recorded result of one group upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupOutcome {
    pub primary: FileStatus,
    pub paired: Option<FileStatus>,
    pub asset_id: Option<String>,
    pub duplicate: bool,
}

impl GroupOutcome {
    pub fn statuses(&self) -> impl Iterator<Item = FileStatus> + '_ {
        std::iter::once(self.primary).chain(self.paired)
    }
}

/// Drives one migration pass against a reader, a destination and a store.
pub struct Migrator<'a> {
    reader: &'a dyn ContentReader,
    client: &'a dyn DestinationClient,
    store: &'a ProgressStore,
    journal: &'a PassJournal,
    grouper: Grouper,
    options: MigrationOptions,
    capture_times: HashMap<String, String>,
    cancel: CancelToken,
}

impl<'a> Migrator<'a> {
    pub fn new(
        reader: &'a dyn ContentReader,
        client: &'a dyn DestinationClient,
        store: &'a ProgressStore,
        journal: &'a PassJournal,
        grouper: Grouper,
        options: MigrationOptions,
    ) -> Self {
        Self {
            reader,
            client,
            store,
            journal,
            grouper,
            options,
            capture_times: HashMap::new(),
            cancel: CancelToken::new(),
        }
    }

    /// Capture times keyed by reader path; used as the asset creation time
    /// instead of the file modification time.
    pub fn with_capture_times(mut self, capture_times: HashMap<String, String>) -> Self {
        self.capture_times = capture_times;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn options(&self) -> &MigrationOptions {
        &self.options
    }

    /// Enumerate, group and drop groups already migrated. Read only.
    pub fn plan(&self) -> Result<MigrationPlan> {
        let files: Vec<FileEntry> = self.reader.list_files()?.collect();
        let total_files = files.len();
        let groups = self.grouper.group(files);
        let total_groups = groups.len();
        let paired_groups = groups.iter().filter(|g| g.is_paired()).count();

        let mut pending = Vec::new();
        let mut skipped = 0;
        for group in groups {
            if self.store.is_successfully_migrated(&group.primary.path)? {
                skipped += 1;
            } else {
                pending.push(group);
            }
        }

        info!(
            "Found {} files in {} groups ({} paired), {} already migrated, {} pending",
            total_files,
            total_groups,
            paired_groups,
            skipped,
            pending.len()
        );

        Ok(MigrationPlan {
            total_files,
            total_groups,
            paired_groups,
            skipped,
            pending,
        })
    }

    /// Run a full pass. In dry-run mode this stops after planning.
    pub fn run(&self, reporter: &dyn ProgressReporter) -> Result<PassOutcome<MigrationSummary>> {
        let started = Instant::now();
        reporter.on_scan_start();
        let plan = self.plan()?;
        reporter.on_scan_complete(plan.total_files, plan.total_groups, plan.pending.len());

        if self.options.dry_run {
            self.journal.note(&format!(
                "dry run: {} groups ({} files) would be uploaded",
                plan.pending.len(),
                plan.pending_files()
            ));
            let mut summary = MigrationSummary::from_plan(&plan, true);
            summary.duration_secs = started.elapsed().as_secs_f64();
            return Ok(PassOutcome::Completed(summary));
        }

        let mut summary = MigrationSummary::from_plan(&plan, false);
        let outcome = self.run_batches(&plan.pending, &mut summary, reporter)?;
        summary.duration_secs = started.elapsed().as_secs_f64();
        reporter.on_pass_complete(summary.duration_secs);
        self.journal.note(&format!(
            "migration finished: {} success, {} failed, {} unsupported",
            summary.success, summary.failed, summary.unsupported
        ));
        Ok(outcome.map(|_| summary))
    }

    /// Upload groups batch by batch, pausing between batches and stopping
    /// at a batch boundary when cancelled.
    fn run_batches(
        &self,
        groups: &[AssetGroup],
        summary: &mut MigrationSummary,
        reporter: &dyn ProgressReporter,
    ) -> Result<PassOutcome<()>> {
        let batch_size = self.options.batch_size.max(1);
        let total_batches = groups.len().div_ceil(batch_size);

        for (index, batch) in groups.chunks(batch_size).enumerate() {
            if self.cancel.is_cancelled() {
                warn!("Stopping after {} of {} batches", index, total_batches);
                self.journal
                    .note(&format!("interrupted after {} of {} batches", index, total_batches));
                return Ok(PassOutcome::Interrupted {
                    partial: (),
                    completed_batches: index,
                    total_batches,
                });
            }

            info!("Batch {}/{} ({} groups)", index + 1, total_batches, batch.len());
            reporter.on_batch_start(index, total_batches, batch.len());
            for group in batch {
                reporter.on_item(&group.primary.path);
                let outcome = self.migrate_group(group)?;
                summary.tally(&outcome);
            }
            reporter.on_batch_complete(index, total_batches);

            if index + 1 < total_batches && !self.options.batch_delay.is_zero() {
                thread::sleep(self.options.batch_delay);
            }
        }

        Ok(PassOutcome::Completed(()))
    }

    /// Read, fingerprint, upload and record one group. Per-file problems
    /// become recorded outcomes; only a store failure is returned as an error.
    pub fn migrate_group(&self, group: &AssetGroup) -> Result<GroupOutcome> {
        let primary = &group.primary;

        let data = match self.reader.read_file(&primary.path) {
            Ok(data) => data,
            Err(err) => {
                let message = format!("read error: {}", err);
                warn!(path = %primary.path, "{}", message);
                self.record(primary, None, FileStatus::Failed, None, Some(&message), None)?;
                let paired = match &group.paired {
                    Some(motion) => {
                        let message = "paired still could not be read";
                        self.record(
                            motion,
                            None,
                            FileStatus::Failed,
                            None,
                            Some(message),
                            None,
                        )?;
                        Some(FileStatus::Failed)
                    }
                    None => None,
                };
                return Ok(GroupOutcome {
                    primary: FileStatus::Failed,
                    paired,
                    asset_id: None,
                    duplicate: false,
                });
            }
        };
        let primary_fingerprint = fingerprint(&data);

        let mut motion_error = None;
        let mut paired_payload = None;
        let mut paired_fingerprint = None;
        if let Some(motion) = &group.paired {
            match self.reader.read_file(&motion.path) {
                Ok(bytes) => {
                    paired_fingerprint = Some(fingerprint(&bytes));
                    paired_payload = Some(PairedPayload {
                        data: bytes,
                        filename: file_name(&motion.path).to_string(),
                    });
                }
                Err(err) => {
                    warn!(path = %motion.path, "Motion component unreadable, uploading still alone: {}", err);
                    motion_error = Some(format!("read error: {}", err));
                }
            }
        }

        let created_at = self
            .capture_times
            .get(&primary.path)
            .cloned()
            .unwrap_or_else(|| primary.modified.clone());
        let upload = AssetUpload {
            data,
            filename: file_name(&primary.path).to_string(),
            created_at,
            paired: paired_payload,
        };
        let included_motion = upload.paired.is_some();

        let (status, asset_id, message, duplicate) = match self.client.upload_asset(&upload) {
            UploadOutcome::Uploaded {
                asset_id,
                duplicate,
            } => {
                debug!(path = %primary.path, asset = %asset_id, duplicate, "Uploaded");
                (FileStatus::Success, Some(asset_id), None, duplicate)
            }
            UploadOutcome::Rejected {
                status,
                message,
                unsupported: true,
            } => {
                warn!(path = %primary.path, status, "Unsupported format: {}", message);
                self.journal.unsupported(&primary.path, primary.size, &message);
                (FileStatus::Unsupported, None, Some(message), false)
            }
            UploadOutcome::Rejected { status, message, .. } => {
                warn!(path = %primary.path, status, "Upload rejected: {}", message);
                (FileStatus::Failed, None, Some(message), false)
            }
            UploadOutcome::Transport { message } => {
                warn!(path = %primary.path, "Upload failed: {}", message);
                (FileStatus::Failed, None, Some(message), false)
            }
        };
        drop(upload);

        self.record(
            primary,
            Some(primary_fingerprint),
            status,
            asset_id.as_deref(),
            message.as_deref(),
            None,
        )?;

        let paired = match &group.paired {
            Some(motion) if included_motion => {
                self.record(
                    motion,
                    paired_fingerprint,
                    status,
                    asset_id.as_deref(),
                    message.as_deref(),
                    Some(&primary.path),
                )?;
                Some(status)
            }
            Some(motion) => {
                self.record(
                    motion,
                    None,
                    FileStatus::Failed,
                    None,
                    motion_error.as_deref(),
                    None,
                )?;
                Some(FileStatus::Failed)
            }
            None => None,
        };

        Ok(GroupOutcome {
            primary: status,
            paired,
            asset_id,
            duplicate,
        })
    }

    fn record(
        &self,
        file: &FileEntry,
        fingerprint: Option<String>,
        status: FileStatus,
        asset_id: Option<&str>,
        message: Option<&str>,
        paired_with: Option<&str>,
    ) -> Result<()> {
        let record = FileRecord {
            fingerprint,
            file_size: file.size as i64,
            source_mtime: file.modified.clone(),
            asset_id: asset_id.map(str::to_string),
            error_message: message.map(str::to_string),
            paired_with: paired_with.map(str::to_string),
            ..FileRecord::new(file.path.clone(), status)
        };
        self.store.upsert_file(&record)?;
        let detail = match (asset_id, message) {
            (Some(id), _) => Some(format!("asset={}", id)),
            (None, Some(message)) => Some(message.to_string()),
            (None, None) => None,
        };
        self.journal.record(&file.path, status.as_str(), detail.as_deref());
        Ok(())
    }
}
