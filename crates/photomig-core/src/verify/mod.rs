//! Three-way reconciliation of origin storage, origin metadata and the
//! destination inventory.

pub mod album;
pub mod report;

use crate::cancel::{CancelToken, PassOutcome};
use crate::destination::{DestinationClient, RemoteAsset};
use crate::error::Result;
use crate::fingerprint::fingerprint;
use crate::progress::ProgressReporter;
use crate::reader::{ContentReader, FileEntry};
use crate::storage::{Checkpoint, FileRecord, FileStatus, ProgressStore};
use std::cell::OnceCell;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, info, warn};

pub use album::{AlbumVerificationReport, AlbumVerifier};
pub use report::{
    write_reports, Classification, ClassificationCounts, ComparisonResult, RenderText,
    ReportPaths, VerificationReport,
};

pub const VERIFY_PASS_ID: &str = "verify";

/// Destination inventory indexed for linking.
pub(crate) struct DestinationIndex {
    by_id: HashMap<String, RemoteAsset>,
    by_checksum: HashMap<String, String>,
}

impl DestinationIndex {
    pub(crate) fn new(assets: Vec<RemoteAsset>) -> Self {
        let mut by_checksum = HashMap::new();
        for asset in &assets {
            if let Some(checksum) = &asset.checksum {
                by_checksum
                    .entry(checksum.clone())
                    .or_insert_with(|| asset.id.clone());
            }
        }
        let by_id = assets.into_iter().map(|a| (a.id.clone(), a)).collect();
        Self { by_id, by_checksum }
    }

    pub(crate) fn len(&self) -> usize {
        self.by_id.len()
    }
}

/// Digest of the ordered keys a resumable pass batches over. A checkpoint
/// is only resumed against the same key list.
pub(crate) fn key_digest<'k>(keys: impl IntoIterator<Item = &'k str>) -> String {
    let mut joined = String::new();
    for key in keys {
        joined.push_str(key);
        joined.push('\n');
    }
    fingerprint(joined.as_bytes())
}

/// Fingerprint computed at most once, and only when a comparison needs it.
struct LazyFingerprint<'r> {
    reader: &'r dyn ContentReader,
    path: Option<&'r str>,
    cell: OnceCell<std::result::Result<String, String>>,
}

impl<'r> LazyFingerprint<'r> {
    fn new(reader: &'r dyn ContentReader, entry: Option<&'r FileEntry>) -> Self {
        Self {
            reader,
            path: entry.map(|e| e.path.as_str()),
            cell: OnceCell::new(),
        }
    }

    fn get(&self) -> Option<&std::result::Result<String, String>> {
        let path = self.path?;
        Some(self.cell.get_or_init(|| {
            self.reader
                .read_file(path)
                .map(|data| fingerprint(&data))
                .map_err(|e| format!("origin unreadable: {}", e))
        }))
    }
}

pub struct Verifier<'a> {
    reader: &'a dyn ContentReader,
    client: &'a dyn DestinationClient,
    store: &'a ProgressStore,
    batch_size: usize,
    cancel: CancelToken,
}

impl<'a> Verifier<'a> {
    pub fn new(
        reader: &'a dyn ContentReader,
        client: &'a dyn DestinationClient,
        store: &'a ProgressStore,
        batch_size: usize,
    ) -> Self {
        Self {
            reader,
            client,
            store,
            batch_size: batch_size.max(1),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Reconcile every path known to origin storage or the metadata
    /// catalogue, then report unlinked destination assets.
    ///
    /// `metadata_paths` are catalogue paths; they are resolved through the
    /// reader. Progress is checkpointed per batch and a compatible
    /// checkpoint is resumed. The store's file records are only read.
    pub fn run(
        &self,
        metadata_paths: &[String],
        reporter: &dyn ProgressReporter,
    ) -> Result<PassOutcome<VerificationReport>> {
        reporter.on_scan_start();
        let origin: BTreeMap<String, FileEntry> = self
            .reader
            .list_files()?
            .map(|entry| (entry.path.clone(), entry))
            .collect();
        let metadata: BTreeSet<String> = metadata_paths
            .iter()
            .map(|p| self.reader.resolve_metadata_path(p))
            .collect();
        let destination = DestinationIndex::new(self.client.list_all_assets()?);
        info!(
            "Verifying {} origin files, {} metadata entries, {} destination assets",
            origin.len(),
            metadata.len(),
            destination.len()
        );

        let keys: Vec<&String> = origin
            .keys()
            .chain(metadata.iter())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let total_batches = keys.len().div_ceil(self.batch_size);
        let digest = key_digest(keys.iter().map(|k| k.as_str()));
        reporter.on_scan_complete(origin.len(), keys.len(), keys.len());

        let (start_batch, mut results) = self.resume_point(total_batches, &digest)?;
        if start_batch > 0 {
            info!(
                "Resuming verification at batch {}/{} ({} results restored)",
                start_batch + 1,
                total_batches,
                results.len()
            );
        }

        for (index, batch) in keys.chunks(self.batch_size).enumerate().skip(start_batch) {
            if self.cancel.is_cancelled() {
                warn!("Verification stopped after {} of {} batches", index, total_batches);
                let partial = VerificationReport::new(
                    origin.len(),
                    metadata.len(),
                    destination.len(),
                    results,
                );
                return Ok(PassOutcome::Interrupted {
                    partial,
                    completed_batches: index,
                    total_batches,
                });
            }

            reporter.on_batch_start(index, total_batches, batch.len());
            let mut batch_results = Vec::with_capacity(batch.len());
            for key in batch {
                reporter.on_item(key);
                let result = self.classify(
                    key,
                    origin.get(key.as_str()),
                    metadata.contains(key.as_str()),
                    &destination,
                )?;
                batch_results.push(result);
            }

            let payloads = batch_results
                .iter()
                .map(serde_json::to_string)
                .collect::<std::result::Result<Vec<_>, _>>()?;
            self.store.save_checkpoint_batch(
                &Checkpoint {
                    pass_id: VERIFY_PASS_ID.to_string(),
                    last_batch: index,
                    total_batches,
                    batch_size: self.batch_size,
                    key_digest: digest.clone(),
                },
                &payloads,
            )?;
            results.extend(batch_results);
            reporter.on_batch_complete(index, total_batches);
        }

        let linked: HashSet<&str> = results
            .iter()
            .filter_map(|r| r.asset_id.as_deref())
            .collect();
        let mut destination_only: Vec<ComparisonResult> = destination
            .by_id
            .values()
            .filter(|asset| !linked.contains(asset.id.as_str()))
            .map(|asset| ComparisonResult {
                key: asset.id.clone(),
                classification: Classification::DestinationOnly,
                asset_id: Some(asset.id.clone()),
                detail: Some(asset.original_file_name.clone()),
            })
            .collect();
        destination_only.sort_by(|a, b| a.key.cmp(&b.key));
        results.extend(destination_only);

        let report =
            VerificationReport::new(origin.len(), metadata.len(), destination.len(), results);
        self.store.clear_checkpoint(VERIFY_PASS_ID)?;
        info!(
            "Verification complete: {} matched, {} mismatched, {} origin-only, {} metadata-only, {} destination-only",
            report.counts.matched,
            report.counts.hash_mismatch,
            report.counts.origin_only,
            report.counts.metadata_only,
            report.counts.destination_only
        );
        Ok(PassOutcome::Completed(report))
    }

    /// Batch to start from plus the results already persisted. A checkpoint
    /// taken over other keys or with a different batch layout is discarded.
    fn resume_point(
        &self,
        total_batches: usize,
        digest: &str,
    ) -> Result<(usize, Vec<ComparisonResult>)> {
        match self.store.load_checkpoint(VERIFY_PASS_ID)? {
            Some(checkpoint) if checkpoint.resumes(self.batch_size, total_batches, digest) => {
                let results = self
                    .store
                    .load_checkpoint_results(VERIFY_PASS_ID)?
                    .iter()
                    .map(|payload| serde_json::from_str(payload))
                    .collect::<std::result::Result<Vec<ComparisonResult>, _>>()?;
                Ok((checkpoint.next_batch(), results))
            }
            Some(_) => {
                debug!("Discarding incompatible verification checkpoint");
                self.store.clear_checkpoint(VERIFY_PASS_ID)?;
                Ok((0, Vec::new()))
            }
            None => Ok((0, Vec::new())),
        }
    }

    fn classify(
        &self,
        key: &str,
        origin: Option<&FileEntry>,
        in_metadata: bool,
        destination: &DestinationIndex,
    ) -> Result<ComparisonResult> {
        let record = self
            .store
            .get_file(key)?
            .filter(|r| r.status == FileStatus::Success);
        let origin_fp = LazyFingerprint::new(self.reader, origin);

        let mut link = match record.as_ref().and_then(|r| r.asset_id.as_deref()) {
            Some(id) => self.lookup_asset(id, destination)?,
            None => None,
        };
        if link.is_none() {
            if let Some(Ok(fp)) = origin_fp.get() {
                link = destination
                    .by_checksum
                    .get(fp)
                    .and_then(|id| destination.by_id.get(id))
                    .cloned();
            }
        }

        let result = |classification, asset_id: Option<String>, detail: Option<String>| {
            ComparisonResult {
                key: key.to_string(),
                classification,
                asset_id,
                detail,
            }
        };

        let asset = match link {
            Some(asset) => asset,
            None if in_metadata => return Ok(result(Classification::MetadataOnly, None, None)),
            None => return Ok(result(Classification::OriginOnly, None, None)),
        };

        let paired_with = record.as_ref().and_then(|r| r.paired_with.as_deref());
        let (reference, reference_label) = match paired_with {
            Some(_) => (
                record.as_ref().and_then(|r| r.fingerprint.clone()),
                "recorded fingerprint",
            ),
            None => (asset.checksum.clone(), "destination checksum"),
        };
        let actual = match origin_fp.get() {
            Some(actual) => actual.clone(),
            None => recorded_fingerprint(record.as_ref()),
        };

        let (classification, asset_id, detail) = match (reference, actual) {
            (None, _) => (
                Classification::HashMismatch,
                Some(asset.id),
                Some(format!("no {}", reference_label)),
            ),
            (_, Err(message)) => (Classification::HashMismatch, Some(asset.id), Some(message)),
            (Some(expected), Ok(actual)) if expected == actual => {
                (Classification::Matched, Some(asset.id), None)
            }
            (Some(_), Ok(actual)) => match destination.by_checksum.get(&actual) {
                // Same content is present under another asset id.
                Some(other) if paired_with.is_none() => {
                    (Classification::Matched, Some(other.clone()), None)
                }
                _ => (
                    Classification::HashMismatch,
                    Some(asset.id),
                    Some(format!("content differs from {}", reference_label)),
                ),
            },
        };
        Ok(result(classification, asset_id, detail))
    }

    /// Find an asset by id in the inventory, falling back to a direct lookup
    /// for assets the inventory listing omits. A failed lookup fails the
    /// pass before the batch is checkpointed.
    fn lookup_asset(
        &self,
        id: &str,
        destination: &DestinationIndex,
    ) -> Result<Option<RemoteAsset>> {
        if let Some(asset) = destination.by_id.get(id) {
            return Ok(Some(asset.clone()));
        }
        self.client.get_asset(id)
    }
}

fn recorded_fingerprint(record: Option<&FileRecord>) -> std::result::Result<String, String> {
    record
        .and_then(|r| r.fingerprint.clone())
        .ok_or_else(|| "origin file missing and no fingerprint recorded".to_string())
}
