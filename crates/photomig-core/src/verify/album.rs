use super::key_digest;
use super::report::RenderText;
use crate::cancel::{CancelToken, PassOutcome};
use crate::destination::{DestinationClient, RemoteAlbum, RemoteAsset};
use crate::error::Result;
use crate::fingerprint::fingerprint;
use crate::metadata::{MetadataSource, OriginAlbum};
use crate::progress::ProgressReporter;
use crate::reader::{file_name, ContentReader};
use crate::storage::{AlbumRecord, Checkpoint, FileStatus, ProgressStore};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use tracing::{debug, info, warn};

pub const VERIFY_ALBUMS_PASS_ID: &str = "verify-albums";

/// Origin album members hashed per chunk, bounding the bytes held at once.
const MEMBER_CHUNK: usize = 100;

/// How an origin album was paired with a destination album.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    /// The migration record links the two albums.
    Id,
    /// Exact name match only.
    Name,
    /// The linked album also carries the origin album's name.
    Both,
    Unmatched,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Id => "id",
            MatchType::Name => "name",
            MatchType::Both => "both",
            MatchType::Unmatched => "unmatched",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumComparison {
    pub origin_album_id: i64,
    pub origin_album_name: String,
    pub dest_album_id: Option<String>,
    pub dest_album_name: Option<String>,
    pub match_type: MatchType,
    pub origin_file_count: usize,
    pub dest_asset_count: usize,
    pub matched: usize,
    pub missing_in_destination: Vec<String>,
    pub extra_in_destination: Vec<String>,
    pub hash_mismatches: Vec<String>,
}

impl AlbumComparison {
    fn unmatched(album: &OriginAlbum) -> Self {
        Self {
            origin_album_id: album.id,
            origin_album_name: album.name.clone(),
            dest_album_id: None,
            dest_album_name: None,
            match_type: MatchType::Unmatched,
            origin_file_count: usize::try_from(album.item_count).unwrap_or(0),
            dest_asset_count: 0,
            matched: 0,
            missing_in_destination: Vec::new(),
            extra_in_destination: Vec::new(),
            hash_mismatches: Vec::new(),
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.match_type != MatchType::Unmatched
            && self.missing_in_destination.is_empty()
            && self.extra_in_destination.is_empty()
            && self.hash_mismatches.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlbumVerificationReport {
    pub generated_at: String,
    pub total_origin_albums: usize,
    pub total_destination_albums: usize,
    pub matched_albums: usize,
    pub albums: Vec<AlbumComparison>,
    /// Origin album names with no destination counterpart.
    pub origin_only: Vec<String>,
    /// Destination album names no origin album matched.
    pub destination_only: Vec<String>,
}

impl AlbumVerificationReport {
    fn new(albums: Vec<AlbumComparison>, destination: &[RemoteAlbum]) -> Self {
        let matched_ids: HashSet<&str> = albums
            .iter()
            .filter_map(|a| a.dest_album_id.as_deref())
            .collect();
        let mut destination_only: Vec<String> = destination
            .iter()
            .filter(|d| !matched_ids.contains(d.id.as_str()))
            .map(|d| d.album_name.clone())
            .collect();
        destination_only.sort();
        let origin_only: Vec<String> = albums
            .iter()
            .filter(|a| a.match_type == MatchType::Unmatched)
            .map(|a| a.origin_album_name.clone())
            .collect();

        Self {
            generated_at: Local::now().naive_local().format("%Y-%m-%dT%H:%M:%S").to_string(),
            total_origin_albums: albums.len(),
            total_destination_albums: destination.len(),
            matched_albums: albums.len() - origin_only.len(),
            albums,
            origin_only,
            destination_only,
        }
    }
}

impl RenderText for AlbumVerificationReport {
    fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Album verification report ({})", self.generated_at);
        let _ = writeln!(out, "{}", "=".repeat(60));
        let _ = writeln!(out, "Origin albums:      {}", self.total_origin_albums);
        let _ = writeln!(out, "Destination albums: {}", self.total_destination_albums);
        let _ = writeln!(out, "Matched albums:     {}", self.matched_albums);
        let _ = writeln!(out, "Origin only:        {}", self.origin_only.len());
        let _ = writeln!(out, "Destination only:   {}", self.destination_only.len());

        for album in self.albums.iter().filter(|a| a.match_type != MatchType::Unmatched) {
            let _ = writeln!(out);
            let status = if album.is_consistent() { "OK" } else { "DIFF" };
            let _ = writeln!(
                out,
                "[{}] {} -> {} (match: {}, {}/{} matched)",
                status,
                album.origin_album_name,
                album.dest_album_name.as_deref().unwrap_or("-"),
                album.match_type.as_str(),
                album.matched,
                album.origin_file_count
            );
            for path in &album.missing_in_destination {
                let _ = writeln!(out, "  missing-in-destination: {}", path);
            }
            for path in &album.hash_mismatches {
                let _ = writeln!(out, "  hash-mismatch: {}", path);
            }
            for name in &album.extra_in_destination {
                let _ = writeln!(out, "  extra-in-destination: {}", name);
            }
        }

        if !self.origin_only.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "[origin-only albums]");
            for name in &self.origin_only {
                let _ = writeln!(out, "  {}", name);
            }
        }
        if !self.destination_only.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "[destination-only albums]");
            for name in &self.destination_only {
                let _ = writeln!(out, "  {}", name);
            }
        }
        out
    }
}

/// Pair an origin album with a destination album. A migration record link
/// wins over a name match; name is only the fallback.
pub fn match_album<'d>(
    album: &OriginAlbum,
    record: Option<&AlbumRecord>,
    destination: &'d [RemoteAlbum],
) -> Option<(&'d RemoteAlbum, MatchType)> {
    let linked = record
        .and_then(|r| r.dest_album_id.as_deref())
        .and_then(|id| destination.iter().find(|d| d.id == id));
    if let Some(linked) = linked {
        let match_type = if linked.album_name == album.name {
            MatchType::Both
        } else {
            MatchType::Id
        };
        return Some((linked, match_type));
    }
    destination
        .iter()
        .find(|d| d.album_name == album.name)
        .map(|d| (d, MatchType::Name))
}

pub struct AlbumVerifier<'a> {
    reader: &'a dyn ContentReader,
    client: &'a dyn DestinationClient,
    store: &'a ProgressStore,
    batch_size: usize,
    cancel: CancelToken,
}

impl<'a> AlbumVerifier<'a> {
    /// `batch_size` is the number of albums per checkpoint.
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

    pub fn run(
        &self,
        metadata: &mut dyn MetadataSource,
        reporter: &dyn ProgressReporter,
    ) -> Result<PassOutcome<AlbumVerificationReport>> {
        let origin = metadata.list_albums()?;
        let destination = self.client.list_albums()?;
        info!(
            "Verifying {} origin albums against {} destination albums",
            origin.len(),
            destination.len()
        );

        let total_batches = origin.len().div_ceil(self.batch_size);
        let album_ids: Vec<String> = origin.iter().map(|a| a.id.to_string()).collect();
        let digest = key_digest(album_ids.iter().map(String::as_str));
        let (start_batch, mut albums) = self.resume_point(total_batches, &digest)?;

        for (index, batch) in origin.chunks(self.batch_size).enumerate().skip(start_batch) {
            if self.cancel.is_cancelled() {
                warn!("Album verification stopped after {} of {} batches", index, total_batches);
                return Ok(PassOutcome::Interrupted {
                    partial: AlbumVerificationReport::new(albums, &destination),
                    completed_batches: index,
                    total_batches,
                });
            }

            reporter.on_batch_start(index, total_batches, batch.len());
            let mut batch_results = Vec::with_capacity(batch.len());
            for album in batch {
                reporter.on_item(&album.name);
                batch_results.push(self.verify_album(album, &destination, metadata)?);
            }

            let payloads = batch_results
                .iter()
                .map(serde_json::to_string)
                .collect::<std::result::Result<Vec<_>, _>>()?;
            self.store.save_checkpoint_batch(
                &Checkpoint {
                    pass_id: VERIFY_ALBUMS_PASS_ID.to_string(),
                    last_batch: index,
                    total_batches,
                    batch_size: self.batch_size,
                    key_digest: digest.clone(),
                },
                &payloads,
            )?;
            albums.extend(batch_results);
            reporter.on_batch_complete(index, total_batches);
        }

        let report = AlbumVerificationReport::new(albums, &destination);
        self.store.clear_checkpoint(VERIFY_ALBUMS_PASS_ID)?;
        info!(
            "Album verification complete: {} matched, {} origin-only, {} destination-only",
            report.matched_albums,
            report.origin_only.len(),
            report.destination_only.len()
        );
        Ok(PassOutcome::Completed(report))
    }

    fn resume_point(
        &self,
        total_batches: usize,
        digest: &str,
    ) -> Result<(usize, Vec<AlbumComparison>)> {
        match self.store.load_checkpoint(VERIFY_ALBUMS_PASS_ID)? {
            Some(checkpoint) if checkpoint.resumes(self.batch_size, total_batches, digest) => {
                let albums = self
                    .store
                    .load_checkpoint_results(VERIFY_ALBUMS_PASS_ID)?
                    .iter()
                    .map(|payload| serde_json::from_str(payload))
                    .collect::<std::result::Result<Vec<AlbumComparison>, _>>()?;
                info!(
                    "Resuming album verification at batch {}/{}",
                    checkpoint.next_batch() + 1,
                    total_batches
                );
                Ok((checkpoint.next_batch(), albums))
            }
            Some(_) => {
                debug!("Discarding incompatible album verification checkpoint");
                self.store.clear_checkpoint(VERIFY_ALBUMS_PASS_ID)?;
                Ok((0, Vec::new()))
            }
            None => Ok((0, Vec::new())),
        }
    }

    fn verify_album(
        &self,
        album: &OriginAlbum,
        destination: &[RemoteAlbum],
        metadata: &mut dyn MetadataSource,
    ) -> Result<AlbumComparison> {
        let record = self.store.get_album(album.id)?;
        let Some((remote, match_type)) = match_album(album, record.as_ref(), destination) else {
            debug!(album = %album.name, "No destination album");
            return Ok(AlbumComparison::unmatched(album));
        };

        let members: Vec<String> = metadata
            .album_members(album.id)?
            .iter()
            .map(|p| self.reader.resolve_metadata_path(p))
            .collect();
        let assets = self.client.list_album_assets(&remote.id)?;

        let mut comparison = AlbumComparison {
            origin_album_id: album.id,
            origin_album_name: album.name.clone(),
            dest_album_id: Some(remote.id.clone()),
            dest_album_name: Some(remote.album_name.clone()),
            match_type,
            origin_file_count: members.len(),
            dest_asset_count: assets.len(),
            matched: 0,
            missing_in_destination: Vec::new(),
            extra_in_destination: Vec::new(),
            hash_mismatches: Vec::new(),
        };
        let mut members_index = MemberIndex::new(&assets);

        for chunk in members.chunks(MEMBER_CHUNK) {
            for path in chunk {
                self.compare_member(path, &mut members_index, &mut comparison)?;
            }
        }

        comparison.extra_in_destination = members_index.unused_names();
        Ok(comparison)
    }

    fn compare_member(
        &self,
        path: &str,
        index: &mut MemberIndex<'_>,
        comparison: &mut AlbumComparison,
    ) -> Result<()> {
        let record = self
            .store
            .get_file(path)?
            .filter(|r| r.status == FileStatus::Success);
        let digest = match self.reader.read_file(path) {
            Ok(data) => Some(fingerprint(&data)),
            Err(err) => {
                debug!(path = %path, "Album member unreadable, using recorded fingerprint: {}", err);
                record.as_ref().and_then(|r| r.fingerprint.clone())
            }
        };

        if let Some(digest) = &digest {
            if index.take_by_checksum(digest) {
                comparison.matched += 1;
                return Ok(());
            }
        }

        // A motion clip travels inside its still's asset.
        if let Some(record) = record.as_ref().filter(|r| r.paired_with.is_some()) {
            if record.asset_id.as_deref().is_some_and(|id| index.contains(id)) {
                if digest.is_some() && digest == record.fingerprint {
                    comparison.matched += 1;
                } else {
                    comparison.hash_mismatches.push(path.to_string());
                }
                return Ok(());
            }
        }

        if index.take_by_name(file_name(path)) {
            comparison.hash_mismatches.push(path.to_string());
        } else {
            comparison.missing_in_destination.push(path.to_string());
        }
        Ok(())
    }
}

/// Destination album members, each claimable once.
struct MemberIndex<'m> {
    assets: &'m [RemoteAsset],
    used: Vec<bool>,
    by_checksum: HashMap<&'m str, Vec<usize>>,
}

impl<'m> MemberIndex<'m> {
    fn new(assets: &'m [RemoteAsset]) -> Self {
        let mut by_checksum: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, asset) in assets.iter().enumerate() {
            if let Some(checksum) = asset.checksum.as_deref() {
                by_checksum.entry(checksum).or_default().push(i);
            }
        }
        Self {
            assets,
            used: vec![false; assets.len()],
            by_checksum,
        }
    }

    fn contains(&self, asset_id: &str) -> bool {
        self.assets.iter().any(|a| a.id == asset_id)
    }

    fn take_by_checksum(&mut self, checksum: &str) -> bool {
        let candidate = self
            .by_checksum
            .get(checksum)
            .and_then(|slots| slots.iter().copied().find(|&i| !self.used[i]));
        self.claim(candidate)
    }

    fn take_by_name(&mut self, name: &str) -> bool {
        let candidate = self
            .assets
            .iter()
            .enumerate()
            .position(|(i, a)| !self.used[i] && a.original_file_name == name);
        self.claim(candidate)
    }

    fn claim(&mut self, candidate: Option<usize>) -> bool {
        match candidate {
            Some(i) => {
                self.used[i] = true;
                true
            }
            None => false,
        }
    }

    fn unused_names(&self) -> Vec<String> {
        self.assets
            .iter()
            .zip(&self.used)
            .filter(|(_, used)| !**used)
            .map(|(a, _)| a.original_file_name.clone())
            .collect()
    }
}
