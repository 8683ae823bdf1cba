use super::Migrator;
use crate::cancel::PassOutcome;
use crate::destination::RemoteAlbum;
use crate::error::Result;
use crate::metadata::{MetadataSource, OriginAlbum};
use crate::progress::ProgressReporter;
use crate::storage::{AlbumRecord, FileStatus};
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, Serialize)]
pub struct AlbumSummary {
    pub dry_run: bool,
    pub total: usize,
    pub created: usize,
    pub reused: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Member assets attached (or, in a dry run, that would be attached).
    pub assets_attached: usize,
    /// Members uploaded during this pass because they were not yet migrated.
    pub members_uploaded: usize,
    pub members_missing: usize,
}

enum AlbumResult {
    Created,
    Reused,
    Failed,
}

impl<'a> Migrator<'a> {
    /// Recreate origin albums at the destination.
    ///
    /// Albums already linked in the store are skipped. An album created by an
    /// earlier attempt, or a destination album with the same name, is reused
    /// instead of creating a duplicate.
    pub fn migrate_albums(
        &self,
        metadata: &mut dyn MetadataSource,
        reporter: &dyn ProgressReporter,
    ) -> Result<PassOutcome<AlbumSummary>> {
        let albums = metadata.list_albums()?;
        let mut summary = AlbumSummary {
            dry_run: self.options.dry_run,
            total: albums.len(),
            ..AlbumSummary::default()
        };
        info!("{} origin albums", albums.len());

        let mut destination_albums = if self.options.dry_run {
            Vec::new()
        } else {
            self.client.list_albums()?
        };

        reporter.on_batch_start(0, 1, albums.len());
        for (index, album) in albums.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!("Album pass stopped after {} of {} albums", index, albums.len());
                return Ok(PassOutcome::Interrupted {
                    partial: summary,
                    completed_batches: index,
                    total_batches: albums.len(),
                });
            }
            reporter.on_item(&album.name);

            let record = self.store.get_album(album.id)?;
            if record.as_ref().is_some_and(|r| r.is_complete()) {
                debug!(album = %album.name, "Already migrated, skipping");
                summary.skipped += 1;
                continue;
            }

            let members = match metadata.album_members(album.id) {
                Ok(members) => members,
                Err(err) => {
                    warn!(album = %album.name, "Could not list album members: {}", err);
                    self.journal
                        .record(&album.name, "album-failed", Some(&err.to_string()));
                    summary.failed += 1;
                    continue;
                }
            };
            let asset_ids = self.member_asset_ids(&members, &mut summary)?;

            if self.options.dry_run {
                info!(
                    "[dry run] album '{}' with {} of {} members",
                    album.name,
                    asset_ids.len(),
                    members.len()
                );
                summary.assets_attached += asset_ids.len();
                continue;
            }

            let previous = record.and_then(|r| r.dest_album_id);
            match self.migrate_album(album, &asset_ids, previous, &mut destination_albums)? {
                AlbumResult::Created => summary.created += 1,
                AlbumResult::Reused => summary.reused += 1,
                AlbumResult::Failed => {
                    summary.failed += 1;
                    continue;
                }
            }
            summary.assets_attached += asset_ids.len();
        }
        reporter.on_batch_complete(0, 1);

        self.journal.note(&format!(
            "album pass finished: {} created, {} reused, {} skipped, {} failed",
            summary.created, summary.reused, summary.skipped, summary.failed
        ));
        Ok(PassOutcome::Completed(summary))
    }

    /// Destination asset ids for album members, uploading members that have
    /// not been migrated yet. Dry runs only look up existing records.
    fn member_asset_ids(
        &self,
        members: &[String],
        summary: &mut AlbumSummary,
    ) -> Result<Vec<String>> {
        let mut asset_ids = Vec::new();
        let mut to_upload = Vec::new();

        for member in members {
            let path = self.reader.resolve_metadata_path(member);
            match self.store.get_file(&path)? {
                Some(record) if record.status == FileStatus::Success => {
                    if let Some(id) = record.asset_id {
                        if !asset_ids.contains(&id) {
                            asset_ids.push(id);
                        }
                    }
                }
                _ if self.options.dry_run => summary.members_missing += 1,
                _ => match self.reader.stat(&path) {
                    Ok(entry) => to_upload.push(entry),
                    Err(err) => {
                        warn!(path = %path, "Album member not readable: {}", err);
                        summary.members_missing += 1;
                    }
                },
            }
        }

        for group in self.grouper.group(to_upload) {
            let outcome = self.migrate_group(&group)?;
            match outcome.asset_id {
                Some(id) if outcome.primary == FileStatus::Success => {
                    summary.members_uploaded += 1;
                    if !asset_ids.contains(&id) {
                        asset_ids.push(id);
                    }
                }
                _ => summary.members_missing += 1,
            }
        }

        Ok(asset_ids)
    }

    fn migrate_album(
        &self,
        album: &OriginAlbum,
        asset_ids: &[String],
        previous: Option<String>,
        destination_albums: &mut Vec<RemoteAlbum>,
    ) -> Result<AlbumResult> {
        let existing = previous
            .and_then(|id| destination_albums.iter().find(|a| a.id == id))
            .or_else(|| destination_albums.iter().find(|a| a.album_name == album.name))
            .map(|remote| remote.id.clone());
        let (dest_id, result) = match existing {
            Some(id) => {
                debug!(album = %album.name, id = %id, "Reusing destination album");
                (id, AlbumResult::Reused)
            }
            None => match self.client.create_album(&album.name) {
                Ok(id) => {
                    // Linked before members are attached, so a failed attach
                    // is retried against this album.
                    self.store.upsert_album(&AlbumRecord {
                        origin_album_id: album.id,
                        album_name: album.name.clone(),
                        dest_album_id: Some(id.clone()),
                        members_attached: false,
                        created_at: String::new(),
                    })?;
                    destination_albums.push(RemoteAlbum {
                        id: id.clone(),
                        album_name: album.name.clone(),
                        asset_count: 0,
                    });
                    (id, AlbumResult::Created)
                }
                Err(err) => {
                    warn!(album = %album.name, "Album creation failed: {}", err);
                    self.journal
                        .record(&album.name, "album-failed", Some(&err.to_string()));
                    return Ok(AlbumResult::Failed);
                }
            },
        };

        if let Err(err) = self.client.add_assets_to_album(&dest_id, asset_ids) {
            warn!(album = %album.name, "Attaching {} assets failed: {}", asset_ids.len(), err);
            self.journal
                .record(&album.name, "album-failed", Some(&err.to_string()));
            return Ok(AlbumResult::Failed);
        }

        self.store.upsert_album(&AlbumRecord {
            origin_album_id: album.id,
            album_name: album.name.clone(),
            dest_album_id: Some(dest_id.clone()),
            members_attached: true,
            created_at: String::new(),
        })?;
        self.journal.record(
            &album.name,
            "album",
            Some(&format!("dest={} assets={}", dest_id, asset_ids.len())),
        );
        info!("Album '{}' -> {} ({} assets)", album.name, dest_id, asset_ids.len());
        Ok(result)
    }
}
