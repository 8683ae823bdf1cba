#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use photomig_core::config::SourceConfig;
use photomig_core::destination::{
    AssetUpload, DestinationClient, RemoteAlbum, RemoteAsset, UploadOutcome,
};
use photomig_core::fingerprint::fingerprint;
use photomig_core::metadata::{MetadataSource, OriginAlbum, OriginFileMeta};
use photomig_core::reader::{LocalReader, NoiseFilter};
use photomig_core::{CancelToken, Error, Grouper, MigrationOptions, ProgressReporter, Result};

/// What the fake destination saw for one upload request.
#[derive(Debug, Clone)]
pub struct SeenUpload {
    pub filename: String,
    pub paired_filename: Option<String>,
    pub created_at: String,
}

/// In-memory destination. Content-addressed like the real service: the same
/// bytes uploaded twice come back as a duplicate of the first asset.
#[derive(Default)]
pub struct FakeDestination {
    assets: RefCell<Vec<RemoteAsset>>,
    albums: RefCell<Vec<(RemoteAlbum, Vec<String>)>>,
    overrides: RefCell<HashMap<String, UploadOutcome>>,
    uploads: RefCell<Vec<SeenUpload>>,
    calls: Cell<usize>,
    next_id: Cell<usize>,
    lookups_offline: Cell<bool>,
    attach_offline: Cell<bool>,
}

impl FakeDestination {
    pub fn new() -> Self {
        Self::default()
    }

    fn tick(&self) {
        self.calls.set(self.calls.get() + 1);
    }

    fn fresh_id(&self, prefix: &str) -> String {
        let n = self.next_id.get() + 1;
        self.next_id.set(n);
        format!("{}-{}", prefix, n)
    }

    /// Every trait call made so far.
    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    pub fn uploads(&self) -> Vec<SeenUpload> {
        self.uploads.borrow().clone()
    }

    /// Place content at the destination without going through an upload.
    pub fn seed_asset(&self, name: &str, data: &[u8]) -> String {
        let id = self.fresh_id("seeded");
        self.assets.borrow_mut().push(RemoteAsset {
            id: id.clone(),
            original_file_name: name.to_string(),
            checksum: Some(fingerprint(data)),
        });
        id
    }

    pub fn seed_album(&self, name: &str, asset_ids: &[String]) -> String {
        let id = self.fresh_id("seeded-album");
        self.albums.borrow_mut().push((
            RemoteAlbum {
                id: id.clone(),
                album_name: name.to_string(),
                asset_count: asset_ids.len() as u64,
            },
            asset_ids.to_vec(),
        ));
        id
    }

    /// Answer uploads of `filename` with `outcome` until cleared.
    pub fn respond_with(&self, filename: &str, outcome: UploadOutcome) {
        self.overrides
            .borrow_mut()
            .insert(filename.to_string(), outcome);
    }

    /// Direct asset lookups fail as if the server were unreachable.
    pub fn set_lookups_offline(&self, offline: bool) {
        self.lookups_offline.set(offline);
    }

    /// Attaching assets to albums fails as if the server were unreachable.
    pub fn set_attach_offline(&self, offline: bool) {
        self.attach_offline.set(offline);
    }

    pub fn clear_responses(&self) {
        self.overrides.borrow_mut().clear();
    }

    pub fn album_assets(&self, album_id: &str) -> Vec<String> {
        self.albums
            .borrow()
            .iter()
            .find(|(album, _)| album.id == album_id)
            .map(|(_, ids)| ids.clone())
            .unwrap_or_default()
    }

    pub fn album_names(&self) -> Vec<String> {
        self.albums
            .borrow()
            .iter()
            .map(|(album, _)| album.album_name.clone())
            .collect()
    }

    pub fn asset_count(&self) -> usize {
        self.assets.borrow().len()
    }
}

impl DestinationClient for FakeDestination {
    fn upload_asset(&self, upload: &AssetUpload) -> UploadOutcome {
        self.tick();
        self.uploads.borrow_mut().push(SeenUpload {
            filename: upload.filename.clone(),
            paired_filename: upload.paired.as_ref().map(|p| p.filename.clone()),
            created_at: upload.created_at.clone(),
        });
        if let Some(outcome) = self.overrides.borrow().get(&upload.filename) {
            return outcome.clone();
        }

        let checksum = fingerprint(&upload.data);
        let existing = self
            .assets
            .borrow()
            .iter()
            .find(|a| a.checksum.as_deref() == Some(checksum.as_str()))
            .map(|a| a.id.clone());
        if let Some(asset_id) = existing {
            return UploadOutcome::Uploaded {
                asset_id,
                duplicate: true,
            };
        }

        let asset_id = self.fresh_id("asset");
        self.assets.borrow_mut().push(RemoteAsset {
            id: asset_id.clone(),
            original_file_name: upload.filename.clone(),
            checksum: Some(checksum),
        });
        UploadOutcome::Uploaded {
            asset_id,
            duplicate: false,
        }
    }

    fn create_album(&self, name: &str) -> Result<String> {
        self.tick();
        let id = self.fresh_id("album");
        self.albums.borrow_mut().push((
            RemoteAlbum {
                id: id.clone(),
                album_name: name.to_string(),
                asset_count: 0,
            },
            Vec::new(),
        ));
        Ok(id)
    }

    fn add_assets_to_album(&self, album_id: &str, asset_ids: &[String]) -> Result<()> {
        self.tick();
        if self.attach_offline.get() {
            return Err(Error::Connection("connection refused".into()));
        }
        let mut albums = self.albums.borrow_mut();
        let (album, members) = albums
            .iter_mut()
            .find(|(album, _)| album.id == album_id)
            .ok_or_else(|| Error::Destination(format!("no album {}", album_id)))?;
        for id in asset_ids {
            if !members.contains(id) {
                members.push(id.clone());
            }
        }
        album.asset_count = members.len() as u64;
        Ok(())
    }

    fn list_all_assets(&self) -> Result<Vec<RemoteAsset>> {
        self.tick();
        Ok(self.assets.borrow().clone())
    }

    fn get_asset(&self, asset_id: &str) -> Result<Option<RemoteAsset>> {
        self.tick();
        if self.lookups_offline.get() {
            return Err(Error::Connection("connection refused".into()));
        }
        Ok(self
            .assets
            .borrow()
            .iter()
            .find(|a| a.id == asset_id)
            .cloned())
    }

    fn list_albums(&self) -> Result<Vec<RemoteAlbum>> {
        self.tick();
        Ok(self
            .albums
            .borrow()
            .iter()
            .map(|(album, _)| album.clone())
            .collect())
    }

    fn list_album_assets(&self, album_id: &str) -> Result<Vec<RemoteAsset>> {
        self.tick();
        let ids = self.album_assets(album_id);
        let assets = self.assets.borrow();
        Ok(ids
            .iter()
            .filter_map(|id| assets.iter().find(|a| &a.id == id).cloned())
            .collect())
    }
}

/// Catalogue fixture. Member and file paths are relative to the photo root.
#[derive(Default)]
pub struct FakeMetadata {
    pub albums: Vec<OriginAlbum>,
    pub members: HashMap<i64, Vec<String>>,
    pub files: Vec<OriginFileMeta>,
}

impl FakeMetadata {
    pub fn with_album(mut self, id: i64, name: &str, members: &[&str]) -> Self {
        self.albums.push(OriginAlbum {
            id,
            name: name.to_string(),
            item_count: members.len() as i64,
        });
        self.members
            .insert(id, members.iter().map(|m| m.to_string()).collect());
        self
    }
}

impl MetadataSource for FakeMetadata {
    fn list_albums(&mut self) -> Result<Vec<OriginAlbum>> {
        let mut albums = self.albums.clone();
        albums.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(albums)
    }

    fn album_members(&mut self, album_id: i64) -> Result<Vec<String>> {
        Ok(self.members.get(&album_id).cloned().unwrap_or_default())
    }

    fn list_indexed_files(&mut self) -> Result<Vec<OriginFileMeta>> {
        Ok(self.files.clone())
    }
}

/// Cancels the shared token once the given batch has completed.
pub struct CancelAfterBatch {
    pub token: CancelToken,
    pub batch: usize,
}

impl ProgressReporter for CancelAfterBatch {
    fn on_batch_complete(&self, batch: usize, _total_batches: usize) {
        if batch == self.batch {
            self.token.cancel();
        }
    }
}

/// Remembers which batches were started.
#[derive(Default)]
pub struct BatchRecorder {
    pub started: RefCell<Vec<usize>>,
}

impl ProgressReporter for BatchRecorder {
    fn on_batch_start(&self, batch: usize, _total_batches: usize, _items: usize) {
        self.started.borrow_mut().push(batch);
    }
}

/// Write `data` at `root/rel`, creating parents. Returns the reader path.
pub fn write_file(root: &Path, rel: &str, data: &[u8]) -> String {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, data).unwrap();
    path.to_string_lossy().into_owned()
}

pub fn local_reader(root: &Path) -> LocalReader {
    let noise = NoiseFilter::new(&SourceConfig::default().exclude_patterns);
    LocalReader::open(root, noise).unwrap()
}

pub fn default_grouper() -> Grouper {
    let source = SourceConfig::default();
    Grouper::new(
        &source.paired_still_extensions,
        &source.paired_motion_extensions,
    )
}

pub fn fast_options(batch_size: usize) -> MigrationOptions {
    MigrationOptions {
        batch_size,
        batch_delay: Duration::ZERO,
        dry_run: false,
    }
}

pub fn dry_run_options() -> MigrationOptions {
    MigrationOptions {
        dry_run: true,
        ..fast_options(100)
    }
}
