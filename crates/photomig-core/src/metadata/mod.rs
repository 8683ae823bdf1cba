pub mod postgres;

use crate::error::Result;
use crate::reader::ContentReader;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use self::postgres::SynologyMetadata;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginAlbum {
    pub id: i64,
    pub name: String,
    pub item_count: i64,
}

/// Per-file metadata recorded by the origin catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginFileMeta {
    /// Path relative to the photo root, `/` separated.
    pub path: String,
    /// Naive capture timestamp, when the catalogue has one.
    pub capture_time: Option<String>,
}

/// Read-only view of the origin metadata catalogue.
pub trait MetadataSource {
    /// User albums ordered by name.
    fn list_albums(&mut self) -> Result<Vec<OriginAlbum>>;

    /// Member paths of one album, in catalogue path form.
    fn album_members(&mut self, album_id: i64) -> Result<Vec<String>>;

    fn list_indexed_files(&mut self) -> Result<Vec<OriginFileMeta>>;
}

/// Capture times keyed by the reader's concrete path.
pub fn capture_time_index(
    reader: &dyn ContentReader,
    files: &[OriginFileMeta],
) -> HashMap<String, String> {
    files
        .iter()
        .filter_map(|file| {
            file.capture_time
                .as_ref()
                .map(|time| (reader.resolve_metadata_path(&file.path), time.clone()))
        })
        .collect()
}
