use super::{format_modified, ContentReader, FileEntry, NoiseFilter};
use crate::error::{Error, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Reader over a locally mounted directory tree.
pub struct LocalReader {
    root: PathBuf,
    root_display: String,
    noise: NoiseFilter,
}

impl LocalReader {
    pub fn open(root: &Path, noise: NoiseFilter) -> Result<Self> {
        if !root.is_dir() {
            return Err(Error::SourceUnavailable(format!(
                "{} is not a readable directory",
                root.display()
            )));
        }
        Ok(Self {
            root: root.to_path_buf(),
            root_display: root.to_string_lossy().into_owned(),
            noise,
        })
    }

    fn entry_for(&self, path: &Path, metadata: &fs::Metadata) -> FileEntry {
        let modified = metadata
            .modified()
            .map(format_modified)
            .unwrap_or_default();
        FileEntry {
            path: path.to_string_lossy().into_owned(),
            size: metadata.len(),
            modified,
        }
    }
}

impl ContentReader for LocalReader {
    fn root(&self) -> &str {
        &self.root_display
    }

    fn list_files(&self) -> Result<Box<dyn Iterator<Item = FileEntry> + '_>> {
        if !self.root.is_dir() {
            return Err(Error::SourceUnavailable(format!(
                "{} is no longer available",
                self.root.display()
            )));
        }

        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !self.noise.is_noise(&entry.path().to_string_lossy()));

        let iter = walker.filter_map(move |entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Skipping unreadable entry: {}", err);
                    return None;
                }
            };
            if !entry.file_type().is_file() {
                return None;
            }
            match entry.metadata() {
                Ok(metadata) => Some(self.entry_for(entry.path(), &metadata)),
                Err(err) => {
                    warn!("Error reading metadata for {}: {}", entry.path().display(), err);
                    None
                }
            }
        });

        Ok(Box::new(iter))
    }

    fn read_file(&self, path: &str) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn stat(&self, path: &str) -> io::Result<FileEntry> {
        let metadata = fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path),
            ));
        }
        Ok(self.entry_for(Path::new(path), &metadata))
    }

    fn resolve_metadata_path(&self, origin_path: &str) -> String {
        if Path::new(origin_path).starts_with(&self.root) {
            return origin_path.to_string();
        }
        let mut resolved = self.root.clone();
        for part in origin_path.split('/').filter(|p| !p.is_empty()) {
            resolved.push(part);
        }
        resolved.to_string_lossy().into_owned()
    }
}
