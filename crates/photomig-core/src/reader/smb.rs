use super::{format_modified, ContentReader, FileEntry, NoiseFilter, RemoteLocation};
use crate::error::{Error, Result};
use pavao::{SmbClient, SmbCredentials, SmbDirentType, SmbOpenOptions, SmbOptions};
use std::collections::VecDeque;
use std::io::{self, Read};
use tracing::{debug, warn};

/// Reader over an SMB share, through libsmbclient.
///
/// Paths handed out are full `smb://host[:port]/share/...` URLs.
pub struct SmbReader {
    client: SmbClient,
    root: String,
    location: RemoteLocation,
    noise: NoiseFilter,
}

fn to_io(err: pavao::SmbError) -> io::Error {
    io::Error::other(err.to_string())
}

impl SmbReader {
    pub fn connect(
        root: &str,
        location: RemoteLocation,
        user: Option<&str>,
        password: Option<&str>,
        workgroup: Option<&str>,
        noise: NoiseFilter,
    ) -> Result<Self> {
        let server = match location.port {
            Some(port) => format!("smb://{}:{}", location.host, port),
            None => format!("smb://{}", location.host),
        };
        let mut credentials = SmbCredentials::default()
            .server(server)
            .share(format!("/{}", location.share));
        if let Some(user) = user {
            credentials = credentials.username(user);
        }
        if let Some(password) = password {
            credentials = credentials.password(password);
        }
        if let Some(workgroup) = workgroup {
            credentials = credentials.workgroup(workgroup);
        }

        let client = SmbClient::new(credentials, SmbOptions::default().one_share_per_server(true))
            .map_err(|e| Error::SourceUnavailable(format!("{}: {}", root, e)))?;
        let reader = Self {
            client,
            root: root.to_string(),
            location,
            noise,
        };

        let root_path = reader.root_share_path();
        reader
            .client
            .stat(&root_path)
            .map_err(|e| Error::SourceUnavailable(format!("{}: {}", root, e)))?;
        debug!("Connected to {}", root);
        Ok(reader)
    }

    fn root_share_path(&self) -> String {
        if self.location.path.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", self.location.path)
        }
    }

    /// Share-relative path (`/dir/file`) for a reader path.
    fn share_path(&self, path: &str) -> String {
        let share_url = self.location.share_url();
        let relative = path.strip_prefix(&share_url).unwrap_or(path);
        format!("/{}", relative.trim_start_matches('/'))
    }

    fn entry(&self, share_path: &str) -> io::Result<FileEntry> {
        let stat = self.client.stat(share_path).map_err(to_io)?;
        Ok(FileEntry {
            path: self.location.url_for(share_path),
            size: stat.size,
            modified: format_modified(stat.modified),
        })
    }
}

/// Depth-first walk that lists one directory at a time.
struct SmbWalk<'r> {
    reader: &'r SmbReader,
    dirs: Vec<String>,
    ready: VecDeque<FileEntry>,
}

impl<'r> SmbWalk<'r> {
    fn expand(&mut self, dir: &str) {
        let mut entries = match self.reader.client.list_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!("Skipping unreadable directory {}: {}", dir, err);
                return;
            }
        };
        entries.sort_by(|a, b| a.name().cmp(b.name()));

        let mut subdirs = Vec::new();
        for dirent in entries {
            let name = dirent.name();
            if name == "." || name == ".." {
                continue;
            }
            let share_path = format!("{}/{}", dir.trim_end_matches('/'), name);
            if self.reader.noise.is_noise(&share_path) {
                continue;
            }
            match dirent.get_type() {
                SmbDirentType::Dir => subdirs.push(share_path),
                SmbDirentType::File => match self.reader.entry(&share_path) {
                    Ok(entry) => self.ready.push_back(entry),
                    Err(err) => warn!("Error reading metadata for {}: {}", share_path, err),
                },
                _ => {}
            }
        }
        // Reverse so the stack pops subdirectories in name order.
        self.dirs.extend(subdirs.into_iter().rev());
    }
}

impl Iterator for SmbWalk<'_> {
    type Item = FileEntry;

    fn next(&mut self) -> Option<FileEntry> {
        loop {
            if let Some(entry) = self.ready.pop_front() {
                return Some(entry);
            }
            let dir = self.dirs.pop()?;
            self.expand(&dir);
        }
    }
}

impl ContentReader for SmbReader {
    fn root(&self) -> &str {
        &self.root
    }

    fn list_files(&self) -> Result<Box<dyn Iterator<Item = FileEntry> + '_>> {
        let root = self.root_share_path();
        self.client
            .stat(&root)
            .map_err(|e| Error::SourceUnavailable(format!("{}: {}", self.root, e)))?;
        Ok(Box::new(SmbWalk {
            reader: self,
            dirs: vec![root],
            ready: VecDeque::new(),
        }))
    }

    fn read_file(&self, path: &str) -> io::Result<Vec<u8>> {
        let share_path = self.share_path(path);
        let mut file = self
            .client
            .open_with(&share_path, SmbOpenOptions::default().read(true))
            .map_err(to_io)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(data)
    }

    fn stat(&self, path: &str) -> io::Result<FileEntry> {
        self.entry(&self.share_path(path))
    }

    fn resolve_metadata_path(&self, origin_path: &str) -> String {
        if origin_path.starts_with(&self.location.share_url()) {
            return origin_path.to_string();
        }
        let relative = origin_path.trim_start_matches('/');
        if self.location.path.is_empty() {
            self.location.url_for(relative)
        } else {
            self.location
                .url_for(&format!("{}/{}", self.location.path, relative))
        }
    }
}
