pub mod local;
#[cfg(feature = "smb")]
pub mod smb;

use crate::config::SourceConfig;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use std::time::SystemTime;

pub use local::LocalReader;

/// One file discovered under the source root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub size: u64,
    /// Source modification time as a naive local timestamp. Never carries an offset.
    pub modified: String,
}

/// Uniform access to the origin storage, local or remote.
pub trait ContentReader {
    /// The configured root, as given.
    fn root(&self) -> &str;

    /// Lazily list every non-noise file under the root. Each call starts a
    /// fresh walk; a missing root is an error, unreadable entries are skipped.
    fn list_files(&self) -> Result<Box<dyn Iterator<Item = FileEntry> + '_>>;

    /// Read a whole file. No caching.
    fn read_file(&self, path: &str) -> io::Result<Vec<u8>>;

    fn stat(&self, path: &str) -> io::Result<FileEntry>;

    /// Translate a path recorded by the origin metadata database (relative
    /// to the photo root, `/` separated) into this reader's concrete path.
    fn resolve_metadata_path(&self, origin_path: &str) -> String;
}

/// Substring matcher over the full path for metadata/thumbnail dirs and
/// housekeeping files.
#[derive(Debug, Clone, Default)]
pub struct NoiseFilter {
    patterns: Vec<String>,
}

impl NoiseFilter {
    pub fn new(patterns: &[String]) -> Self {
        Self {
            patterns: patterns
                .iter()
                .filter(|p| !p.is_empty())
                .cloned()
                .collect(),
        }
    }

    pub fn is_noise(&self, path: &str) -> bool {
        self.patterns.iter().any(|pattern| path.contains(pattern.as_str()))
    }
}

/// A parsed `scheme://host[:port]/share/path...` location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLocation {
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
    pub share: String,
    /// Sub-path inside the share, without leading or trailing `/`.
    pub path: String,
}

impl RemoteLocation {
    pub fn parse(url: &str) -> Result<Self> {
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| Error::InvalidSource(format!("missing scheme in '{}'", url)))?;
        if scheme.is_empty() {
            return Err(Error::InvalidSource(format!("missing scheme in '{}'", url)));
        }

        let (authority, tail) = match rest.split_once('/') {
            Some((authority, tail)) => (authority, tail),
            None => (rest, ""),
        };

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    Error::InvalidSource(format!("invalid port '{}' in '{}'", port, url))
                })?;
                (host, Some(port))
            }
            None => (authority, None),
        };
        if host.is_empty() {
            return Err(Error::InvalidSource(format!("missing host in '{}'", url)));
        }

        let mut parts = tail.split('/').filter(|s| !s.is_empty());
        let share = parts
            .next()
            .ok_or_else(|| Error::InvalidSource(format!("missing share in '{}'", url)))?
            .to_string();
        let path = parts.collect::<Vec<_>>().join("/");

        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            host: host.to_string(),
            port,
            share,
            path,
        })
    }

    /// `scheme://host[:port]/share` without the sub-path.
    pub fn share_url(&self) -> String {
        match self.port {
            Some(port) => format!("{}://{}:{}/{}", self.scheme, self.host, port, self.share),
            None => format!("{}://{}/{}", self.scheme, self.host, self.share),
        }
    }

    /// Full URL for a path relative to the share root.
    pub fn url_for(&self, share_path: &str) -> String {
        format!("{}/{}", self.share_url(), share_path.trim_start_matches('/'))
    }
}

/// Open the reader matching the configured root's scheme.
pub fn open_reader(source: &SourceConfig) -> Result<Box<dyn ContentReader>> {
    let noise = NoiseFilter::new(&source.exclude_patterns);

    if !source.path.contains("://") {
        let reader = LocalReader::open(Path::new(&source.path), noise)?;
        return Ok(Box::new(reader));
    }

    let location = RemoteLocation::parse(&source.path)?;
    match location.scheme.as_str() {
        "smb" => open_smb(source, location, noise),
        other => Err(Error::InvalidSource(format!(
            "unsupported scheme '{}' in '{}'",
            other, source.path
        ))),
    }
}

#[cfg(feature = "smb")]
fn open_smb(
    source: &SourceConfig,
    location: RemoteLocation,
    noise: NoiseFilter,
) -> Result<Box<dyn ContentReader>> {
    let reader = smb::SmbReader::connect(
        &source.path,
        location,
        source.smb_user.as_deref(),
        source.smb_password.as_deref(),
        source.smb_workgroup.as_deref(),
        noise,
    )?;
    Ok(Box::new(reader))
}

#[cfg(not(feature = "smb"))]
fn open_smb(
    source: &SourceConfig,
    _location: RemoteLocation,
    _noise: NoiseFilter,
) -> Result<Box<dyn ContentReader>> {
    Err(Error::Config(format!(
        "'{}' is a remote share, but this build lacks the `smb` feature",
        source.path
    )))
}

pub(crate) fn format_modified(modified: SystemTime) -> String {
    let local: chrono::DateTime<chrono::Local> = modified.into();
    local.naive_local().format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// File name component of a reader path (`/` or `\` separated).
pub fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
