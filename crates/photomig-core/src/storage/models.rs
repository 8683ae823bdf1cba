use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Recorded outcome of one migration attempt. A path with no row is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Success,
    Failed,
    Unsupported,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Success => "success",
            FileStatus::Failed => "failed",
            FileStatus::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(FileStatus::Success),
            "failed" => Ok(FileStatus::Failed),
            "unsupported" => Ok(FileStatus::Unsupported),
            other => Err(format!("unknown file status '{}'", other)),
        }
    }
}

impl ToSql for FileStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for FileStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// Per-file migration outcome, keyed by source path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub source_path: String,
    pub fingerprint: Option<String>,
    pub file_size: i64,
    /// Opaque source modification timestamp; no timezone is inferred.
    pub source_mtime: String,
    pub asset_id: Option<String>,
    pub status: FileStatus,
    pub error_message: Option<String>,
    /// For a motion clip uploaded inside its still's asset: the still's path.
    pub paired_with: Option<String>,
    /// Set by the store on every write.
    pub updated_at: String,
}

impl FileRecord {
    pub fn new(source_path: impl Into<String>, status: FileStatus) -> Self {
        Self {
            source_path: source_path.into(),
            fingerprint: None,
            file_size: 0,
            source_mtime: String::new(),
            asset_id: None,
            status,
            error_message: None,
            paired_with: None,
            updated_at: String::new(),
        }
    }
}

/// Origin album to destination album link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumRecord {
    pub origin_album_id: i64,
    pub album_name: String,
    pub dest_album_id: Option<String>,
    /// False while a created album still lacks its members.
    pub members_attached: bool,
    pub created_at: String,
}

impl AlbumRecord {
    pub fn is_complete(&self) -> bool {
        self.dest_album_id.is_some() && self.members_attached
    }
}

/// Last fully processed batch of a resumable verification pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub pass_id: String,
    /// Zero-based index of the last batch whose results are persisted.
    pub last_batch: usize,
    pub total_batches: usize,
    pub batch_size: usize,
    /// Fingerprint of the ordered key list the batches were cut from.
    pub key_digest: String,
}

impl Checkpoint {
    pub fn next_batch(&self) -> usize {
        self.last_batch + 1
    }

    /// Whether this checkpoint was cut from the same keys with the same
    /// batch layout.
    pub fn resumes(&self, batch_size: usize, total_batches: usize, key_digest: &str) -> bool {
        self.batch_size == batch_size
            && self.total_batches == total_batches
            && self.key_digest == key_digest
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MigrationStats {
    pub total: i64,
    pub success: i64,
    pub failed: i64,
    pub unsupported: i64,
}

impl MigrationStats {
    /// Percentage of recorded files that migrated successfully.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.success as f64 * 100.0 / self.total as f64
        }
    }
}
