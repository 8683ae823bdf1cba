use crate::error::Result;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Bucket of one reconciled file. Every considered file lands in exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Classification {
    Matched,
    HashMismatch,
    OriginOnly,
    MetadataOnly,
    DestinationOnly,
}

impl Classification {
    pub const ALL: [Classification; 5] = [
        Classification::Matched,
        Classification::HashMismatch,
        Classification::OriginOnly,
        Classification::MetadataOnly,
        Classification::DestinationOnly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Matched => "matched",
            Classification::HashMismatch => "hash-mismatch",
            Classification::OriginOnly => "origin-only",
            Classification::MetadataOnly => "metadata-only",
            Classification::DestinationOnly => "destination-only",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonResult {
    /// Reader path, or the destination asset id for destination-only entries.
    pub key: String,
    pub classification: Classification,
    pub asset_id: Option<String>,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationCounts {
    pub matched: usize,
    pub hash_mismatch: usize,
    pub origin_only: usize,
    pub metadata_only: usize,
    pub destination_only: usize,
}

impl ClassificationCounts {
    pub fn from_results<'r>(results: impl IntoIterator<Item = &'r ComparisonResult>) -> Self {
        let mut counts = Self::default();
        for result in results {
            match result.classification {
                Classification::Matched => counts.matched += 1,
                Classification::HashMismatch => counts.hash_mismatch += 1,
                Classification::OriginOnly => counts.origin_only += 1,
                Classification::MetadataOnly => counts.metadata_only += 1,
                Classification::DestinationOnly => counts.destination_only += 1,
            }
        }
        counts
    }

    pub fn get(&self, classification: Classification) -> usize {
        match classification {
            Classification::Matched => self.matched,
            Classification::HashMismatch => self.hash_mismatch,
            Classification::OriginOnly => self.origin_only,
            Classification::MetadataOnly => self.metadata_only,
            Classification::DestinationOnly => self.destination_only,
        }
    }

    pub fn total(&self) -> usize {
        self.matched + self.hash_mismatch + self.origin_only + self.metadata_only + self.destination_only
    }
}

/// Outcome of a three-way verification pass. Built once, then only read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub generated_at: String,
    pub origin_files: usize,
    pub metadata_files: usize,
    pub destination_assets: usize,
    pub counts: ClassificationCounts,
    pub results: Vec<ComparisonResult>,
}

impl VerificationReport {
    pub fn new(
        origin_files: usize,
        metadata_files: usize,
        destination_assets: usize,
        results: Vec<ComparisonResult>,
    ) -> Self {
        Self {
            generated_at: Local::now().naive_local().format("%Y-%m-%dT%H:%M:%S").to_string(),
            origin_files,
            metadata_files,
            destination_assets,
            counts: ClassificationCounts::from_results(&results),
            results,
        }
    }

    pub fn with_classification(
        &self,
        classification: Classification,
    ) -> impl Iterator<Item = &ComparisonResult> {
        self.results
            .iter()
            .filter(move |r| r.classification == classification)
    }

    /// True when nothing needs attention.
    pub fn is_clean(&self) -> bool {
        self.counts.matched == self.counts.total()
    }
}

/// A report that also has a human readable rendering.
pub trait RenderText {
    fn render_text(&self) -> String;
}

impl RenderText for VerificationReport {
    fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Verification report ({})", self.generated_at);
        let _ = writeln!(out, "{}", "=".repeat(60));
        let _ = writeln!(out, "Origin files:       {}", self.origin_files);
        let _ = writeln!(out, "Metadata files:     {}", self.metadata_files);
        let _ = writeln!(out, "Destination assets: {}", self.destination_assets);
        let _ = writeln!(out);
        for classification in Classification::ALL {
            let _ = writeln!(
                out,
                "{:<18} {}",
                format!("{}:", classification.as_str()),
                self.counts.get(classification)
            );
        }

        for classification in Classification::ALL {
            if classification == Classification::Matched {
                continue;
            }
            let mut entries = self.with_classification(classification).peekable();
            if entries.peek().is_none() {
                continue;
            }
            let _ = writeln!(out);
            let _ = writeln!(out, "[{}]", classification.as_str());
            for entry in entries {
                match &entry.detail {
                    Some(detail) => {
                        let _ = writeln!(out, "  {} ({})", entry.key, detail);
                    }
                    None => {
                        let _ = writeln!(out, "  {}", entry.key);
                    }
                }
            }
        }
        out
    }
}

/// Where a pair of reports was written.
#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub json: PathBuf,
    pub text: PathBuf,
}

/// Write `<stem>_<timestamp>.json` and `.txt` from the same report object.
pub fn write_reports<R>(report: &R, dir: &Path, stem: &str) -> Result<ReportPaths>
where
    R: Serialize + RenderText,
{
    fs::create_dir_all(dir)?;
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let json = dir.join(format!("{}_{}.json", stem, stamp));
    let text = dir.join(format!("{}_{}.txt", stem, stamp));

    let mut writer = BufWriter::new(File::create(&json)?);
    serde_json::to_writer_pretty(&mut writer, report)?;
    writer.flush()?;

    fs::write(&text, report.render_text())?;

    info!("Reports written to {} and {}", json.display(), text.display());
    Ok(ReportPaths { json, text })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn result(key: &str, classification: Classification) -> ComparisonResult {
        ComparisonResult {
            key: key.to_string(),
            classification,
            asset_id: None,
            detail: None,
        }
    }

    #[test]
    fn test_counts_partition_results() {
        let report = VerificationReport::new(
            2,
            2,
            2,
            vec![
                result("/a", Classification::Matched),
                result("/b", Classification::MetadataOnly),
                result("c", Classification::DestinationOnly),
            ],
        );
        assert_eq!(report.counts.matched, 1);
        assert_eq!(report.counts.metadata_only, 1);
        assert_eq!(report.counts.destination_only, 1);
        assert_eq!(report.counts.total(), 3);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_text_rendering_lists_discrepancies() {
        let report = VerificationReport::new(
            1,
            1,
            0,
            vec![
                result("/ok.jpg", Classification::Matched),
                result("/gap.jpg", Classification::MetadataOnly),
            ],
        );
        let text = report.render_text();
        assert!(text.contains("metadata-only:     1"));
        assert!(text.contains("[metadata-only]\n  /gap.jpg"));
        assert!(!text.contains("[matched]"));
    }

    #[test]
    fn test_write_reports_from_same_object() {
        let tmp = tempdir().unwrap();
        let report = VerificationReport::new(1, 1, 1, vec![result("/a", Classification::Matched)]);
        let paths = write_reports(&report, &tmp.path().join("reports"), "verify").unwrap();
        let parsed: VerificationReport =
            serde_json::from_str(&fs::read_to_string(&paths.json).unwrap()).unwrap();
        assert_eq!(parsed, report);
        assert_eq!(fs::read_to_string(&paths.text).unwrap(), report.render_text());
    }
}
