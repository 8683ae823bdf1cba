use crate::reader::FileEntry;
use std::collections::BTreeMap;

/// A primary file plus an optional paired motion component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetGroup {
    pub primary: FileEntry,
    pub paired: Option<FileEntry>,
}

impl AssetGroup {
    pub fn single(primary: FileEntry) -> Self {
        Self {
            primary,
            paired: None,
        }
    }

    pub fn is_paired(&self) -> bool {
        self.paired.is_some()
    }

    /// Every file owned by this group, primary first.
    pub fn files(&self) -> impl Iterator<Item = &FileEntry> {
        std::iter::once(&self.primary).chain(self.paired.iter())
    }
}

/// Detects still+motion pairs sharing a base name.
#[derive(Debug, Clone)]
pub struct Grouper {
    still_extensions: Vec<String>,
    motion_extensions: Vec<String>,
}

#[derive(Default)]
struct Candidates {
    stills: Vec<FileEntry>,
    motions: Vec<FileEntry>,
    others: Vec<FileEntry>,
}

impl Grouper {
    pub fn new(still_extensions: &[String], motion_extensions: &[String]) -> Self {
        let normalize = |exts: &[String]| {
            exts.iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect::<Vec<_>>()
        };
        Self {
            still_extensions: normalize(still_extensions),
            motion_extensions: normalize(motion_extensions),
        }
    }

    /// Group files in one pass. Output is sorted by primary path and every
    /// input file lands in exactly one group.
    pub fn group<I>(&self, files: I) -> Vec<AssetGroup>
    where
        I: IntoIterator<Item = FileEntry>,
    {
        let mut by_base: BTreeMap<String, Candidates> = BTreeMap::new();

        for file in files {
            let (base, ext) = split_extension(&file.path);
            let slot = by_base.entry(group_key(base)).or_default();
            match ext.map(|e| e.to_ascii_lowercase()) {
                Some(ext) if self.still_extensions.contains(&ext) => slot.stills.push(file),
                Some(ext) if self.motion_extensions.contains(&ext) => slot.motions.push(file),
                _ => slot.others.push(file),
            }
        }

        let mut groups = Vec::new();
        for (_, mut candidates) in by_base {
            if candidates.stills.len() == 1 && candidates.motions.len() == 1 {
                let still = candidates.stills.remove(0);
                let motion = candidates.motions.remove(0);
                groups.push(AssetGroup {
                    primary: still,
                    paired: Some(motion),
                });
            } else {
                groups.extend(candidates.stills.drain(..).map(AssetGroup::single));
                groups.extend(candidates.motions.drain(..).map(AssetGroup::single));
            }
            groups.extend(candidates.others.into_iter().map(AssetGroup::single));
        }

        groups.sort_by(|a, b| a.primary.path.cmp(&b.primary.path));
        groups
    }
}

/// Directory kept as-is, stem case-folded: `IMG_1` and `img_1` pair only
/// within the same directory.
fn group_key(base: &str) -> String {
    let name_start = base.rfind(['/', '\\']).map(|i| i + 1).unwrap_or(0);
    format!("{}{}", &base[..name_start], base[name_start..].to_lowercase())
}

/// Split `dir/name.ext` into (`dir/name`, `ext`). Dots inside directory
/// names and leading dots on file names are not extensions.
fn split_extension(path: &str) -> (&str, Option<&str>) {
    let name_start = path.rfind(['/', '\\']).map(|i| i + 1).unwrap_or(0);
    match path[name_start..].rfind('.') {
        Some(0) | None => (path, None),
        Some(dot) => {
            let dot = name_start + dot;
            (&path[..dot], Some(&path[dot + 1..]))
        }
    }
}
