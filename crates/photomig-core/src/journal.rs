use crate::error::Result;
use chrono::Local;
use std::cell::RefCell;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

const RULE: &str = "============================================================";

/// Per-pass audit file: one line per attempted item plus a block for each
/// unsupported-format rejection.
///
/// Opened at pass start and handed to components by reference. Buffered
/// output is flushed on drop, so an aborted pass still leaves a complete
/// record of what it attempted.
pub struct PassJournal {
    sink: Option<Sink>,
}

struct Sink {
    path: PathBuf,
    writer: RefCell<BufWriter<File>>,
}

impl PassJournal {
    /// Create `<log_dir>/<pass>_<YYYYmmdd_HHMMSS>.log`.
    pub fn open(log_dir: &Path, pass: &str) -> Result<Self> {
        fs::create_dir_all(log_dir)?;
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = log_dir.join(format!("{}_{}.log", pass, stamp));
        let file = File::create(&path)?;
        let journal = Self {
            sink: Some(Sink {
                path,
                writer: RefCell::new(BufWriter::new(file)),
            }),
        };
        journal.note(&format!("{} pass started", pass));
        Ok(journal)
    }

    /// A journal that records nothing.
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.sink.as_ref().map(|s| s.path.as_path())
    }

    /// Free-form milestone line.
    pub fn note(&self, message: &str) {
        self.write_line(&format!("{} | INFO | {}", timestamp(), message));
    }

    /// Outcome of one attempted item.
    pub fn record(&self, path: &str, outcome: &str, detail: Option<&str>) {
        let line = match detail {
            Some(detail) => format!("{} | {} | {} | {}", timestamp(), outcome, path, detail),
            None => format!("{} | {} | {}", timestamp(), outcome, path),
        };
        self.write_line(&line);
    }

    pub fn unsupported(&self, path: &str, size: u64, message: &str) {
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        let block = format!(
            "{rule}\nUNSUPPORTED FORMAT\n{rule}\nFile: {}\nSize: {}\nAttempted MIME: {}\nResponse: {:?}\nTimestamp: {}\n{rule}",
            path,
            format_size(size),
            mime.essence_str(),
            message,
            timestamp(),
            rule = RULE,
        );
        self.write_line(&block);
    }

    pub fn flush(&self) {
        if let Some(sink) = &self.sink {
            if let Err(err) = sink.writer.borrow_mut().flush() {
                warn!("Failed to flush journal {}: {}", sink.path.display(), err);
            }
        }
    }

    fn write_line(&self, line: &str) {
        if let Some(sink) = &self.sink {
            if let Err(err) = writeln!(sink.writer.borrow_mut(), "{}", line) {
                warn!("Failed to write journal {}: {}", sink.path.display(), err);
            }
        }
    }
}

impl Drop for PassJournal {
    fn drop(&mut self) {
        self.flush();
    }
}

fn timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Human readable byte count (`500 B`, `1.5 MB`).
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}
