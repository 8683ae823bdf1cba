//! Markdown migration report rendered from the progress store.

use crate::error::Result;
use crate::storage::{FileStatus, ProgressStore};
use chrono::Local;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

pub fn render_migration_report(store: &ProgressStore) -> Result<String> {
    let stats = store.statistics()?;
    let mut out = String::new();

    let _ = writeln!(out, "# Migration report");
    let _ = writeln!(out);
    let _ = writeln!(out, "Generated: {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(out);

    let _ = writeln!(out, "## Summary");
    let _ = writeln!(out);
    let _ = writeln!(out, "| Status | Files |");
    let _ = writeln!(out, "|--------|-------|");
    let _ = writeln!(out, "| Total | {} |", stats.total);
    let _ = writeln!(out, "| Success | {} |", stats.success);
    let _ = writeln!(out, "| Failed | {} |", stats.failed);
    let _ = writeln!(out, "| Unsupported | {} |", stats.unsupported);
    let _ = writeln!(out);
    let _ = writeln!(out, "Success rate: {:.1}%", stats.success_rate());
    let _ = writeln!(out);

    let _ = writeln!(out, "## Failed files");
    let _ = writeln!(out);
    let failed = store.list_by_status(FileStatus::Failed)?;
    if failed.is_empty() {
        let _ = writeln!(out, "No failed files.");
    } else {
        let _ = writeln!(out, "| File | Error |");
        let _ = writeln!(out, "|------|-------|");
        for record in &failed {
            let error = record.error_message.as_deref().unwrap_or("unknown");
            let _ = writeln!(
                out,
                "| {} | {} |",
                escape_cell(&record.source_path),
                escape_cell(error)
            );
        }
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "## Unsupported files");
    let _ = writeln!(out);
    let unsupported = store.list_by_status(FileStatus::Unsupported)?;
    if unsupported.is_empty() {
        let _ = writeln!(out, "No unsupported files.");
    } else {
        let _ = writeln!(out, "| File | MIME type |");
        let _ = writeln!(out, "|------|-----------|");
        for record in &unsupported {
            let mime = mime_guess::from_path(&record.source_path).first_or_octet_stream();
            let _ = writeln!(
                out,
                "| {} | {} |",
                escape_cell(&record.source_path),
                mime.essence_str()
            );
        }
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "## Albums");
    let _ = writeln!(out);
    let albums = store.list_albums()?;
    if albums.is_empty() {
        let _ = writeln!(out, "No albums migrated.");
    } else {
        let _ = writeln!(out, "| Origin ID | Album | Destination ID |");
        let _ = writeln!(out, "|-----------|-------|----------------|");
        for album in &albums {
            let _ = writeln!(
                out,
                "| {} | {} | {} |",
                album.origin_album_id,
                escape_cell(&album.album_name),
                album.dest_album_id.as_deref().unwrap_or("-")
            );
        }
    }

    Ok(out)
}

pub fn write_migration_report(store: &ProgressStore, output: &Path) -> Result<()> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(output, render_migration_report(store)?)?;
    Ok(())
}
