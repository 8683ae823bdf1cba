mod commands;
mod logging;
mod progress;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process;

use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands, DEFAULT_CONFIG};
use dotenv::dotenv;
use photomig_core::config::{load_configuration, LoggingConfig};
use photomig_core::destination::{DestinationClient, ImmichClient, OfflineDestination};
use photomig_core::metadata::{capture_time_index, MetadataSource, SynologyMetadata};
use photomig_core::migrate::{AlbumSummary, BackfillSummary};
use photomig_core::reader::{open_reader, ContentReader};
use photomig_core::storage::FileStatus;
use photomig_core::verify::{write_reports, AlbumVerificationReport, VerificationReport};
use photomig_core::{
    AlbumVerifier, AppConfig, CancelToken, Grouper, MigrationOptions, MigrationSummary, Migrator,
    PassJournal, PassOutcome, ProgressStore, Result, Verifier,
};
use progress::CliReporter;
use tracing::{error, info, warn};

fn main() {
    dotenv().ok();

    let args = Cli::parse();
    let Some(command) = args.command else {
        let _ = Cli::command().print_long_help();
        return;
    };

    let (config_path, required) = match &args.config {
        Some(path) => (path.clone(), true),
        None => (PathBuf::from(DEFAULT_CONFIG), false),
    };
    let loaded = load_configuration(&config_path, required);
    let logging_config = loaded
        .as_ref()
        .map(|config| config.logging.clone())
        .unwrap_or_else(|_| LoggingConfig::default());
    let _guard = logging::init_logger(&logging_config);

    let mut config = match loaded {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };
    if let Some(batch_size) = args.batch_size {
        config.migration.batch_size = batch_size.max(1);
    }
    if let Some(batch_delay) = args.batch_delay {
        config.migration.batch_delay_secs = batch_delay.max(0.0);
    }

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, stopping after the current batch...");
        handler_token.cancel();
    }) {
        warn!("Could not install interrupt handler: {}", err);
    }

    let result = match command {
        Commands::Migrate { dry_run } => run_migrate(&config, dry_run, &cancel),
        Commands::Verify => run_verify(&config, &cancel),
        Commands::VerifyAlbums => run_verify_albums(&config, &cancel),
        Commands::Backfill { dry_run } => run_backfill(&config, dry_run, &cancel),
        Commands::Retry { dry_run } => run_retry(&config, dry_run, &cancel),
        Commands::Status { verbose } => run_status(&config, verbose),
        Commands::Albums { dry_run } => run_albums(&config, dry_run, &cancel),
        Commands::Report { output } => run_report(&config, &output),
        Commands::PrintConfig => {
            println!("Configuration: {:#?}", config.redacted());
            Ok(())
        }
    };

    if let Err(err) = result {
        error!("Error: {}", err);
        process::exit(1);
    }
}

// ── Setup ──

fn open_store(config: &AppConfig) -> Result<ProgressStore> {
    Ok(ProgressStore::open(&config.migration.progress_db)?)
}

fn open_source(config: &AppConfig) -> Result<Box<dyn ContentReader>> {
    config.validate_source()?;
    let reader = open_reader(&config.source)?;
    info!("Source: {}", reader.root());
    Ok(reader)
}

/// Connected destination client. Dry runs get an offline stand-in so no
/// request is ever sent.
fn open_destination(config: &AppConfig, dry_run: bool) -> Result<Box<dyn DestinationClient>> {
    if dry_run {
        return Ok(Box::new(OfflineDestination));
    }
    config.validate_destination()?;
    let client = ImmichClient::new(&config.destination)?;
    client.check_connection()?;
    info!("Connected to {}", client.base_url());
    Ok(Box::new(client))
}

fn open_metadata(config: &AppConfig) -> Result<SynologyMetadata> {
    SynologyMetadata::connect(config.metadata()?)
}

fn grouper(config: &AppConfig) -> Grouper {
    Grouper::new(
        &config.source.paired_still_extensions,
        &config.source.paired_motion_extensions,
    )
}

fn options(config: &AppConfig, dry_run: bool) -> MigrationOptions {
    let mut options = MigrationOptions::from_config(config);
    options.dry_run = options.dry_run || dry_run;
    options
}

fn open_journal(config: &AppConfig, pass: &str) -> Result<PassJournal> {
    let journal = PassJournal::open(&config.logging.log_dir, pass)?;
    if let Some(path) = journal.path() {
        info!("Pass log: {}", path.display());
    }
    Ok(journal)
}

/// Capture times from the catalogue when one is configured. A catalogue
/// that cannot be reached only costs the better timestamps.
fn load_capture_times(config: &AppConfig, reader: &dyn ContentReader) -> HashMap<String, String> {
    if config.metadata.is_none() {
        return HashMap::new();
    }
    match open_metadata(config).and_then(|mut metadata| metadata.list_indexed_files()) {
        Ok(files) => {
            let index = capture_time_index(reader, &files);
            info!("{} capture times loaded from the catalogue", index.len());
            index
        }
        Err(err) => {
            warn!("Catalogue unavailable, using file modification times: {}", err);
            HashMap::new()
        }
    }
}

fn interrupted_notice(completed_batches: usize, total_batches: usize) {
    warn!(
        "{} after {} of {} batches; run the command again to continue",
        "Interrupted".yellow(),
        completed_batches,
        total_batches
    );
}

// ── Passes ──

fn run_migrate(config: &AppConfig, dry_run: bool, cancel: &CancelToken) -> Result<()> {
    let options = options(config, dry_run);
    let reader = open_source(config)?;
    let client = open_destination(config, options.dry_run)?;
    let store = open_store(config)?;
    let journal = open_journal(config, "migrate")?;
    let capture_times = load_capture_times(config, reader.as_ref());

    let migrator = Migrator::new(
        reader.as_ref(),
        client.as_ref(),
        &store,
        &journal,
        grouper(config),
        options,
    )
    .with_capture_times(capture_times)
    .with_cancel(cancel.clone());

    let reporter = CliReporter::new("Batch");
    match migrator.run(&reporter)? {
        PassOutcome::Completed(summary) => print_migration_summary(&summary),
        PassOutcome::Interrupted {
            partial,
            completed_batches,
            total_batches,
        } => {
            print_migration_summary(&partial);
            interrupted_notice(completed_batches, total_batches);
            return Ok(());
        }
    }

    if config.metadata.is_some() {
        let mut metadata = open_metadata(config)?;
        album_pass(&migrator, &mut metadata)?;
    }
    Ok(())
}

fn run_albums(config: &AppConfig, dry_run: bool, cancel: &CancelToken) -> Result<()> {
    let options = options(config, dry_run);
    let mut metadata = open_metadata(config)?;
    let reader = open_source(config)?;
    let client = open_destination(config, options.dry_run)?;
    let store = open_store(config)?;
    let journal = open_journal(config, "albums")?;

    let migrator = Migrator::new(
        reader.as_ref(),
        client.as_ref(),
        &store,
        &journal,
        grouper(config),
        options,
    )
    .with_cancel(cancel.clone());
    album_pass(&migrator, &mut metadata)
}

fn album_pass(migrator: &Migrator<'_>, metadata: &mut dyn MetadataSource) -> Result<()> {
    let reporter = CliReporter::new("Albums");
    match migrator.migrate_albums(metadata, &reporter)? {
        PassOutcome::Completed(summary) => print_album_summary(&summary),
        PassOutcome::Interrupted {
            partial,
            completed_batches,
            total_batches,
        } => {
            print_album_summary(&partial);
            interrupted_notice(completed_batches, total_batches);
        }
    }
    Ok(())
}

fn run_retry(config: &AppConfig, dry_run: bool, cancel: &CancelToken) -> Result<()> {
    let options = options(config, dry_run);
    let store = open_store(config)?;

    if options.dry_run {
        let candidates = store.list_by_status(FileStatus::Failed)?;
        info!("{} failed files would be retried", format!("{}", candidates.len()).yellow());
        for record in candidates {
            println!(
                "  {} ({})",
                record.source_path,
                record.error_message.as_deref().unwrap_or("no error recorded")
            );
        }
        return Ok(());
    }

    let reader = open_source(config)?;
    let client = open_destination(config, false)?;
    let journal = open_journal(config, "retry")?;
    let capture_times = load_capture_times(config, reader.as_ref());

    let migrator = Migrator::new(
        reader.as_ref(),
        client.as_ref(),
        &store,
        &journal,
        grouper(config),
        options,
    )
    .with_capture_times(capture_times)
    .with_cancel(cancel.clone());

    let reporter = CliReporter::new("Retry");
    match migrator.retry_failed(&reporter)? {
        PassOutcome::Completed(summary) => print_migration_summary(&summary),
        PassOutcome::Interrupted {
            partial,
            completed_batches,
            total_batches,
        } => {
            print_migration_summary(&partial);
            interrupted_notice(completed_batches, total_batches);
        }
    }
    Ok(())
}

fn run_backfill(config: &AppConfig, dry_run: bool, cancel: &CancelToken) -> Result<()> {
    let options = options(config, dry_run);
    let reader = open_source(config)?;
    // Backfill reads the destination listing even in a dry run.
    let client = open_destination(config, false)?;
    let store = open_store(config)?;
    let journal = open_journal(config, "backfill")?;
    let capture_times = load_capture_times(config, reader.as_ref());

    let migrator = Migrator::new(
        reader.as_ref(),
        client.as_ref(),
        &store,
        &journal,
        grouper(config),
        options,
    )
    .with_capture_times(capture_times)
    .with_cancel(cancel.clone());

    let reporter = CliReporter::new("Backfill");
    match migrator.backfill(&reporter)? {
        PassOutcome::Completed(summary) => print_backfill_summary(&summary),
        PassOutcome::Interrupted {
            partial,
            completed_batches,
            total_batches,
        } => {
            print_backfill_summary(&partial);
            interrupted_notice(completed_batches, total_batches);
        }
    }
    Ok(())
}

fn run_verify(config: &AppConfig, cancel: &CancelToken) -> Result<()> {
    let reader = open_source(config)?;
    let client = open_destination(config, false)?;
    let store = open_store(config)?;

    let metadata_paths: Vec<String> = match &config.metadata {
        Some(_) => open_metadata(config)?
            .list_indexed_files()?
            .into_iter()
            .map(|file| file.path)
            .collect(),
        None => {
            warn!("No [metadata] section; files will not be classified as metadata-only");
            Vec::new()
        }
    };

    let verifier = Verifier::new(reader.as_ref(), client.as_ref(), &store, config.verify.batch_size)
        .with_cancel(cancel.clone());
    let reporter = CliReporter::new("Verify");
    match verifier.run(&metadata_paths, &reporter)? {
        PassOutcome::Completed(report) => {
            print_verification_summary(&report);
            write_reports(&report, &config.verify.report_dir, "verify")?;
        }
        PassOutcome::Interrupted {
            partial,
            completed_batches,
            total_batches,
        } => {
            print_verification_summary(&partial);
            interrupted_notice(completed_batches, total_batches);
        }
    }
    Ok(())
}

fn run_verify_albums(config: &AppConfig, cancel: &CancelToken) -> Result<()> {
    let mut metadata = open_metadata(config)?;
    let reader = open_source(config)?;
    let client = open_destination(config, false)?;
    let store = open_store(config)?;

    let verifier = AlbumVerifier::new(
        reader.as_ref(),
        client.as_ref(),
        &store,
        config.verify.album_batch_size,
    )
    .with_cancel(cancel.clone());
    let reporter = CliReporter::new("Albums");
    match verifier.run(&mut metadata, &reporter)? {
        PassOutcome::Completed(report) => {
            print_album_verification_summary(&report);
            write_reports(&report, &config.verify.report_dir, "album_verify")?;
        }
        PassOutcome::Interrupted {
            partial,
            completed_batches,
            total_batches,
        } => {
            print_album_verification_summary(&partial);
            interrupted_notice(completed_batches, total_batches);
        }
    }
    Ok(())
}

fn run_status(config: &AppConfig, verbose: bool) -> Result<()> {
    let store = open_store(config)?;
    let stats = store.statistics()?;

    info!(
        "{} files recorded: {} success, {} failed, {} unsupported ({:.1}% success)",
        stats.total,
        format!("{}", stats.success).green(),
        format!("{}", stats.failed).red(),
        format!("{}", stats.unsupported).yellow(),
        stats.success_rate(),
    );
    info!("{} albums recorded", store.list_albums()?.len());

    if verbose {
        for record in store.list_by_status(FileStatus::Failed)? {
            println!(
                "  {} {} ({})",
                "failed".red(),
                record.source_path,
                record.error_message.as_deref().unwrap_or("no error recorded")
            );
        }
        for record in store.list_by_status(FileStatus::Unsupported)? {
            println!("  {} {}", "unsupported".yellow(), record.source_path);
        }
    }
    Ok(())
}

fn run_report(config: &AppConfig, output: &Path) -> Result<()> {
    let store = open_store(config)?;
    photomig_core::report::write_migration_report(&store, output)?;
    info!("Migration report written to {}", output.display());
    Ok(())
}

// ── Output ──

fn print_migration_summary(summary: &MigrationSummary) {
    println!();
    if summary.dry_run {
        info!(
            "{} {} files in {} groups ({} paired), {} already migrated",
            "Dry run:".cyan(),
            summary.total_files,
            summary.total_groups,
            summary.paired_groups,
            summary.skipped,
        );
        return;
    }
    info!(
        "{} groups attempted, {} skipped in {}",
        summary.attempted_groups,
        summary.skipped,
        format!("{:.2}s", summary.duration_secs).green(),
    );
    info!(
        "{} success ({} duplicates), {} failed, {} unsupported",
        format!("{}", summary.success).green(),
        summary.duplicates,
        format!("{}", summary.failed).red(),
        format!("{}", summary.unsupported).yellow(),
    );
}

fn print_album_summary(summary: &AlbumSummary) {
    let prefix = if summary.dry_run { "Dry run: " } else { "" };
    info!(
        "{}{} albums: {} created, {} reused, {} skipped, {} failed",
        prefix,
        summary.total,
        format!("{}", summary.created).green(),
        summary.reused,
        summary.skipped,
        format!("{}", summary.failed).red(),
    );
    info!(
        "{} assets attached, {} members uploaded, {} members missing",
        summary.assets_attached,
        summary.members_uploaded,
        format!("{}", summary.members_missing).yellow(),
    );
}

fn print_backfill_summary(summary: &BackfillSummary) {
    info!(
        "{} unrecorded files: {} already at destination, {} to upload, {} unreadable",
        summary.unrecorded,
        format!("{}", summary.linked.len()).green(),
        format!("{}", summary.to_upload.len()).yellow(),
        format!("{}", summary.read_failures).red(),
    );
    if summary.dry_run {
        for (path, asset_id) in &summary.linked {
            println!("  {} {} -> {}", "link".green(), path, asset_id);
        }
        for path in &summary.to_upload {
            println!("  {} {}", "upload".yellow(), path);
        }
    } else if summary.upload.attempted_groups > 0 {
        print_migration_summary(&summary.upload);
    }
}

fn print_verification_summary(report: &VerificationReport) {
    println!();
    info!(
        "{} origin files, {} catalogue entries, {} destination assets",
        report.origin_files, report.metadata_files, report.destination_assets
    );
    let counts = &report.counts;
    info!(
        "{} matched, {} hash-mismatch, {} origin-only, {} metadata-only, {} destination-only",
        format!("{}", counts.matched).green(),
        format!("{}", counts.hash_mismatch).red(),
        format!("{}", counts.origin_only).yellow(),
        format!("{}", counts.metadata_only).yellow(),
        format!("{}", counts.destination_only).cyan(),
    );
}

fn print_album_verification_summary(report: &AlbumVerificationReport) {
    println!();
    let consistent = report.albums.iter().filter(|a| a.is_consistent()).count();
    info!(
        "{} origin albums, {} destination albums, {} matched, {} consistent",
        report.total_origin_albums,
        report.total_destination_albums,
        format!("{}", report.matched_albums).green(),
        consistent,
    );
    if !report.origin_only.is_empty() || !report.destination_only.is_empty() {
        info!(
            "{} origin-only, {} destination-only",
            format!("{}", report.origin_only.len()).yellow(),
            format!("{}", report.destination_only.len()).cyan(),
        );
    }
}
