use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub const DEFAULT_CONFIG: &str = "photomig.toml";

#[derive(Debug, Parser)]
#[command(name = "photomig")]
#[command(about = "Migrate a Synology Photos library to Immich and verify the result", long_about = None)]
pub struct Cli {
    /// Configuration file (default: photomig.toml, optional when absent)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override migration.batch_size
    #[arg(long, global = true)]
    pub batch_size: Option<usize>,

    /// Override migration.batch_delay_secs
    #[arg(long, global = true)]
    pub batch_delay: Option<f64>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Upload every source file not yet migrated, then recreate albums
    Migrate {
        /// Report what would be uploaded without contacting the destination
        #[arg(long)]
        dry_run: bool,
    },
    /// Compare origin storage, the metadata catalogue and the destination
    Verify,
    /// Compare origin albums with destination albums
    VerifyAlbums,
    /// Link or upload source files that have no recorded outcome
    Backfill {
        #[arg(long)]
        dry_run: bool,
    },
    /// Retry files whose last attempt failed
    Retry {
        #[arg(long)]
        dry_run: bool,
    },
    /// Show migration statistics from the progress store
    Status {
        /// Also list failed files with their errors
        #[arg(short, long)]
        verbose: bool,
    },
    /// Recreate origin albums at the destination
    Albums {
        #[arg(long)]
        dry_run: bool,
    },
    /// Write a Markdown migration report
    Report {
        #[arg(short, long, default_value = "migration_report.md")]
        output: PathBuf,
    },
    /// Print configuration values with credentials masked
    PrintConfig,
}
