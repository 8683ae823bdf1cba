pub mod cancel;
pub mod config;
pub mod destination;
pub mod error;
pub mod fingerprint;
pub mod grouper;
pub mod journal;
pub mod metadata;
pub mod migrate;
pub mod progress;
pub mod reader;
pub mod report;
pub mod storage;
pub mod verify;

pub use cancel::{CancelToken, PassOutcome};
pub use config::AppConfig;
pub use error::{Error, Result};
pub use grouper::{AssetGroup, Grouper};
pub use journal::PassJournal;
pub use migrate::{MigrationOptions, MigrationSummary, Migrator};
pub use progress::{ProgressReporter, SilentReporter};
pub use storage::ProgressStore;
pub use verify::{AlbumVerifier, Verifier};
