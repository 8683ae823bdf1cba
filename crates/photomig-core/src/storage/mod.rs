pub mod models;
pub mod queries;
pub mod sqlite;

pub use models::{AlbumRecord, Checkpoint, FileRecord, FileStatus, MigrationStats};
pub use sqlite::ProgressStore;
