use rusqlite::{Connection, Result};
use std::path::Path;
use tracing::debug;

const SCHEMA_VERSION: i64 = 2;

/// Durable migration state in a single SQLite file.
///
/// One writer per file. Every write commits before the call returns.
pub struct ProgressStore {
    conn: Connection,
}

impl ProgressStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = ProgressStore { conn };
        store.configure_pragmas()?;
        store.migrate_schema()?;
        debug!("Progress store opened at {}", path.display());
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = ProgressStore { conn };
        store.configure_pragmas()?;
        store.migrate_schema()?;
        Ok(store)
    }

    fn configure_pragmas(&self) -> Result<()> {
        // journal_mode returns a row, so it can't go through execute_batch
        let _mode: String = self
            .conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        self.conn.execute_batch(
            "PRAGMA synchronous = FULL;
             PRAGMA busy_timeout = 5000;",
        )?;
        debug!("SQLite pragmas configured (WAL mode, synchronous=FULL)");
        Ok(())
    }

    fn migrate_schema(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;

        if version == 1 {
            // Version 1 checkpoints carry no key digest; the empty default
            // never matches, so they are discarded on the next resume. Version 1
            // only recorded albums once their members were attached.
            debug!("Schema version 1 < {}, upgrading in place", SCHEMA_VERSION);
            self.conn.execute_batch(
                "ALTER TABLE verify_checkpoint ADD COLUMN key_digest TEXT NOT NULL DEFAULT '';
                 ALTER TABLE migrated_album ADD COLUMN members_attached INTEGER NOT NULL DEFAULT 1;",
            )?;
        }

        self.conn.execute_batch(include_str!("schema.sql"))?;
        debug!("SQLite schema initialized (version {})", SCHEMA_VERSION);
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}
