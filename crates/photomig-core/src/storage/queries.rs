use super::models::*;
use super::sqlite::ProgressStore;
use rusqlite::{params, OptionalExtension, Result, Row};
use tracing::debug;

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn file_from_row(row: &Row<'_>) -> Result<FileRecord> {
    Ok(FileRecord {
        source_path: row.get(0)?,
        fingerprint: row.get(1)?,
        file_size: row.get(2)?,
        source_mtime: row.get(3)?,
        asset_id: row.get(4)?,
        status: row.get(5)?,
        error_message: row.get(6)?,
        paired_with: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn album_from_row(row: &Row<'_>) -> Result<AlbumRecord> {
    Ok(AlbumRecord {
        origin_album_id: row.get(0)?,
        album_name: row.get(1)?,
        dest_album_id: row.get(2)?,
        members_attached: row.get(3)?,
        created_at: row.get(4)?,
    })
}

const FILE_COLUMNS: &str = "source_path, fingerprint, file_size, source_mtime, asset_id, \
                            status, error_message, paired_with, updated_at";

impl ProgressStore {
    // ── Files ────────────────────────────────────────────────────

    /// Insert or overwrite the record for `record.source_path`.
    pub fn upsert_file(&self, record: &FileRecord) -> Result<()> {
        let tx = self.connection().unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO migrated_file \
                 (source_path, fingerprint, file_size, source_mtime, asset_id, \
                  status, error_message, paired_with, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
                 ON CONFLICT(source_path) DO UPDATE SET \
                     fingerprint = COALESCE(excluded.fingerprint, migrated_file.fingerprint), \
                     file_size = excluded.file_size, \
                     source_mtime = excluded.source_mtime, \
                     asset_id = excluded.asset_id, \
                     status = excluded.status, \
                     error_message = excluded.error_message, \
                     paired_with = excluded.paired_with, \
                     updated_at = excluded.updated_at",
            )?;
            stmt.execute(params![
                record.source_path,
                record.fingerprint,
                record.file_size,
                record.source_mtime,
                record.asset_id,
                record.status,
                record.error_message,
                record.paired_with,
                now(),
            ])?;
        }
        tx.commit()?;
        debug!(path = %record.source_path, status = %record.status, "Recorded file outcome");
        Ok(())
    }

    pub fn get_file(&self, source_path: &str) -> Result<Option<FileRecord>> {
        self.connection()
            .query_row(
                &format!("SELECT {} FROM migrated_file WHERE source_path = ?1", FILE_COLUMNS),
                params![source_path],
                file_from_row,
            )
            .optional()
    }

    pub fn is_successfully_migrated(&self, source_path: &str) -> Result<bool> {
        let found: Option<i64> = self
            .connection()
            .query_row(
                "SELECT 1 FROM migrated_file WHERE source_path = ?1 AND status = 'success'",
                params![source_path],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Records with the given status, ordered by path.
    pub fn list_by_status(&self, status: FileStatus) -> Result<Vec<FileRecord>> {
        let mut stmt = self.connection().prepare_cached(&format!(
            "SELECT {} FROM migrated_file WHERE status = ?1 ORDER BY source_path",
            FILE_COLUMNS
        ))?;
        let records = stmt
            .query_map(params![status], file_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn list_files(&self) -> Result<Vec<FileRecord>> {
        let mut stmt = self.connection().prepare_cached(&format!(
            "SELECT {} FROM migrated_file ORDER BY source_path",
            FILE_COLUMNS
        ))?;
        let records = stmt
            .query_map([], file_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn statistics(&self) -> Result<MigrationStats> {
        let mut stats = MigrationStats::default();
        let mut stmt = self
            .connection()
            .prepare_cached("SELECT status, COUNT(*) FROM migrated_file GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, FileStatus>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (status, count) = row?;
            match status {
                FileStatus::Success => stats.success = count,
                FileStatus::Failed => stats.failed = count,
                FileStatus::Unsupported => stats.unsupported = count,
            }
            stats.total += count;
        }
        Ok(stats)
    }

    // ── Albums ───────────────────────────────────────────────────

    pub fn upsert_album(&self, record: &AlbumRecord) -> Result<()> {
        let created_at = if record.created_at.is_empty() {
            now()
        } else {
            record.created_at.clone()
        };
        self.connection().execute(
            "INSERT INTO migrated_album \
             (origin_album_id, album_name, dest_album_id, members_attached, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(origin_album_id) DO UPDATE SET \
                 album_name = excluded.album_name, \
                 dest_album_id = excluded.dest_album_id, \
                 members_attached = excluded.members_attached",
            params![
                record.origin_album_id,
                record.album_name,
                record.dest_album_id,
                record.members_attached,
                created_at
            ],
        )?;
        debug!(album = %record.album_name, "Recorded album link");
        Ok(())
    }

    pub fn get_album(&self, origin_album_id: i64) -> Result<Option<AlbumRecord>> {
        self.connection()
            .query_row(
                "SELECT origin_album_id, album_name, dest_album_id, members_attached, created_at \
                 FROM migrated_album WHERE origin_album_id = ?1",
                params![origin_album_id],
                album_from_row,
            )
            .optional()
    }

    pub fn list_albums(&self) -> Result<Vec<AlbumRecord>> {
        let mut stmt = self.connection().prepare_cached(
            "SELECT origin_album_id, album_name, dest_album_id, members_attached, created_at \
             FROM migrated_album ORDER BY album_name, origin_album_id",
        )?;
        let albums = stmt
            .query_map([], album_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(albums)
    }

    // ── Verification checkpoints ─────────────────────────────────

    pub fn load_checkpoint(&self, pass_id: &str) -> Result<Option<Checkpoint>> {
        self.connection()
            .query_row(
                "SELECT pass_id, last_batch, total_batches, batch_size, key_digest \
                 FROM verify_checkpoint WHERE pass_id = ?1",
                params![pass_id],
                |row| {
                    Ok(Checkpoint {
                        pass_id: row.get(0)?,
                        last_batch: row.get::<_, i64>(1)? as usize,
                        total_batches: row.get::<_, i64>(2)? as usize,
                        batch_size: row.get::<_, i64>(3)? as usize,
                        key_digest: row.get(4)?,
                    })
                },
            )
            .optional()
    }

    /// Persist one batch's serialized results and advance the checkpoint to
    /// it, in a single transaction.
    pub fn save_checkpoint_batch(&self, checkpoint: &Checkpoint, payloads: &[String]) -> Result<()> {
        let tx = self.connection().unchecked_transaction()?;
        {
            let mut delete = tx.prepare_cached(
                "DELETE FROM verify_checkpoint_result WHERE pass_id = ?1 AND batch_index = ?2",
            )?;
            delete.execute(params![checkpoint.pass_id, checkpoint.last_batch as i64])?;

            let mut insert = tx.prepare_cached(
                "INSERT INTO verify_checkpoint_result (pass_id, batch_index, seq, payload) \
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (seq, payload) in payloads.iter().enumerate() {
                insert.execute(params![
                    checkpoint.pass_id,
                    checkpoint.last_batch as i64,
                    seq as i64,
                    payload
                ])?;
            }

            tx.execute(
                "INSERT INTO verify_checkpoint \
                 (pass_id, last_batch, total_batches, batch_size, key_digest, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                 ON CONFLICT(pass_id) DO UPDATE SET \
                     last_batch = excluded.last_batch, \
                     total_batches = excluded.total_batches, \
                     batch_size = excluded.batch_size, \
                     key_digest = excluded.key_digest, \
                     updated_at = excluded.updated_at",
                params![
                    checkpoint.pass_id,
                    checkpoint.last_batch as i64,
                    checkpoint.total_batches as i64,
                    checkpoint.batch_size as i64,
                    checkpoint.key_digest,
                    now()
                ],
            )?;
        }
        tx.commit()?;
        debug!(
            pass = %checkpoint.pass_id,
            batch = checkpoint.last_batch,
            total = checkpoint.total_batches,
            "Checkpoint saved"
        );
        Ok(())
    }

    /// Serialized results of all persisted batches, in processing order.
    pub fn load_checkpoint_results(&self, pass_id: &str) -> Result<Vec<String>> {
        let mut stmt = self.connection().prepare_cached(
            "SELECT payload FROM verify_checkpoint_result \
             WHERE pass_id = ?1 ORDER BY batch_index, seq",
        )?;
        let payloads = stmt
            .query_map(params![pass_id], |row| row.get(0))?
            .collect::<Result<Vec<String>>>()?;
        Ok(payloads)
    }

    pub fn clear_checkpoint(&self, pass_id: &str) -> Result<()> {
        let tx = self.connection().unchecked_transaction()?;
        tx.execute(
            "DELETE FROM verify_checkpoint_result WHERE pass_id = ?1",
            params![pass_id],
        )?;
        tx.execute("DELETE FROM verify_checkpoint WHERE pass_id = ?1", params![pass_id])?;
        tx.commit()?;
        Ok(())
    }
}
