use super::{MetadataSource, OriginAlbum, OriginFileMeta};
use crate::config::MetadataConfig;
use crate::error::Result;
use chrono::DateTime;
use postgres::{Client, Config, NoTls};
use tracing::debug;

const ALBUMS_QUERY: &str = "SELECT id::int8, name, item_count::int8 \
                            FROM normal_album \
                            WHERE type = 0 \
                            ORDER BY name";

const ALBUM_MEMBERS_QUERY: &str = "SELECT CONCAT(f.name, '/', u.filename) AS full_path \
                                   FROM many_item_has_many_normal_album ma \
                                   JOIN unit u ON ma.id_item = u.id_item \
                                   JOIN folder f ON u.id_folder = f.id \
                                   WHERE ma.id_normal_album = $1::int8 \
                                   ORDER BY full_path";

const INDEXED_FILES_QUERY: &str = "SELECT CONCAT(f.name, '/', u.filename) AS full_path, \
                                          u.takentime::int8 \
                                   FROM unit u \
                                   JOIN folder f ON u.id_folder = f.id \
                                   ORDER BY full_path";

/// Synology Photos catalogue (`synofoto` PostgreSQL database), read only.
pub struct SynologyMetadata {
    client: Client,
}

impl SynologyMetadata {
    pub fn connect(config: &MetadataConfig) -> Result<Self> {
        let client = Config::new()
            .host(&config.host)
            .port(config.port)
            .user(&config.user)
            .password(&config.password)
            .dbname(&config.database)
            .connect(NoTls)?;
        debug!(
            "Connected to metadata database {}@{}:{}/{}",
            config.user, config.host, config.port, config.database
        );
        Ok(Self { client })
    }
}

/// Render an epoch capture time as a naive timestamp, without inventing an
/// offset.
fn format_taken_time(secs: i64) -> Option<String> {
    DateTime::from_timestamp(secs, 0).map(|t| t.naive_utc().format("%Y-%m-%dT%H:%M:%S").to_string())
}

impl MetadataSource for SynologyMetadata {
    fn list_albums(&mut self) -> Result<Vec<OriginAlbum>> {
        let rows = self.client.query(ALBUMS_QUERY, &[])?;
        let mut albums = Vec::with_capacity(rows.len());
        for row in rows {
            albums.push(OriginAlbum {
                id: row.try_get(0)?,
                name: row.try_get(1)?,
                item_count: row.try_get::<_, Option<i64>>(2)?.unwrap_or(0),
            });
        }
        debug!("Fetched {} origin albums", albums.len());
        Ok(albums)
    }

    fn album_members(&mut self, album_id: i64) -> Result<Vec<String>> {
        let rows = self.client.query(ALBUM_MEMBERS_QUERY, &[&album_id])?;
        rows.iter()
            .map(|row| row.try_get::<_, String>(0).map_err(Into::into))
            .collect()
    }

    fn list_indexed_files(&mut self) -> Result<Vec<OriginFileMeta>> {
        let rows = self.client.query(INDEXED_FILES_QUERY, &[])?;
        let mut files = Vec::with_capacity(rows.len());
        for row in rows {
            let taken: Option<i64> = row.try_get(1)?;
            files.push(OriginFileMeta {
                path: row.try_get(0)?,
                capture_time: taken.filter(|secs| *secs > 0).and_then(format_taken_time),
            });
        }
        debug!("Fetched {} indexed origin files", files.len());
        Ok(files)
    }
}
