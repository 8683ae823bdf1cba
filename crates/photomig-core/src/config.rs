use crate::error::{Error, Result};
use config::{Config, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const REDACTED: &str = "********";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub destination: DestinationConfig,
    #[serde(default)]
    pub migration: MigrationConfig,
    #[serde(default)]
    pub metadata: Option<MetadataConfig>,
    #[serde(default)]
    pub verify: VerifyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub path: String,
    pub smb_user: Option<String>,
    pub smb_password: Option<String>,
    pub smb_workgroup: Option<String>,
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,
    #[serde(default = "default_still_extensions")]
    pub paired_still_extensions: Vec<String>,
    #[serde(default = "default_motion_extensions")]
    pub paired_motion_extensions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DestinationConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_device_id")]
    pub device_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MigrationConfig {
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_delay_secs")]
    pub batch_delay_secs: f64,
    #[serde(default = "default_progress_db")]
    pub progress_db: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetadataConfig {
    pub host: String,
    #[serde(default = "default_metadata_port")]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_metadata_database")]
    pub database: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VerifyConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Albums per checkpoint in album verification.
    #[serde(default = "default_album_batch_size")]
    pub album_batch_size: usize,
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_exclude_patterns() -> Vec<String> {
    ["@eaDir", ".thumbnail", "#recycle", ".DS_Store", "Thumbs.db"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_still_extensions() -> Vec<String> {
    ["heic", "heif", "jpg", "jpeg"].iter().map(|s| s.to_string()).collect()
}

fn default_motion_extensions() -> Vec<String> {
    ["mov", "mp4"].iter().map(|s| s.to_string()).collect()
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_device_id() -> String {
    "photomig".to_string()
}

fn default_batch_size() -> usize {
    100
}

fn default_album_batch_size() -> usize {
    5
}

fn default_batch_delay_secs() -> f64 {
    1.0
}

fn default_progress_db() -> PathBuf {
    PathBuf::from("migration_progress.db")
}

fn default_metadata_port() -> u16 {
    5432
}

fn default_metadata_database() -> String {
    "synofoto".to_string()
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("reports")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            smb_user: None,
            smb_password: None,
            smb_workgroup: None,
            exclude_patterns: default_exclude_patterns(),
            paired_still_extensions: default_still_extensions(),
            paired_motion_extensions: default_motion_extensions(),
        }
    }
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
            device_id: default_device_id(),
        }
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            batch_size: default_batch_size(),
            batch_delay_secs: default_batch_delay_secs(),
            progress_db: default_progress_db(),
        }
    }
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            album_batch_size: default_album_batch_size(),
            report_dir: default_report_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            level: default_log_level(),
        }
    }
}

/// Load configuration from a TOML file layered with `PHOTOMIG_*` environment
/// variables (nested keys separated by `__`, e.g. `PHOTOMIG_DESTINATION__API_KEY`).
pub fn load_configuration(path: &Path, required: bool) -> Result<AppConfig> {
    let path_str = path
        .to_str()
        .ok_or_else(|| Error::Config(format!("non UTF-8 config path: {}", path.display())))?;

    let builder = Config::builder()
        .add_source(ConfigFile::with_name(path_str).required(required))
        .add_source(
            Environment::with_prefix("PHOTOMIG")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let config = builder.try_deserialize::<AppConfig>()?;
    config.validate_batching()?;
    Ok(config)
}

impl AppConfig {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_secs_f64(self.migration.batch_delay_secs.max(0.0))
    }

    fn validate_batching(&self) -> Result<()> {
        if self.migration.batch_size == 0 {
            return Err(Error::Config("migration.batch_size must be at least 1".into()));
        }
        if self.verify.batch_size == 0 || self.verify.album_batch_size == 0 {
            return Err(Error::Config(
                "verify.batch_size and verify.album_batch_size must be at least 1".into(),
            ));
        }
        if !self.migration.batch_delay_secs.is_finite() || self.migration.batch_delay_secs < 0.0 {
            return Err(Error::Config(
                "migration.batch_delay_secs must be a non-negative number".into(),
            ));
        }
        Ok(())
    }

    pub fn validate_source(&self) -> Result<()> {
        if self.source.path.trim().is_empty() {
            return Err(Error::Config("source.path is not set".into()));
        }
        Ok(())
    }

    pub fn validate_destination(&self) -> Result<()> {
        if self.destination.url.trim().is_empty() {
            return Err(Error::Config("destination.url is not set".into()));
        }
        Ok(())
    }

    pub fn metadata(&self) -> Result<&MetadataConfig> {
        self.metadata.as_ref().ok_or_else(|| {
            Error::Config("[metadata] section is required for this command".into())
        })
    }

    /// Copy with credentials masked, for printing.
    pub fn redacted(&self) -> AppConfig {
        let mut copy = self.clone();
        if copy.source.smb_password.is_some() {
            copy.source.smb_password = Some(REDACTED.to_string());
        }
        if !copy.destination.api_key.is_empty() {
            copy.destination.api_key = REDACTED.to_string();
        }
        if let Some(metadata) = copy.metadata.as_mut() {
            if !metadata.password.is_empty() {
                metadata.password = REDACTED.to_string();
            }
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_minimal_file_applies_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("photomig.toml");
        fs::write(
            &path,
            "[source]\npath = \"/mnt/photo\"\n\n[destination]\nurl = \"http://nas:2283\"\napi_key = \"k\"\n",
        )
        .unwrap();

        let config = load_configuration(&path, true).unwrap();
        assert_eq!(config.source.path, "/mnt/photo");
        assert_eq!(config.migration.batch_size, 100);
        assert_eq!(config.migration.batch_delay_secs, 1.0);
        assert!(!config.migration.dry_run);
        assert!(config.metadata.is_none());
        assert!(config
            .source
            .exclude_patterns
            .contains(&"@eaDir".to_string()));
        assert_eq!(config.destination.timeout_secs, 600);
    }

    #[test]
    fn test_metadata_section_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("photomig.toml");
        fs::write(
            &path,
            "[metadata]\nhost = \"192.168.1.10\"\nuser = \"postgres\"\n\n[migration]\nbatch_size = 25\nbatch_delay_secs = 0.5\n",
        )
        .unwrap();

        let config = load_configuration(&path, true).unwrap();
        let metadata = config.metadata().unwrap();
        assert_eq!(metadata.port, 5432);
        assert_eq!(metadata.database, "synofoto");
        assert_eq!(config.migration.batch_size, 25);
        assert_eq!(config.batch_delay(), Duration::from_millis(500));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("photomig.toml");
        fs::write(&path, "[migration]\nbatch_size = 0\n").unwrap();
        assert!(matches!(
            load_configuration(&path, true),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_redacted_masks_secrets() {
        let mut config = AppConfig::default();
        config.destination.api_key = "secret".into();
        config.source.smb_password = Some("pw".into());
        let shown = config.redacted();
        assert_eq!(shown.destination.api_key, REDACTED);
        assert_eq!(shown.source.smb_password.as_deref(), Some(REDACTED));
    }
}
