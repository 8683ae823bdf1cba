pub mod immich;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

pub use immich::ImmichClient;

/// One upload request: the primary payload plus an optional paired motion
/// payload sent in the same request.
#[derive(Debug, Clone)]
pub struct AssetUpload {
    pub data: Vec<u8>,
    pub filename: String,
    /// Naive timestamp, passed through unchanged.
    pub created_at: String,
    pub paired: Option<PairedPayload>,
}

#[derive(Debug, Clone)]
pub struct PairedPayload {
    pub data: Vec<u8>,
    pub filename: String,
}

/// Result of a single upload attempt. Never retried by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded {
        asset_id: String,
        /// The destination already held identical content.
        duplicate: bool,
    },
    /// The destination answered and refused the content.
    Rejected {
        status: u16,
        message: String,
        unsupported: bool,
    },
    /// No usable answer: connection failure or timeout.
    Transport { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAsset {
    pub id: String,
    pub original_file_name: String,
    /// Base64 SHA-1 of the stored original.
    pub checksum: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAlbum {
    pub id: String,
    pub album_name: String,
    pub asset_count: u64,
}

/// Operations against the destination asset service.
///
/// Each call is a single attempt; retry policy belongs to the caller.
pub trait DestinationClient {
    /// Fail fast when credentials are missing or the service is unreachable.
    fn check_connection(&self) -> Result<()> {
        Ok(())
    }

    fn upload_asset(&self, upload: &AssetUpload) -> UploadOutcome;

    fn create_album(&self, name: &str) -> Result<String>;

    fn add_assets_to_album(&self, album_id: &str, asset_ids: &[String]) -> Result<()>;

    /// Every asset, with paging handled internally.
    fn list_all_assets(&self) -> Result<Vec<RemoteAsset>>;

    /// Direct lookup; `None` when the id is unknown.
    fn get_asset(&self, asset_id: &str) -> Result<Option<RemoteAsset>>;

    fn list_albums(&self) -> Result<Vec<RemoteAlbum>>;

    fn list_album_assets(&self, album_id: &str) -> Result<Vec<RemoteAsset>>;
}

/// Stand-in for dry runs: never touches the network and refuses every call,
/// so a dry-run path that reaches the destination fails loudly.
pub struct OfflineDestination;

impl OfflineDestination {
    fn refuse<T>(&self) -> Result<T> {
        Err(Error::Connection("destination is not contacted in a dry run".to_string()))
    }
}

impl DestinationClient for OfflineDestination {
    fn upload_asset(&self, upload: &AssetUpload) -> UploadOutcome {
        UploadOutcome::Transport {
            message: format!("dry run: {} not uploaded", upload.filename),
        }
    }

    fn create_album(&self, _name: &str) -> Result<String> {
        self.refuse()
    }

    fn add_assets_to_album(&self, _album_id: &str, _asset_ids: &[String]) -> Result<()> {
        self.refuse()
    }

    fn list_all_assets(&self) -> Result<Vec<RemoteAsset>> {
        self.refuse()
    }

    fn get_asset(&self, _asset_id: &str) -> Result<Option<RemoteAsset>> {
        self.refuse()
    }

    fn list_albums(&self) -> Result<Vec<RemoteAlbum>> {
        self.refuse()
    }

    fn list_album_assets(&self, _album_id: &str) -> Result<Vec<RemoteAsset>> {
        self.refuse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_destination_refuses_everything() {
        let offline = OfflineDestination;
        let upload = AssetUpload {
            data: b"x".to_vec(),
            filename: "a.jpg".to_string(),
            created_at: "2020-01-01T00:00:00".to_string(),
            paired: None,
        };
        assert!(matches!(
            offline.upload_asset(&upload),
            UploadOutcome::Transport { .. }
        ));
        assert!(offline.check_connection().is_ok());
        assert!(matches!(offline.list_all_assets(), Err(Error::Connection(_))));
        assert!(offline.create_album("Trips").is_err());
    }
}
