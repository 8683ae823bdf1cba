use super::{AssetUpload, DestinationClient, RemoteAlbum, RemoteAsset, UploadOutcome};
use crate::config::DestinationConfig;
use crate::error::{Error, Result};
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const SEARCH_PAGE_SIZE: usize = 1000;

#[derive(Debug, Deserialize)]
struct UploadResponse {
    id: Option<String>,
    status: Option<String>,
    #[serde(default)]
    duplicate: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetResponse {
    id: String,
    #[serde(default)]
    original_file_name: String,
    checksum: Option<String>,
}

impl From<AssetResponse> for RemoteAsset {
    fn from(asset: AssetResponse) -> Self {
        RemoteAsset {
            id: asset.id,
            original_file_name: asset.original_file_name,
            checksum: asset.checksum,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlbumResponse {
    id: String,
    album_name: String,
    #[serde(default)]
    asset_count: u64,
    #[serde(default)]
    assets: Vec<AssetResponse>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    assets: SearchPage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchPage {
    #[serde(default)]
    items: Vec<AssetResponse>,
    next_page: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedResponse {
    id: String,
}

/// Blocking client for an Immich server, authenticated with `x-api-key`.
pub struct ImmichClient {
    client: Client,
    base_url: String,
    api_key: String,
    device_id: String,
}

impl ImmichClient {
    pub fn new(config: &DestinationConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(Error::Connection("no API key configured".to_string()));
        }
        if config.url.trim().is_empty() {
            return Err(Error::Connection("no destination URL configured".to_string()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            device_id: config.device_id.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header("x-api-key", &self.api_key)
            .header("Accept", "application/json")
    }

    fn upload_form(&self, upload: &AssetUpload) -> reqwest::Result<Form> {
        let mut form = Form::new()
            .text(
                "deviceAssetId",
                format!("{}-{}", upload.filename, upload.data.len()),
            )
            .text("deviceId", self.device_id.clone())
            .text("fileCreatedAt", upload.created_at.clone())
            .text("fileModifiedAt", upload.created_at.clone())
            .part("assetData", file_part(&upload.data, &upload.filename)?);

        if let Some(paired) = &upload.paired {
            form = form.part("livePhotoData", file_part(&paired.data, &paired.filename)?);
        }
        Ok(form)
    }
}

fn file_part(data: &[u8], filename: &str) -> reqwest::Result<Part> {
    let mime = mime_guess::from_path(filename).first_or_octet_stream();
    Part::bytes(data.to_vec())
        .file_name(filename.to_string())
        .mime_str(mime.essence_str())
}

fn expect_success(response: Response, context: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(Error::Destination(format!(
        "{} failed: HTTP {}: {}",
        context,
        status.as_u16(),
        body.trim()
    )))
}

/// Classify an upload response. 4xx is a content problem; the body decides
/// whether it is an unsupported format.
pub(crate) fn classify_upload_response(status: u16, body: &str) -> UploadOutcome {
    if status == 200 || status == 201 {
        if let Ok(parsed) = serde_json::from_str::<UploadResponse>(body) {
            if let Some(asset_id) = parsed.id {
                let duplicate = parsed.duplicate || parsed.status.as_deref() == Some("duplicate");
                return UploadOutcome::Uploaded {
                    asset_id,
                    duplicate,
                };
            }
        }
        return UploadOutcome::Rejected {
            status,
            message: format!("HTTP {}: response carried no asset id: {}", status, body.trim()),
            unsupported: false,
        };
    }

    if (400..500).contains(&status) {
        return UploadOutcome::Rejected {
            status,
            message: body.trim().to_string(),
            unsupported: body.to_lowercase().contains("unsupported"),
        };
    }

    UploadOutcome::Rejected {
        status,
        message: format!("HTTP {}: {}", status, body.trim()),
        unsupported: false,
    }
}

impl DestinationClient for ImmichClient {
    fn check_connection(&self) -> Result<()> {
        let ping = self
            .request(Method::GET, "/api/server/ping")
            .send()
            .map_err(|e| Error::Connection(format!("cannot reach {}: {}", self.base_url, e)))?;
        if !ping.status().is_success() {
            return Err(Error::Connection(format!(
                "{} answered ping with HTTP {}",
                self.base_url,
                ping.status().as_u16()
            )));
        }

        let me = self
            .request(Method::GET, "/api/users/me")
            .send()
            .map_err(|e| Error::Connection(format!("cannot reach {}: {}", self.base_url, e)))?;
        match me.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(Error::Connection("API key was rejected".to_string()))
            }
            status if status.is_success() => {
                debug!("Connected to {}", self.base_url);
                Ok(())
            }
            status => Err(Error::Connection(format!(
                "{} answered with HTTP {}",
                self.base_url,
                status.as_u16()
            ))),
        }
    }

    fn upload_asset(&self, upload: &AssetUpload) -> UploadOutcome {
        let form = match self.upload_form(upload) {
            Ok(form) => form,
            Err(e) => {
                return UploadOutcome::Transport {
                    message: format!("could not build upload request: {}", e),
                }
            }
        };

        let response = match self.request(Method::POST, "/api/assets").multipart(form).send() {
            Ok(response) => response,
            Err(e) => {
                warn!(file = %upload.filename, "Upload transport error: {}", e);
                return UploadOutcome::Transport {
                    message: format!("network error: {}", e),
                };
            }
        };

        let status = response.status().as_u16();
        match response.text() {
            Ok(body) => classify_upload_response(status, &body),
            Err(e) => UploadOutcome::Transport {
                message: format!("failed reading response body: {}", e),
            },
        }
    }

    fn create_album(&self, name: &str) -> Result<String> {
        let response = self
            .request(Method::POST, "/api/albums")
            .json(&serde_json::json!({ "albumName": name }))
            .send()?;
        let created: CreatedResponse = expect_success(response, "create album")?.json()?;
        debug!(album = %name, id = %created.id, "Created destination album");
        Ok(created.id)
    }

    fn add_assets_to_album(&self, album_id: &str, asset_ids: &[String]) -> Result<()> {
        if asset_ids.is_empty() {
            return Ok(());
        }
        let response = self
            .request(Method::PUT, &format!("/api/albums/{}/assets", album_id))
            .json(&serde_json::json!({ "ids": asset_ids }))
            .send()?;
        expect_success(response, "add assets to album")?;
        Ok(())
    }

    fn list_all_assets(&self) -> Result<Vec<RemoteAsset>> {
        let mut assets = Vec::new();
        let mut page: u64 = 1;
        loop {
            let response = self
                .request(Method::POST, "/api/search/metadata")
                .json(&serde_json::json!({ "page": page, "size": SEARCH_PAGE_SIZE }))
                .send()?;
            let result: SearchResponse = expect_success(response, "list assets")?.json()?;
            let count = result.assets.items.len();
            assets.extend(result.assets.items.into_iter().map(RemoteAsset::from));

            let next = result
                .assets
                .next_page
                .as_deref()
                .and_then(|p| p.parse::<u64>().ok());
            match next {
                Some(next) if count > 0 => page = next,
                None if count == SEARCH_PAGE_SIZE => page += 1,
                _ => break,
            }
        }
        debug!("Fetched {} destination assets", assets.len());
        Ok(assets)
    }

    fn get_asset(&self, asset_id: &str) -> Result<Option<RemoteAsset>> {
        let response = self
            .request(Method::GET, &format!("/api/assets/{}", asset_id))
            .send()?;
        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => Ok(None),
            _ => {
                let asset: AssetResponse = expect_success(response, "get asset")?.json()?;
                Ok(Some(asset.into()))
            }
        }
    }

    fn list_albums(&self) -> Result<Vec<RemoteAlbum>> {
        let response = self.request(Method::GET, "/api/albums").send()?;
        let albums: Vec<AlbumResponse> = expect_success(response, "list albums")?.json()?;
        Ok(albums
            .into_iter()
            .map(|a| RemoteAlbum {
                id: a.id,
                album_name: a.album_name,
                asset_count: a.asset_count,
            })
            .collect())
    }

    fn list_album_assets(&self, album_id: &str) -> Result<Vec<RemoteAsset>> {
        let response = self
            .request(Method::GET, &format!("/api/albums/{}", album_id))
            .send()?;
        let album: AlbumResponse = expect_success(response, "get album")?.json()?;
        Ok(album.assets.into_iter().map(RemoteAsset::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str, key: &str) -> DestinationConfig {
        DestinationConfig {
            url: url.to_string(),
            api_key: key.to_string(),
            ..DestinationConfig::default()
        }
    }

    #[test]
    fn test_missing_api_key_is_connection_error() {
        let result = ImmichClient::new(&config("http://localhost:2283", "  "));
        assert!(matches!(result, Err(Error::Connection(_))));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = ImmichClient::new(&config("http://localhost:2283/", "k")).unwrap();
        assert_eq!(client.base_url(), "http://localhost:2283");
    }

    #[test]
    fn test_created_response() {
        let outcome = classify_upload_response(201, r#"{"id":"a1","status":"created"}"#);
        assert_eq!(
            outcome,
            UploadOutcome::Uploaded {
                asset_id: "a1".to_string(),
                duplicate: false
            }
        );
    }

    #[test]
    fn test_duplicate_response_is_success() {
        let outcome = classify_upload_response(200, r#"{"id":"a2","status":"duplicate"}"#);
        assert_eq!(
            outcome,
            UploadOutcome::Uploaded {
                asset_id: "a2".to_string(),
                duplicate: true
            }
        );
    }

    #[test]
    fn test_unsupported_rejection() {
        let outcome = classify_upload_response(400, r#"{"message":"Unsupported file type"}"#);
        assert!(matches!(
            outcome,
            UploadOutcome::Rejected {
                status: 400,
                unsupported: true,
                ..
            }
        ));
    }

    #[test]
    fn test_other_client_error_is_not_unsupported() {
        let outcome = classify_upload_response(413, "Payload Too Large");
        assert!(matches!(
            outcome,
            UploadOutcome::Rejected {
                status: 413,
                unsupported: false,
                ..
            }
        ));
    }

    #[test]
    fn test_server_error_keeps_status_in_message() {
        match classify_upload_response(502, "bad gateway") {
            UploadOutcome::Rejected { message, .. } => assert!(message.starts_with("HTTP 502")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_success_without_id_is_rejected() {
        assert!(matches!(
            classify_upload_response(201, "{}"),
            UploadOutcome::Rejected { .. }
        ));
    }
}
