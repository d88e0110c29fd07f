/// photos.rs — Google Photos Library uploader.
/// Two calls per image: raw bytes → upload token, then upload token → media
/// item in the shared album.
use reqwest::{header, Client};
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    error::{BridgeError, BridgeResult},
    sniff::{sniff_prefix, BoxReader},
};

// ─── batchCreate request shapes ────────────────────────────────────────────────

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BatchCreateRequest<'a> {
    pub album_id:        &'a str,
    pub new_media_items: Vec<NewMediaItem<'a>>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct NewMediaItem<'a> {
    pub description:       String,
    pub simple_media_item: SimpleMediaItem<'a>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SimpleMediaItem<'a> {
    pub upload_token: &'a str,
}

pub fn describe(display_name: &str) -> String {
    format!("{display_name} uploaded")
}

// ─── Uploader ──────────────────────────────────────────────────────────────────

/// Bound to one access token and one album for the lifetime of an upload.
pub struct PhotosUploader<'a> {
    http:     &'a Client,
    api_base: &'a str,
    album_id: &'a str,
    token:    String,
}

impl<'a> PhotosUploader<'a> {
    pub fn new(http: &'a Client, api_base: &'a str, album_id: &'a str, token: String) -> Self {
        Self { http, api_base, album_id, token }
    }

    /// Raw upload followed by media-item creation; stops at the first failure.
    pub async fn upload(&self, display_name: &str, content: BoxReader) -> BridgeResult<()> {
        let upload_token = self.upload_content(content).await?;
        if let Err(e) = self.create_media_item(&upload_token, display_name).await {
            // The raw bytes stay on the remote side with no media item pointing at them.
            warn!("media item creation failed after raw upload; upload token ({} chars) orphaned", upload_token.len());
            return Err(e);
        }
        Ok(())
    }

    /// POST the raw bytes. The response body is the opaque upload token.
    pub async fn upload_content(&self, content: BoxReader) -> BridgeResult<String> {
        let sniffed = sniff_prefix(content)
            .await
            .map_err(|e| BridgeError::upload(format!("Failed to read bytes: {e}")))?;
        let mime_type = sniffed.mime_type;
        debug!("sniffed content type {mime_type}");

        let resp = self.http
            .post(format!("{}/v1/uploads", self.api_base))
            .bearer_auth(&self.token)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .header("X-Goog-Upload-Content-Type", mime_type)
            .header("X-Goog-Upload-Protocol", "raw")
            .body(sniffed.into_body())
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(BridgeError::upload(body));
        }
        Ok(body)
    }

    /// Attach `upload_token` to the album as exactly one new media item.
    pub async fn create_media_item(&self, upload_token: &str, display_name: &str) -> BridgeResult<()> {
        let payload = BatchCreateRequest {
            album_id:        self.album_id,
            new_media_items: vec![NewMediaItem {
                description:       describe(display_name),
                simple_media_item: SimpleMediaItem { upload_token },
            }],
        };

        let resp = self.http
            .post(format!("{}/v1/mediaItems:batchCreate", self.api_base))
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await?;
            return Err(BridgeError::media_item(body));
        }
        Ok(())
    }
}
