//! REST client for the publishing platform
//!
//! Thin wrapper over the v2 post endpoint and the v1.1 chunked-less media
//! upload. Callers pass a bearer token; token freshness is the
//! [`TokenStore`](crate::auth::TokenStore)'s job.

use std::path::Path;
use std::time::Duration;

use reqwest::multipart;
use reqwest::StatusCode;
use serde_json::json;
use tracing::{debug, instrument};

use crate::error::ApiError;
use crate::types::ImageMimeType;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const VERIFY_TIMEOUT: Duration = Duration::from_secs(15);

/// Service endpoints, overridable for tests.
#[derive(Debug, Clone)]
pub struct ApiEndpoints {
    pub authorize_url: String,
    pub token_url: String,
    pub media_upload_url: String,
    pub post_url: String,
    pub user_info_url: String,
}

impl Default for ApiEndpoints {
    fn default() -> Self {
        Self {
            authorize_url: "https://x.com/i/oauth2/authorize".to_string(),
            token_url: "https://api.x.com/2/oauth2/token".to_string(),
            media_upload_url: "https://upload.twitter.com/1.1/media/upload.json".to_string(),
            post_url: "https://api.twitter.com/2/tweets".to_string(),
            user_info_url: "https://api.twitter.com/2/users/me".to_string(),
        }
    }
}

impl ApiEndpoints {
    /// Point every endpoint at a single base URL. Test servers mount all
    /// routes on one host.
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            authorize_url: format!("{}/i/oauth2/authorize", base),
            token_url: format!("{}/2/oauth2/token", base),
            media_upload_url: format!("{}/1.1/media/upload.json", base),
            post_url: format!("{}/2/tweets", base),
            user_info_url: format!("{}/2/users/me", base),
        }
    }
}

pub struct XApiClient {
    http: reqwest::Client,
    endpoints: ApiEndpoints,
}

impl XApiClient {
    pub fn new(endpoints: ApiEndpoints) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http, endpoints })
    }

    /// Upload an image and return its media id.
    ///
    /// The MIME type is gated locally from the file extension before any
    /// bytes leave the machine; unsupported formats never hit the wire.
    #[instrument(skip(self, access_token))]
    pub async fn upload_media(
        &self,
        access_token: &str,
        image_path: &Path,
    ) -> Result<String, ApiError> {
        let mime_type = ImageMimeType::from_path(image_path).ok_or_else(|| {
            ApiError::Upload(format!(
                "unsupported image format: {}",
                image_path.display()
            ))
        })?;

        let bytes = tokio::fs::read(image_path)
            .await
            .map_err(|e| ApiError::Upload(format!("failed to read image file: {}", e)))?;

        let file_name = image_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());

        let part = multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime_type.as_str())
            .map_err(|e| ApiError::Upload(format!("invalid media type: {}", e)))?;
        let form = multipart::Form::new()
            .part("media", part)
            .text("media_category", "tweet_image");

        let response = self
            .http
            .post(&self.endpoints.media_upload_url)
            .bearer_auth(access_token)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::Upload(extract_api_error(&body, status)));
        }

        let parsed: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| ApiError::Upload(format!("malformed upload response: {}", e)))?;
        let media_id = parsed
            .get("media_id_string")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ApiError::Upload("response did not include a media id".to_string()))?;

        debug!(media_id, "media uploaded");
        Ok(media_id.to_string())
    }

    /// Create a post, optionally attaching an uploaded media id.
    ///
    /// Anything other than 201 Created with a `data.id` is a failure, even
    /// other 2xx statuses.
    #[instrument(skip(self, access_token, text))]
    pub async fn create_post(
        &self,
        access_token: &str,
        text: &str,
        media_id: Option<&str>,
    ) -> Result<String, ApiError> {
        let mut payload = json!({ "text": text });
        if let Some(id) = media_id {
            payload["media"] = json!({ "media_ids": [id] });
        }

        let response = self
            .http
            .post(&self.endpoints.post_url)
            .bearer_auth(access_token)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if status != StatusCode::CREATED {
            return Err(ApiError::Post(extract_api_error(&body, status)));
        }

        let parsed: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| ApiError::Post(format!("malformed post response: {}", e)))?;
        let post_id = parsed
            .pointer("/data/id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ApiError::Post("response did not include a post id".to_string()))?;

        debug!(post_id, "post created");
        Ok(post_id.to_string())
    }

    /// Probe the authenticated-user endpoint to confirm the token works.
    pub async fn verify_connection(&self, access_token: &str) -> Result<(), ApiError> {
        let response = self
            .http
            .get(&self.endpoints.user_info_url)
            .bearer_auth(access_token)
            .timeout(VERIFY_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::OK {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::Connection(extract_api_error(&body, status)))
        }
    }
}

/// Pull the most specific error message out of an API response body.
fn extract_api_error(body: &str, status: StatusCode) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("detail")
                .or_else(|| v.pointer("/errors/0/detail"))
                .or_else(|| v.pointer("/errors/0/message"))
                .and_then(|e| e.as_str())
                .map(|s| s.to_string())
        })
        .map(|detail| format!("status {}: {}", status.as_u16(), detail))
        .unwrap_or_else(|| format!("status {}", status.as_u16()))
}
