use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{ImageUploader, UploadedFile};

const UPLOAD_FILENAME: &str = "amesh.png";
const UPLOAD_TITLE: &str = "amesh";

#[derive(Debug, Deserialize)]
struct UploadTarget {
    upload_url: String,
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct CompletedUpload {
    files: Vec<UploadedFile>,
}

/// Slack Web API client using the external upload flow
/// (`files.getUploadURLExternal` → raw POST → `files.completeUploadExternal`).
///
/// The bot token is fixed at construction and sent as-is; an empty or
/// revoked token shows up as an API error on the first upload.
pub struct SlackClient {
    client: reqwest::Client,
    token: String,
    api_base_url: String,
}

impl SlackClient {
    pub fn new(token: impl Into<String>, api_base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: token.into(),
            api_base_url: api_base_url.into(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.api_base_url.trim_end_matches('/'), method)
    }

    /// Send an authenticated Web API request and unwrap Slack's `ok`/`error` envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("Failed to send {} request to Slack", method))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Slack API error on {} ({}): {}", method, status, error_body);
        }

        let body: Value = response
            .json()
            .await
            .with_context(|| format!("Failed to parse Slack {} response", method))?;

        if !body["ok"].as_bool().unwrap_or(false) {
            anyhow::bail!(
                "Slack {} failed: {}",
                method,
                body["error"].as_str().unwrap_or("unknown_error")
            );
        }

        serde_json::from_value(body)
            .with_context(|| format!("Unexpected Slack {} response", method))
    }

    async fn upload_file(&self, png: Vec<u8>, channel: &str) -> Result<UploadedFile> {
        debug!("Uploading {} bytes to channel {}", png.len(), channel);

        let length = png.len().to_string();
        let target: UploadTarget = self
            .call(
                "files.getUploadURLExternal",
                self.client
                    .post(self.method_url("files.getUploadURLExternal"))
                    .form(&[("filename", UPLOAD_FILENAME), ("length", length.as_str())]),
            )
            .await?;

        let response = self
            .client
            .post(&target.upload_url)
            .header(CONTENT_TYPE, "image/png")
            .body(png)
            .send()
            .await
            .context("Failed to send file bytes to Slack")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Slack file transfer failed ({}): {}", status, error_body);
        }

        let completed: CompletedUpload = self
            .call(
                "files.completeUploadExternal",
                self.client
                    .post(self.method_url("files.completeUploadExternal"))
                    .json(&json!({
                        "files": [{ "id": target.file_id, "title": UPLOAD_TITLE }],
                        "channel_id": channel,
                    })),
            )
            .await?;

        completed
            .files
            .into_iter()
            .next()
            .context("Slack completeUploadExternal returned no file")
    }
}

#[async_trait]
impl ImageUploader for SlackClient {
    async fn upload(&self, png: Vec<u8>, channel: &str) -> Result<UploadedFile> {
        match self.upload_file(png, channel).await {
            Ok(file) => {
                info!("Name: {}, URL: {}", file.name, file.url_private);
                Ok(file)
            }
            Err(e) => {
                debug!("Upload to {} failed: {:#}", channel, e);
                Err(e)
            }
        }
    }
}
