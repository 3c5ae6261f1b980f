pub mod slack;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

/// Form payload Slack POSTs when a slash command is invoked.
///
/// Only the fields this service reads are kept; serde skips the rest.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SlashCommand {
    pub command: String,
    pub channel_id: String,
    pub channel_name: String,
    pub user_id: String,
    pub user_name: String,
}

/// A file stored on the chat platform after an upload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadedFile {
    pub name: String,
    #[serde(default)]
    pub url_private: String,
}

/// Destination for a rendered image
#[async_trait]
pub trait ImageUploader: Send + Sync {
    async fn upload(&self, png: Vec<u8>, channel: &str) -> Result<UploadedFile>;
}
