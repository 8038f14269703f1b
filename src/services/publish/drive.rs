//! Google Drive v3 sink.
//!
//! Expects a ready OAuth access token; minting one from a service account is
//! left to the deployment.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::json;

use super::{DestinationRef, StorageSink, remote_name};
use crate::error::PublishError;
use crate::models::PublishConfig;

const CSV_MIME: &str = "text/csv";

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
}

/// Uploads the output file into a shared Drive folder, replacing any file of
/// the same name.
#[derive(Debug, Clone)]
pub struct DriveSink {
    client: Client,
    api_base: String,
    upload_base: String,
    folder_id: String,
    access_token: String,
    remote_name: Option<String>,
}

impl DriveSink {
    pub fn new(config: &PublishConfig) -> Result<Self, PublishError> {
        let folder_id = config
            .folder_id
            .clone()
            .filter(|f| !f.is_empty())
            .ok_or_else(|| PublishError::ServiceError("drive folder id is not set".to_string()))?;
        let access_token = config
            .access_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| PublishError::ServiceError("drive access token is not set".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            client,
            api_base: config.drive_api_base.trim_end_matches('/').to_string(),
            upload_base: config.drive_upload_base.trim_end_matches('/').to_string(),
            folder_id,
            access_token,
            remote_name: config.remote_name.clone(),
        })
    }

    /// Public link for a file id.
    pub fn view_url(file_id: &str) -> String {
        format!("https://drive.google.com/file/d/{file_id}/view")
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, PublishError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(PublishError::ServiceError(format!(
            "status {}: {}",
            status,
            body.trim()
        )))
    }

    async fn find_existing(&self, name: &str) -> Result<Option<String>, PublishError> {
        let query = format!(
            "name = '{}' and '{}' in parents and trashed = false",
            name.replace('\\', "\\\\").replace('\'', "\\'"),
            self.folder_id
        );
        let response = self
            .client
            .get(format!("{}/drive/v3/files", self.api_base))
            .bearer_auth(&self.access_token)
            .query(&[
                ("q", query.as_str()),
                ("fields", "files(id,name)"),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
            ])
            .send()
            .await?;

        let list: FileList = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| PublishError::InvalidResponse(e.to_string()))?;
        Ok(list.files.into_iter().next().map(|f| f.id))
    }

    async fn create_metadata(&self, name: &str) -> Result<String, PublishError> {
        let response = self
            .client
            .post(format!("{}/drive/v3/files", self.api_base))
            .bearer_auth(&self.access_token)
            .query(&[("supportsAllDrives", "true")])
            .json(&json!({
                "name": name,
                "parents": [self.folder_id],
                "mimeType": CSV_MIME,
            }))
            .send()
            .await?;

        let file: DriveFile = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| PublishError::InvalidResponse(e.to_string()))?;
        Ok(file.id)
    }

    async fn upload_media(&self, file_id: &str, content: Vec<u8>) -> Result<(), PublishError> {
        let response = self
            .client
            .patch(format!(
                "{}/upload/drive/v3/files/{}",
                self.upload_base, file_id
            ))
            .bearer_auth(&self.access_token)
            .query(&[("uploadType", "media"), ("supportsAllDrives", "true")])
            .header(CONTENT_TYPE, CSV_MIME)
            .body(content)
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl StorageSink for DriveSink {
    fn name(&self) -> &str {
        "drive"
    }

    async fn publish(&self, local_path: &Path) -> Result<DestinationRef, PublishError> {
        let content = match tokio::fs::read(local_path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PublishError::MissingFile(local_path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let name = remote_name(local_path, self.remote_name.as_deref())?;

        let file_id = match self.find_existing(&name).await? {
            Some(id) => {
                tracing::debug!(file_id = %id, "replacing existing drive file");
                id
            }
            None => {
                let id = self.create_metadata(&name).await?;
                tracing::debug!(file_id = %id, "created drive file");
                id
            }
        };

        self.upload_media(&file_id, content).await?;

        Ok(DestinationRef {
            sink: self.name().to_string(),
            name,
            url: Some(Self::view_url(&file_id)),
            id: file_id,
        })
    }
}
