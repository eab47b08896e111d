use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::config::DriveConfig;
use crate::source::drive::{DriveClient, DriveError, DriveFile, DriveFolder};

const PAGE_SIZE: &str = "1000";
const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Supplies OAuth access tokens; refreshing them is the provider's business
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, DriveError>;
}

/// A token obtained out of band (e.g. from the environment)
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn access_token(&self) -> Result<String, DriveError> {
        if self.0.is_empty() {
            return Err(DriveError::Unauthorized("no access token configured".to_string()));
        }
        Ok(self.0.clone())
    }
}

/// Google Drive v3 REST client
pub struct GoogleDriveClient {
    http: Client,
    api_base: String,
    tokens: Arc<dyn TokenProvider>,
}

impl GoogleDriveClient {
    pub fn new(config: &DriveConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self, DriveError> {
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| DriveError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, DriveError> {
        let token = self.tokens.access_token().await?;
        let response = request.bearer_auth(token).send().await.map_err(|e| {
            if e.is_timeout() {
                DriveError::Timeout
            } else {
                DriveError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::NOT_FOUND => DriveError::NotFound(message),
            StatusCode::FORBIDDEN => DriveError::AccessDenied(message),
            StatusCode::UNAUTHORIZED => DriveError::Unauthorized(message),
            _ => DriveError::Status {
                status: status.as_u16(),
                message,
            },
        })
    }

    async fn json<T: for<'de> Deserialize<'de>>(&self, request: RequestBuilder) -> Result<T, DriveError> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DriveError::Timeout
                } else {
                    DriveError::InvalidResponse(e.to_string())
                }
            })
    }
}

#[async_trait]
impl DriveClient for GoogleDriveClient {
    async fn list_folder(&self, folder_id: &str) -> Result<DriveFolder, DriveError> {
        // Folder metadata first: tells "not found" apart from "access denied"
        let metadata: FileResource = self
            .json(
                self.http
                    .get(format!("{}/files/{}", self.api_base, folder_id))
                    .query(&[("fields", "id,name,mimeType"), ("supportsAllDrives", "true")]),
            )
            .await?;
        if metadata.mime_type.as_deref().is_some_and(|mime| mime != FOLDER_MIME_TYPE) {
            return Err(DriveError::InvalidResponse(format!("{} is not a folder", metadata.id)));
        }

        let query = format!("'{}' in parents and trashed=false", folder_id);
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(format!("{}/files", self.api_base))
                .query(&[
                    ("q", query.as_str()),
                    ("fields", "nextPageToken,files(id,name,mimeType)"),
                    ("pageSize", PAGE_SIZE),
                    ("supportsAllDrives", "true"),
                    ("includeItemsFromAllDrives", "true"),
                ]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let page: FileList = self.json(request).await?;
            debug!(folder_id, page_files = page.files.len(), "Fetched Drive listing page");

            files.extend(page.files.into_iter().map(|f| DriveFile {
                id: f.id,
                name: f.name.unwrap_or_default(),
                mime_type: f.mime_type.unwrap_or_default(),
            }));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(DriveFolder {
            name: metadata.name,
            files,
        })
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>, DriveError> {
        let response = self
            .send(
                self.http
                    .get(format!("{}/files/{}", self.api_base, file_id))
                    .query(&[("alt", "media"), ("supportsAllDrives", "true")]),
            )
            .await?;

        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                DriveError::Timeout
            } else {
                DriveError::Network(e.to_string())
            }
        })?;
        Ok(bytes.to_vec())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileResource {
    id: String,
    name: Option<String>,
    mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    next_page_token: Option<String>,
    #[serde(default)]
    files: Vec<FileResource>,
}
