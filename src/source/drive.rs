use std::path::PathBuf;
use std::sync::{Arc, LazyLock, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::{FetchError, FetchReason, SourceError, UnavailableKind};
use crate::models::{Batch, ImageId, ImageKey, SourceDescriptor};
use crate::source::{foreign_identifier, ImageSource};

static FOLDER_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"folders/([-A-Za-z0-9_]+)").expect("folder path pattern is valid"));
static ID_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]id=([-A-Za-z0-9_]+)").expect("id parameter pattern is valid"));
static BARE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-A-Za-z0-9_]+$").expect("bare id pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("Drive link is empty")]
    Empty,

    #[error("No folder id found in '{0}'")]
    NoFolderId(String),
}

/// Extract a folder id from a share link or accept a bare id
///
/// Bare ids must contain a digit, which keeps plain words from passing as ids.
pub fn parse_folder_ref(input: &str) -> Result<String, LinkError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(LinkError::Empty);
    }

    let looks_like_link = input.contains('/') || input.contains('?') || input.contains('=');
    if looks_like_link {
        return FOLDER_PATH
            .captures(input)
            .or_else(|| ID_PARAM.captures(input))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| LinkError::NoFolderId(input.to_string()));
    }

    if BARE_ID.is_match(input) && input.chars().any(|c| c.is_ascii_digit()) {
        Ok(input.to_string())
    } else {
        Err(LinkError::NoFolderId(input.to_string()))
    }
}

/// One child of a remote folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
}

/// Drive MIME types the pipeline can decode
const IMAGE_MIME_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/bmp", "image/gif"];

impl DriveFile {
    pub fn is_image(&self) -> bool {
        IMAGE_MIME_TYPES.contains(&self.mime_type.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct DriveFolder {
    pub name: Option<String>,
    pub files: Vec<DriveFile>,
}

/// Failures reported by the remote collaborator
#[derive(Debug, Clone, Error)]
pub enum DriveError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("drive API returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Remote-drive collaborator: list a folder, download a file
#[async_trait]
pub trait DriveClient: Send + Sync {
    async fn list_folder(&self, folder_id: &str) -> Result<DriveFolder, DriveError>;

    async fn download(&self, file_id: &str) -> Result<Vec<u8>, DriveError>;
}

/// Images in one remote folder
///
/// The [`DriveClient`] owns authentication and the wire protocol. Downloaded
/// bytes can be kept in a per-source scratch directory so moving back to an
/// image does not download it again.
pub struct DriveSource {
    client: Arc<dyn DriveClient>,
    folder_id: String,
    folder_name: OnceLock<String>,
    cache: Option<ScratchCache>,
}

impl DriveSource {
    pub fn new(client: Arc<dyn DriveClient>, folder_id: impl Into<String>) -> Self {
        Self {
            client,
            folder_id: folder_id.into(),
            folder_name: OnceLock::new(),
            cache: None,
        }
    }

    /// Parse a share link or bare id into a source
    pub fn from_link(client: Arc<dyn DriveClient>, link: &str) -> Result<Self, LinkError> {
        Ok(Self::new(client, parse_folder_ref(link)?))
    }

    /// Keep downloads in a scratch directory removed when the source is dropped
    pub fn with_download_cache(mut self) -> std::io::Result<Self> {
        self.cache = Some(ScratchCache::new()?);
        Ok(self)
    }

    pub fn folder_id(&self) -> &str {
        &self.folder_id
    }

    /// Keep a folder name learned earlier; a later listing does not replace it
    pub(crate) fn remember_folder_name(&self, name: String) {
        let _ = self.folder_name.set(name);
    }
}

impl ImageSource for DriveSource {
    fn descriptor(&self) -> SourceDescriptor {
        SourceDescriptor::Drive {
            folder_id: self.folder_id.clone(),
            folder_name: self.folder_name.get().cloned(),
        }
    }

    async fn list_images(&self) -> Result<Batch, SourceError> {
        let folder = self.client.list_folder(&self.folder_id).await.map_err(|e| {
            let kind = match &e {
                DriveError::NotFound(_) => UnavailableKind::NotFound,
                DriveError::AccessDenied(_) | DriveError::Unauthorized(_) => UnavailableKind::AccessDenied,
                DriveError::InvalidResponse(_) => UnavailableKind::Invalid,
                DriveError::Timeout | DriveError::Network(_) | DriveError::Status { .. } => {
                    UnavailableKind::Unreachable
                }
            };
            SourceError::unavailable(kind, format!("Drive folder '{}': {}", self.folder_id, e))
        })?;

        if let Some(name) = folder.name {
            let _ = self.folder_name.set(name);
        }

        let total = folder.files.len();
        let batch: Batch = folder
            .files
            .into_iter()
            .filter(DriveFile::is_image)
            .map(|file| ImageId::drive(file.id, file.name))
            .collect();

        info!(
            folder_id = %self.folder_id,
            images = batch.len(),
            skipped = total - batch.len(),
            "Listed Drive folder"
        );
        Ok(batch)
    }

    async fn fetch_bytes(&self, id: &ImageId) -> Result<Vec<u8>, FetchError> {
        let ImageKey::Drive { file_id } = &id.key else {
            return Err(foreign_identifier(id));
        };

        if let Some(cache) = &self.cache {
            if let Some(bytes) = cache.get(file_id).await {
                debug!(file_id = %file_id, "Serving Drive image from scratch cache");
                return Ok(bytes);
            }
        }

        let bytes = self
            .client
            .download(file_id)
            .await
            .map_err(|e| FetchError::new(id.to_string(), fetch_reason(&e), e.to_string()))?;
        debug!(file_id = %file_id, bytes = bytes.len(), "Downloaded Drive image");

        if let Some(cache) = &self.cache {
            cache.put(file_id, &bytes).await;
        }
        Ok(bytes)
    }
}

fn fetch_reason(error: &DriveError) -> FetchReason {
    match error {
        DriveError::NotFound(_) => FetchReason::Missing,
        DriveError::AccessDenied(_) | DriveError::Unauthorized(_) => FetchReason::PermissionDenied,
        DriveError::Timeout | DriveError::Network(_) => FetchReason::TransientNetwork,
        DriveError::Status { status, .. } if *status == 429 || *status >= 500 => {
            FetchReason::TransientNetwork
        }
        DriveError::Status { .. } => FetchReason::Missing,
        DriveError::InvalidResponse(_) => FetchReason::DecodeFailure,
    }
}

/// Downloaded bytes keyed by file id, for the lifetime of one source
struct ScratchCache {
    dir: TempDir,
}

impl ScratchCache {
    fn new() -> std::io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("boardscan-drive-").tempdir()?;
        Ok(Self { dir })
    }

    fn path_for(&self, file_id: &str) -> PathBuf {
        let safe: String = file_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.path().join(safe)
    }

    async fn get(&self, file_id: &str) -> Option<Vec<u8>> {
        tokio::fs::read(self.path_for(file_id)).await.ok()
    }

    async fn put(&self, file_id: &str, bytes: &[u8]) {
        if let Err(e) = tokio::fs::write(self.path_for(file_id), bytes).await {
            warn!(file_id, error = %e, "Could not cache Drive download");
        }
    }
}
