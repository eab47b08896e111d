use std::path::PathBuf;

use tracing::{debug, warn};

use crate::config::has_allowed_extension;
use crate::error::{FetchError, SourceError};
use crate::models::{Batch, ImageId, ImageKey, SourceDescriptor};
use crate::source::{foreign_identifier, ImageSource};

/// A file the upload collaborator has already written to disk
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub path: PathBuf,
    pub original_name: String,
}

impl UploadedFile {
    pub fn new(path: impl Into<PathBuf>, original_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            original_name: original_name.into(),
        }
    }
}

/// Images just uploaded by the user, in selection order
#[derive(Debug, Clone, Default)]
pub struct LocalSource {
    uploads: Vec<UploadedFile>,
}

impl LocalSource {
    pub fn new(uploads: Vec<UploadedFile>) -> Self {
        Self { uploads }
    }
}

impl ImageSource for LocalSource {
    fn descriptor(&self) -> SourceDescriptor {
        SourceDescriptor::Local
    }

    async fn list_images(&self) -> Result<Batch, SourceError> {
        let mut batch = Batch::with_capacity(self.uploads.len());
        for upload in &self.uploads {
            if has_allowed_extension(&upload.original_name) {
                batch.push(ImageId::local(&upload.path, &upload.original_name));
            } else {
                warn!(filename = %upload.original_name, "Skipping upload with unsupported extension");
            }
        }
        debug!(images = batch.len(), uploads = self.uploads.len(), "Listed local uploads");
        Ok(batch)
    }

    async fn fetch_bytes(&self, id: &ImageId) -> Result<Vec<u8>, FetchError> {
        let ImageKey::Local { path } = &id.key else {
            return Err(foreign_identifier(id));
        };
        tokio::fs::read(path)
            .await
            .map_err(|e| FetchError::from_io(id.to_string(), &e))
    }
}
