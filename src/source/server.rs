use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::has_allowed_extension;
use crate::error::{FetchError, FetchReason, SourceError, UnavailableKind};
use crate::models::{Batch, ImageId, ImageKey, SourceDescriptor};
use crate::source::{foreign_identifier, ImageSource};

/// Images under a directory mounted on the server
#[derive(Debug, Clone)]
pub struct ServerSource {
    root: PathBuf,
}

impl ServerSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ImageSource for ServerSource {
    fn descriptor(&self) -> SourceDescriptor {
        SourceDescriptor::Server
    }

    async fn list_images(&self) -> Result<Batch, SourceError> {
        let root = self.root.clone();
        let batch = tokio::task::spawn_blocking(move || scan_directory(&root))
            .await
            .map_err(|e| SourceError::unavailable(UnavailableKind::Unreachable, e.to_string()))??;
        debug!(root = %self.root.display(), images = batch.len(), "Listed server images");
        Ok(batch)
    }

    async fn fetch_bytes(&self, id: &ImageId) -> Result<Vec<u8>, FetchError> {
        let ImageKey::Server { relative_path } = &id.key else {
            return Err(foreign_identifier(id));
        };
        if !stays_inside(relative_path) {
            return Err(FetchError::new(
                id.to_string(),
                FetchReason::Missing,
                "path escapes the server image directory",
            ));
        }
        tokio::fs::read(self.root.join(relative_path))
            .await
            .map_err(|e| FetchError::from_io(id.to_string(), &e))
    }
}

/// Recursive scan, allow-listed extensions only, sorted by relative path
fn scan_directory(root: &Path) -> Result<Batch, SourceError> {
    let metadata = std::fs::metadata(root).map_err(|e| {
        let kind = match e.kind() {
            ErrorKind::NotFound => UnavailableKind::NotFound,
            ErrorKind::PermissionDenied => UnavailableKind::AccessDenied,
            _ => UnavailableKind::Unreachable,
        };
        SourceError::unavailable(kind, format!("{}: {}", root.display(), e))
    })?;
    if !metadata.is_dir() {
        return Err(SourceError::unavailable(
            UnavailableKind::Invalid,
            format!("{} is not a directory", root.display()),
        ));
    }

    let mut relative_paths = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                let kind = match e.io_error().map(|io| io.kind()) {
                    Some(ErrorKind::PermissionDenied) => UnavailableKind::AccessDenied,
                    _ => UnavailableKind::Unreachable,
                };
                return Err(SourceError::unavailable(kind, e.to_string()));
            }
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry in server directory");
                continue;
            }
        };

        if !entry.file_type().is_file() || !has_allowed_extension(entry.file_name()) {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(root) {
            relative_paths.push(relative.to_path_buf());
        }
    }

    relative_paths.sort();
    Ok(relative_paths.into_iter().map(ImageId::server).collect())
}

fn stays_inside(relative: &Path) -> bool {
    relative
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}
