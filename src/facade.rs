use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::OutputFormat;
use crate::detection::{DetectionPipeline, ProcessedImage};
use crate::error::{ImageError, NavigationError, PipelineError, RestoreError, SaveError, SourceError};
use crate::models::{Direction, DetectionResult, ImageId, SourceDescriptor, SourceKind};
use crate::session::{BatchSession, SessionSnapshot};
use crate::source::{ImageSource, SourceAdapter};

/// Fetched and processed image
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    /// Bytes exactly as the source returned them
    pub original_image: Vec<u8>,
    pub annotated_image: Vec<u8>,
    pub format: OutputFormat,
    pub detection: DetectionResult,
}

/// Navigation state plus the outcome for the image under the cursor
#[derive(Debug, Clone)]
pub struct FullResult {
    pub current_index: usize,
    pub total_images: usize,
    pub has_prev: bool,
    pub has_next: bool,
    pub filename: String,
    pub source: SourceKind,
    pub outcome: Result<ProcessedFrame, ImageError>,
}

impl FullResult {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn summary(&self) -> FrameSummary<'_> {
        let (detection, error) = match &self.outcome {
            Ok(frame) => (Some(&frame.detection), None),
            Err(e) => (None, Some(e.to_string())),
        };
        FrameSummary {
            current_index: self.current_index,
            total_images: self.total_images,
            has_prev: self.has_prev,
            has_next: self.has_next,
            filename: &self.filename,
            source: self.source,
            detection,
            error,
        }
    }
}

/// Serialisable view of a [`FullResult`] without the image bytes
#[derive(Debug, Serialize)]
pub struct FrameSummary<'a> {
    pub current_index: usize,
    pub total_images: usize,
    pub has_prev: bool,
    pub has_next: bool,
    pub filename: &'a str,
    pub source: SourceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detection: Option<&'a DetectionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One user's view of the system: the active source, the cursor over its
/// batch and the shared detection pipeline
///
/// Per-image failures travel inside [`FullResult::outcome`] next to the
/// navigation state, so a bad file never blocks moving past it.
pub struct ProcessingFacade {
    pipeline: Arc<DetectionPipeline>,
    source: Option<SourceAdapter>,
    session: BatchSession,
}

impl ProcessingFacade {
    pub fn new(pipeline: Arc<DetectionPipeline>) -> Self {
        Self {
            pipeline,
            source: None,
            session: BatchSession::default(),
        }
    }

    /// Rebuild a facade from a snapshot and a live source it was taken from
    ///
    /// A Drive source must point at the snapshot's folder; the snapshot's
    /// folder name carries over.
    pub fn restore(
        pipeline: Arc<DetectionPipeline>,
        snapshot: SessionSnapshot,
        source: impl Into<SourceAdapter>,
    ) -> Result<Self, RestoreError> {
        let source = source.into();
        let expected = snapshot.source.kind();
        let found = source.descriptor().kind();
        if expected != found {
            return Err(RestoreError::SourceMismatch { expected, found });
        }

        if let (SourceDescriptor::Drive { folder_id, folder_name }, SourceAdapter::Drive(drive)) =
            (snapshot.source, &source)
        {
            if drive.folder_id() != folder_id {
                return Err(RestoreError::FolderMismatch {
                    expected: folder_id,
                    found: drive.folder_id().to_string(),
                });
            }
            if let Some(name) = folder_name {
                drive.remember_folder_name(name);
            }
        }

        let session = BatchSession::restore(snapshot.images, snapshot.index)?;
        Ok(Self {
            pipeline,
            source: Some(source),
            session,
        })
    }

    /// List the new source and replace the batch
    ///
    /// Any previous batch and cursor are dropped first, so a failed listing
    /// leaves the facade with no active source.
    pub async fn select_source(&mut self, source: impl Into<SourceAdapter>) -> Result<usize, SourceError> {
        let source = source.into();
        self.source = None;
        self.session.reset(Vec::new());

        let batch = match source.list_images().await {
            Ok(batch) => batch,
            Err(e) => {
                error!(error = %e, "Source selection failed");
                return Err(e);
            }
        };

        let total = batch.len();
        info!(source = %source.descriptor().kind(), images = total, "Source selected");
        self.session.reset(batch);
        self.source = Some(source);
        Ok(total)
    }

    pub fn session(&self) -> &BatchSession {
        &self.session
    }

    pub fn descriptor(&self) -> Option<SourceDescriptor> {
        self.source.as_ref().map(ImageSource::descriptor)
    }

    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.descriptor().map(|source| SessionSnapshot {
            source,
            images: self.session.batch().to_vec(),
            index: self.session.index(),
        })
    }

    pub fn goto(&mut self, index: usize) -> Result<usize, NavigationError> {
        self.require_source()?;
        self.session.goto(index)
    }

    pub fn step(&mut self, direction: Direction) -> Result<usize, NavigationError> {
        self.require_source()?;
        self.session.step(direction)
    }

    /// Move to `index` and process it
    pub async fn open(&mut self, index: usize) -> Result<FullResult, NavigationError> {
        self.goto(index)?;
        self.get_current().await
    }

    /// Step once and process the new current image
    pub async fn navigate(&mut self, direction: Direction) -> Result<FullResult, NavigationError> {
        self.step(direction)?;
        self.get_current().await
    }

    /// Fetch and process the image under the cursor
    pub async fn get_current(&self) -> Result<FullResult, NavigationError> {
        let (source, index, id) = self.current()?;

        let outcome = self.process(source, id).await;
        if let Err(e) = &outcome {
            warn!(index, image = %id, error = %e, retryable = e.is_retryable(), "Image could not be processed");
        }

        Ok(FullResult {
            current_index: index,
            total_images: self.session.len(),
            has_prev: self.session.has_prev(),
            has_next: self.session.has_next(),
            filename: id.filename.clone(),
            source: source.descriptor().kind(),
            outcome,
        })
    }

    /// Write the current annotated image to `<root>/<subdir>/<stem>_processed.<ext>`
    pub async fn save_annotated(&self, output_root: &Path, processed_subdir: &str) -> Result<PathBuf, SaveError> {
        let (source, _, id) = self.current()?;
        let frame = self.process(source, id).await?;
        Ok(write_annotated(output_root, processed_subdir, &id.filename, &frame).await?)
    }

    fn require_source(&self) -> Result<&SourceAdapter, NavigationError> {
        self.source.as_ref().ok_or(NavigationError::NoActiveBatch)
    }

    fn current(&self) -> Result<(&SourceAdapter, usize, &ImageId), NavigationError> {
        let source = self.require_source()?;
        match (self.session.index(), self.session.current()) {
            (Some(index), Some(id)) => Ok((source, index, id)),
            _ => Err(NavigationError::NoActiveBatch),
        }
    }

    async fn process(&self, source: &SourceAdapter, id: &ImageId) -> Result<ProcessedFrame, ImageError> {
        let original_image = source.fetch_bytes(id).await?;
        debug!(image = %id, bytes = original_image.len(), "Fetched image");

        // Decoding and detection are CPU bound; keep them off the async workers
        let pipeline = Arc::clone(&self.pipeline);
        let (original_image, processed) = tokio::task::spawn_blocking(move || {
            let processed = pipeline.process(&original_image);
            (original_image, processed)
        })
        .await
        .map_err(|e| PipelineError::Aborted(e.to_string()))?;

        let ProcessedImage {
            annotated_image,
            format,
            detection,
        } = processed?;

        Ok(ProcessedFrame {
            original_image,
            annotated_image,
            format,
            detection,
        })
    }
}

/// Write an already processed frame next to other saved results
pub async fn write_annotated(
    output_root: &Path,
    processed_subdir: &str,
    filename: &str,
    frame: &ProcessedFrame,
) -> std::io::Result<PathBuf> {
    let dir = output_root.join(processed_subdir);
    tokio::fs::create_dir_all(&dir).await?;

    let path = dir.join(processed_name(filename, frame.format));
    tokio::fs::write(&path, &frame.annotated_image).await?;
    info!(path = %path.display(), "Saved annotated image");
    Ok(path)
}

/// `<stem>_processed.<ext>`, ignoring any directories in the display name
pub fn processed_name(filename: &str, format: OutputFormat) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "image".to_string());
    format!("{}_processed.{}", stem, format.extension())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processed_name_uses_output_extension() {
        assert_eq!(processed_name("board_01.png", OutputFormat::Jpeg { quality: 85 }), "board_01_processed.jpg");
        assert_eq!(processed_name("nested/dir/scan.JPG", OutputFormat::Png), "scan_processed.png");
        assert_eq!(processed_name("", OutputFormat::Png), "image_processed.png");
    }
}
