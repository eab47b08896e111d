pub mod config;
pub mod detection;
pub mod error;
pub mod facade;
pub mod models;
pub mod pipeline;
pub mod registry;
pub mod session;
pub mod source;

pub use config::{AppConfig, BoardSpec, DriveConfig, OutputFormat};
pub use detection::{DetectionPipeline, ProcessedImage};
pub use error::{
    FetchError, FetchReason, ImageError, NavigationError, PipelineError, RestoreError, SaveError, SourceError,
    UnavailableKind,
};
pub use facade::{FrameSummary, FullResult, ProcessedFrame, ProcessingFacade};
pub use models::{BoardStatus, Contour, DetectionResult, Direction, ImageId, SourceDescriptor, SourceKind};
pub use pipeline::{BoundingBox, DebugConfig, MetadataValue, Pipeline, PipelineContext, PipelineData, PipelineStep};
pub use registry::SessionRegistry;
pub use session::{BatchSession, CursorState, SessionSnapshot};
pub use source::{DriveSource, ImageSource, LocalSource, ServerSource, SourceAdapter, UploadedFile};
