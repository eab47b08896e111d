#![allow(dead_code)]

mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from boardscan for tests
pub use boardscan::detection::{BoardDetectError, BoardDetector, DetectionPipeline};
pub use boardscan::source::{DriveClient, DriveError, DriveFile, DriveFolder, DriveSource};
pub use boardscan::{
    BoardSpec, BoardStatus, Direction, FetchReason, ImageError, ImageSource, LocalSource, NavigationError,
    OutputFormat, PipelineError, ProcessingFacade, ServerSource, SourceAdapter, UploadedFile,
};
