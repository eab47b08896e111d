pub mod drive;
pub mod drive_api;
pub mod local;
pub mod server;

use crate::error::{FetchError, FetchReason, SourceError};
use crate::models::{Batch, ImageId, SourceDescriptor};

pub use drive::{parse_folder_ref, DriveClient, DriveError, DriveFile, DriveFolder, DriveSource, LinkError};
pub use drive_api::{GoogleDriveClient, StaticToken, TokenProvider};
pub use local::{LocalSource, UploadedFile};
pub use server::ServerSource;

/// Capability shared by every source kind
#[allow(async_fn_in_trait)]
pub trait ImageSource {
    fn descriptor(&self) -> SourceDescriptor;

    /// Enumerate the batch, in navigation order
    async fn list_images(&self) -> Result<Batch, SourceError>;

    /// Raw encoded bytes of one listed image. Repeatable, no visible side effects.
    async fn fetch_bytes(&self, id: &ImageId) -> Result<Vec<u8>, FetchError>;
}

/// The active source of a session
///
/// Session and pipeline code talk to this union and never care which kind
/// is active.
pub enum SourceAdapter {
    Local(LocalSource),
    Server(ServerSource),
    Drive(DriveSource),
}

impl ImageSource for SourceAdapter {
    fn descriptor(&self) -> SourceDescriptor {
        match self {
            SourceAdapter::Local(source) => source.descriptor(),
            SourceAdapter::Server(source) => source.descriptor(),
            SourceAdapter::Drive(source) => source.descriptor(),
        }
    }

    async fn list_images(&self) -> Result<Batch, SourceError> {
        match self {
            SourceAdapter::Local(source) => source.list_images().await,
            SourceAdapter::Server(source) => source.list_images().await,
            SourceAdapter::Drive(source) => source.list_images().await,
        }
    }

    async fn fetch_bytes(&self, id: &ImageId) -> Result<Vec<u8>, FetchError> {
        match self {
            SourceAdapter::Local(source) => source.fetch_bytes(id).await,
            SourceAdapter::Server(source) => source.fetch_bytes(id).await,
            SourceAdapter::Drive(source) => source.fetch_bytes(id).await,
        }
    }
}

impl From<LocalSource> for SourceAdapter {
    fn from(source: LocalSource) -> Self {
        SourceAdapter::Local(source)
    }
}

impl From<ServerSource> for SourceAdapter {
    fn from(source: ServerSource) -> Self {
        SourceAdapter::Server(source)
    }
}

impl From<DriveSource> for SourceAdapter {
    fn from(source: DriveSource) -> Self {
        SourceAdapter::Drive(source)
    }
}

/// An identifier handed to a source that did not list it
pub(crate) fn foreign_identifier(id: &ImageId) -> FetchError {
    FetchError::new(
        id.to_string(),
        FetchReason::Missing,
        "identifier does not belong to the active source",
    )
}
