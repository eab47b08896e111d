use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Direction, SourceKind};

/// Why a source could not produce a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableKind {
    NotFound,
    AccessDenied,
    Unreachable,
    Invalid,
}

impl fmt::Display for UnavailableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            UnavailableKind::NotFound => "not found",
            UnavailableKind::AccessDenied => "access denied",
            UnavailableKind::Unreachable => "unreachable",
            UnavailableKind::Invalid => "invalid",
        };
        f.write_str(label)
    }
}

/// Listing failure. Terminal for the selection attempt; the batch is left empty.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("Image source unavailable ({kind}): {message}")]
    Unavailable {
        kind: UnavailableKind,
        message: String,
    },
}

impl SourceError {
    pub fn unavailable(kind: UnavailableKind, message: impl Into<String>) -> Self {
        SourceError::Unavailable {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> UnavailableKind {
        match self {
            SourceError::Unavailable { kind, .. } => *kind,
        }
    }
}

/// Machine-readable reason attached to a per-image fetch failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchReason {
    Missing,
    PermissionDenied,
    TransientNetwork,
    DecodeFailure,
}

impl FetchReason {
    /// Only network hiccups are worth retrying.
    pub fn is_retryable(self) -> bool {
        matches!(self, FetchReason::TransientNetwork)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FetchReason::Missing => "missing",
            FetchReason::PermissionDenied => "permission_denied",
            FetchReason::TransientNetwork => "transient_network",
            FetchReason::DecodeFailure => "decode_failure",
        }
    }
}

impl fmt::Display for FetchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure to read the raw bytes of one image
#[derive(Debug, Clone, Error)]
#[error("Failed to fetch '{identifier}' ({reason}): {detail}")]
pub struct FetchError {
    pub identifier: String,
    pub reason: FetchReason,
    pub detail: String,
}

impl FetchError {
    pub fn new(identifier: impl Into<String>, reason: FetchReason, detail: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            reason,
            detail: detail.into(),
        }
    }

    /// Map a filesystem error onto the fetch taxonomy
    pub fn from_io(identifier: impl Into<String>, err: &std::io::Error) -> Self {
        let reason = match err.kind() {
            std::io::ErrorKind::PermissionDenied => FetchReason::PermissionDenied,
            std::io::ErrorKind::InvalidData => FetchReason::DecodeFailure,
            _ => FetchReason::Missing,
        };
        Self::new(identifier, reason, err.to_string())
    }
}

/// Failures inside the detection pipeline
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("Unsupported image format: {0}")]
    UnsupportedImageFormat(String),

    #[error("Board detector rejected the input: {0}")]
    BoardDetector(String),

    #[error("Barcode decoder failed: {0}")]
    BarcodeDecoder(String),

    #[error("Failed to encode annotated image: {0}")]
    EncodeFailure(String),

    #[error("Image processing aborted: {0}")]
    Aborted(String),
}

/// Navigation misuse. Never changes the cursor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NavigationError {
    #[error("Index {index} is out of range for a batch of {len} images")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("No {direction} image")]
    NoMoreImages { direction: Direction },

    #[error("No image source has been selected")]
    NoActiveBatch,
}

/// Per-image failure carried alongside navigation state
#[derive(Debug, Clone, Error)]
pub enum ImageError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl ImageError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ImageError::Fetch(e) => e.reason.is_retryable(),
            ImageError::Pipeline(_) => false,
        }
    }
}

/// Failure to write the current annotated image
#[derive(Debug, Error)]
pub enum SaveError {
    #[error(transparent)]
    Navigation(#[from] NavigationError),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("Failed to write annotated image: {0}")]
    Io(#[from] std::io::Error),
}

/// A persisted session that cannot be rebuilt
#[derive(Debug, Clone, Error)]
pub enum RestoreError {
    #[error("Snapshot was taken from a {expected} source but a {found} source was supplied")]
    SourceMismatch { expected: SourceKind, found: SourceKind },

    #[error("Snapshot was taken from Drive folder '{expected}' but folder '{found}' was supplied")]
    FolderMismatch { expected: String, found: String },

    #[error(transparent)]
    Navigation(#[from] NavigationError),
}
