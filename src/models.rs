use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Connected dark region found in a thresholded image
#[derive(Debug, Clone)]
pub struct Contour {
    pub label: u32,
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
    pub pixel_count: u32,
}

impl Contour {
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    pub fn aspect_ratio(&self) -> f32 {
        let w = self.width() as f32;
        let h = self.height() as f32;
        if h == 0.0 {
            return 0.0;
        }
        w / h
    }

    /// Share of the bounding box covered by the region (1.0 for a solid axis-aligned square)
    pub fn fill_ratio(&self) -> f32 {
        let bbox_area = (self.width() * self.height()) as f32;
        if bbox_area == 0.0 {
            return 0.0;
        }
        self.pixel_count as f32 / bbox_area
    }

    /// Mean side length of the bounding box
    pub fn side(&self) -> f32 {
        (self.width() as f32 + self.height() as f32) / 2.0
    }

    pub fn center(&self) -> PixelPoint {
        PixelPoint::new(
            (self.min_x + self.max_x) as f32 / 2.0,
            (self.min_y + self.max_y) as f32 / 2.0,
        )
    }

    /// Bounding box corners, clockwise from top-left
    pub fn corners(&self) -> Vec<PixelPoint> {
        let (x0, y0) = (self.min_x as f32, self.min_y as f32);
        let (x1, y1) = (self.max_x as f32, self.max_y as f32);
        vec![
            PixelPoint::new(x0, y0),
            PixelPoint::new(x1, y0),
            PixelPoint::new(x1, y1),
            PixelPoint::new(x0, y1),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: f32,
    pub y: f32,
}

impl PixelPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &PixelPoint) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Navigation direction for `step`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Prev,
    Next,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Prev => f.write_str("previous"),
            Direction::Next => f.write_str("next"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Local,
    Server,
    Drive,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Local => f.write_str("local"),
            SourceKind::Server => f.write_str("server"),
            SourceKind::Drive => f.write_str("drive"),
        }
    }
}

/// Which collection the current batch was listed from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceDescriptor {
    Local,
    Server,
    Drive {
        folder_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        folder_name: Option<String>,
    },
}

impl SourceDescriptor {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceDescriptor::Local => SourceKind::Local,
            SourceDescriptor::Server => SourceKind::Server,
            SourceDescriptor::Drive { .. } => SourceKind::Drive,
        }
    }
}

/// Where the bytes of one image live
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageKey {
    /// Already-persisted upload on local disk
    Local { path: PathBuf },
    /// Path relative to the server mount
    Server { relative_path: PathBuf },
    /// Remote file id
    Drive { file_id: String },
}

/// Opaque handle to one image plus its display name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageId {
    pub key: ImageKey,
    pub filename: String,
}

impl ImageId {
    pub fn local(path: impl Into<PathBuf>, filename: impl Into<String>) -> Self {
        Self {
            key: ImageKey::Local { path: path.into() },
            filename: filename.into(),
        }
    }

    pub fn server(relative_path: impl Into<PathBuf>) -> Self {
        let relative_path = relative_path.into();
        let filename = relative_path.to_string_lossy().into_owned();
        Self {
            key: ImageKey::Server { relative_path },
            filename,
        }
    }

    pub fn drive(file_id: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            key: ImageKey::Drive {
                file_id: file_id.into(),
            },
            filename: filename.into(),
        }
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            ImageKey::Local { path } => write!(f, "local:{}", path.display()),
            ImageKey::Server { relative_path } => write!(f, "server:{}", relative_path.display()),
            ImageKey::Drive { file_id } => write!(f, "drive:{}", file_id),
        }
    }
}

/// Ordered images of one selection; navigation order is listing order
pub type Batch = Vec<ImageId>;

/// Outcome of fiducial-board detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardStatus {
    Detected,
    NotDetected,
    /// The detector hit pathological input and could not decide
    Unknown,
}

impl BoardStatus {
    pub fn as_bool(self) -> Option<bool> {
        match self {
            BoardStatus::Detected => Some(true),
            BoardStatus::NotDetected => Some(false),
            BoardStatus::Unknown => None,
        }
    }
}

/// Located board: individual markers plus an enclosing outline
#[derive(Debug, Clone, PartialEq)]
pub struct BoardDetection {
    pub markers: Vec<Vec<PixelPoint>>,
    pub outline: Vec<PixelPoint>,
}

/// One decoded 2D code
#[derive(Debug, Clone)]
pub struct DecodedBarcode {
    pub payload: String,
    pub corners: Vec<PixelPoint>,
}

/// Structured output of the detection pipeline for one image
#[derive(Debug, Clone, Serialize)]
pub struct DetectionResult {
    pub board: BoardStatus,
    pub board_markers: usize,
    /// Raw decoded text, one per barcode, in decoder order
    pub decoded_payloads: Vec<String>,
    /// JSON form of each raw payload when it parses, `None` otherwise
    pub parsed_payloads: Vec<Option<Value>>,
}

impl DetectionResult {
    pub fn board_detected(&self) -> Option<bool> {
        self.board.as_bool()
    }
}
