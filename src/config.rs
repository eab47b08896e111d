use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub const DEFAULT_DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Image extensions accepted from uploads and the server mount (lowercase)
pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif"];

/// Case-insensitive extension check against [`ALLOWED_EXTENSIONS`]
pub fn has_allowed_extension(name: impl AsRef<Path>) -> bool {
    name.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            ALLOWED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Top-level application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Mount scanned by the server source
    pub server_images_dir: PathBuf,
    /// Subdirectory (under the output root) receiving saved annotated images
    pub processed_subdir: String,
    pub drive: DriveConfig,
    pub board: BoardSpec,
    pub output: OutputFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_images_dir: PathBuf::from("shared_data"),
            processed_subdir: "proc_imgs".to_string(),
            drive: DriveConfig::default(),
            board: BoardSpec::default(),
            output: OutputFormat::default(),
        }
    }
}

impl AppConfig {
    /// Load a TOML config file; missing keys keep their defaults
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub api_base: String,
    pub timeout_secs: u64,
    /// Keep downloaded bytes in a scratch directory for the session lifetime
    pub cache_downloads: bool,
}

impl DriveConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_DRIVE_API_BASE.to_string(),
            timeout_secs: 30,
            cache_downloads: true,
        }
    }
}

/// Geometry of the printed marker board and detection tolerances
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardSpec {
    pub squares_x: u32,
    pub squares_y: u32,
    /// Fraction of the board's markers that must be found
    pub min_marker_fraction: f32,
    pub min_marker_side_px: u32,
    /// Solidity a marker blob must reach (pixels / bbox area)
    pub min_fill_ratio: f32,
    /// Allowed relative deviation of a marker's side from the median side
    pub size_tolerance: f32,
    /// Allowed relative deviation of neighbour spacing from the board pitch
    pub pitch_tolerance: f32,
    pub blur_sigma: f32,
}

impl Default for BoardSpec {
    fn default() -> Self {
        Self {
            squares_x: 5,
            squares_y: 5,
            min_marker_fraction: 0.3,
            min_marker_side_px: 12,
            min_fill_ratio: 0.75,
            size_tolerance: 0.25,
            pitch_tolerance: 0.2,
            blur_sigma: 1.0,
        }
    }
}

impl BoardSpec {
    /// Markers printed on the board: one in every other square
    pub fn expected_markers(&self) -> usize {
        (self.squares_x * self.squares_y / 2) as usize
    }

    pub fn min_markers(&self) -> usize {
        let needed = (self.expected_markers() as f32 * self.min_marker_fraction).ceil() as usize;
        needed.max(4)
    }
}

/// Encoding used for the annotated image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum OutputFormat {
    Png,
    Jpeg { quality: u8 },
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Jpeg { quality: 85 }
    }
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg { .. } => "jpg",
        }
    }
}
