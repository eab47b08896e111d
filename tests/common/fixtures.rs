use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use boardscan::detection::DetectionPipeline;
use boardscan::source::{DriveClient, DriveError, DriveFile, DriveFolder};
use boardscan::{BoardSpec, OutputFormat};
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use qrcode::{Color, QrCode};

pub const WHITE: Luma<u8> = Luma([255u8]);
pub const BLACK: Luma<u8> = Luma([0u8]);

/// Encode any image as PNG bytes
pub fn png_bytes(image: &DynamicImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("Failed to encode test PNG");
    bytes
}

pub fn blank_image(width: u32, height: u32) -> GrayImage {
    GrayImage::from_pixel(width, height, WHITE)
}

/// Side of [`board_image`]
pub const BOARD_SIDE: u32 = 330;

/// 5x5 board of 50 px squares with a 30 px dark marker on every other square
///
/// Twelve markers, matching `BoardSpec::default()`.
pub fn board_image() -> GrayImage {
    let mut image = blank_image(BOARD_SIDE, BOARD_SIDE);
    for row in 0..5 {
        for col in 0..5 {
            if (row + col) % 2 == 0 {
                continue;
            }
            let (x0, y0) = (50 + col * 50, 50 + row * 50);
            for y in y0..y0 + 30 {
                for x in x0..x0 + 30 {
                    image.put_pixel(x, y, BLACK);
                }
            }
        }
    }
    image
}

/// A QR code carrying `payload`, 8 px per module with a 4-module quiet zone
pub fn qr_image(payload: &str) -> GrayImage {
    qr_image_with_module(payload, 8)
}

pub fn qr_image_with_module(payload: &str, module: u32) -> GrayImage {
    const QUIET: u32 = 4;

    let code = QrCode::new(payload.as_bytes()).expect("Failed to build QR code");
    let modules = code.width() as u32;
    let colors = code.to_colors();
    let side = (modules + 2 * QUIET) * module;

    GrayImage::from_fn(side, side, |x, y| {
        let mx = (x / module) as i64 - QUIET as i64;
        let my = (y / module) as i64 - QUIET as i64;
        let inside = mx >= 0 && my >= 0 && (mx as u32) < modules && (my as u32) < modules;
        if inside && colors[(my as u32 * modules + mx as u32) as usize] == Color::Dark {
            BLACK
        } else {
            WHITE
        }
    })
}

/// `left` and `right` next to each other on a white page
pub fn side_by_side(left: &GrayImage, right: &GrayImage) -> GrayImage {
    let mut page = blank_image(left.width() + right.width(), left.height().max(right.height()));
    image::imageops::replace(&mut page, left, 0, 0);
    image::imageops::replace(&mut page, right, left.width() as i64, 0);
    page
}

/// Write `names` as small PNG files into `dir`
pub fn write_images(dir: &Path, names: &[&str]) {
    let bytes = png_bytes(&DynamicImage::ImageLuma8(blank_image(40, 30)));
    for name in names {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create fixture directory");
        }
        std::fs::write(&path, &bytes).expect("Failed to write fixture image");
    }
}

pub fn test_pipeline() -> Arc<DetectionPipeline> {
    Arc::new(DetectionPipeline::new(BoardSpec::default(), OutputFormat::Png))
}

/// In-memory drive that counts downloads
#[derive(Default)]
pub struct FakeDriveClient {
    pub folder_name: Option<String>,
    pub files: Vec<DriveFile>,
    pub contents: HashMap<String, Vec<u8>>,
    pub list_error: Option<DriveError>,
    pub download_errors: HashMap<String, DriveError>,
    pub downloads: AtomicUsize,
}

impl FakeDriveClient {
    pub fn with_file(mut self, id: &str, name: &str, mime_type: &str, bytes: Vec<u8>) -> Self {
        self.files.push(DriveFile {
            id: id.to_string(),
            name: name.to_string(),
            mime_type: mime_type.to_string(),
        });
        self.contents.insert(id.to_string(), bytes);
        self
    }

    pub fn failing_list(mut self, error: DriveError) -> Self {
        self.list_error = Some(error);
        self
    }

    pub fn failing_download(mut self, id: &str, error: DriveError) -> Self {
        self.download_errors.insert(id.to_string(), error);
        self
    }

    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DriveClient for FakeDriveClient {
    async fn list_folder(&self, _folder_id: &str) -> Result<DriveFolder, DriveError> {
        if let Some(error) = &self.list_error {
            return Err(error.clone());
        }
        Ok(DriveFolder {
            name: self.folder_name.clone(),
            files: self.files.clone(),
        })
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>, DriveError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.download_errors.get(file_id) {
            return Err(error.clone());
        }
        self.contents
            .get(file_id)
            .cloned()
            .ok_or_else(|| DriveError::NotFound(file_id.to_string()))
    }
}
