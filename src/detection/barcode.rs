use image::GrayImage;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{DecodedBarcode, PixelPoint};

#[derive(Debug, Clone, Error)]
#[error("barcode decoder failed: {0}")]
pub struct BarcodeError(pub String);

/// Black-box 2D-code decoder contract
pub trait BarcodeDecoder: Send + Sync {
    /// Every code located and decoded, in the decoder's own order
    fn decode(&self, image: &GrayImage) -> Result<Vec<DecodedBarcode>, BarcodeError>;
}

/// QR decoder backed by `rqrr`
#[derive(Debug, Default, Clone, Copy)]
pub struct QrDecoder;

impl BarcodeDecoder for QrDecoder {
    fn decode(&self, image: &GrayImage) -> Result<Vec<DecodedBarcode>, BarcodeError> {
        let (width, height) = image.dimensions();
        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
            width as usize,
            height as usize,
            |x, y| image.get_pixel(x as u32, y as u32)[0],
        );

        let grids = prepared.detect_grids();
        debug!(candidates = grids.len(), "QR grid candidates");

        let mut decoded = Vec::new();
        for (i, grid) in grids.iter().enumerate() {
            let mut payload = Vec::new();
            match grid.decode_to(&mut payload) {
                Ok(_) => {
                    let corners = grid
                        .bounds
                        .iter()
                        .map(|p| PixelPoint::new(p.x as f32, p.y as f32))
                        .collect();
                    decoded.push(DecodedBarcode {
                        payload: String::from_utf8_lossy(&payload).into_owned(),
                        corners,
                    });
                }
                // Located but unreadable: no result and no outline
                Err(e) => warn!(candidate = i + 1, error = %e, "QR candidate could not be decoded"),
            }
        }

        Ok(decoded)
    }
}
