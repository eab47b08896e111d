pub mod annotate;
pub mod barcode;
pub mod board;
pub mod contours;
pub mod payload;
pub mod preprocessing;
pub mod steps;

use std::io::Cursor;
use std::panic::{catch_unwind, AssertUnwindSafe};

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, RgbImage};
use tracing::{debug, warn};

use crate::config::{BoardSpec, OutputFormat};
use crate::error::PipelineError;
use crate::models::{BoardDetection, BoardStatus, DetectionResult};

pub use barcode::{BarcodeDecoder, BarcodeError, QrDecoder};
pub use board::{BoardDetectError, BoardDetector, MarkerBoardDetector};

/// Annotated image plus structured results for one input
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub annotated_image: Vec<u8>,
    pub format: OutputFormat,
    pub detection: DetectionResult,
}

/// Board detection and barcode decoding over raw image bytes
pub struct DetectionPipeline {
    board: Box<dyn BoardDetector>,
    barcodes: Box<dyn BarcodeDecoder>,
    output: OutputFormat,
    min_markers: usize,
}

impl DetectionPipeline {
    pub fn new(board: BoardSpec, output: OutputFormat) -> Self {
        Self {
            min_markers: board.min_markers(),
            board: Box::new(MarkerBoardDetector::new(board)),
            barcodes: Box::new(QrDecoder),
            output,
        }
    }

    pub fn with_board_detector(mut self, detector: impl BoardDetector + 'static) -> Self {
        self.board = Box::new(detector);
        self
    }

    pub fn with_barcode_decoder(mut self, decoder: impl BarcodeDecoder + 'static) -> Self {
        self.barcodes = Box::new(decoder);
        self
    }

    /// Decode, detect, annotate, re-encode
    ///
    /// The board and barcode stages run side by side. Once both are done, board
    /// markers inside a decoded barcode are discarded before the board status
    /// is decided.
    pub fn process(&self, raw: &[u8]) -> Result<ProcessedImage, PipelineError> {
        let image = image::load_from_memory(raw)
            .map_err(|e| PipelineError::UnsupportedImageFormat(e.to_string()))?;
        debug!(width = image.width(), height = image.height(), "Decoded image");

        let gray = image.to_luma8();
        let (board, barcodes) = std::thread::scope(|s| {
            let board_stage = s.spawn(|| run_board_detector(self.board.as_ref(), &image));
            let barcodes = catch_unwind(AssertUnwindSafe(|| self.barcodes.decode(&gray)));
            let board = board_stage.join().unwrap_or_else(|_| BoardOutcome::Unknown);
            (board, barcodes)
        });

        let barcodes = match barcodes {
            Ok(decoded) => decoded.map_err(|e| PipelineError::BarcodeDecoder(e.0))?,
            Err(_) => {
                warn!("Barcode decoder panicked");
                return Err(PipelineError::BarcodeDecoder("decoder panicked".to_string()));
            }
        };

        let (width, height) = (image.width(), image.height());
        let regions: Vec<_> = barcodes
            .iter()
            .map(|b| annotate::expand_polygon(&b.corners, annotate::BARCODE_EXPANSION, width, height))
            .collect();

        let (status, board) = match board {
            BoardOutcome::Found(detection) => {
                match board::exclude_regions(detection, &regions, self.min_markers) {
                    Some(detection) => (BoardStatus::Detected, Some(detection)),
                    None => (BoardStatus::NotDetected, None),
                }
            }
            BoardOutcome::NotFound => (BoardStatus::NotDetected, None),
            BoardOutcome::Unknown => (BoardStatus::Unknown, None),
            BoardOutcome::Failed(message) => return Err(PipelineError::BoardDetector(message)),
        };

        let decoded_payloads: Vec<String> = barcodes.iter().map(|b| b.payload.clone()).collect();
        let parsed_payloads = decoded_payloads
            .iter()
            .map(|raw| payload::parse_payload(raw))
            .collect();

        let mut canvas = image.to_rgb8();
        if let Some(board) = &board {
            annotate::draw_board(&mut canvas, board);
        }
        annotate::draw_barcodes(&mut canvas, &barcodes);

        let annotated_image = encode(canvas, self.output)?;

        debug!(
            board = ?status,
            barcodes = decoded_payloads.len(),
            bytes = annotated_image.len(),
            "Image processed"
        );

        Ok(ProcessedImage {
            annotated_image,
            format: self.output,
            detection: DetectionResult {
                board: status,
                board_markers: board.as_ref().map_or(0, |b| b.markers.len()),
                decoded_payloads,
                parsed_payloads,
            },
        })
    }
}

enum BoardOutcome {
    Found(BoardDetection),
    NotFound,
    Unknown,
    Failed(String),
}

/// Detector errors on degenerate geometry and detector panics both become `Unknown`
fn run_board_detector(detector: &dyn BoardDetector, image: &DynamicImage) -> BoardOutcome {
    match catch_unwind(AssertUnwindSafe(|| detector.detect(image))) {
        Ok(Ok(Some(detection))) => BoardOutcome::Found(detection),
        Ok(Ok(None)) => BoardOutcome::NotFound,
        Ok(Err(BoardDetectError::Degenerate(reason))) => {
            warn!(%reason, "Board detector hit degenerate geometry");
            BoardOutcome::Unknown
        }
        Ok(Err(BoardDetectError::InvalidInput(reason))) => BoardOutcome::Failed(reason),
        Err(_) => {
            warn!("Board detector panicked");
            BoardOutcome::Unknown
        }
    }
}

fn encode(canvas: RgbImage, format: OutputFormat) -> Result<Vec<u8>, PipelineError> {
    let mut buffer = Vec::new();
    let written = match format {
        OutputFormat::Png => DynamicImage::ImageRgb8(canvas)
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png),
        OutputFormat::Jpeg { quality } => {
            JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100)).encode_image(&canvas)
        }
    };
    written.map_err(|e| PipelineError::EncodeFailure(e.to_string()))?;
    Ok(buffer)
}
