mod common;

use boardscan::detection::{BarcodeDecoder, BarcodeError, MarkerBoardDetector};
use boardscan::models::{BoardDetection, DecodedBarcode};
use image::{DynamicImage, GrayImage};
use serde_json::json;
use common::*;

struct DegenerateDetector;

impl BoardDetector for DegenerateDetector {
    fn detect(&self, _image: &DynamicImage) -> Result<Option<BoardDetection>, BoardDetectError> {
        Err(BoardDetectError::Degenerate("collinear corners".to_string()))
    }
}

struct PanickingDetector;

impl BoardDetector for PanickingDetector {
    fn detect(&self, _image: &DynamicImage) -> Result<Option<BoardDetection>, BoardDetectError> {
        panic!("detector blew up");
    }
}

struct RejectingDetector;

impl BoardDetector for RejectingDetector {
    fn detect(&self, _image: &DynamicImage) -> Result<Option<BoardDetection>, BoardDetectError> {
        Err(BoardDetectError::InvalidInput("unsupported channel layout".to_string()))
    }
}

struct PanickingDecoder;

impl BarcodeDecoder for PanickingDecoder {
    fn decode(&self, _image: &GrayImage) -> Result<Vec<DecodedBarcode>, BarcodeError> {
        panic!("decoder blew up");
    }
}

struct FixedDecoder(Vec<&'static str>);

impl BarcodeDecoder for FixedDecoder {
    fn decode(&self, _image: &GrayImage) -> Result<Vec<DecodedBarcode>, BarcodeError> {
        Ok(self
            .0
            .iter()
            .map(|payload| DecodedBarcode {
                payload: payload.to_string(),
                corners: Vec::new(),
            })
            .collect())
    }
}

fn pipeline() -> DetectionPipeline {
    DetectionPipeline::new(BoardSpec::default(), OutputFormat::Png)
}

fn png(image: GrayImage) -> Vec<u8> {
    png_bytes(&DynamicImage::ImageLuma8(image))
}

#[test]
fn test_blank_image_has_no_board_and_no_barcodes() -> anyhow::Result<()> {
    let processed = pipeline().process(&png(blank_image(200, 150)))?;

    assert_eq!(processed.detection.board, BoardStatus::NotDetected);
    assert!(processed.detection.decoded_payloads.is_empty());
    assert!(processed.detection.parsed_payloads.is_empty());
    Ok(())
}

#[test]
fn test_marker_grid_is_detected() -> anyhow::Result<()> {
    let processed = pipeline().process(&png(board_image()))?;

    assert_eq!(processed.detection.board, BoardStatus::Detected);
    assert_eq!(processed.detection.board_markers, 12);
    Ok(())
}

#[test]
fn test_candidates_come_from_step_pipeline() -> anyhow::Result<()> {
    let detector = MarkerBoardDetector::new(BoardSpec::default());
    let candidates = detector.find_candidates(&DynamicImage::ImageLuma8(board_image()))?;
    assert_eq!(candidates.len(), 12);
    assert!(candidates.iter().all(|c| (28.0..=32.0).contains(&c.side())));
    Ok(())
}

#[test]
fn test_debug_dump_writes_step_images() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let detector = MarkerBoardDetector::new(BoardSpec::default()).with_debug(dir.path().to_path_buf())?;
    detector.find_candidates(&DynamicImage::ImageLuma8(board_image()))?;

    assert!(dir.path().join("00_input").join("01.png").exists());
    assert!(dir.path().join("03_threshold").join("01.png").exists());
    Ok(())
}

#[test]
fn test_qr_json_payload_is_parsed() -> anyhow::Result<()> {
    let processed = pipeline().process(&png(qr_image(r#"{"plot":7,"crop":"wheat"}"#)))?;

    assert_eq!(processed.detection.decoded_payloads, vec![r#"{"plot":7,"crop":"wheat"}"#]);
    assert_eq!(
        processed.detection.parsed_payloads,
        vec![Some(json!({"plot": 7, "crop": "wheat"}))]
    );
    Ok(())
}

#[test]
fn test_qr_plain_text_keeps_raw_payload() -> anyhow::Result<()> {
    let processed = pipeline().process(&png(qr_image("hello")))?;

    assert_eq!(processed.detection.decoded_payloads, vec!["hello"]);
    assert_eq!(processed.detection.parsed_payloads, vec![None]);
    Ok(())
}

#[test]
fn test_qr_code_alone_is_not_a_board() -> anyhow::Result<()> {
    let payloads = ["hello", r#"{"plot":12,"crop":"barley","row":"north","rep":3}"#];

    for module in [12, 16] {
        for payload in payloads {
            let processed = pipeline().process(&png(qr_image_with_module(payload, module)))?;

            assert_eq!(processed.detection.decoded_payloads, vec![payload], "module {module}");
            assert_eq!(processed.detection.board, BoardStatus::NotDetected, "module {module}");
            assert_eq!(processed.detection.board_markers, 0);
        }
    }
    Ok(())
}

#[test]
fn test_board_and_qr_code_are_both_found() -> anyhow::Result<()> {
    let page = side_by_side(&board_image(), &qr_image(r#"{"a":1}"#));
    let processed = pipeline().process(&png(page))?;

    assert_eq!(processed.detection.board, BoardStatus::Detected);
    assert_eq!(processed.detection.board_markers, 12);
    assert_eq!(processed.detection.decoded_payloads, vec![r#"{"a":1}"#]);
    assert_eq!(processed.detection.parsed_payloads, vec![Some(json!({"a": 1}))]);

    let annotated = image::load_from_memory(&processed.annotated_image)?.to_rgb8();
    let count = |color| annotated.pixels().filter(|p| **p == color).count();
    assert!(count(boardscan::detection::annotate::BOARD_COLOR) > 0);
    assert!(count(boardscan::detection::annotate::BARCODE_COLOR) > 0);
    Ok(())
}

#[test]
fn test_payloads_stay_aligned_with_raw_order() -> anyhow::Result<()> {
    let pipeline = pipeline().with_barcode_decoder(FixedDecoder(vec!["hello", "{\"a\":1}"]));
    let processed = pipeline.process(&png(blank_image(50, 50)))?;

    assert_eq!(processed.detection.decoded_payloads, vec!["hello", "{\"a\":1}"]);
    assert_eq!(processed.detection.parsed_payloads, vec![None, Some(json!({"a": 1}))]);
    Ok(())
}

#[test]
fn test_corrupt_bytes_are_unsupported_format() {
    let result = pipeline().process(b"definitely not an image");
    assert!(matches!(result, Err(PipelineError::UnsupportedImageFormat(_))));
}

#[test]
fn test_degenerate_detector_gives_unknown() -> anyhow::Result<()> {
    let pipeline = pipeline().with_board_detector(DegenerateDetector);
    let processed = pipeline.process(&png(board_image()))?;

    assert_eq!(processed.detection.board, BoardStatus::Unknown);
    assert_eq!(processed.detection.board_detected(), None);
    Ok(())
}

#[test]
fn test_panicking_detector_gives_unknown() -> anyhow::Result<()> {
    let pipeline = pipeline().with_board_detector(PanickingDetector);
    let processed = pipeline.process(&png(blank_image(64, 64)))?;

    assert_eq!(processed.detection.board, BoardStatus::Unknown);
    Ok(())
}

#[test]
fn test_panicking_decoder_is_a_pipeline_error() {
    let pipeline = pipeline().with_barcode_decoder(PanickingDecoder);
    let result = pipeline.process(&png(board_image()));
    assert!(matches!(result, Err(PipelineError::BarcodeDecoder(_))));
}

#[test]
fn test_rejected_input_is_a_pipeline_error() {
    let pipeline = pipeline().with_board_detector(RejectingDetector);
    let result = pipeline.process(&png(blank_image(64, 64)));
    assert!(matches!(result, Err(PipelineError::BoardDetector(_))));
}

#[test]
fn test_annotated_output_matches_input_size() -> anyhow::Result<()> {
    let processed = pipeline().process(&png(board_image()))?;
    assert_eq!(processed.format, OutputFormat::Png);

    let annotated = image::load_from_memory(&processed.annotated_image)?.to_rgb8();
    assert_eq!(annotated.dimensions(), (BOARD_SIDE, BOARD_SIDE));
    let outline_pixels = annotated
        .pixels()
        .filter(|p| **p == boardscan::detection::annotate::BOARD_COLOR)
        .count();
    assert!(outline_pixels > 0);
    Ok(())
}

#[test]
fn test_jpeg_output_is_decodable() -> anyhow::Result<()> {
    let pipeline = DetectionPipeline::new(BoardSpec::default(), OutputFormat::Jpeg { quality: 80 });
    let processed = pipeline.process(&png(blank_image(80, 60)))?;

    let decoded = image::load_from_memory(&processed.annotated_image)?;
    assert_eq!((decoded.width(), decoded.height()), (80, 60));
    Ok(())
}
