use image::{Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;

use crate::models::{BoardDetection, DecodedBarcode, PixelPoint};

pub const BOARD_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const BARCODE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

pub const LINE_THICKNESS: i32 = 4;
pub const BARCODE_EXPANSION: f32 = 1.1;

/// Draw board markers and outline
pub fn draw_board(canvas: &mut RgbImage, board: &BoardDetection) {
    for marker in &board.markers {
        draw_polygon(canvas, marker, BOARD_COLOR, LINE_THICKNESS / 2);
    }
    draw_polygon(canvas, &board.outline, BOARD_COLOR, LINE_THICKNESS);
}

/// Draw each barcode outline, slightly enlarged so it does not cover the code
pub fn draw_barcodes(canvas: &mut RgbImage, barcodes: &[DecodedBarcode]) {
    let (width, height) = canvas.dimensions();
    for barcode in barcodes {
        let outline = expand_polygon(&barcode.corners, BARCODE_EXPANSION, width, height);
        draw_polygon(canvas, &outline, BARCODE_COLOR, LINE_THICKNESS);
    }
}

/// Scale a polygon about its centroid and clamp it into the image
pub fn expand_polygon(points: &[PixelPoint], factor: f32, width: u32, height: u32) -> Vec<PixelPoint> {
    if points.is_empty() {
        return Vec::new();
    }
    let n = points.len() as f32;
    let cx = points.iter().map(|p| p.x).sum::<f32>() / n;
    let cy = points.iter().map(|p| p.y).sum::<f32>() / n;
    let max_x = width.saturating_sub(1) as f32;
    let max_y = height.saturating_sub(1) as f32;

    points
        .iter()
        .map(|p| {
            PixelPoint::new(
                (cx + factor * (p.x - cx)).clamp(0.0, max_x),
                (cy + factor * (p.y - cy)).clamp(0.0, max_y),
            )
        })
        .collect()
}

/// Closed polygon outline, `thickness` pixels wide
pub fn draw_polygon(canvas: &mut RgbImage, points: &[PixelPoint], color: Rgb<u8>, thickness: i32) {
    if points.len() < 2 {
        return;
    }
    let half = thickness.max(1) / 2;
    for (i, start) in points.iter().enumerate() {
        let end = &points[(i + 1) % points.len()];
        for offset in -half..=half {
            let o = offset as f32;
            draw_line_segment_mut(canvas, (start.x + o, start.y), (end.x + o, end.y), color);
            draw_line_segment_mut(canvas, (start.x, start.y + o), (end.x, end.y + o), color);
        }
    }
}
