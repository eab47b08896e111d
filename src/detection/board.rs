use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use image::DynamicImage;
use thiserror::Error;
use tracing::debug;

use crate::config::BoardSpec;
use crate::detection::steps::{
    contour_from_metadata, BlurStep, ContourDetectionStep, GrayscaleStep, SquareFilterStep,
    ThresholdStep,
};
use crate::models::{BoardDetection, Contour, PixelPoint};
use crate::pipeline::Pipeline;

#[derive(Debug, Clone, Error)]
pub enum BoardDetectError {
    /// The input cannot be analysed at all
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Geometry the detector cannot reason about
    #[error("degenerate geometry: {0}")]
    Degenerate(String),
}

/// Black-box board detector contract
pub trait BoardDetector: Send + Sync {
    /// `Ok(None)` means the detector ran cleanly and found no board
    fn detect(&self, image: &DynamicImage) -> Result<Option<BoardDetection>, BoardDetectError>;
}

/// Marker-lattice detector driven by a [`BoardSpec`]
///
/// Looks for the printed markers of a ChArUco-style board: solid dark squares
/// of one size sitting on the nodes of a square grid no larger than the board.
/// Candidate squares come out of a composable step pipeline and
/// [`locate_board`] does the lattice check.
pub struct MarkerBoardDetector {
    spec: BoardSpec,
    candidates: Pipeline,
}

impl MarkerBoardDetector {
    pub fn new(spec: BoardSpec) -> Self {
        let candidates = Self::candidate_pipeline(&spec);
        Self { spec, candidates }
    }

    /// Dump every intermediate candidate image into `dir`
    pub fn with_debug(mut self, dir: PathBuf) -> anyhow::Result<Self> {
        self.candidates = self.candidates.with_debug(dir)?;
        Ok(self)
    }

    fn candidate_pipeline(spec: &BoardSpec) -> Pipeline {
        let min_side = spec.min_marker_side_px as f32;
        let min_area = ((min_side * min_side) * spec.min_fill_ratio * 0.5).max(1.0) as u32;

        Pipeline::new()
            .add_step(Arc::new(GrayscaleStep))
            .add_step(Arc::new(BlurStep { sigma: spec.blur_sigma }))
            .add_step(Arc::new(ThresholdStep))
            .add_step(Arc::new(ContourDetectionStep { min_area }))
            .add_step(Arc::new(SquareFilterStep {
                min_side,
                max_side_fraction: 0.5,
                min_fill_ratio: spec.min_fill_ratio,
            }))
    }

    /// Candidate marker squares, before the lattice check
    pub fn find_candidates(&self, image: &DynamicImage) -> Result<Vec<Contour>, BoardDetectError> {
        let items = self
            .candidates
            .run(image.clone())
            .map_err(|e| BoardDetectError::InvalidInput(e.to_string()))?;

        items
            .iter()
            .map(contour_from_metadata)
            .collect::<anyhow::Result<Vec<_>>>()
            .map_err(|e| BoardDetectError::InvalidInput(e.to_string()))
    }
}

impl BoardDetector for MarkerBoardDetector {
    fn detect(&self, image: &DynamicImage) -> Result<Option<BoardDetection>, BoardDetectError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(BoardDetectError::InvalidInput("image has no pixels".to_string()));
        }

        let candidates = self.find_candidates(image)?;
        debug!(candidates = candidates.len(), "Board marker candidates");

        locate_board(&candidates, &self.spec)
    }
}

/// Keep the markers that form a consistent lattice
pub fn locate_board(
    candidates: &[Contour],
    spec: &BoardSpec,
) -> Result<Option<BoardDetection>, BoardDetectError> {
    let min_markers = spec.min_markers();
    if candidates.len() < min_markers {
        return Ok(None);
    }

    let median_side = median(candidates.iter().map(|c| c.side()).collect())
        .ok_or_else(|| BoardDetectError::Degenerate("no marker sizes".to_string()))?;
    if !median_side.is_finite() || median_side <= 0.0 {
        return Err(BoardDetectError::Degenerate(format!("median marker side {median_side}")));
    }

    let sized: Vec<&Contour> = candidates
        .iter()
        .filter(|c| (c.side() - median_side).abs() <= spec.size_tolerance * median_side)
        .collect();
    if sized.len() < min_markers {
        return Ok(None);
    }

    let centers: Vec<PixelPoint> = sized.iter().map(|c| c.center()).collect();
    let nearest: Vec<f32> = centers
        .iter()
        .enumerate()
        .map(|(i, p)| {
            centers
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, q)| p.distance(q))
                .fold(f32::INFINITY, f32::min)
        })
        .collect();

    let pitch = median(nearest.clone())
        .ok_or_else(|| BoardDetectError::Degenerate("no marker spacing".to_string()))?;
    if !pitch.is_finite() || pitch <= 0.0 {
        return Err(BoardDetectError::Degenerate(format!("marker pitch {pitch}")));
    }
    // Separate components whose centres are closer than one side cannot be distinct markers
    if pitch < median_side {
        return Ok(None);
    }

    let low = pitch * (1.0 - spec.pitch_tolerance);
    let high = pitch * (1.0 + spec.pitch_tolerance);
    let markers: Vec<&Contour> = sized
        .iter()
        .zip(nearest.iter())
        .filter(|(_, d)| **d >= low && **d <= high)
        .map(|(c, _)| *c)
        .collect();

    if markers.len() < min_markers {
        return Ok(None);
    }

    let Some(aligned) = align_to_grid(&markers, spec) else {
        debug!(markers = markers.len(), pitch, "Markers do not sit on a board grid");
        return Ok(None);
    };

    debug!(
        markers = aligned.len(),
        pitch,
        side = median_side,
        required = min_markers,
        expected = spec.expected_markers(),
        "Board lattice check"
    );

    if aligned.len() < min_markers || aligned.len() > spec.expected_markers() {
        return Ok(None);
    }

    Ok(Some(board_from_markers(aligned.iter().map(|c| c.corners()).collect())))
}

/// Keep the markers that sit on one square grid, inside a board-sized window
///
/// The grid step is the larger axis offset to each marker's nearest
/// neighbour, which covers both row neighbours and the diagonal neighbours of
/// a checkerboard layout. The window is the `squares_x` by `squares_y` block
/// of grid nodes (either orientation) holding the most markers. `None` when
/// two markers claim the same node.
fn align_to_grid<'a>(markers: &[&'a Contour], spec: &BoardSpec) -> Option<Vec<&'a Contour>> {
    let centers: Vec<PixelPoint> = markers.iter().map(|c| c.center()).collect();
    let steps: Vec<f32> = centers
        .iter()
        .enumerate()
        .filter_map(|(i, p)| {
            centers
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .min_by(|(_, a), (_, b)| p.distance(a).total_cmp(&p.distance(b)))
                .map(|(_, q)| (q.x - p.x).abs().max((q.y - p.y).abs()))
        })
        .collect();

    let step = median(steps)?;
    if !step.is_finite() || step <= 0.0 {
        return None;
    }
    let tolerance = spec.pitch_tolerance * step;

    let nodes = centers
        .iter()
        .map(|anchor| {
            centers
                .iter()
                .map(|p| grid_node(anchor, p, step, tolerance))
                .collect::<Vec<_>>()
        })
        .max_by_key(|nodes| nodes.iter().flatten().count())?;

    let mut occupied = BTreeSet::new();
    let mut placed = Vec::new();
    for (marker, node) in markers.iter().zip(nodes) {
        let Some(node) = node else { continue };
        if !occupied.insert(node) {
            return None;
        }
        placed.push((*marker, node));
    }

    let (sx, sy) = (i64::from(spec.squares_x), i64::from(spec.squares_y));
    let mut window = None;
    let mut best = 0;
    for (w, h) in [(sx, sy), (sy, sx)] {
        for &(i0, _) in &occupied {
            for &(_, j0) in &occupied {
                let candidate = GridWindow { i0, j0, w, h };
                let count = occupied.iter().filter(|node| candidate.contains(node)).count();
                if count > best {
                    best = count;
                    window = Some(candidate);
                }
            }
        }
    }
    let window = window?;

    let total = placed.len();
    let kept: Vec<&Contour> = placed
        .into_iter()
        .filter(|(_, node)| window.contains(node))
        .map(|(marker, _)| marker)
        .collect();
    if kept.len() < total {
        debug!(dropped = total - kept.len(), "Grid markers outside the board window");
    }
    Some(kept)
}

#[derive(Debug, Clone, Copy)]
struct GridWindow {
    i0: i64,
    j0: i64,
    w: i64,
    h: i64,
}

impl GridWindow {
    fn contains(&self, &(i, j): &(i64, i64)) -> bool {
        i >= self.i0 && i < self.i0 + self.w && j >= self.j0 && j < self.j0 + self.h
    }
}

/// Grid node of `point` relative to `anchor`, if it sits close enough to one
fn grid_node(anchor: &PixelPoint, point: &PixelPoint, step: f32, tolerance: f32) -> Option<(i64, i64)> {
    let fx = (point.x - anchor.x) / step;
    let fy = (point.y - anchor.y) / step;
    let (i, j) = (fx.round(), fy.round());
    if ((fx - i) * step).abs() <= tolerance && ((fy - j) * step).abs() <= tolerance {
        Some((i as i64, j as i64))
    } else {
        None
    }
}

/// Drop markers whose centre lies inside any of `regions`
///
/// Used with decoded barcode outlines: the solid blocks of a QR code look like
/// markers but never belong to the board. `None` when fewer than `min_markers`
/// are left.
pub fn exclude_regions(
    detection: BoardDetection,
    regions: &[Vec<PixelPoint>],
    min_markers: usize,
) -> Option<BoardDetection> {
    let BoardDetection { markers, outline } = detection;
    let before = markers.len();
    let kept: Vec<Vec<PixelPoint>> = markers
        .into_iter()
        .filter(|marker| {
            let center = centroid(marker);
            !regions.iter().any(|region| contains(region, &center))
        })
        .collect();

    if kept.len() == before {
        return Some(BoardDetection { markers: kept, outline });
    }
    debug!(removed = before - kept.len(), kept = kept.len(), "Markers inside barcode regions");
    if kept.len() < min_markers {
        return None;
    }
    Some(board_from_markers(kept))
}

/// Markers plus their bounding rectangle as the outline
fn board_from_markers(markers: Vec<Vec<PixelPoint>>) -> BoardDetection {
    let points = || markers.iter().flatten();
    let min_x = points().map(|p| p.x).fold(f32::INFINITY, f32::min);
    let min_y = points().map(|p| p.y).fold(f32::INFINITY, f32::min);
    let max_x = points().map(|p| p.x).fold(f32::NEG_INFINITY, f32::max);
    let max_y = points().map(|p| p.y).fold(f32::NEG_INFINITY, f32::max);

    let outline = vec![
        PixelPoint::new(min_x, min_y),
        PixelPoint::new(max_x, min_y),
        PixelPoint::new(max_x, max_y),
        PixelPoint::new(min_x, max_y),
    ];
    BoardDetection { markers, outline }
}

fn centroid(points: &[PixelPoint]) -> PixelPoint {
    let n = points.len().max(1) as f32;
    PixelPoint::new(
        points.iter().map(|p| p.x).sum::<f32>() / n,
        points.iter().map(|p| p.y).sum::<f32>() / n,
    )
}

/// Even-odd ray cast
fn contains(polygon: &[PixelPoint], point: &PixelPoint) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for (i, a) in polygon.iter().enumerate() {
        let b = &polygon[j];
        if (a.y > point.y) != (b.y > point.y) {
            let cross_x = a.x + (point.y - a.y) / (b.y - a.y) * (b.x - a.x);
            if point.x < cross_x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn median(mut values: Vec<f32>) -> Option<f32> {
    if values.is_empty() || values.iter().any(|v| v.is_nan()) {
        return None;
    }
    values.sort_by(f32::total_cmp);
    Some(values[values.len() / 2])
}
