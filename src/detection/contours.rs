use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};
use std::collections::HashMap;
use crate::models::Contour;

/// Find foreground regions in a binary image using connected components
///
/// Four-connectivity keeps checkerboard squares that only touch at a corner apart.
pub fn find_contours(binary: &GrayImage, min_area: u32) -> Vec<Contour> {
    let labeled = connected_components(binary, Connectivity::Four, Luma([0]));

    let mut regions: HashMap<u32, (u32, u32, u32, u32, u32)> = HashMap::new();

    for (x, y, label) in labeled.enumerate_pixels() {
        let label_val = label[0];
        if label_val == 0 {
            continue; // Background
        }

        regions.entry(label_val)
            .and_modify(|(min_x, min_y, max_x, max_y, count)| {
                *min_x = (*min_x).min(x);
                *min_y = (*min_y).min(y);
                *max_x = (*max_x).max(x);
                *max_y = (*max_y).max(y);
                *count += 1;
            })
            .or_insert((x, y, x, y, 1));
    }

    let mut contours: Vec<Contour> = regions.into_iter()
        .map(|(label, (min_x, min_y, max_x, max_y, count))| {
            Contour {
                label,
                min_x,
                min_y,
                max_x,
                max_y,
                pixel_count: count,
            }
        })
        .filter(|c| c.pixel_count >= min_area)
        .collect();

    // HashMap order is random; keep results stable
    contours.sort_by_key(|c| (c.min_y, c.min_x, c.label));
    contours
}
