use crate::pipeline::{PipelineData, PipelineStep, PipelineContext, BoundingBox, MetadataValue};
use crate::detection::{preprocessing, contours};
use crate::models::Contour;
use anyhow::Result;
use image::{DynamicImage, GenericImageView};

/// Convert image to grayscale
pub struct GrayscaleStep;

impl PipelineStep for GrayscaleStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();
        for item in data {
            let gray = preprocessing::to_grayscale(&item.image);
            result.push(item.with_image(DynamicImage::ImageLuma8(gray)));
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "Grayscale Conversion"
    }
}

/// Apply Gaussian blur
pub struct BlurStep {
    pub sigma: f32,
}

impl PipelineStep for BlurStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();
        for item in data {
            let gray = item.image.to_luma8();
            let blurred = preprocessing::apply_blur(&gray, self.sigma);
            result.push(item.with_image(DynamicImage::ImageLuma8(blurred)));
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "Gaussian Blur"
    }
}

/// Otsu binarization, dark ink becomes foreground
pub struct ThresholdStep;

impl PipelineStep for ThresholdStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();
        for item in data {
            let gray = item.image.to_luma8();
            let binary = preprocessing::threshold_dark(&gray);
            result.push(item.with_image(DynamicImage::ImageLuma8(binary)));
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "Threshold"
    }
}

/// Split a binary image into one item per foreground region
pub struct ContourDetectionStep {
    pub min_area: u32,
}

impl PipelineStep for ContourDetectionStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();

        for item in data {
            let binary = item.image.to_luma8();
            let detected_contours = contours::find_contours(&binary, self.min_area);

            for contour in detected_contours {
                let bbox = BoundingBox {
                    x: contour.min_x,
                    y: contour.min_y,
                    width: contour.width(),
                    height: contour.height(),
                };

                let cropped = item.image.crop_imm(bbox.x, bbox.y, bbox.width, bbox.height);

                let region = PipelineData::from_region(cropped, item.original.clone(), bbox)
                    .with_metadata("contour_label", MetadataValue::Int(contour.label as i64))
                    .with_metadata("pixel_count", MetadataValue::Int(contour.pixel_count as i64))
                    .with_metadata("side", MetadataValue::Float(contour.side()))
                    .with_metadata("fill_ratio", MetadataValue::Float(contour.fill_ratio()))
                    .with_metadata("aspect_ratio", MetadataValue::Float(contour.aspect_ratio()));

                result.push(region);
            }
        }

        Ok(result)
    }

    fn name(&self) -> &str {
        "Contour Detection"
    }
}

/// Keep solid, roughly square regions of plausible marker size
pub struct SquareFilterStep {
    pub min_side: f32,
    /// Upper bound on side length relative to the shorter image dimension
    pub max_side_fraction: f32,
    pub min_fill_ratio: f32,
}

impl PipelineStep for SquareFilterStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();

        for item in data {
            let side = item.get_float("side").unwrap_or(0.0);
            let fill = item.get_float("fill_ratio").unwrap_or(0.0);
            let aspect = item.get_float("aspect_ratio").unwrap_or(0.0);

            let (img_width, img_height) = item.original.as_ref().dimensions();
            let max_side = img_width.min(img_height) as f32 * self.max_side_fraction;

            let is_marker = side >= self.min_side
                && side <= max_side
                && fill >= self.min_fill_ratio
                && (0.7..=1.4).contains(&aspect);

            if is_marker {
                result.push(item);
            }
        }

        Ok(result)
    }

    fn name(&self) -> &str {
        "Square Filtering"
    }
}

/// Rebuild the contour a region item was cut from
pub fn contour_from_metadata(item: &PipelineData) -> Result<Contour> {
    let bbox = item
        .bbox
        .ok_or_else(|| anyhow::anyhow!("Item is not an image region"))?;
    let field = |key: &str| -> Result<u32> {
        item.get_int(key)
            .map(|v| v as u32)
            .ok_or_else(|| anyhow::anyhow!("Missing {}", key))
    };

    Ok(Contour {
        label: field("contour_label")?,
        min_x: bbox.x,
        min_y: bbox.y,
        max_x: bbox.x + bbox.width - 1,
        max_y: bbox.y + bbox.height - 1,
        pixel_count: field("pixel_count")?,
    })
}
