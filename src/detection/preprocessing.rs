use image::{DynamicImage, GrayImage};
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use imageproc::filter::gaussian_blur_f32;

/// Convert image to grayscale
pub fn to_grayscale(img: &DynamicImage) -> GrayImage {
    img.to_luma8()
}

/// Apply Gaussian blur to reduce noise
pub fn apply_blur(img: &GrayImage, sigma: f32) -> GrayImage {
    if sigma <= 0.0 {
        return img.clone();
    }
    gaussian_blur_f32(img, sigma)
}

/// Binarize with Otsu's level so that dark ink becomes foreground (255)
pub fn threshold_dark(img: &GrayImage) -> GrayImage {
    let level = otsu_level(img);
    threshold(img, level, ThresholdType::BinaryInverted)
}
