//! Image preprocessing for field recognition.

use image::{DynamicImage, GrayImage, Luma};
use tracing::trace;

use crate::models::config::InkBand;
use crate::regions::Rect;

/// Map pixels inside the ink band to white and everything else to black.
///
/// Handwritten entries on the sheets use blue ink; isolating it drops the
/// printed grid and labels that confuse digit recognition.
pub fn isolate_ink(image: &DynamicImage, band: InkBand) -> DynamicImage {
    let rgb = image.to_rgb8();
    let mask = GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let pixel = rgb.get_pixel(x, y);
        if band.contains(pixel.0) {
            Luma([255])
        } else {
            Luma([0])
        }
    });
    DynamicImage::ImageLuma8(mask)
}

/// Crop a raster-space rectangle, clamped to the image bounds.
pub fn crop_region(image: &DynamicImage, rect: &Rect) -> Option<DynamicImage> {
    let (x, y, width, height) = rect.pixel_crop(image.width(), image.height())?;
    trace!("Cropping {}x{} at ({}, {})", width, height, x, y);
    Some(image.crop_imm(x, y, width, height))
}
