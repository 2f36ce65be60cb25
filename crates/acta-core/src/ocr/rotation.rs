//! Page orientation detection and correction.

use image::DynamicImage;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

use super::{BestEffort, Recognizer};

lazy_static! {
    // Orientation line of a Tesseract OSD report.
    static ref ROTATE_LINE: Regex = Regex::new(r"Rotate:\s*(\d+)").unwrap();
}

/// A page image after orientation correction.
#[derive(Debug, Clone)]
pub struct Corrected {
    pub image: DynamicImage,
    /// Clockwise rotation applied, or the fallback 0 with its cause.
    pub angle: BestEffort<u32>,
}

/// Detects page orientation and rotates the page upright.
pub struct RotationCorrector<R> {
    recognizer: R,
}

impl<R: Recognizer> RotationCorrector<R> {
    pub fn new(recognizer: R) -> Self {
        Self { recognizer }
    }

    /// Clockwise quarter turn needed to make the page upright.
    pub fn detect(&self, image: &DynamicImage) -> BestEffort<u32> {
        let report = match self.recognizer.orientation_report(image) {
            Ok(report) => report,
            Err(e) => {
                warn!("Orientation detection failed, assuming upright: {}", e);
                return BestEffort::fallback(0, e.to_string());
            }
        };

        match parse_rotation(&report) {
            Ok(angle) => {
                debug!("Detected page rotation: {}°", angle);
                BestEffort::detected(angle)
            }
            Err(cause) => {
                warn!("Orientation detection unusable, assuming upright: {}", cause);
                BestEffort::fallback(0, cause)
            }
        }
    }

    /// Detect the orientation and rotate the image upright.
    pub fn correct(&self, image: DynamicImage) -> Corrected {
        let angle = self.detect(&image);
        let image = rotate_upright(image, *angle.value());
        Corrected { image, angle }
    }
}

/// Extract the quarter-turn angle from an orientation report.
pub fn parse_rotation(report: &str) -> Result<u32, String> {
    let caps = ROTATE_LINE
        .captures(report)
        .ok_or_else(|| "no Rotate line in orientation report".to_string())?;
    let angle: u32 = caps[1]
        .parse()
        .map_err(|e| format!("invalid rotation {:?}: {}", &caps[1], e))?;

    match angle {
        0 | 90 | 180 | 270 => Ok(angle),
        other => Err(format!("rotation {}° is not a quarter turn", other)),
    }
}

/// Rotate clockwise by a quarter-turn angle; the canvas grows to fit.
pub fn rotate_upright(image: DynamicImage, angle: u32) -> DynamicImage {
    match angle {
        90 => image.rotate90(),
        180 => image.rotate180(),
        270 => image.rotate270(),
        _ => image,
    }
}
