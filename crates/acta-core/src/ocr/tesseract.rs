//! Tesseract command-line recognizer.

use std::io::Write;
use std::process::Command;

use image::DynamicImage;
use tracing::{debug, trace};

use super::{Recognizer, Result};
use crate::error::OcrError;
use crate::models::config::OcrConfig;

/// Runs the `tesseract` binary on temporary PNG files.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    program: String,
    language: String,
    digit_psm: u32,
    osd_psm: u32,
}

impl TesseractCli {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            program: config.tesseract_path.clone(),
            language: config.language.clone(),
            digit_psm: config.digit_psm,
            osd_psm: config.osd_psm,
        }
    }

    fn run(&self, image: &DynamicImage, args: &[&str]) -> Result<String> {
        let mut tmp = tempfile::Builder::new()
            .prefix("acta-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| OcrError::InvalidImage(format!("failed to create temp file: {}", e)))?;
        image
            .write_to(&mut tmp, image::ImageFormat::Png)
            .map_err(|e| OcrError::InvalidImage(e.to_string()))?;
        tmp.flush()
            .map_err(|e| OcrError::InvalidImage(e.to_string()))?;

        trace!("{} {} stdout {}", self.program, tmp.path().display(), args.join(" "));

        let output = Command::new(&self.program)
            .arg(tmp.path())
            .arg("stdout")
            .args(args)
            .output()
            .map_err(|source| OcrError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Engine {
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        let mut report = String::from_utf8_lossy(&output.stdout).into_owned();
        // Some builds print the OSD block on stderr.
        report.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(report)
    }
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self::new(&OcrConfig::default())
    }
}

impl Recognizer for TesseractCli {
    fn recognize_digits(&self, image: &DynamicImage) -> Result<String> {
        let psm = self.digit_psm.to_string();
        let text = self.run(image, &["-l", &self.language, "--psm", &psm, "digits"])?;
        debug!("tesseract digits: {:?}", text.trim());
        Ok(text)
    }

    fn orientation_report(&self, image: &DynamicImage) -> Result<String> {
        let psm = self.osd_psm.to_string();
        self.run(image, &["--psm", &psm])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn test_missing_binary_is_spawn_error() {
        let config = OcrConfig {
            tesseract_path: "/nonexistent/acta-tesseract".to_string(),
            ..OcrConfig::default()
        };
        let recognizer = TesseractCli::new(&config);
        let image = DynamicImage::ImageRgb8(RgbImage::new(8, 8));

        let err = recognizer.recognize_digits(&image).unwrap_err();
        assert!(matches!(err, OcrError::Spawn { .. }));
    }
}
