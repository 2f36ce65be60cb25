//! Configuration structures for the extraction pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Main configuration for the acta pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ActaConfig {
    /// PDF processing configuration.
    pub pdf: PdfConfig,

    /// Character-recognition configuration.
    pub ocr: OcrConfig,

    /// Consistency-check configuration.
    pub validation: ValidationConfig,

    /// Optional region catalog file; the built-in catalog is used otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regions: Option<PathBuf>,

    /// Storage collaborator configuration.
    pub storage: StorageConfig,
}

/// PDF processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    /// DPI the raster-space rectangles were measured at.
    pub render_dpi: u32,

    /// Page holding the tally sheet (1-indexed).
    pub page: u32,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            render_dpi: 122,
            page: 1,
        }
    }
}

/// Recognition engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Path or name of the tesseract binary.
    pub tesseract_path: String,

    /// Recognition language.
    pub language: String,

    /// Page segmentation mode for field crops (6 = single uniform block).
    pub digit_psm: u32,

    /// Page segmentation mode for orientation detection (0 = OSD only).
    pub osd_psm: u32,

    /// Run orientation detection before cropping.
    pub detect_rotation: bool,

    /// Color band isolated on the retry pass.
    pub ink_band: InkBand,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_path: "tesseract".to_string(),
            language: "eng".to_string(),
            digit_psm: 6,
            osd_psm: 0,
            detect_rotation: true,
            ink_band: InkBand::default(),
        }
    }
}

/// Inclusive per-channel RGB band of the ink used for handwritten entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InkBand {
    pub low: [u8; 3],
    pub high: [u8; 3],
}

impl Default for InkBand {
    fn default() -> Self {
        Self {
            low: [0, 0, 100],
            high: [100, 100, 255],
        }
    }
}

impl InkBand {
    /// Whether every channel falls inside the band.
    pub fn contains(&self, rgb: [u8; 3]) -> bool {
        rgb.iter()
            .zip(self.low.iter().zip(self.high.iter()))
            .all(|(c, (lo, hi))| c >= lo && c <= hi)
    }
}

/// What the ballot-total identity compares against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BallotTotalSource {
    /// The `total` field printed on the sheet.
    #[default]
    Form,
    /// The table's registered capacity from the capacity collaborator.
    Capacity,
}

/// How identities treat operands that were unreadable under the lenient policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroFallbackPolicy {
    /// Report the identity as skipped.
    #[default]
    Skip,
    /// Evaluate with the fallback zero.
    EvaluateAsZero,
}

/// Consistency-check configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub ballot_total: BallotTotalSource,
    pub zero_fallback: ZeroFallbackPolicy,
}

/// Storage collaborator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database receiving tally records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,
}

impl ActaConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| ConfigError::Invalid {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self).map_err(|e| ConfigError::Invalid {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
