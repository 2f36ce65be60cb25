//! Core library for vote tally-sheet extraction.
//!
//! This crate provides:
//! - A region catalog locating each field on the sheet
//! - Text-layer extraction from positioned PDF tokens
//! - Image OCR fallback with orientation correction and ink isolation
//! - Normalization and arithmetic consistency checks

pub mod error;
pub mod extract;
pub mod models;
pub mod ocr;
pub mod pdf;
pub mod pipeline;
pub mod regions;
pub mod tabular;
pub mod validate;

pub use error::{ActaError, Result};
pub use models::config::ActaConfig;
pub use models::tally::{Field, FieldSource, Normalized, NormalizedTally, RawField, RawTally, TallyFields};
pub use ocr::{BestEffort, Recognizer, TesseractCli};
pub use pdf::{PageToken, PdfExtractor, PdfProcessor};
pub use pipeline::{CapacityLookup, DocumentResult, PassSummary, PersistenceAdapter, TallyPipeline};
pub use regions::{CoordinateSpace, Rect, RegionCatalog, Truncation};
pub use tabular::{TallyRow, check_row};
pub use validate::{Discrepancy, Identity};
