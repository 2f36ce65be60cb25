//! Error types for the acta-core library.

use thiserror::Error;

use crate::models::tally::Field;

/// Main error type for the acta library.
#[derive(Error, Debug)]
pub enum ActaError {
    /// PDF processing error.
    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    /// OCR processing error.
    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Persistence collaborator error.
    #[error("persistence error: {0}")]
    Persist(#[from] PersistError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to PDF processing.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// Failed to read the text layer.
    #[error("failed to extract text layer: {0}")]
    TextExtraction(String),

    /// Failed to produce a raster image of a page.
    #[error("failed to rasterize page: {0}")]
    Rasterize(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// Invalid page number requested.
    #[error("invalid page number: {0}")]
    InvalidPage(u32),
}

/// Errors related to the character-recognition engine.
#[derive(Error, Debug)]
pub enum OcrError {
    /// The engine binary could not be started.
    #[error("failed to run recognizer '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The engine ran but reported failure.
    #[error("recognizer exited with {status}: {stderr}")]
    Engine { status: String, stderr: String },

    /// The image could not be handed to the engine.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// The engine output did not contain what was asked for.
    #[error("unexpected recognizer report: {0}")]
    Report(String),
}

/// Errors detected while loading configuration or the region catalog.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The region catalog has no entry for a field.
    #[error("region catalog has no entry for field {0}")]
    MissingField(Field),

    /// The region catalog names a field twice.
    #[error("region catalog defines field {0} more than once")]
    DuplicateField(Field),

    /// A field entry has no rectangle for one of the coordinate spaces.
    #[error("field {field} has no {space} rectangles")]
    NoRegions { field: Field, space: &'static str },

    /// The file could not be parsed.
    #[error("invalid configuration file {path}: {reason}")]
    Invalid { path: String, reason: String },

    /// The file could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reported by a persistence adapter.
#[derive(Error, Debug)]
pub enum PersistError {
    /// No polling table is registered under the extracted code.
    #[error("no polling table registered for code {0}")]
    UnknownTable(String),

    /// The table code itself could not be read from the document.
    #[error("table code was not read; record cannot be linked")]
    MissingTableCode,

    /// The backing store failed.
    #[error("storage failure: {0}")]
    Storage(String),
}

/// Result type for the acta library.
pub type Result<T> = std::result::Result<T, ActaError>;
