//! PDF processing module.

mod extractor;
mod tokens;

#[cfg(test)]
pub(crate) mod fixtures;

pub use extractor::PdfExtractor;
pub use tokens::{PageToken, TokenCollector};

use crate::error::PdfError;
use image::DynamicImage;

/// Result type for PDF operations.
pub type Result<T> = std::result::Result<T, PdfError>;

/// Trait for PDF processing implementations.
pub trait PdfProcessor {
    /// Load a PDF from bytes.
    fn load(&mut self, data: &[u8]) -> Result<()>;

    /// Get the number of pages in the PDF.
    fn page_count(&self) -> u32;

    /// Positioned text-layer tokens of a page, in top-left-origin points.
    fn page_tokens(&self, page: u32) -> Result<Vec<PageToken>>;

    /// Render a page as an image at the specified DPI.
    fn render_page(&self, page: u32, dpi: u32) -> Result<DynamicImage>;
}
