//! Field extraction passes over a single tally sheet.

pub mod image_ocr;
pub mod patterns;
pub mod text_layer;

pub use image_ocr::ImageOcrExtractor;
pub use text_layer::TextLayerExtractor;
