//! Text-layer tokens and page rasters using lopdf and pdf-extract.
//!
//! Scanned tally sheets carry the page scan as an embedded image, sometimes
//! with an invisible text layer on top. Rendering therefore means decoding
//! the page's largest image and scaling it to the page size at the requested
//! DPI, so raster rectangles line up regardless of the scan resolution.
//!
//! pdf-extract pins its own lopdf release, so the text pass parses the bytes
//! again as the `Document` type it re-exports.

use std::panic::{self, AssertUnwindSafe};

use image::imageops::FilterType;
use image::{DynamicImage, ImageBuffer, Rgb};
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, trace};

use super::tokens::{PageToken, TokenCollector};
use super::{PdfProcessor, Result};
use crate::error::PdfError;

/// US Letter, used when a page carries no usable MediaBox.
const DEFAULT_PAGE_SIZE: (f64, f64) = (612.0, 792.0);

/// PDF reader backed by lopdf.
pub struct PdfExtractor {
    document: Option<Document>,
    raw_data: Vec<u8>,
}

impl PdfExtractor {
    /// Create a new PDF extractor.
    pub fn new() -> Self {
        Self {
            document: None,
            raw_data: Vec::new(),
        }
    }

    fn document(&self) -> Result<&Document> {
        self.document
            .as_ref()
            .ok_or_else(|| PdfError::Parse("No document loaded".to_string()))
    }

    /// The document as pdf-extract's own lopdf sees it.
    fn text_document(&self) -> Result<pdf_extract::Document> {
        let mut doc = pdf_extract::Document::load_mem(&self.raw_data)
            .map_err(|e| PdfError::TextExtraction(e.to_string()))?;
        if doc.is_encrypted() {
            doc.decrypt("").map_err(|_| PdfError::Encrypted)?;
        }
        Ok(doc)
    }

    fn page_id(&self, doc: &Document, page: u32) -> Result<ObjectId> {
        doc.get_pages().get(&page).copied().ok_or(PdfError::InvalidPage(page))
    }

    /// Page size in points, from the (possibly inherited) MediaBox.
    fn page_size(&self, doc: &Document, page_id: ObjectId) -> (f64, f64) {
        let media_box = inherited_attribute(doc, page_id, b"MediaBox").and_then(|obj| match obj {
            Object::Array(values) if values.len() == 4 => {
                let nums: Vec<f64> = values.iter().filter_map(as_number).collect();
                (nums.len() == 4).then(|| ((nums[2] - nums[0]).abs(), (nums[3] - nums[1]).abs()))
            }
            _ => None,
        });
        media_box.unwrap_or(DEFAULT_PAGE_SIZE)
    }

    /// Decode every image XObject referenced by a page.
    fn page_images(&self, doc: &Document, page_id: ObjectId) -> Vec<DynamicImage> {
        let mut images = Vec::new();

        let Some(Object::Dictionary(resources)) = inherited_attribute(doc, page_id, b"Resources") else {
            return images;
        };

        if let Ok(xobjects) = resources.get(b"XObject") {
            if let Ok((_, Object::Dictionary(xobj_dict))) = doc.dereference(xobjects) {
                for (_name, obj_ref) in xobj_dict.iter() {
                    if let Ok((_, obj)) = doc.dereference(obj_ref) {
                        if let Some(img) = decode_image_object(doc, obj) {
                            images.push(img);
                        }
                    }
                }
            }
        }

        images
    }

    /// Decode every image object in the document.
    fn all_images(&self, doc: &Document) -> Vec<DynamicImage> {
        let images: Vec<DynamicImage> = doc
            .objects
            .values()
            .filter_map(|object| decode_image_object(doc, object))
            .collect();
        debug!("Found {} images in document", images.len());
        images
    }
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfProcessor for PdfExtractor {
    fn load(&mut self, data: &[u8]) -> Result<()> {
        let mut doc = Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;

        // Handle PDFs with empty password encryption
        if doc.is_encrypted() {
            if doc.decrypt("").is_err() {
                return Err(PdfError::Encrypted);
            }
            debug!("Decrypted PDF with empty password");
        }

        let page_count = doc.get_pages().len();
        if page_count == 0 {
            return Err(PdfError::NoPages);
        }

        debug!("Loaded PDF with {} pages", page_count);
        self.document = Some(doc);
        self.raw_data = data.to_vec();
        Ok(())
    }

    fn page_count(&self) -> u32 {
        self.document
            .as_ref()
            .map(|doc| doc.get_pages().len() as u32)
            .unwrap_or(0)
    }

    fn page_tokens(&self, page: u32) -> Result<Vec<PageToken>> {
        let doc = self.document()?;
        self.page_id(doc, page)?;

        let text_doc = self.text_document()?;
        let mut collector = TokenCollector::new(page);

        // pdf-extract panics on some malformed pages (a missing MediaBox, for one).
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::output_doc_page(&text_doc, &mut collector, page)
        }));
        match outcome {
            Ok(result) => result.map_err(|e| PdfError::TextExtraction(e.to_string()))?,
            Err(_) => {
                return Err(PdfError::TextExtraction(format!(
                    "text layer interpreter panicked on page {}",
                    page
                )));
            }
        }

        let tokens = collector.into_tokens();
        debug!("Collected {} text tokens from page {}", tokens.len(), page);
        Ok(tokens)
    }

    fn render_page(&self, page: u32, dpi: u32) -> Result<DynamicImage> {
        let doc = self.document()?;
        let page_id = self.page_id(doc, page)?;

        let mut images = self.page_images(doc, page_id);
        if images.is_empty() {
            debug!("No XObject images found on page {}, scanning all objects", page);
            images = self.all_images(doc);
        }

        // The page scan is the largest image; logos and stamps are smaller.
        let scan = images
            .into_iter()
            .max_by_key(|img| u64::from(img.width()) * u64::from(img.height()))
            .ok_or_else(|| PdfError::Rasterize(format!("no image found for page {}", page)))?;

        let (width_pt, height_pt) = self.page_size(doc, page_id);
        let scale = f64::from(dpi) / 72.0;
        let width = (width_pt * scale).round().max(1.0) as u32;
        let height = (height_pt * scale).round().max(1.0) as u32;

        debug!(
            "Rendering page {} at {} dpi: {}x{} scan -> {}x{}",
            page,
            dpi,
            scan.width(),
            scan.height(),
            width,
            height
        );

        if scan.width() == width && scan.height() == height {
            return Ok(scan);
        }
        Ok(scan.resize_exact(width, height, FilterType::Triangle))
    }
}

/// Look up a page attribute, walking up the page tree for inherited values.
fn inherited_attribute(doc: &Document, node_id: ObjectId, key: &[u8]) -> Option<Object> {
    let Ok(Object::Dictionary(dict)) = doc.get_object(node_id) else {
        return None;
    };

    if let Ok(value) = dict.get(key) {
        if let Ok((_, resolved)) = doc.dereference(value) {
            return Some(resolved.clone());
        }
    }

    match dict.get(b"Parent") {
        Ok(Object::Reference(parent_id)) => inherited_attribute(doc, *parent_id, key),
        _ => None,
    }
}

fn as_number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

fn decode_image_object(doc: &Document, obj: &Object) -> Option<DynamicImage> {
    let Object::Stream(stream) = obj else {
        return None;
    };
    let dict: &Dictionary = &stream.dict;

    if dict.get(b"Subtype").ok()?.as_name().ok()? != b"Image" {
        return None;
    }

    let width = dict.get(b"Width").ok()?.as_i64().ok()? as u32;
    let height = dict.get(b"Height").ok()?.as_i64().ok()? as u32;
    trace!("Found image object: {}x{}", width, height);

    if let Ok(filter) = dict.get(b"Filter") {
        let filter_name = match filter {
            Object::Name(name) => Some(name.as_slice()),
            Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
            _ => None,
        };

        match filter_name {
            Some(b"DCTDecode") => {
                return image::load_from_memory_with_format(&stream.content, image::ImageFormat::Jpeg).ok();
            }
            Some(b"JPXDecode") | Some(b"CCITTFaxDecode") | Some(b"JBIG2Decode") => {
                trace!("Unsupported image filter");
                return None;
            }
            _ => {}
        }
    }

    let data = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());

    let color_space = dict
        .get(b"ColorSpace")
        .ok()
        .and_then(|o| match o {
            Object::Name(name) => Some(name.as_slice()),
            Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
            Object::Reference(r) => doc.get_object(*r).ok().and_then(|o| o.as_name().ok()),
            _ => None,
        })
        .unwrap_or(b"DeviceRGB");

    let bits = dict
        .get(b"BitsPerComponent")
        .ok()
        .and_then(|o| o.as_i64().ok())
        .unwrap_or(8);

    image_from_raw(&data, width, height, color_space, bits)
}

fn image_from_raw(data: &[u8], width: u32, height: u32, color_space: &[u8], bits: i64) -> Option<DynamicImage> {
    if bits != 8 {
        trace!("Unsupported bits per component: {}", bits);
        return None;
    }

    let pixels = (width as usize) * (height as usize);
    let rgb: Vec<u8> = match color_space {
        b"DeviceRGB" | b"RGB" if data.len() >= pixels * 3 => data[..pixels * 3].to_vec(),
        b"DeviceGray" | b"G" if data.len() >= pixels => {
            data[..pixels].iter().flat_map(|&g| [g, g, g]).collect()
        }
        _ => {
            trace!(
                "Could not decode image: colorspace={:?}, data_len={}",
                String::from_utf8_lossy(color_space),
                data.len()
            );
            return None;
        }
    };

    ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, rgb).map(DynamicImage::ImageRgb8)
}
