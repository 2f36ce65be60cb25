//! Recovers fields the text layer missed by recognizing digits on the page image.

use image::DynamicImage;
use tracing::{debug, warn};

use super::patterns::NON_DIGIT;
use crate::models::config::InkBand;
use crate::models::tally::{Field, FieldSource, RawField, RawTally};
use crate::ocr::{Recognizer, crop_region, isolate_ink};
use crate::regions::{CoordinateSpace, Rect, RegionCatalog};

/// Reduce recognizer output to its digits.
pub fn clean_digits(text: &str) -> String {
    let compact: String = text.chars().filter(|c| !c.is_whitespace() && *c != '.').collect();
    NON_DIGIT.replace_all(&compact, "").into_owned()
}

/// Crops raster regions from an upright page and runs digit recognition.
pub struct ImageOcrExtractor<'a, R> {
    catalog: &'a RegionCatalog,
    recognizer: R,
    ink_band: InkBand,
}

impl<'a, R: Recognizer> ImageOcrExtractor<'a, R> {
    pub fn new(catalog: &'a RegionCatalog, recognizer: R, ink_band: InkBand) -> Self {
        Self {
            catalog,
            recognizer,
            ink_band,
        }
    }

    /// Fill only the fields still missing in `raw`. Returns how many were filled.
    pub fn fill_missing(&self, image: &DynamicImage, raw: &mut RawTally) -> usize {
        let mut filled = 0;
        for field in raw.missing() {
            if let Some(text) = self.extract_field(field, image) {
                *raw.get_mut(field) = Some(RawField::new(text, FieldSource::ImageOcr));
                filled += 1;
            }
        }
        debug!("Image OCR filled {} fields", filled);
        filled
    }

    /// Digits recognized for one field after its raster-pass truncation rule.
    pub fn extract_field(&self, field: Field, image: &DynamicImage) -> Option<String> {
        let mut value = String::new();
        for rect in self.catalog.regions(field, CoordinateSpace::Raster) {
            value.push_str(&self.read_region(field, image, rect));
        }

        if value.is_empty() {
            debug!("{}: nothing recognized in raster regions", field);
            return None;
        }

        let result = self.catalog.rule(field, CoordinateSpace::Raster).apply(&value);
        debug!("{}: image OCR read {:?} -> {:?}", field, value, result);
        result
    }

    fn read_region(&self, field: Field, image: &DynamicImage, rect: &Rect) -> String {
        let Some(crop) = crop_region(image, rect) else {
            debug!("{}: region {:?} lies outside the image", field, rect);
            return String::new();
        };

        // A read holding only noise characters counts as empty here, so it
        // gets the ink-isolation retry too.
        let digits = self.recognize(field, &crop);
        if !digits.is_empty() {
            return digits;
        }

        debug!("{}: retrying with ink isolation", field);
        self.recognize(field, &isolate_ink(&crop, self.ink_band))
    }

    fn recognize(&self, field: Field, crop: &DynamicImage) -> String {
        match self.recognizer.recognize_digits(crop) {
            Ok(text) => clean_digits(&text),
            Err(e) => {
                warn!("{}: recognition failed: {}", field, e);
                String::new()
            }
        }
    }
}
