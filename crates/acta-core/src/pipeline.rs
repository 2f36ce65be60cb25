//! Per-document extraction pipeline.
//!
//! Text layer first, then (only if a field is still missing) rotation
//! correction and image OCR, then lenient normalization and the consistency
//! checks. Every document yields a [`DocumentResult`]; failures along the way
//! are logged and recorded, never returned.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, PersistError};
use crate::extract::{ImageOcrExtractor, TextLayerExtractor};
use crate::models::config::{ActaConfig, BallotTotalSource};
use crate::models::tally::{Field, FieldSource, NormalizedTally, RawTally};
use crate::ocr::{BestEffort, Recognizer, RotationCorrector};
use crate::pdf::{PdfExtractor, PdfProcessor};
use crate::regions::RegionCatalog;
use crate::validate::{ConsistencyValidator, Discrepancy, ExpectedTotal, FieldNormalizer};

/// Registry of polling-table capacities.
pub trait CapacityLookup {
    /// Registered capacity of a table, or `None` when unknown.
    fn capacity(&self, table_code: &str) -> Option<i64>;
}

impl CapacityLookup for HashMap<String, i64> {
    fn capacity(&self, table_code: &str) -> Option<i64> {
        self.get(table_code).copied()
    }
}

/// Downstream storage for processed documents.
pub trait PersistenceAdapter {
    /// Store one document. Failures are reported to the caller, who decides
    /// whether to log them; they never affect the result itself.
    fn persist(&mut self, result: &DocumentResult) -> Result<(), PersistError>;
}

/// What each pass contributed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PassSummary {
    /// Fields resolved from the text layer.
    pub text_fields: usize,
    /// Whether the image pass ran.
    pub ocr_used: bool,
    /// Fields resolved by image OCR.
    pub ocr_fields: usize,
    /// Rotation applied before OCR; `None` when detection did not run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<BestEffort<u32>>,
    /// Why the text layer was unusable, if it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_layer_error: Option<String>,
    /// Why no page image was available, if it was not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raster_error: Option<String>,
}

/// Everything known about one processed tally sheet.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentResult {
    /// File name or other caller-supplied label.
    pub source: String,
    /// Size of the document in bytes.
    pub byte_size: u64,
    /// Raw strings as recovered by the passes.
    pub raw: RawTally,
    /// Normalized values.
    pub fields: NormalizedTally,
    /// Findings, in normalization then identity order.
    pub discrepancies: Vec<Discrepancy>,
    pub passes: PassSummary,
    /// Processing time in milliseconds.
    pub processing_time_ms: u64,
}

impl DocumentResult {
    /// No findings at all.
    pub fn is_consistent(&self) -> bool {
        self.discrepancies.is_empty()
    }

    /// Findings as report lines.
    pub fn messages(&self) -> Vec<String> {
        self.discrepancies.iter().map(ToString::to_string).collect()
    }

    /// The table code exactly as read, leading zeros included.
    pub fn table_code(&self) -> Option<&str> {
        self.raw.text(Field::TableCode)
    }

    /// Size in whole kilobytes.
    pub fn size_kb(&self) -> u64 {
        self.byte_size / 1024
    }
}

/// Hybrid extraction and validation for single-page tally sheets.
pub struct TallyPipeline<R> {
    catalog: Arc<RegionCatalog>,
    config: ActaConfig,
    recognizer: R,
}

impl<R: Recognizer> TallyPipeline<R> {
    pub fn new(catalog: Arc<RegionCatalog>, config: ActaConfig, recognizer: R) -> Self {
        Self {
            catalog,
            config,
            recognizer,
        }
    }

    /// Build a pipeline, loading the region catalog named in the configuration.
    pub fn from_config(config: ActaConfig, recognizer: R) -> Result<Self, ConfigError> {
        let catalog = match &config.regions {
            Some(path) => RegionCatalog::from_file(path)?,
            None => RegionCatalog::standard().clone(),
        };
        Ok(Self::new(Arc::new(catalog), config, recognizer))
    }

    /// Build a pipeline from a JSON configuration file.
    pub fn from_config_file(path: &Path, recognizer: R) -> crate::Result<Self> {
        let config = ActaConfig::from_file(path)?;
        Ok(Self::from_config(config, recognizer)?)
    }

    pub fn config(&self) -> &ActaConfig {
        &self.config
    }

    pub fn catalog(&self) -> &RegionCatalog {
        &self.catalog
    }

    /// Read and process a PDF file.
    pub fn process_file(&self, path: &Path, capacity: Option<&dyn CapacityLookup>) -> DocumentResult {
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        match std::fs::read(path) {
            Ok(data) => self.process_bytes(&source, &data, capacity),
            Err(e) => {
                warn!("{}: cannot read file: {}", source, e);
                let passes = PassSummary {
                    text_layer_error: Some(e.to_string()),
                    ..PassSummary::default()
                };
                self.assemble(source, 0, RawTally::default(), passes, Instant::now(), capacity)
            }
        }
    }

    /// Process an in-memory PDF.
    pub fn process_bytes(&self, source: &str, data: &[u8], capacity: Option<&dyn CapacityLookup>) -> DocumentResult {
        let mut extractor = PdfExtractor::new();
        if let Err(e) = extractor.load(data) {
            warn!("{}: cannot load PDF: {}", source, e);
            let passes = PassSummary {
                text_layer_error: Some(e.to_string()),
                raster_error: Some(e.to_string()),
                ..PassSummary::default()
            };
            return self.assemble(
                source.to_string(),
                data.len() as u64,
                RawTally::default(),
                passes,
                Instant::now(),
                capacity,
            );
        }
        self.process(source, &extractor, data.len() as u64, capacity)
    }

    /// Process an already loaded document.
    pub fn process<P: PdfProcessor>(
        &self,
        source: &str,
        pdf: &P,
        byte_size: u64,
        capacity: Option<&dyn CapacityLookup>,
    ) -> DocumentResult {
        let start = Instant::now();
        let page = self.config.pdf.page;
        let mut passes = PassSummary::default();

        let tokens = match pdf.page_tokens(page) {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!("{}: text layer unavailable: {}", source, e);
                passes.text_layer_error = Some(e.to_string());
                Vec::new()
            }
        };

        let mut raw = TextLayerExtractor::new(&self.catalog).extract(&tokens);
        passes.text_fields = raw.count_from(FieldSource::TextLayer);

        if raw.has_missing() {
            debug!("{}: {} fields missing, falling back to image OCR", source, raw.missing().len());
            passes.ocr_used = true;
            self.ocr_pass(source, pdf, &mut raw, &mut passes);
        }

        self.assemble(source.to_string(), byte_size, raw, passes, start, capacity)
    }

    fn ocr_pass<P: PdfProcessor>(&self, source: &str, pdf: &P, raw: &mut RawTally, passes: &mut PassSummary) {
        let image = match pdf.render_page(self.config.pdf.page, self.config.pdf.render_dpi) {
            Ok(image) => image,
            Err(e) => {
                warn!("{}: no page image for OCR: {}", source, e);
                passes.raster_error = Some(e.to_string());
                return;
            }
        };

        let image = if self.config.ocr.detect_rotation {
            let corrected = RotationCorrector::new(&self.recognizer).correct(image);
            passes.rotation = Some(corrected.angle);
            corrected.image
        } else {
            image
        };

        let extractor = ImageOcrExtractor::new(&self.catalog, &self.recognizer, self.config.ocr.ink_band);
        passes.ocr_fields = extractor.fill_missing(&image, raw);
    }

    fn assemble(
        &self,
        source: String,
        byte_size: u64,
        raw: RawTally,
        passes: PassSummary,
        start: Instant,
        capacity: Option<&dyn CapacityLookup>,
    ) -> DocumentResult {
        let normalization = FieldNormalizer::lenient().normalize(&raw);

        let expected = match self.config.validation.ballot_total {
            BallotTotalSource::Form => ExpectedTotal::FromForm,
            BallotTotalSource::Capacity => {
                let table_code = raw.text(Field::TableCode).map(str::to_string);
                let capacity = match (capacity, table_code.as_deref()) {
                    (Some(lookup), Some(code)) => lookup.capacity(code),
                    _ => None,
                };
                ExpectedTotal::FromCapacity { table_code, capacity }
            }
        };

        let validator = ConsistencyValidator::new(self.config.validation.zero_fallback);
        let mut discrepancies = normalization.discrepancies;
        discrepancies.extend(validator.validate(&normalization.fields, &expected));

        let result = DocumentResult {
            source,
            byte_size,
            raw,
            fields: normalization.fields,
            discrepancies,
            passes,
            processing_time_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            "{}: {} text / {} OCR fields, {} discrepancies in {}ms",
            result.source,
            result.passes.text_fields,
            result.passes.ocr_fields,
            result.discrepancies.len(),
            result.processing_time_ms
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use image::{DynamicImage, RgbImage};
    use pretty_assertions::assert_eq;

    use crate::error::PdfError;
    use crate::models::config::ZeroFallbackPolicy;
    use crate::models::tally::Normalized;
    use crate::ocr::testing::ScriptedRecognizer;
    use crate::pdf::fixtures::text_pdf;
    use crate::pdf::{self, PageToken};
    use crate::validate::Identity;

    struct MockPdf {
        tokens: Vec<PageToken>,
        image: Option<DynamicImage>,
        render_calls: Cell<usize>,
    }

    impl MockPdf {
        fn new(tokens: Vec<PageToken>, image: Option<DynamicImage>) -> Self {
            Self {
                tokens,
                image,
                render_calls: Cell::new(0),
            }
        }
    }

    impl PdfProcessor for MockPdf {
        fn load(&mut self, _data: &[u8]) -> pdf::Result<()> {
            Ok(())
        }

        fn page_count(&self) -> u32 {
            1
        }

        fn page_tokens(&self, _page: u32) -> pdf::Result<Vec<PageToken>> {
            Ok(self.tokens.clone())
        }

        fn render_page(&self, _page: u32, _dpi: u32) -> pdf::Result<DynamicImage> {
            self.render_calls.set(self.render_calls.get() + 1);
            self.image
                .clone()
                .ok_or_else(|| PdfError::Rasterize("no image".to_string()))
        }
    }

    const SHEET: [(&str, f32, f32); 13] = [
        ("123456", 100.0, 214.0),
        ("777", 100.0, 230.0),
        ("1501", 100.0, 280.0),
        ("250000", 100.0, 340.0),
        ("200", 100.0, 400.0),
        ("50", 100.0, 460.0),
        ("100", 470.0, 185.0),
        ("50", 470.0, 235.0),
        ("20", 470.0, 270.0),
        ("10", 470.0, 320.0),
        ("185", 470.0, 390.0),
        ("5", 470.0, 440.0),
        ("15", 470.0, 490.0),
    ];

    fn sheet_tokens() -> Vec<PageToken> {
        SHEET
            .iter()
            .map(|(text, x, y)| PageToken::new(*text, *x, *y, x + 20.0, y + 12.0))
            .collect()
    }

    fn pipeline<'a>(recognizer: &'a ScriptedRecognizer, config: ActaConfig) -> TallyPipeline<&'a ScriptedRecognizer> {
        TallyPipeline::new(Arc::new(RegionCatalog::standard().clone()), config, recognizer)
    }

    #[test]
    fn test_consistent_text_page_never_touches_ocr() {
        let recognizer = ScriptedRecognizer::default();
        let pdf = MockPdf::new(sheet_tokens(), None);

        let result = pipeline(&recognizer, ActaConfig::default()).process("sheet.pdf", &pdf, 2048, None);

        assert!(result.is_consistent(), "{:?}", result.messages());
        assert_eq!(result.passes.text_fields, 13);
        assert!(!result.passes.ocr_used);
        assert_eq!(pdf.render_calls.get(), 0);
        assert_eq!(recognizer.calls(), 0);
        assert_eq!(result.table_code(), Some("12345"));
        assert_eq!(result.fields.mas, Normalized::Read(100));
        assert_eq!(result.size_kb(), 2);
    }

    #[test]
    fn test_synthetic_pdf_end_to_end() {
        let recognizer = ScriptedRecognizer::default();
        let data = text_pdf(&SHEET);

        let result = pipeline(&recognizer, ActaConfig::default()).process_bytes("sheet.pdf", &data, None);

        assert!(result.is_consistent(), "{:?}", result.messages());
        assert_eq!(result.fields.valid_votes, Normalized::Read(185));
        assert_eq!(recognizer.calls(), 0);
        assert_eq!(result.byte_size, data.len() as u64);
    }

    #[test]
    fn test_oversized_counts_still_yield_a_result() {
        let recognizer = ScriptedRecognizer::default();
        let mut tokens = sheet_tokens();
        for token in tokens.iter_mut().filter(|t| t.x0 == 470.0 && t.y0 < 240.0) {
            token.text = "9000000000000000000".to_string();
        }
        let pdf = MockPdf::new(tokens, None);

        let result = pipeline(&recognizer, ActaConfig::default()).process("sheet.pdf", &pdf, 10, None);

        assert_eq!(result.fields.mas, Normalized::Read(9_000_000_000_000_000_000));
        assert_eq!(
            result.discrepancies,
            vec![Discrepancy::Overflow {
                identity: Identity::ValidVoteSum
            }]
        );
    }

    #[test]
    fn test_all_sentinel_document() {
        let recognizer = ScriptedRecognizer::default();
        let pdf = MockPdf::new(Vec::new(), None);

        let result = pipeline(&recognizer, ActaConfig::default()).process("blank.pdf", &pdf, 10, None);

        assert!(result.passes.ocr_used);
        assert!(result.passes.raster_error.is_some());
        assert!(result.fields.iter().all(|(_, v)| v.or_zero() == 0));
        let unread = result
            .discrepancies
            .iter()
            .filter(|d| matches!(d, Discrepancy::Unread { .. }))
            .count();
        assert_eq!(unread, 13);
        let skipped: Vec<Identity> = result
            .discrepancies
            .iter()
            .filter_map(|d| match d {
                Discrepancy::Skipped { identity, .. } => Some(*identity),
                _ => None,
            })
            .collect();
        assert_eq!(
            skipped,
            vec![Identity::ValidVoteSum, Identity::BallotTotal, Identity::ValidVoteBalance]
        );
    }

    #[test]
    fn test_all_sentinel_evaluated_as_zero() {
        let recognizer = ScriptedRecognizer::default();
        let pdf = MockPdf::new(Vec::new(), None);
        let mut config = ActaConfig::default();
        config.validation.zero_fallback = ZeroFallbackPolicy::EvaluateAsZero;

        let result = pipeline(&recognizer, config).process("blank.pdf", &pdf, 10, None);

        // 0 + 0 = 0 everywhere, so only the reading problems remain.
        assert_eq!(result.discrepancies.len(), 13);
        assert!(result.discrepancies.iter().all(|d| matches!(d, Discrepancy::Unread { .. })));
    }

    #[test]
    fn test_ocr_fills_only_missing_fields() {
        let recognizer = ScriptedRecognizer::with_digits(&["15\n"]);
        recognizer.push_orientation(Ok("Rotate: 0".to_string()));
        let mut tokens = sheet_tokens();
        tokens.retain(|t| t.y0 != 490.0);
        let image = DynamicImage::ImageRgb8(RgbImage::new(1040, 1340));
        let pdf = MockPdf::new(tokens, Some(image));

        let result = pipeline(&recognizer, ActaConfig::default()).process("sheet.pdf", &pdf, 10, None);

        assert!(result.is_consistent(), "{:?}", result.messages());
        assert_eq!(result.passes.text_fields, 12);
        assert_eq!(result.passes.ocr_fields, 1);
        assert_eq!(result.passes.rotation, Some(BestEffort::detected(0)));
        assert_eq!(recognizer.digit_calls.get(), 1);
        assert_eq!(result.raw.get(Field::NullVotes).as_ref().map(|r| r.source), Some(FieldSource::ImageOcr));
    }

    #[test]
    fn test_unloadable_pdf_still_yields_result() {
        let recognizer = ScriptedRecognizer::default();
        let result = pipeline(&recognizer, ActaConfig::default()).process_bytes("broken.pdf", b"%PDF-garbage", None);

        assert!(result.passes.text_layer_error.is_some());
        assert!(!result.is_consistent());
        assert_eq!(result.byte_size, 12);
        assert_eq!(recognizer.calls(), 0);
    }

    #[test]
    fn test_from_config_file_loads_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        let catalog_path = dir.path().join("regions.json");
        std::fs::write(&catalog_path, "[]").unwrap();

        let mut config = ActaConfig::default();
        config.regions = Some(catalog_path);
        config.save(&config_path).unwrap();

        let err = TallyPipeline::from_config_file(&config_path, ScriptedRecognizer::default())
            .err()
            .unwrap();
        assert!(matches!(err, crate::ActaError::Config(ConfigError::MissingField(Field::TableCode))));

        let err = TallyPipeline::from_config_file(&dir.path().join("absent.json"), ScriptedRecognizer::default())
            .err()
            .unwrap();
        assert!(matches!(err, crate::ActaError::Config(ConfigError::Io(_))));
    }

    #[test]
    fn test_ballot_total_against_capacity() {
        let recognizer = ScriptedRecognizer::default();
        let pdf = MockPdf::new(sheet_tokens(), None);
        let mut config = ActaConfig::default();
        config.validation.ballot_total = BallotTotalSource::Capacity;
        let registry = HashMap::from([("12345".to_string(), 240)]);

        let pipeline = pipeline(&recognizer, config);
        let result = pipeline.process("sheet.pdf", &pdf, 10, Some(&registry));
        assert_eq!(result.messages().len(), 1);
        assert!(result.messages()[0].contains("capacity(240)"));

        let result = pipeline.process("sheet.pdf", &pdf, 10, None);
        assert_eq!(
            result.discrepancies,
            vec![Discrepancy::CapacityUnavailable {
                table_code: Some("12345".to_string())
            }]
        );
    }
}
