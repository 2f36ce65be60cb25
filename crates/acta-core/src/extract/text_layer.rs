//! Reads field values from positioned text-layer tokens.

use tracing::debug;

use super::patterns::NUMERIC_TOKEN;
use crate::models::tally::{Field, FieldSource, RawField, RawTally, TallyFields};
use crate::pdf::PageToken;
use crate::regions::{CoordinateSpace, RegionCatalog};

/// Buckets numeric tokens into the text-space rectangles of each field.
pub struct TextLayerExtractor<'a> {
    catalog: &'a RegionCatalog,
}

impl<'a> TextLayerExtractor<'a> {
    pub fn new(catalog: &'a RegionCatalog) -> Self {
        Self { catalog }
    }

    /// Resolve every field the text layer can supply; the rest stay `None`.
    pub fn extract(&self, tokens: &[PageToken]) -> RawTally {
        let raw: RawTally = TallyFields::from_fn(|field| {
            self.extract_field(field, tokens)
                .map(|text| RawField::new(text, FieldSource::TextLayer))
        });
        debug!(
            "Text layer resolved {}/{} fields from {} tokens",
            raw.count_from(FieldSource::TextLayer),
            Field::ALL.len(),
            tokens.len()
        );
        raw
    }

    /// Value of one field after its text-pass truncation rule.
    pub fn extract_field(&self, field: Field, tokens: &[PageToken]) -> Option<String> {
        let mut value = String::new();

        for rect in self.catalog.regions(field, CoordinateSpace::Text) {
            let mut hits: Vec<(f32, &str)> = tokens
                .iter()
                .map(|token| (token, token.text.trim()))
                .filter(|(token, text)| NUMERIC_TOKEN.is_match(text) && rect.contains(token.x0, token.y0))
                .map(|(token, text)| (token.x0, text))
                .collect();

            // Reading order within the rectangle.
            hits.sort_by(|a, b| a.0.total_cmp(&b.0));
            for (_, text) in hits {
                value.push_str(text);
            }
        }

        if value.is_empty() {
            debug!("{}: no numeric token in text regions", field);
            return None;
        }

        let rule = self.catalog.rule(field, CoordinateSpace::Text);
        let result = rule.apply(&value);
        debug!("{}: text layer read {:?} -> {:?}", field, value, result);
        result
    }
}
