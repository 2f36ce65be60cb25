//! Converts raw field strings into integers.

use tracing::debug;

use super::discrepancy::Discrepancy;
use crate::models::tally::{Field, Normalized, NormalizedTally, RawTally, TallyFields};

/// How unreadable values are represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizationPolicy {
    /// Missing or unconvertible values become a zero fallback.
    Lenient,
    /// Missing or unconvertible values become absent.
    Strict,
}

/// Normalized values and the findings produced along the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalization {
    pub fields: NormalizedTally,
    pub discrepancies: Vec<Discrepancy>,
}

/// Normalizes raw strings under a policy.
#[derive(Debug, Clone, Copy)]
pub struct FieldNormalizer {
    policy: NormalizationPolicy,
}

impl FieldNormalizer {
    pub fn new(policy: NormalizationPolicy) -> Self {
        Self { policy }
    }

    pub fn lenient() -> Self {
        Self::new(NormalizationPolicy::Lenient)
    }

    pub fn strict() -> Self {
        Self::new(NormalizationPolicy::Strict)
    }

    /// Normalize every field.
    pub fn normalize(&self, raw: &RawTally) -> Normalization {
        self.normalize_scoped(raw, &Field::ALL)
    }

    /// Normalize the fields in `scope`; the others are absent without a finding.
    pub fn normalize_scoped(&self, raw: &RawTally, scope: &[Field]) -> Normalization {
        let mut discrepancies = Vec::new();

        let fields = TallyFields::from_fn(|field| {
            if !scope.contains(&field) {
                return Normalized::Absent;
            }
            let (value, finding) = self.normalize_field(field, raw.text(field));
            discrepancies.extend(finding);
            value
        });

        debug!(
            "Normalized {} fields ({:?}), {} findings",
            scope.len(),
            self.policy,
            discrepancies.len()
        );
        Normalization { fields, discrepancies }
    }

    fn normalize_field(&self, field: Field, raw: Option<&str>) -> (Normalized, Option<Discrepancy>) {
        let unresolved = match self.policy {
            NormalizationPolicy::Lenient => Normalized::ZeroFallback,
            NormalizationPolicy::Strict => Normalized::Absent,
        };

        let Some(text) = raw.map(str::trim).filter(|t| !t.is_empty()) else {
            return (unresolved, Some(Discrepancy::Unread { field }));
        };

        match text.parse::<i64>() {
            Ok(value) => (Normalized::Read(value), None),
            Err(_) => {
                let finding = match self.policy {
                    NormalizationPolicy::Lenient => Discrepancy::Unread { field },
                    NormalizationPolicy::Strict => Discrepancy::Unconvertible {
                        field,
                        raw: text.to_string(),
                    },
                };
                (unresolved, Some(finding))
            }
        }
    }
}
