//! Ingestion of pre-extracted spreadsheet rows.
//!
//! Rows come from an external extraction step, one row per sheet. They skip
//! the document passes and go straight to strict normalization and the
//! consistency checks, with the ballot total compared against the
//! registered capacity.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::config::ZeroFallbackPolicy;
use crate::models::tally::{Field, FieldSource, RawField, RawTally, TallyFields};
use crate::pipeline::{CapacityLookup, DocumentResult, PassSummary};
use crate::validate::{ConsistencyValidator, ExpectedTotal, FieldNormalizer};

/// Cell content the upstream extractor writes for values it could not find.
pub const NOT_FOUND_MARKER: &str = "[NO ENCONTRADO]";

/// Fields a row carries.
pub const TABULAR_FIELDS: [Field; 10] = [
    Field::TableCode,
    Field::BallotsUsed,
    Field::BallotsUnused,
    Field::Mas,
    Field::Sumate,
    Field::Votexchi,
    Field::Chupacoto,
    Field::ValidVotes,
    Field::BlankVotes,
    Field::NullVotes,
];

/// One spreadsheet row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyRow {
    #[serde(rename = "Partido1", default)]
    pub party1: Option<String>,
    #[serde(rename = "Partido2", default)]
    pub party2: Option<String>,
    #[serde(rename = "Partido3", default)]
    pub party3: Option<String>,
    #[serde(rename = "Partido4", default)]
    pub party4: Option<String>,
    #[serde(rename = "Blancos", default)]
    pub blank: Option<String>,
    #[serde(rename = "Validos", default)]
    pub valid: Option<String>,
    #[serde(rename = "CantidadAnfora", default)]
    pub ballots_used: Option<String>,
    #[serde(rename = "PapeletasNoUsadas", default)]
    pub ballots_unused: Option<String>,
    #[serde(rename = "Nulos", default)]
    pub null: Option<String>,
    #[serde(rename = "CodigoMesa", default)]
    pub table_code: Option<String>,
}

impl TallyRow {
    fn cell(&self, field: Field) -> Option<&str> {
        let cell = match field {
            Field::TableCode => self.table_code.as_ref(),
            Field::BallotsUsed => self.ballots_used.as_ref(),
            Field::BallotsUnused => self.ballots_unused.as_ref(),
            Field::Mas => self.party1.as_ref(),
            Field::Sumate => self.party2.as_ref(),
            Field::Votexchi => self.party3.as_ref(),
            Field::Chupacoto => self.party4.as_ref(),
            Field::ValidVotes => self.valid.as_ref(),
            Field::BlankVotes => self.blank.as_ref(),
            Field::NullVotes => self.null.as_ref(),
            _ => None,
        };
        cell.map(|text| text.trim())
            .filter(|text| !text.is_empty() && *text != NOT_FOUND_MARKER)
    }

    /// Raw values keyed by field; cells that are blank or marked not found are `None`.
    pub fn to_raw(&self) -> RawTally {
        TallyFields::from_fn(|field| {
            self.cell(field)
                .map(|text| RawField::new(text, FieldSource::Tabular))
        })
    }
}

/// Normalize and check one row.
///
/// `source` labels the result (typically `file.csv#3`) and `byte_size` is the
/// size of the file the row came from.
pub fn check_row(
    source: &str,
    row: &TallyRow,
    byte_size: u64,
    capacity: Option<&dyn CapacityLookup>,
    zero_fallback: ZeroFallbackPolicy,
) -> DocumentResult {
    let start = Instant::now();
    let raw = row.to_raw();
    let normalization = FieldNormalizer::strict().normalize_scoped(&raw, &TABULAR_FIELDS);

    let table_code = raw.text(Field::TableCode).map(str::to_string);
    let registered = match (capacity, table_code.as_deref()) {
        (Some(lookup), Some(code)) => lookup.capacity(code),
        _ => None,
    };
    let expected = ExpectedTotal::FromCapacity {
        table_code,
        capacity: registered,
    };

    let mut discrepancies = normalization.discrepancies;
    discrepancies.extend(ConsistencyValidator::new(zero_fallback).validate(&normalization.fields, &expected));
    debug!("{}: {} discrepancies", source, discrepancies.len());

    DocumentResult {
        source: source.to_string(),
        byte_size,
        raw,
        fields: normalization.fields,
        discrepancies,
        passes: PassSummary::default(),
        processing_time_ms: start.elapsed().as_millis() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tally::Normalized;
    use crate::validate::{Discrepancy, Identity};
    use pretty_assertions::assert_eq;

    struct Fixed(i64);

    impl CapacityLookup for Fixed {
        fn capacity(&self, _table_code: &str) -> Option<i64> {
            Some(self.0)
        }
    }

    fn row() -> TallyRow {
        let s = |v: &str| Some(v.to_string());
        TallyRow {
            party1: s("100"),
            party2: s("50"),
            party3: s("20"),
            party4: s("10"),
            blank: s("5"),
            valid: s("185"),
            ballots_used: s("200"),
            ballots_unused: s("50"),
            null: s("15"),
            table_code: s("01234"),
        }
    }

    #[test]
    fn test_consistent_row() {
        let result = check_row("rows.csv#1", &row(), 100, Some(&Fixed(250)), ZeroFallbackPolicy::Skip);
        assert!(result.is_consistent(), "{:?}", result.messages());
        assert_eq!(result.table_code(), Some("01234"));
        assert_eq!(result.fields.total_issued, Normalized::Absent);
    }

    #[test]
    fn test_capacity_unavailable() {
        let result = check_row("rows.csv#1", &row(), 100, None, ZeroFallbackPolicy::Skip);
        assert_eq!(
            result.discrepancies,
            vec![Discrepancy::CapacityUnavailable {
                table_code: Some("01234".to_string())
            }]
        );
    }

    #[test]
    fn test_marker_and_garbage_cells() {
        let mut row = row();
        row.null = Some(NOT_FOUND_MARKER.to_string());
        row.blank = Some("x5".to_string());

        let result = check_row("rows.csv#2", &row, 100, Some(&Fixed(250)), ZeroFallbackPolicy::EvaluateAsZero);

        assert_eq!(result.fields.null_votes, Normalized::Absent);
        assert_eq!(result.discrepancies[0], Discrepancy::Unconvertible {
            field: Field::BlankVotes,
            raw: "x5".to_string()
        });
        assert_eq!(result.discrepancies[1], Discrepancy::Unread { field: Field::NullVotes });
        // Absent operands are never evaluated, whatever the zero-fallback policy.
        assert!(result.discrepancies.contains(&Discrepancy::Skipped {
            identity: Identity::ValidVoteSum,
            missing: vec![Field::BlankVotes],
        }));
        assert!(result.discrepancies.contains(&Discrepancy::Skipped {
            identity: Identity::ValidVoteBalance,
            missing: vec![Field::NullVotes],
        }));
    }
}
