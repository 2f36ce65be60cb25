//! Human-readable findings attached to a tally sheet.

use std::fmt;

use serde::Serialize;

use crate::models::config::BallotTotalSource;
use crate::models::tally::Field;

/// The arithmetic identities a tally sheet must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Identity {
    /// Categories plus blank ballots equal the valid votes.
    ValidVoteSum,
    /// Used plus unused ballots equal the expected total.
    BallotTotal,
    /// Used ballots minus null votes equal the valid votes.
    ValidVoteBalance,
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Identity::ValidVoteSum => "valid vote sum",
            Identity::BallotTotal => "ballot total",
            Identity::ValidVoteBalance => "valid vote balance",
        })
    }
}

/// One finding. A sheet with none is consistent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Discrepancy {
    /// No pass recovered a usable value.
    Unread { field: Field },
    /// A value was found but is not an integer.
    Unconvertible { field: Field, raw: String },
    ValidVoteSum {
        mas: i64,
        sumate: i64,
        votexchi: i64,
        chupacoto: i64,
        blank: i64,
        sum: i64,
        valid: i64,
    },
    BallotTotal {
        used: i64,
        unused: i64,
        sum: i64,
        expected: i64,
        reference: BallotTotalSource,
    },
    ValidVoteBalance {
        used: i64,
        null: i64,
        difference: i64,
        valid: i64,
    },
    /// An identity could not be evaluated.
    Skipped { identity: Identity, missing: Vec<Field> },
    /// The operands are too large to combine.
    Overflow { identity: Identity },
    /// The capacity registry had no entry for the table.
    CapacityUnavailable { table_code: Option<String> },
}

impl Discrepancy {
    /// Whether this is an arithmetic mismatch rather than a reading problem.
    pub fn is_mismatch(&self) -> bool {
        matches!(
            self,
            Discrepancy::ValidVoteSum { .. } | Discrepancy::BallotTotal { .. } | Discrepancy::ValidVoteBalance { .. }
        )
    }
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discrepancy::Unread { field } => write!(f, "{} was not read correctly", field),
            Discrepancy::Unconvertible { field, raw } => {
                write!(f, "could not convert {} value {:?} to an integer", field, raw)
            }
            Discrepancy::ValidVoteSum {
                mas,
                sumate,
                votexchi,
                chupacoto,
                blank,
                sum,
                valid,
            } => write!(
                f,
                "Valid vote sum: MAS({}) + SUMATE({}) + VOTEXCHI({}) + CHUPACOTO({}) + Blancos({}) = {} != votosValidos({})",
                mas, sumate, votexchi, chupacoto, blank, sum, valid
            ),
            Discrepancy::BallotTotal {
                used,
                unused,
                sum,
                expected,
                reference,
            } => {
                let label = match reference {
                    BallotTotalSource::Form => "total",
                    BallotTotalSource::Capacity => "capacity",
                };
                write!(
                    f,
                    "Ballot total mismatch: totalAnforas({}) + totalNoUtilizadas({}) = {} != {}({})",
                    used, unused, sum, label, expected
                )
            }
            Discrepancy::ValidVoteBalance {
                used,
                null,
                difference,
                valid,
            } => write!(
                f,
                "Valid vote balance mismatch: totalAnforas({}) - votosNulos({}) = {} != votosValidos({})",
                used, null, difference, valid
            ),
            Discrepancy::Skipped { identity, missing } => {
                let names: Vec<&str> = missing.iter().map(|field| field.name()).collect();
                write!(f, "Skipped {} check: no value for {}", identity, names.join(", "))
            }
            Discrepancy::Overflow { identity } => {
                write!(f, "Skipped {} check: values out of range", identity)
            }
            Discrepancy::CapacityUnavailable { table_code } => match table_code {
                Some(code) => write!(f, "Capacity unavailable for table code {}", code),
                None => f.write_str("Capacity unavailable: table code was not read"),
            },
        }
    }
}
