//! Arithmetic consistency checks between tally-sheet fields.

use tracing::debug;

use super::discrepancy::{Discrepancy, Identity};
use crate::models::config::{BallotTotalSource, ZeroFallbackPolicy};
use crate::models::tally::{Field, Normalized, NormalizedTally};

/// What the ballot-total identity compares `used + unused` against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedTotal {
    /// The sheet's own `total` field.
    FromForm,
    /// The registered capacity, `None` when the registry had no answer.
    FromCapacity {
        table_code: Option<String>,
        capacity: Option<i64>,
    },
}

/// Checks the three tally identities independently of each other.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsistencyValidator {
    zero_fallback: ZeroFallbackPolicy,
}

impl ConsistencyValidator {
    pub fn new(zero_fallback: ZeroFallbackPolicy) -> Self {
        Self { zero_fallback }
    }

    /// All findings, in identity order. Empty means consistent.
    pub fn validate(&self, fields: &NormalizedTally, expected: &ExpectedTotal) -> Vec<Discrepancy> {
        let findings: Vec<Discrepancy> = [
            self.check_valid_vote_sum(fields),
            self.check_ballot_total(fields, expected),
            self.check_valid_vote_balance(fields),
        ]
        .into_iter()
        .flatten()
        .collect();

        debug!("Consistency check: {} findings", findings.len());
        findings
    }

    /// MAS + SUMATE + VOTEXCHI + CHUPACOTO + blank = valid.
    pub fn check_valid_vote_sum(&self, fields: &NormalizedTally) -> Option<Discrepancy> {
        let operands = [
            Field::Mas,
            Field::Sumate,
            Field::Votexchi,
            Field::Chupacoto,
            Field::BlankVotes,
            Field::ValidVotes,
        ];
        let [mas, sumate, votexchi, chupacoto, blank, valid] =
            match self.operands(Identity::ValidVoteSum, fields, operands) {
                Ok(values) => values,
                Err(skipped) => return Some(skipped),
            };

        let sum = [sumate, votexchi, chupacoto, blank]
            .into_iter()
            .try_fold(mas, i64::checked_add);
        let Some(sum) = sum else {
            return Some(overflow(Identity::ValidVoteSum));
        };
        (sum != valid).then_some(Discrepancy::ValidVoteSum {
            mas,
            sumate,
            votexchi,
            chupacoto,
            blank,
            sum,
            valid,
        })
    }

    /// used + unused = expected total.
    pub fn check_ballot_total(&self, fields: &NormalizedTally, expected: &ExpectedTotal) -> Option<Discrepancy> {
        let (used, unused, expected, reference) = match expected {
            ExpectedTotal::FromForm => {
                let operands = [Field::BallotsUsed, Field::BallotsUnused, Field::TotalIssued];
                let [used, unused, total] = match self.operands(Identity::BallotTotal, fields, operands) {
                    Ok(values) => values,
                    Err(skipped) => return Some(skipped),
                };
                (used, unused, total, BallotTotalSource::Form)
            }
            ExpectedTotal::FromCapacity { table_code, capacity } => {
                let Some(capacity) = *capacity else {
                    return Some(Discrepancy::CapacityUnavailable {
                        table_code: table_code.clone(),
                    });
                };
                let operands = [Field::BallotsUsed, Field::BallotsUnused];
                let [used, unused] = match self.operands(Identity::BallotTotal, fields, operands) {
                    Ok(values) => values,
                    Err(skipped) => return Some(skipped),
                };
                (used, unused, capacity, BallotTotalSource::Capacity)
            }
        };

        let Some(sum) = used.checked_add(unused) else {
            return Some(overflow(Identity::BallotTotal));
        };
        (sum != expected).then_some(Discrepancy::BallotTotal {
            used,
            unused,
            sum,
            expected,
            reference,
        })
    }

    /// used - null = valid.
    pub fn check_valid_vote_balance(&self, fields: &NormalizedTally) -> Option<Discrepancy> {
        let operands = [Field::BallotsUsed, Field::NullVotes, Field::ValidVotes];
        let [used, null, valid] = match self.operands(Identity::ValidVoteBalance, fields, operands) {
            Ok(values) => values,
            Err(skipped) => return Some(skipped),
        };

        let Some(difference) = used.checked_sub(null) else {
            return Some(overflow(Identity::ValidVoteBalance));
        };
        (difference != valid).then_some(Discrepancy::ValidVoteBalance {
            used,
            null,
            difference,
            valid,
        })
    }

    /// Resolve operand values, or the `Skipped` finding naming the unusable ones.
    fn operands<const N: usize>(
        &self,
        identity: Identity,
        fields: &NormalizedTally,
        operands: [Field; N],
    ) -> Result<[i64; N], Discrepancy> {
        let mut values = [0i64; N];
        let mut missing = Vec::new();

        for (slot, field) in values.iter_mut().zip(operands) {
            match (*fields.get(field), self.zero_fallback) {
                (Normalized::Read(v), _) => *slot = v,
                (Normalized::ZeroFallback, ZeroFallbackPolicy::EvaluateAsZero) => *slot = 0,
                _ => missing.push(field),
            }
        }

        if missing.is_empty() {
            Ok(values)
        } else {
            debug!("Skipping {} check, unusable: {:?}", identity, missing);
            Err(Discrepancy::Skipped { identity, missing })
        }
    }
}

fn overflow(identity: Identity) -> Discrepancy {
    debug!("Skipping {} check, operands overflow", identity);
    Discrepancy::Overflow { identity }
}
