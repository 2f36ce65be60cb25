//! Normalization and arithmetic consistency checks.

mod discrepancy;
mod identities;
mod normalizer;

pub use discrepancy::{Discrepancy, Identity};
pub use identities::{ConsistencyValidator, ExpectedTotal};
pub use normalizer::{FieldNormalizer, Normalization, NormalizationPolicy};
