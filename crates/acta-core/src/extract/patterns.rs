//! Regex patterns shared by the extraction passes.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Digits, optionally a hyphen and more digits. Labels and page furniture fail this.
    pub static ref NUMERIC_TOKEN: Regex = Regex::new(r"^\d+-?\d*$").unwrap();

    pub static ref NON_DIGIT: Regex = Regex::new(r"\D").unwrap();
}
