//! Character recognition over rasterized tally sheets.
//!
//! Recognition itself is delegated to an external engine behind the
//! [`Recognizer`] trait. This module adds what the sheets need around it:
//! orientation correction, ink isolation and cropping.

mod preprocessing;
mod rotation;
mod tesseract;

pub use preprocessing::{crop_region, isolate_ink};
pub use rotation::{Corrected, RotationCorrector, parse_rotation, rotate_upright};
pub use tesseract::TesseractCli;

use image::DynamicImage;
use serde::Serialize;

use crate::error::OcrError;

/// Result type for OCR operations.
pub type Result<T> = std::result::Result<T, OcrError>;

/// A character-recognition engine.
pub trait Recognizer {
    /// Recognize a single block of digits.
    fn recognize_digits(&self, image: &DynamicImage) -> Result<String>;

    /// Run orientation and script detection, returning the raw report.
    fn orientation_report(&self, image: &DynamicImage) -> Result<String>;
}

impl<R: Recognizer + ?Sized> Recognizer for &R {
    fn recognize_digits(&self, image: &DynamicImage) -> Result<String> {
        (**self).recognize_digits(image)
    }

    fn orientation_report(&self, image: &DynamicImage) -> Result<String> {
        (**self).orientation_report(image)
    }
}

/// Outcome of a detection that must never abort extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BestEffort<T> {
    /// The engine produced a usable answer.
    Detected { value: T },
    /// Detection failed; `value` is the default used instead.
    Fallback { value: T, cause: String },
}

impl<T> BestEffort<T> {
    pub fn detected(value: T) -> Self {
        BestEffort::Detected { value }
    }

    pub fn fallback(value: T, cause: impl Into<String>) -> Self {
        BestEffort::Fallback {
            value,
            cause: cause.into(),
        }
    }

    pub fn value(&self) -> &T {
        match self {
            BestEffort::Detected { value } | BestEffort::Fallback { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            BestEffort::Detected { value } | BestEffort::Fallback { value, .. } => value,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, BestEffort::Fallback { .. })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted recognizers for tests.

    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    use super::*;

    /// Replays queued answers and counts calls.
    #[derive(Default)]
    pub struct ScriptedRecognizer {
        pub digits: RefCell<VecDeque<Result<String>>>,
        pub orientation: RefCell<VecDeque<Result<String>>>,
        pub digit_calls: Cell<usize>,
        pub orientation_calls: Cell<usize>,
    }

    impl ScriptedRecognizer {
        pub fn with_digits(answers: &[&str]) -> Self {
            let recognizer = Self::default();
            for answer in answers {
                recognizer.digits.borrow_mut().push_back(Ok(answer.to_string()));
            }
            recognizer
        }

        pub fn push_orientation(&self, answer: Result<String>) {
            self.orientation.borrow_mut().push_back(answer);
        }

        pub fn calls(&self) -> usize {
            self.digit_calls.get() + self.orientation_calls.get()
        }
    }

    impl Recognizer for ScriptedRecognizer {
        fn recognize_digits(&self, _image: &DynamicImage) -> Result<String> {
            self.digit_calls.set(self.digit_calls.get() + 1);
            self.digits.borrow_mut().pop_front().unwrap_or_else(|| Ok(String::new()))
        }

        fn orientation_report(&self, _image: &DynamicImage) -> Result<String> {
            self.orientation_calls.set(self.orientation_calls.get() + 1);
            self.orientation
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Ok("Rotate: 0".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_best_effort_accessors() {
        let detected = BestEffort::detected(90u32);
        assert_eq!(*detected.value(), 90);
        assert!(!detected.is_fallback());

        let fallback = BestEffort::fallback(0u32, "engine missing");
        assert!(fallback.is_fallback());
        assert_eq!(fallback.into_value(), 0);
    }

    #[test]
    fn test_best_effort_serializes_cause() {
        let json = serde_json::to_value(BestEffort::fallback(0u32, "no Rotate line")).unwrap();
        assert_eq!(json["outcome"], "fallback");
        assert_eq!(json["value"], 0);
        assert_eq!(json["cause"], "no Rotate line");
    }
}
