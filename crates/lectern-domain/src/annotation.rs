//! Slide-level concept annotations

use crate::SlideId;
use serde::{Deserialize, Serialize};

/// A concept taught on one slide, with how central it is to that slide
///
/// Produced once per slide by an external extraction step and never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptAnnotation {
    /// Slide the concept was found on
    pub slide_id: SlideId,

    /// Raw concept term as extracted
    pub term: String,

    /// Centrality of the concept on the slide, in [0, 1]
    pub salience: f64,
}

impl ConceptAnnotation {
    /// Create a new annotation
    pub fn new(slide_id: impl Into<SlideId>, term: impl Into<String>, salience: f64) -> Self {
        Self {
            slide_id: slide_id.into(),
            term: term.into(),
            salience,
        }
    }

    /// Validate the annotation: non-blank term and salience within [0, 1]
    pub fn validate(&self) -> Result<(), String> {
        if self.term.trim().is_empty() {
            return Err("term is empty".to_string());
        }
        if !(0.0..=1.0).contains(&self.salience) {
            return Err(format!("salience {} out of range [0.0, 1.0]", self.salience));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_valid_annotation() {
        let annotation = ConceptAnnotation::new("s1", "Lockout/Tagout", 0.8);
        assert!(annotation.validate().is_ok());
    }

    #[test]
    fn test_blank_term_rejected() {
        let annotation = ConceptAnnotation::new("s1", "   ", 0.8);
        assert!(annotation.validate().is_err());
    }

    #[test]
    fn test_salience_bounds() {
        assert!(ConceptAnnotation::new("s1", "x", 1.5).validate().is_err());
        assert!(ConceptAnnotation::new("s1", "x", -0.1).validate().is_err());
        assert!(ConceptAnnotation::new("s1", "x", f64::NAN).validate().is_err());
        assert!(ConceptAnnotation::new("s1", "x", 0.0).validate().is_ok());
        assert!(ConceptAnnotation::new("s1", "x", 1.0).validate().is_ok());
    }

    proptest! {
        #[test]
        fn prop_validate_accepts_exactly_unit_salience(salience in -2.0f64..2.0, term in "[A-Za-z ]{0,12}") {
            let annotation = ConceptAnnotation::new("s1", term.clone(), salience);
            let expected = !term.trim().is_empty() && (0.0..=1.0).contains(&salience);
            prop_assert_eq!(annotation.validate().is_ok(), expected);
        }
    }
}
