//! Acceptance policy for conversion outputs.
//!
//! Every applicable check runs; errors accumulate in the order
//! size, ratio, structural.

use crate::config::ValidationThresholds;
use crate::structure::StructureValidator;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Verdict plus ordered diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl ValidationOutcome {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
        }
    }

    pub fn invalid(errors: Vec<String>) -> Self {
        Self {
            is_valid: false,
            errors,
        }
    }

    /// Build from a list of errors: valid iff the list is empty.
    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    /// AND the verdicts, append the diagnostics.
    pub fn absorb(&mut self, other: ValidationOutcome) {
        self.is_valid &= other.is_valid;
        self.errors.extend(other.errors);
    }
}

/// Size, ratio and structural checks over one output.
#[derive(Debug, Clone)]
pub struct ValidationPolicy {
    thresholds: ValidationThresholds,
}

impl ValidationPolicy {
    pub fn new(thresholds: ValidationThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &ValidationThresholds {
        &self.thresholds
    }

    /// Valid iff `output_size >= min_file_size`.
    pub fn check_size(&self, output_size: u64) -> Option<String> {
        let min = self.thresholds.min_file_size;
        if output_size >= min {
            None
        } else {
            Some(format!(
                "Output file size ({} bytes) is below the minimum threshold ({} bytes)",
                output_size, min
            ))
        }
    }

    /// Valid iff `output/original >= threshold`; an empty original only needs a non-empty output.
    pub fn check_ratio(&self, output_size: u64, original_size: u64) -> Option<String> {
        if original_size == 0 {
            return if output_size > 0 {
                None
            } else {
                Some("Output file is empty for an empty input".to_string())
            };
        }

        let ratio = output_size as f64 / original_size as f64;
        let threshold = self.thresholds.conversion_ratio_threshold;
        if ratio >= threshold {
            None
        } else {
            Some(format!(
                "Conversion ratio ({:.2}) is below the threshold ({:.2})",
                ratio, threshold
            ))
        }
    }

    /// Run all checks. The structural check runs only when enabled and a
    /// validator exists for the target format.
    pub fn evaluate(
        &self,
        output_size: u64,
        original_size: u64,
        output_path: &Path,
        structure: Option<&dyn StructureValidator>,
    ) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::from_errors(
            [
                self.check_size(output_size),
                self.check_ratio(output_size, original_size),
            ]
            .into_iter()
            .flatten()
            .collect(),
        );

        if self.thresholds.verify_structure {
            if let Some(validator) = structure {
                outcome.absorb(validator.validate(output_path, self.thresholds.check_links));
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedValidator(ValidationOutcome);

    impl StructureValidator for FixedValidator {
        fn validate(&self, _path: &Path, _check_links: bool) -> ValidationOutcome {
            self.0.clone()
        }
    }

    fn policy(min_file_size: u64, ratio: f64) -> ValidationPolicy {
        ValidationPolicy::new(ValidationThresholds {
            verify_structure: true,
            min_file_size,
            conversion_ratio_threshold: ratio,
            check_links: false,
        })
    }

    #[test]
    fn test_size_check_boundaries() {
        let p = policy(50, 0.1);
        assert!(p.check_size(50).is_none());
        assert!(p.check_size(51).is_none());
        let msg = p.check_size(49).unwrap();
        assert!(msg.contains("49 bytes"));
        assert!(msg.contains("50 bytes"));
        assert!(msg.contains("below the minimum threshold"));
    }

    #[test]
    fn test_zero_min_size_always_passes() {
        assert!(policy(0, 0.1).check_size(0).is_none());
    }

    #[test]
    fn test_ratio_check_with_empty_original() {
        let p = policy(0, 0.9);
        assert!(p.check_ratio(0, 0).is_some());
        assert!(p.check_ratio(1, 0).is_none());
    }

    #[test]
    fn test_ratio_check_formats_two_decimals() {
        let msg = policy(0, 0.1).check_ratio(5, 100).unwrap();
        assert_eq!(msg, "Conversion ratio (0.05) is below the threshold (0.10)");
    }

    #[test]
    fn test_ratio_at_threshold_passes() {
        assert!(policy(0, 0.1).check_ratio(10, 100).is_none());
    }

    #[test]
    fn test_no_special_case_for_small_pairs() {
        // 5 / 100 is a plain 0.05 ratio
        let p = policy(0, 0.04);
        assert!(p.check_ratio(5, 100).is_none());
        let p = policy(0, 0.06);
        assert!(p.check_ratio(5, 100).is_some());
    }

    #[test]
    fn test_evaluate_accumulates_size_then_ratio() {
        let outcome = policy(50, 0.1).evaluate(5, 100, Path::new("out.docx"), None);
        assert!(!outcome.is_valid);
        assert_eq!(outcome.errors.len(), 2);
        assert!(outcome.errors[0].contains("below the minimum threshold"));
        assert!(outcome.errors[1].contains("Conversion ratio"));
    }

    #[test]
    fn test_evaluate_appends_structural_errors_last() {
        let validator = FixedValidator(ValidationOutcome::invalid(vec![
            "Document has no paragraphs".to_string(),
        ]));
        let outcome = policy(50, 0.1).evaluate(5, 100, Path::new("out.docx"), Some(&validator));
        assert_eq!(outcome.errors.len(), 3);
        assert_eq!(outcome.errors[2], "Document has no paragraphs");
    }

    #[test]
    fn test_evaluate_structural_failure_alone_invalidates() {
        let validator = FixedValidator(ValidationOutcome::invalid(vec!["empty body".to_string()]));
        let outcome = policy(50, 0.1).evaluate(80, 100, Path::new("out.html"), Some(&validator));
        assert!(!outcome.is_valid);
        assert_eq!(outcome.errors, vec!["empty body".to_string()]);
    }

    #[test]
    fn test_evaluate_skips_structure_when_disabled() {
        let mut thresholds = policy(50, 0.1).thresholds().clone();
        thresholds.verify_structure = false;
        let validator = FixedValidator(ValidationOutcome::invalid(vec!["nope".to_string()]));
        let outcome = ValidationPolicy::new(thresholds).evaluate(
            80,
            100,
            Path::new("out.html"),
            Some(&validator),
        );
        assert!(outcome.is_valid);
    }

    #[test]
    fn test_evaluate_valid_output() {
        let validator = FixedValidator(ValidationOutcome::valid());
        let outcome = policy(50, 0.1).evaluate(80, 100, Path::new("out.docx"), Some(&validator));
        assert_eq!(outcome, ValidationOutcome::valid());
    }

    #[test]
    fn test_absorb() {
        let mut outcome = ValidationOutcome::valid();
        outcome.absorb(ValidationOutcome::invalid(vec!["a".to_string()]));
        outcome.absorb(ValidationOutcome::valid());
        assert!(!outcome.is_valid);
        assert_eq!(outcome.errors, vec!["a".to_string()]);
    }
}
