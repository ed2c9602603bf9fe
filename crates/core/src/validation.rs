//! Shared parameter validation helpers.
//!
//! Small reusable range checks used by configuration loading and the
//! detector/scorer constructors.

use crate::error::CoreError;

/// Validate that a value falls within `[0.0, 1.0]`.
///
/// Returns a `CoreError::Validation` naming the field if out of range.
pub fn validate_unit_range(value: f64, name: &str) -> Result<(), CoreError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(CoreError::Validation(format!(
            "{name} must be between 0.0 and 1.0, got {value}"
        )));
    }
    Ok(())
}

/// Validate that a value is finite and strictly positive.
pub fn validate_positive_finite(value: f64, name: &str) -> Result<(), CoreError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(CoreError::Validation(format!(
            "{name} must be a positive finite number, got {value}"
        )));
    }
    Ok(())
}

/// Validate that a count is at least `min`.
pub fn validate_min_count(value: usize, min: usize, name: &str) -> Result<(), CoreError> {
    if value < min {
        return Err(CoreError::Validation(format!(
            "{name} must be at least {min}, got {value}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_range_accepts_boundaries() {
        assert!(validate_unit_range(0.0, "rate").is_ok());
        assert!(validate_unit_range(1.0, "rate").is_ok());
    }

    #[test]
    fn unit_range_rejects_outside() {
        assert!(validate_unit_range(-0.01, "rate").is_err());
        assert!(validate_unit_range(1.01, "rate").is_err());
    }

    #[test]
    fn positive_finite_rejects_nan_and_zero() {
        assert!(validate_positive_finite(f64::NAN, "scale").is_err());
        assert!(validate_positive_finite(0.0, "scale").is_err());
        assert!(validate_positive_finite(-1.0, "scale").is_err());
        assert!(validate_positive_finite(2.5, "scale").is_ok());
    }

    #[test]
    fn min_count_enforced() {
        assert!(validate_min_count(2, 3, "trees").is_err());
        assert!(validate_min_count(3, 3, "trees").is_ok());
    }
}
