// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tunable processing thresholds.

use crate::error::SchemaError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Thresholds steering the decision policy and rules engine.
///
/// Values are validated by [`ProcessingThresholds::validate`]; the
/// defaults match production tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ProcessingThresholds {
    /// Minimum confidence for every required field (auto-post gate).
    pub field_confidence_threshold: f64,
    /// Minimum classifier confidence per categorised line item.
    pub category_confidence_threshold: f64,
    /// Relative tolerance for arithmetic comparisons.
    pub arithmetic_tolerance: f64,
    /// Maximum decimal places a monetary value may carry.
    pub rounding_decimal_places: u32,
    /// Duplicate-hash lookback window, in days, for posting indexes.
    pub duplicate_hash_window_days: u32,
}

impl Default for ProcessingThresholds {
    fn default() -> Self {
        Self {
            field_confidence_threshold: 0.82,
            category_confidence_threshold: 0.75,
            arithmetic_tolerance: 0.02,
            rounding_decimal_places: 2,
            duplicate_hash_window_days: 180,
        }
    }
}

impl ProcessingThresholds {
    /// Validate all ranges.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] naming the offending threshold.
    pub fn validate(&self) -> Result<(), SchemaError> {
        for (name, v) in [
            ("field_confidence_threshold", self.field_confidence_threshold),
            (
                "category_confidence_threshold",
                self.category_confidence_threshold,
            ),
            ("arithmetic_tolerance", self.arithmetic_tolerance),
        ] {
            if !(0.0..=1.0).contains(&v) || v.is_nan() {
                return Err(SchemaError::new(
                    format!("/thresholds/{name}"),
                    format!("must be within [0, 1], got {v}"),
                ));
            }
        }
        if self.duplicate_hash_window_days == 0 {
            return Err(SchemaError::new(
                "/thresholds/duplicate_hash_window_days",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let t = ProcessingThresholds::default();
        assert!(t.validate().is_ok());
        assert_eq!(t.field_confidence_threshold, 0.82);
        assert_eq!(t.category_confidence_threshold, 0.75);
        assert_eq!(t.arithmetic_tolerance, 0.02);
        assert_eq!(t.rounding_decimal_places, 2);
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let t = ProcessingThresholds {
            field_confidence_threshold: 1.5,
            ..Default::default()
        };
        let err = t.validate().unwrap_err();
        assert!(err.path.contains("field_confidence_threshold"));
    }

    #[test]
    fn zero_window_is_rejected() {
        let t = ProcessingThresholds {
            duplicate_hash_window_days: 0,
            ..Default::default()
        };
        assert!(t.validate().is_err());
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let t: ProcessingThresholds =
            toml_like(r#"{"arithmetic_tolerance": 0.05}"#);
        assert_eq!(t.arithmetic_tolerance, 0.05);
        assert_eq!(t.rounding_decimal_places, 2);
    }

    fn toml_like(json: &str) -> ProcessingThresholds {
        serde_json::from_str(json).unwrap()
    }
}
