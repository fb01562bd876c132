// SPDX-License-Identifier: MIT OR Apache-2.0
//! Rule reports, repair patches, and the final processing result.

use crate::invoice::{Invoice, ProcessingStatus};
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RuleReport
// ---------------------------------------------------------------------------

/// Outcome of a validation pass over an invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct RuleReport {
    /// `true` when no rule produced a failure.
    pub passed: bool,
    /// Rule failures, in evaluation order.
    #[serde(default)]
    pub failures: Vec<Failure>,
    /// Advisory warnings that do not block posting.
    #[serde(default)]
    pub warnings: Vec<Warning>,
}

impl RuleReport {
    /// Build a report from accumulated failures and warnings.
    #[must_use]
    pub fn from_parts(failures: Vec<Failure>, warnings: Vec<Warning>) -> Self {
        Self {
            passed: failures.is_empty(),
            failures,
            warnings,
        }
    }

    /// `true` when every failure's rule is in the given repairable set.
    #[must_use]
    pub fn all_repairable(&self, repairable: &[&str]) -> bool {
        !self.failures.is_empty()
            && self
                .failures
                .iter()
                .all(|f| repairable.contains(&f.rule.as_str()))
    }
}

/// A single rule failure with the pointer path it concerns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Failure {
    /// Rule identifier (e.g. `arithmetic_balance`).
    pub rule: String,
    /// JSON-Pointer path into the invoice.
    pub path: String,
    /// Human-readable description.
    pub reason: String,
    /// Expected value, when the rule computes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Decimal>,
    /// Observed value, when the rule computes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<Decimal>,
    /// Relative tolerance the comparison used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
    /// Suggested correction for the repair gateway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
}

/// An advisory warning attached to a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Warning {
    /// Rule identifier.
    pub rule: String,
    /// JSON-Pointer path into the invoice.
    pub path: String,
    /// Human-readable message.
    pub message: String,
}

// ---------------------------------------------------------------------------
// JsonPatch
// ---------------------------------------------------------------------------

/// Allowed patch operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PatchOp {
    /// Add a value at a path that is currently absent.
    Add,
    /// Replace the value at an existing path.
    Replace,
}

/// A bounded repair operation with rationale and evidence citations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JsonPatch {
    /// Operation kind.
    pub op: PatchOp,
    /// JSON-Pointer path into the invoice.
    pub path: String,
    /// Replacement value.
    pub value: serde_json::Value,
    /// Why the change is justified. At least 10 characters.
    pub rationale: String,
    /// Evidence bbox ids the change cites. Must be nonempty.
    pub cites_bbox: Vec<String>,
}

impl JsonPatch {
    /// Minimum rationale length accepted by the contract.
    pub const MIN_RATIONALE_LEN: usize = 10;

    /// Check the patch against the response contract.
    ///
    /// `allowed_paths` are the required-field paths plus the paths listed
    /// in failures. Returns the reason the patch is rejected, or `None`
    /// if it is acceptable.
    #[must_use]
    pub fn contract_violation(&self, allowed_paths: &[String]) -> Option<String> {
        if !self.path.starts_with('/') {
            return Some(format!("path '{}' is not a JSON pointer", self.path));
        }
        if !allowed_paths.iter().any(|p| p == &self.path) {
            return Some(format!("path '{}' is not an allowed target", self.path));
        }
        if self.rationale.trim().len() < Self::MIN_RATIONALE_LEN {
            return Some("rationale shorter than 10 characters".to_string());
        }
        if self.cites_bbox.is_empty() {
            return Some("cites_bbox is empty".to_string());
        }
        None
    }
}

// ---------------------------------------------------------------------------
// ProcessingResult
// ---------------------------------------------------------------------------

/// Complete result of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProcessingResult {
    /// The final invoice record.
    pub invoice: Invoice,
    /// Validation outcome (post-repair, when a patch was applied).
    pub rule_report: RuleReport,
    /// The validated patch list, when the repair gateway ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_patch: Option<Vec<JsonPatch>>,
    /// Final invoice JSON as emitted to downstream consumers.
    pub final_json: serde_json::Value,
    /// Ordered audit entries recorded for this job.
    #[serde(default)]
    pub audit_trail: Vec<serde_json::Value>,
    /// Final decision.
    pub status: ProcessingStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(rule: &str) -> Failure {
        Failure {
            rule: rule.to_string(),
            path: "/amounts/grand_total".to_string(),
            reason: "mismatch".to_string(),
            expected: None,
            actual: None,
            tolerance: None,
            suggested_fix: None,
        }
    }

    #[test]
    fn report_passes_iff_no_failures() {
        let report = RuleReport::from_parts(vec![], vec![]);
        assert!(report.passed);
        let report = RuleReport::from_parts(vec![failure("arithmetic_balance")], vec![]);
        assert!(!report.passed);
    }

    #[test]
    fn all_repairable_requires_every_failure_in_set() {
        let set = ["arithmetic_balance", "tax_coherence"];
        let report = RuleReport::from_parts(vec![failure("arithmetic_balance")], vec![]);
        assert!(report.all_repairable(&set));

        let report = RuleReport::from_parts(
            vec![failure("arithmetic_balance"), failure("date_logic")],
            vec![],
        );
        assert!(!report.all_repairable(&set));
    }

    #[test]
    fn all_repairable_is_false_for_clean_report() {
        let report = RuleReport::from_parts(vec![], vec![]);
        assert!(!report.all_repairable(&["arithmetic_balance"]));
    }

    #[test]
    fn patch_contract_rejects_short_rationale() {
        let patch = JsonPatch {
            op: PatchOp::Replace,
            path: "/amounts/grand_total".to_string(),
            value: serde_json::json!("1190.00"),
            rationale: "short".to_string(),
            cites_bbox: vec!["p0#bx_0001".to_string()],
        };
        let allowed = vec!["/amounts/grand_total".to_string()];
        assert!(patch.contract_violation(&allowed).is_some());
    }

    #[test]
    fn patch_contract_rejects_uncited_patch() {
        let patch = JsonPatch {
            op: PatchOp::Replace,
            path: "/amounts/grand_total".to_string(),
            value: serde_json::json!("1190.00"),
            rationale: "total shown on page balances the arithmetic".to_string(),
            cites_bbox: vec![],
        };
        let allowed = vec!["/amounts/grand_total".to_string()];
        assert!(patch.contract_violation(&allowed).is_some());
    }

    #[test]
    fn patch_contract_rejects_disallowed_path() {
        let patch = JsonPatch {
            op: PatchOp::Replace,
            path: "/vendor/name".to_string(),
            value: serde_json::json!("ACME"),
            rationale: "vendor name is clearly printed in the header".to_string(),
            cites_bbox: vec!["p0#bx_0001".to_string()],
        };
        let allowed = vec!["/amounts/grand_total".to_string()];
        assert!(patch.contract_violation(&allowed).is_some());
    }

    #[test]
    fn patch_contract_accepts_well_formed_patch() {
        let patch = JsonPatch {
            op: PatchOp::Replace,
            path: "/amounts/grand_total".to_string(),
            value: serde_json::json!("1190.00"),
            rationale: "grand total text reads 1.190,00 on page 0".to_string(),
            cites_bbox: vec!["p0#bx_0042".to_string()],
        };
        let allowed = vec!["/amounts/grand_total".to_string()];
        assert!(patch.contract_violation(&allowed).is_none());
    }

    #[test]
    fn patch_op_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&PatchOp::Replace).unwrap(), "\"replace\"");
        assert_eq!(serde_json::to_string(&PatchOp::Add).unwrap(), "\"add\"");
    }
}
