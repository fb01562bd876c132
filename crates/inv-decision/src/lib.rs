// SPDX-License-Identifier: MIT OR Apache-2.0
//! inv-decision
#![deny(unsafe_code)]
//!
//! The decision policy: given an extracted invoice and its rule report,
//! choose between auto-posting, a bounded LLM repair attempt, and human
//! review. Deterministic and side-effect free; the trace it emits goes
//! straight into the audit log.

use inv_model::{Invoice, ProcessingThresholds, RuleReport};
use inv_rules::REPAIRABLE_RULES;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The action the orchestrator takes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Post without human involvement.
    AutoPost,
    /// Attempt one bounded LLM repair, then re-validate.
    LlmFallback,
    /// Route to human review.
    NeedsReview,
}

/// The factors behind a decision, recorded for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTrace {
    /// Chosen action.
    pub action: Action,
    /// Every required field cleared the confidence threshold.
    pub field_conf_ok: bool,
    /// The rule report had no failures.
    pub rules_passed: bool,
    /// Every categorised line item cleared the category threshold.
    pub category_ok: bool,
    /// Human-readable explanation.
    pub reason: String,
}

/// Decision policy configured by [`ProcessingThresholds`].
#[derive(Debug, Clone, Default)]
pub struct DecisionPolicy {
    thresholds: ProcessingThresholds,
}

impl DecisionPolicy {
    /// Create a policy with the given thresholds.
    #[must_use]
    pub fn new(thresholds: ProcessingThresholds) -> Self {
        Self { thresholds }
    }

    /// Decide the next action for an invoice.
    #[must_use]
    pub fn decide(&self, invoice: &Invoice, report: &RuleReport) -> DecisionTrace {
        let field_conf_ok = self.field_confidence_ok(invoice);
        let rules_passed = report.passed;
        let category_ok = self.category_confidence_ok(invoice);

        let (action, reason) = if field_conf_ok && rules_passed && category_ok {
            (Action::AutoPost, "all checks passed".to_string())
        } else if !rules_passed && report.all_repairable(&REPAIRABLE_RULES) {
            (
                Action::LlmFallback,
                "rule failures are all repairable".to_string(),
            )
        } else {
            (Action::NeedsReview, review_reason(field_conf_ok, rules_passed, category_ok))
        };

        debug!(
            target: "inv.decision",
            ?action,
            field_conf_ok,
            rules_passed,
            category_ok,
            "decision made"
        );
        DecisionTrace {
            action,
            field_conf_ok,
            rules_passed,
            category_ok,
            reason,
        }
    }

    fn field_confidence_ok(&self, invoice: &Invoice) -> bool {
        invoice
            .required_field_confidences()
            .iter()
            .all(|(_, conf)| *conf >= self.thresholds.field_confidence_threshold)
    }

    fn category_confidence_ok(&self, invoice: &Invoice) -> bool {
        invoice.line_items.iter().all(|item| {
            match (item.category.as_deref(), item.category_confidence) {
                (Some(_), Some(conf)) => conf >= self.thresholds.category_confidence_threshold,
                // Unclassified items do not block posting.
                _ => true,
            }
        })
    }
}

fn review_reason(field_conf_ok: bool, rules_passed: bool, category_ok: bool) -> String {
    let mut parts = Vec::new();
    if !field_conf_ok {
        parts.push("required field confidence below threshold");
    }
    if !rules_passed {
        parts.push("non-repairable rule failures");
    }
    if !category_ok {
        parts.push("category confidence below threshold");
    }
    if parts.is_empty() {
        "manual review required".to_string()
    } else {
        parts.join("; ")
    }
}
