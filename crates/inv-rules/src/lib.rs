// SPDX-License-Identifier: MIT OR Apache-2.0
//! inv-rules
#![deny(unsafe_code)]
//!
//! Deterministic validation rules over extracted invoices. The engine
//! is purely functional: same invoice and thresholds, same report.
//! Each rule contributes zero or more failures addressed by
//! JSON-Pointer path; advisory findings land in the warning list.

use inv_model::{Failure, Invoice, ProcessingThresholds, RuleReport, Warning};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::debug;

/// Rules whose failures the repair gateway may attempt to fix.
pub const REPAIRABLE_RULES: [&str; 7] = [
    "arithmetic_balance",
    "line_sum_subtotal",
    "line_sum_tax",
    "date_format",
    "currency_format",
    "tax_coherence",
    "rounding_policy",
];

/// Validation engine configured by [`ProcessingThresholds`].
#[derive(Debug, Clone, Default)]
pub struct RulesEngine {
    thresholds: ProcessingThresholds,
}

impl RulesEngine {
    /// Create an engine with the given thresholds.
    #[must_use]
    pub fn new(thresholds: ProcessingThresholds) -> Self {
        Self { thresholds }
    }

    /// The engine's thresholds.
    #[must_use]
    pub fn thresholds(&self) -> &ProcessingThresholds {
        &self.thresholds
    }

    /// Validate an invoice, carrying extraction warnings into the report.
    #[must_use]
    pub fn validate(&self, invoice: &Invoice, carried_warnings: &[Warning]) -> RuleReport {
        let mut failures = Vec::new();
        let warnings = carried_warnings.to_vec();

        self.check_arithmetic_balance(invoice, &mut failures);
        self.check_line_sums(invoice, &mut failures);
        self.check_dates(invoice, &mut failures);
        self.check_currency(invoice, &mut failures);
        self.check_amounts(invoice, &mut failures);
        self.check_duplicate_hash(invoice, &mut failures);
        self.check_tax_coherence(invoice, &mut failures);
        self.check_rounding_policy(invoice, &mut failures);

        let report = RuleReport::from_parts(failures, warnings);
        debug!(
            target: "inv.rules",
            passed = report.passed,
            failures = report.failures.len(),
            warnings = report.warnings.len(),
            "validation complete"
        );
        report
    }

    fn tolerance(&self) -> Decimal {
        Decimal::from_f64(self.thresholds.arithmetic_tolerance).unwrap_or_else(|| {
            Decimal::new(2, 2) // 0.02
        })
    }

    fn report_dp(&self, d: Decimal) -> Decimal {
        d.round_dp_with_strategy(
            self.thresholds.rounding_decimal_places,
            RoundingStrategy::MidpointAwayFromZero,
        )
    }

    /// Relative error `|actual − expected| / |expected|` exceeds τ.
    fn out_of_tolerance(&self, expected: Decimal, actual: Decimal) -> bool {
        if expected.is_zero() {
            return !actual.is_zero();
        }
        let error = (actual - expected).abs() / expected.abs();
        error > self.tolerance()
    }

    // -- arithmetic_balance -------------------------------------------------

    fn check_arithmetic_balance(&self, invoice: &Invoice, failures: &mut Vec<Failure>) {
        let Some(grand_total) = invoice.amounts.grand_total.value else {
            return; // required_* rules cover the absence
        };

        // With no subtotal the equation reduces to identity: the grand
        // total stands alone and the rule passes by construction.
        let expected = match amount(&invoice.amounts.subtotal) {
            Some(subtotal) => {
                let mut e = subtotal;
                e += amount(&invoice.amounts.tax_amount).unwrap_or_default();
                e += amount(&invoice.amounts.shipping).unwrap_or_default();
                e -= amount(&invoice.amounts.discount).unwrap_or_default();
                e
            }
            None => grand_total,
        };

        if self.out_of_tolerance(expected, grand_total) {
            let expected = self.report_dp(expected);
            let actual = self.report_dp(grand_total);
            failures.push(Failure {
                rule: "arithmetic_balance".to_string(),
                path: "/amounts/grand_total".to_string(),
                reason: format!(
                    "grand total {actual} does not balance subtotal + tax + shipping − discount = {expected}"
                ),
                expected: Some(expected),
                actual: Some(actual),
                tolerance: Some(self.thresholds.arithmetic_tolerance),
                suggested_fix: Some(format!("adjust grand total to {expected} or verify the component amounts")),
            });
        }
    }

    // -- line_sum_subtotal / line_sum_tax -----------------------------------

    fn check_line_sums(&self, invoice: &Invoice, failures: &mut Vec<Failure>) {
        let mut line_total: Option<Decimal> = None;
        let mut line_tax: Option<Decimal> = None;
        for item in &invoice.line_items {
            if let (Some(qty), Some(unit)) = (amount(&item.quantity), amount(&item.unit_price)) {
                *line_total.get_or_insert(Decimal::ZERO) += qty * unit;
            }
            if let Some(tax) = amount(&item.tax_amount) {
                *line_tax.get_or_insert(Decimal::ZERO) += tax;
            }
        }

        if let (Some(expected), Some(subtotal)) = (line_total, amount(&invoice.amounts.subtotal)) {
            if self.out_of_tolerance(expected, subtotal) {
                let expected = self.report_dp(expected);
                let actual = self.report_dp(subtotal);
                failures.push(Failure {
                    rule: "line_sum_subtotal".to_string(),
                    path: "/amounts/subtotal".to_string(),
                    reason: format!(
                        "line items sum to {expected} but the subtotal reads {actual}"
                    ),
                    expected: Some(expected),
                    actual: Some(actual),
                    tolerance: Some(self.thresholds.arithmetic_tolerance),
                    suggested_fix: Some(format!("adjust subtotal to {expected} or verify line item quantities and prices")),
                });
            }
        }

        if let (Some(expected), Some(tax)) = (line_tax, amount(&invoice.amounts.tax_amount)) {
            if self.out_of_tolerance(expected, tax) {
                let expected = self.report_dp(expected);
                let actual = self.report_dp(tax);
                failures.push(Failure {
                    rule: "line_sum_tax".to_string(),
                    path: "/amounts/tax_amount".to_string(),
                    reason: format!(
                        "line item tax sums to {expected} but the invoice tax reads {actual}"
                    ),
                    expected: Some(expected),
                    actual: Some(actual),
                    tolerance: Some(self.thresholds.arithmetic_tolerance),
                    suggested_fix: Some(format!("adjust tax amount to {expected} or verify line item tax values")),
                });
            }
        }
    }

    // -- required_date / date_format / date_logic ---------------------------

    fn check_dates(&self, invoice: &Invoice, failures: &mut Vec<Failure>) {
        let invoice_date = match invoice.invoice_date.value {
            Some(d) => d,
            None => {
                failures.push(Failure {
                    rule: "required_date".to_string(),
                    path: "/invoice_date".to_string(),
                    reason: "invoice date is required".to_string(),
                    expected: None,
                    actual: None,
                    tolerance: None,
                    suggested_fix: Some("provide a valid invoice date".to_string()),
                });
                return;
            }
        };

        if let Some(due) = invoice.due_date.as_ref().and_then(|f| f.value) {
            if due < invoice_date {
                failures.push(Failure {
                    rule: "date_logic".to_string(),
                    path: "/due_date".to_string(),
                    reason: format!(
                        "due date {due} precedes the invoice date {invoice_date}"
                    ),
                    expected: None,
                    actual: None,
                    tolerance: None,
                    suggested_fix: Some("adjust the due date to fall on or after the invoice date".to_string()),
                });
            }
        }
    }

    // -- required_currency / currency_format --------------------------------

    fn check_currency(&self, invoice: &Invoice, failures: &mut Vec<Failure>) {
        let currency = &invoice.amounts.currency;
        if currency.value.is_none() {
            failures.push(Failure {
                rule: "required_currency".to_string(),
                path: "/amounts/currency".to_string(),
                reason: "currency is required".to_string(),
                expected: None,
                actual: None,
                tolerance: None,
                suggested_fix: Some("provide an ISO 4217 currency code".to_string()),
            });
            return;
        }
        // A defaulted currency (no evidence, floor confidence) means the
        // document showed no supported symbol or code.
        if currency.evidence.is_empty() && currency.confidence < 0.5 {
            failures.push(Failure {
                rule: "currency_format".to_string(),
                path: "/amounts/currency".to_string(),
                reason: "no supported currency symbol or code was observed in the document"
                    .to_string(),
                expected: None,
                actual: None,
                tolerance: None,
                suggested_fix: Some(
                    "cite evidence for a currency in the allowed set (EUR, USD, GBP, JPY, SAR, AED, EGP, QAR, KWD, BHD)".to_string(),
                ),
            });
        }
    }

    // -- non_negative_amount / amount_format --------------------------------

    fn check_amounts(&self, invoice: &Invoice, failures: &mut Vec<Failure>) {
        let mut check = |path: String, value: Option<Decimal>| {
            if let Some(v) = value {
                if v.is_sign_negative() {
                    failures.push(Failure {
                        rule: "non_negative_amount".to_string(),
                        path: path.clone(),
                        reason: format!("amount {v} is negative"),
                        expected: None,
                        actual: Some(v),
                        tolerance: None,
                        suggested_fix: Some("amounts must be non-negative".to_string()),
                    });
                }
            }
        };

        check(
            "/amounts/grand_total".to_string(),
            invoice.amounts.grand_total.value,
        );
        for (path, field) in invoice.amounts.optional_fields() {
            check(path.to_string(), field.and_then(|f| f.value));
        }
        for (i, item) in invoice.line_items.iter().enumerate() {
            check(format!("/line_items/{i}/quantity"), amount(&item.quantity));
            check(
                format!("/line_items/{i}/unit_price"),
                amount(&item.unit_price),
            );
            check(format!("/line_items/{i}/total"), amount(&item.total));
            check(
                format!("/line_items/{i}/tax_amount"),
                amount(&item.tax_amount),
            );
        }

        if let Some(rate) = amount(&invoice.amounts.tax_rate) {
            if rate < Decimal::ZERO || rate > Decimal::from(100) {
                failures.push(Failure {
                    rule: "amount_format".to_string(),
                    path: "/amounts/tax_rate".to_string(),
                    reason: format!("tax rate {rate} is outside [0, 100]"),
                    expected: None,
                    actual: Some(rate),
                    tolerance: None,
                    suggested_fix: Some("express the tax rate as a percentage".to_string()),
                });
            }
        }
    }

    // -- duplicate_hash -----------------------------------------------------

    fn check_duplicate_hash(&self, invoice: &Invoice, failures: &mut Vec<Failure>) {
        if invoice.duplicate_hash.is_empty() {
            failures.push(Failure {
                rule: "duplicate_hash".to_string(),
                path: "/duplicate_hash".to_string(),
                reason: "duplicate hash is missing".to_string(),
                expected: None,
                actual: None,
                tolerance: None,
                suggested_fix: Some("derive the duplicate hash from the key tuple".to_string()),
            });
        }
    }

    // -- tax_coherence ------------------------------------------------------

    fn check_tax_coherence(&self, invoice: &Invoice, failures: &mut Vec<Failure>) {
        let (Some(rate), Some(tax), Some(subtotal)) = (
            amount(&invoice.amounts.tax_rate),
            amount(&invoice.amounts.tax_amount),
            amount(&invoice.amounts.subtotal),
        ) else {
            return;
        };

        let expected = subtotal * rate / Decimal::from(100);
        if self.out_of_tolerance(expected, tax) {
            let expected = self.report_dp(expected);
            let actual = self.report_dp(tax);
            failures.push(Failure {
                rule: "tax_coherence".to_string(),
                path: "/amounts/tax_amount".to_string(),
                reason: format!(
                    "tax amount {actual} does not match rate {rate}% applied to subtotal (expected {expected})"
                ),
                expected: Some(expected),
                actual: Some(actual),
                tolerance: Some(self.thresholds.arithmetic_tolerance),
                suggested_fix: Some(format!("adjust tax amount to {expected} or correct the tax rate")),
            });
        }
    }

    // -- rounding_policy ----------------------------------------------------

    fn check_rounding_policy(&self, invoice: &Invoice, failures: &mut Vec<Failure>) {
        let max_dp = self.thresholds.rounding_decimal_places;
        let mut check = |path: String, value: Option<Decimal>| {
            if let Some(v) = value {
                if v.scale() > max_dp {
                    failures.push(Failure {
                        rule: "rounding_policy".to_string(),
                        path,
                        reason: format!(
                            "{v} carries {} decimal places (max {max_dp})",
                            v.scale()
                        ),
                        expected: None,
                        actual: Some(v),
                        tolerance: None,
                        suggested_fix: Some(format!("round to {max_dp} decimal places")),
                    });
                }
            }
        };

        check(
            "/amounts/grand_total".to_string(),
            invoice.amounts.grand_total.value,
        );
        for (path, field) in invoice.amounts.optional_fields() {
            check(path.to_string(), field.and_then(|f| f.value));
        }
    }
}

fn amount(field: &Option<inv_model::FieldValue<Decimal>>) -> Option<Decimal> {
    field.as_ref().and_then(|f| f.value)
}
