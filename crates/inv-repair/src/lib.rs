// SPDX-License-Identifier: MIT OR Apache-2.0
//! inv-repair
#![deny(unsafe_code)]
//!
//! The LLM repair gateway. Builds a structured repair request from the
//! invoice, its rule report, and curated evidence snippets; validates
//! the returned JSON-Patch array against a strict contract; applies the
//! surviving patches through the pointer accessor. At most one LLM call
//! per job, never retried.

mod snippets;

pub use snippets::{build_snippets, EvidenceSnippet, DEFAULT_MAX_SNIPPETS};

use async_trait::async_trait;
use inv_model::{pointer, Invoice, JsonPatch, RuleReport, Token};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// Instruction block sent with every repair request.
pub const MAX_PATCHES: usize = 5;

/// System prompt framing the fixer as an abstaining auditor.
pub const SYSTEM_PROMPT: &str = "You are an auditor for invoice JSON. Input: a strict JSON schema \
instance (fields may be null), a RULE REPORT with failed rules, and OCR evidence snippets with \
bbox ids.\nTASK: Only if you can fix a field with high confidence from the snippets, output a \
JSON Patch array. Otherwise, output [].\nRULES:\n- Do not re-extract from raw text beyond \
provided snippets.\n- Only edit fields listed in failed rules or null required fields.\n- If \
uncertain, abstain.\n- For each operation, include a \"rationale\" sibling key (string) and a \
\"cites_bbox\" array of evidence ids.\nOUTPUT: JSON Patch array of objects with keys: op, path, \
value, rationale, cites_bbox.";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Repair-stage failures. All of them mean "no patch".
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// The fixer did not answer within its timeout.
    #[error("llm call timed out after {timeout_secs}s")]
    Timeout {
        /// Configured timeout in seconds.
        timeout_secs: u64,
    },

    /// The response was not a JSON array.
    #[error("malformed llm response: {0}")]
    Malformed(String),

    /// The fixer itself failed.
    #[error("llm call failed: {0}")]
    Call(String),
}

// ---------------------------------------------------------------------------
// Fixer interface
// ---------------------------------------------------------------------------

/// The external LLM collaborator.
///
/// Receives the serialised [`RepairRequest`] and returns the raw
/// response text, expected to be a bare JSON array of patches.
#[async_trait]
pub trait LlmFixer: Send + Sync {
    /// Propose repairs for the request. Called at most once per job.
    async fn propose(&self, request: &RepairRequest) -> Result<String, LlmError>;

    /// Model identifier recorded in audit metadata.
    fn model_info(&self) -> Value;
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Wire shape of one repair request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairRequest {
    /// The invoice as JSON.
    pub invoice_json: Value,
    /// The failing rule report.
    pub rule_report: RuleReport,
    /// Curated evidence snippets with stable bbox ids.
    pub evidence_snippets: Vec<EvidenceSnippet>,
    /// Bounds the fixer must respect.
    pub instructions: RepairInstructions,
}

/// Instruction block bounding the fixer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairInstructions {
    /// Maximum number of patches accepted.
    pub max_patches: usize,
    /// Confidence below which the fixer should abstain.
    pub confidence_threshold: f64,
    /// Allowed patch operations.
    pub allowed_operations: Vec<String>,
    /// Required-field paths that may always be patched.
    pub required_fields: Vec<String>,
}

impl Default for RepairInstructions {
    fn default() -> Self {
        Self {
            max_patches: MAX_PATCHES,
            confidence_threshold: 0.8,
            allowed_operations: vec!["replace".to_string(), "add".to_string()],
            required_fields: pointer::REQUIRED_FIELD_PATHS
                .iter()
                .map(|p| (*p).to_string())
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

/// Builds requests, validates responses, applies patches.
pub struct RepairGateway {
    fixer: Arc<dyn LlmFixer>,
    max_snippets: usize,
}

impl RepairGateway {
    /// Create a gateway around a fixer.
    pub fn new(fixer: Arc<dyn LlmFixer>) -> Self {
        Self {
            fixer,
            max_snippets: DEFAULT_MAX_SNIPPETS,
        }
    }

    /// Override the evidence snippet cap.
    #[must_use]
    pub fn with_max_snippets(mut self, max_snippets: usize) -> Self {
        self.max_snippets = max_snippets;
        self
    }

    /// The fixer's model info, for audit entries.
    #[must_use]
    pub fn model_info(&self) -> Value {
        self.fixer.model_info()
    }

    /// Build the repair request for a failing invoice.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Malformed`] if the invoice cannot be
    /// serialised (never expected for a built invoice).
    pub fn build_request(
        &self,
        invoice: &Invoice,
        report: &RuleReport,
        tokens: &[Token],
    ) -> Result<RepairRequest, LlmError> {
        let invoice_json =
            serde_json::to_value(invoice).map_err(|e| LlmError::Malformed(e.to_string()))?;
        Ok(RepairRequest {
            invoice_json,
            rule_report: report.clone(),
            evidence_snippets: build_snippets(tokens, self.max_snippets),
            instructions: RepairInstructions::default(),
        })
    }

    /// Call the fixer once and return the validated patch list.
    ///
    /// Patches violating the contract are dropped silently; the list may
    /// be empty. The call is never retried.
    ///
    /// # Errors
    ///
    /// Propagates the fixer's [`LlmError`]; the caller treats any error
    /// as "no patch".
    pub async fn propose(
        &self,
        request: &RepairRequest,
    ) -> Result<Vec<JsonPatch>, LlmError> {
        let raw = self.fixer.propose(request).await?;
        let candidates: Vec<Value> =
            serde_json::from_str(raw.trim()).map_err(|e| LlmError::Malformed(e.to_string()))?;

        let allowed_paths = allowed_paths(&request.rule_report, &request.instructions);
        let mut patches = Vec::new();
        for candidate in candidates {
            if patches.len() >= request.instructions.max_patches {
                warn!(target: "inv.repair", "patch limit reached; remaining patches dropped");
                break;
            }
            let patch: JsonPatch = match serde_json::from_value(candidate) {
                Ok(p) => p,
                Err(e) => {
                    warn!(target: "inv.repair", error = %e, "dropping malformed patch");
                    continue;
                }
            };
            if let Some(reason) = patch.contract_violation(&allowed_paths) {
                warn!(target: "inv.repair", %reason, path = %patch.path, "dropping patch");
                continue;
            }
            patches.push(patch);
        }

        info!(target: "inv.repair", accepted = patches.len(), "validated llm patches");
        Ok(patches)
    }

    /// Apply validated patches in order.
    ///
    /// Marks `llm_patch_applied` and re-derives the duplicate hash when
    /// any patch landed. A patch whose value cannot be converted is
    /// skipped with a warning; earlier patches remain applied.
    pub fn apply(&self, invoice: &mut Invoice, patches: &[JsonPatch]) {
        let mut applied = 0usize;
        for patch in patches {
            match pointer::set(invoice, &patch.path, patch.value.clone()) {
                Ok(()) => applied += 1,
                Err(e) => {
                    warn!(target: "inv.repair", path = %patch.path, error = %e, "patch skipped");
                }
            }
        }
        if applied > 0 {
            invoice.llm_patch_applied = true;
            refresh_duplicate_hash(invoice);
        }
        info!(target: "inv.repair", applied, "patch application complete");
    }
}

/// Required-field paths plus every failing path.
fn allowed_paths(report: &RuleReport, instructions: &RepairInstructions) -> Vec<String> {
    let mut paths = instructions.required_fields.clone();
    for failure in &report.failures {
        if !paths.contains(&failure.path) {
            paths.push(failure.path.clone());
        }
    }
    paths
}

/// The duplicate hash depends on the key tuple; re-derive it after a
/// patch may have changed any component.
fn refresh_duplicate_hash(invoice: &mut Invoice) {
    let (Some(name), Some(number), Some(date), Some(total)) = (
        invoice.vendor.name.value.as_deref(),
        invoice.invoice_number.value.as_deref(),
        invoice.invoice_date.value,
        invoice.amounts.grand_total.value,
    ) else {
        return;
    };
    invoice.duplicate_hash = inv_model::hash::duplicate_hash(name, number, date, total);
}

/// Assemble the audit metadata value for an LLM call.
#[must_use]
pub fn audit_payload(request: &RepairRequest, patches: &[JsonPatch]) -> (Value, Value) {
    let input = json!({
        "system_prompt": SYSTEM_PROMPT,
        "request": request,
    });
    let output = serde_json::to_value(patches).unwrap_or(Value::Null);
    (input, output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use inv_model::{
        Amounts, BBox, CurrencyCode, Evidence, Failure, FieldValue, InvoiceBuilder, RuleReport,
        Vendor,
    };
    use rust_decimal_macros::dec;

    struct CannedFixer(String);

    #[async_trait]
    impl LlmFixer for CannedFixer {
        async fn propose(&self, _request: &RepairRequest) -> Result<String, LlmError> {
            Ok(self.0.clone())
        }

        fn model_info(&self) -> Value {
            json!({"model": "canned"})
        }
    }

    fn field<T>(value: T) -> FieldValue<T> {
        let ev = Evidence::new(0, BBox::new(0.0, 0.0, 10.0, 10.0).unwrap(), "x", 0.9).unwrap();
        FieldValue::found(value, 0.9, vec![ev]).unwrap()
    }

    fn invoice() -> Invoice {
        let vendor = Vendor {
            name: field("ACME GmbH".to_string()),
            address: None,
            tax_id: None,
            phone: None,
            email: None,
            layout_hash: "00".repeat(16),
        };
        let amounts = Amounts {
            subtotal: Some(field(dec!(1000.00))),
            tax_amount: Some(field(dec!(190.00))),
            tax_rate: None,
            discount: None,
            shipping: None,
            grand_total: field(dec!(1200.00)),
            currency: field(CurrencyCode::EUR),
        };
        InvoiceBuilder::new("p-1", "inv.pdf")
            .invoice_number(field("INV-1".to_string()))
            .invoice_date(field(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()))
            .vendor(vendor)
            .amounts(amounts)
            .build()
            .unwrap()
    }

    fn failing_report() -> RuleReport {
        RuleReport::from_parts(
            vec![Failure {
                rule: "arithmetic_balance".to_string(),
                path: "/amounts/grand_total".to_string(),
                reason: "mismatch".to_string(),
                expected: Some(dec!(1190.00)),
                actual: Some(dec!(1200.00)),
                tolerance: Some(0.02),
                suggested_fix: None,
            }],
            vec![],
        )
    }

    fn patch_json(path: &str, value: &str) -> String {
        json!([{
            "op": "replace",
            "path": path,
            "value": value,
            "rationale": "the printed total reads 1.190,00 and balances the arithmetic",
            "cites_bbox": ["p0#bx_0042"],
        }])
        .to_string()
    }

    #[tokio::test]
    async fn valid_patch_survives_validation() {
        let gateway = RepairGateway::new(Arc::new(CannedFixer(patch_json(
            "/amounts/grand_total",
            "1190.00",
        ))));
        let request = gateway
            .build_request(&invoice(), &failing_report(), &[])
            .unwrap();
        let patches = gateway.propose(&request).await.unwrap();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].path, "/amounts/grand_total");
    }

    #[tokio::test]
    async fn patch_outside_allowed_paths_is_dropped() {
        let gateway = RepairGateway::new(Arc::new(CannedFixer(patch_json(
            "/notes",
            "injected",
        ))));
        let request = gateway
            .build_request(&invoice(), &failing_report(), &[])
            .unwrap();
        let patches = gateway.propose(&request).await.unwrap();
        assert!(patches.is_empty());
    }

    #[tokio::test]
    async fn short_rationale_is_dropped() {
        let raw = json!([{
            "op": "replace",
            "path": "/amounts/grand_total",
            "value": "1190.00",
            "rationale": "fix",
            "cites_bbox": ["p0#bx_0042"],
        }])
        .to_string();
        let gateway = RepairGateway::new(Arc::new(CannedFixer(raw)));
        let request = gateway
            .build_request(&invoice(), &failing_report(), &[])
            .unwrap();
        assert!(gateway.propose(&request).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_op_is_dropped() {
        let raw = json!([{
            "op": "remove",
            "path": "/amounts/grand_total",
            "value": null,
            "rationale": "remove the disputed grand total entirely",
            "cites_bbox": ["p0#bx_0042"],
        }])
        .to_string();
        let gateway = RepairGateway::new(Arc::new(CannedFixer(raw)));
        let request = gateway
            .build_request(&invoice(), &failing_report(), &[])
            .unwrap();
        assert!(gateway.propose(&request).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_array_response_is_malformed() {
        let gateway = RepairGateway::new(Arc::new(CannedFixer("{\"not\": \"array\"}".into())));
        let request = gateway
            .build_request(&invoice(), &failing_report(), &[])
            .unwrap();
        assert!(matches!(
            gateway.propose(&request).await,
            Err(LlmError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn patch_count_is_capped() {
        let one = json!({
            "op": "replace",
            "path": "/amounts/grand_total",
            "value": "1190.00",
            "rationale": "the printed total reads 1.190,00 and balances",
            "cites_bbox": ["p0#bx_0042"],
        });
        let raw = serde_json::to_string(&vec![one; 9]).unwrap();
        let gateway = RepairGateway::new(Arc::new(CannedFixer(raw)));
        let request = gateway
            .build_request(&invoice(), &failing_report(), &[])
            .unwrap();
        assert_eq!(gateway.propose(&request).await.unwrap().len(), MAX_PATCHES);
    }

    #[tokio::test]
    async fn apply_sets_flag_and_refreshes_duplicate_hash() {
        let gateway = RepairGateway::new(Arc::new(CannedFixer(patch_json(
            "/amounts/grand_total",
            "1190.00",
        ))));
        let mut inv = invoice();
        let before_hash = inv.duplicate_hash.clone();
        let request = gateway.build_request(&inv, &failing_report(), &[]).unwrap();
        let patches = gateway.propose(&request).await.unwrap();
        gateway.apply(&mut inv, &patches);

        assert!(inv.llm_patch_applied);
        assert_eq!(inv.amounts.grand_total.value, Some(dec!(1190.00)));
        assert_ne!(inv.duplicate_hash, before_hash);
    }

    #[tokio::test]
    async fn apply_skips_unconvertible_values() {
        let gateway = RepairGateway::new(Arc::new(CannedFixer(String::new())));
        let mut inv = invoice();
        let patch = JsonPatch {
            op: inv_model::PatchOp::Replace,
            path: "/amounts/grand_total".to_string(),
            value: json!(true),
            rationale: "this value is not a decimal at all".to_string(),
            cites_bbox: vec!["p0#bx_0001".to_string()],
        };
        gateway.apply(&mut inv, &[patch]);
        assert!(!inv.llm_patch_applied);
        assert_eq!(inv.amounts.grand_total.value, Some(dec!(1200.00)));
    }
}
