// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared fixtures for the end-to-end suites.

use async_trait::async_trait;
use inv_classify::KeywordClassifier;
use inv_ocr::{OcrEngine, OcrError, RawToken};
use inv_pipeline::{JobState, Pipeline, PipelineConfig, PipelineContext};
use inv_repair::{LlmError, LlmFixer, RepairRequest};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Token rows as `(text, x, y)` on page 0.
pub type Rows = Vec<(&'static str, f64, f64)>;

/// A clean European invoice: label column left, value 60 units right,
/// one row per 100 units.
pub fn clean_rows() -> Rows {
    vec![
        ("From:", 0.0, 0.0),
        ("ACME GmbH", 60.0, 0.0),
        ("Invoice No:", 0.0, 100.0),
        ("INV-2024-001", 60.0, 100.0),
        ("Datum:", 0.0, 200.0),
        ("15.03.2024", 60.0, 200.0),
        ("Subtotal:", 0.0, 300.0),
        ("€ 1.000,00", 80.0, 300.0),
        ("Tax:", 0.0, 400.0),
        ("€ 190,00", 60.0, 400.0),
        ("19%", 140.0, 400.0),
        ("Grand Total:", 0.0, 500.0),
        ("€ 1.190,00", 60.0, 500.0),
    ]
}

/// Same invoice with a grand total that does not balance.
pub fn mismatched_rows() -> Rows {
    let mut rows = clean_rows();
    rows.last_mut().unwrap().0 = "€ 1.200,00";
    rows
}

pub struct MockOcr {
    rows: Vec<(String, f64, f64)>,
}

impl MockOcr {
    pub fn new(rows: &[(&str, f64, f64)]) -> Self {
        Self {
            rows: rows
                .iter()
                .map(|(t, x, y)| (t.to_string(), *x, *y))
                .collect(),
        }
    }
}

#[async_trait]
impl OcrEngine for MockOcr {
    async fn recognize(&self, _bytes: &[u8], _filename: &str) -> Result<Vec<RawToken>, OcrError> {
        Ok(self
            .rows
            .iter()
            .map(|(text, x, y)| RawToken {
                text: text.clone(),
                confidence: 0.95,
                scale: Default::default(),
                page: 0,
                bbox: Some([*x, *y, *x + 60.0, *y + 16.0]),
            })
            .collect())
    }

    fn name(&self) -> &str {
        "mock-ocr"
    }
}

/// A fixer that always abstains.
pub struct AbstainingFixer;

#[async_trait]
impl LlmFixer for AbstainingFixer {
    async fn propose(&self, _request: &RepairRequest) -> Result<String, LlmError> {
        Ok("[]".to_string())
    }

    fn model_info(&self) -> Value {
        json!({ "model": "abstain" })
    }
}

/// A fixer that repairs `arithmetic_balance` failures with the rule's
/// expected value, citing the first evidence snippet.
pub struct GrandTotalFixer;

#[async_trait]
impl LlmFixer for GrandTotalFixer {
    async fn propose(&self, request: &RepairRequest) -> Result<String, LlmError> {
        let Some(failure) = request
            .rule_report
            .failures
            .iter()
            .find(|f| f.rule == "arithmetic_balance")
        else {
            return Ok("[]".to_string());
        };
        let cite = request
            .evidence_snippets
            .first()
            .map(|s| s.bbox_id.clone())
            .unwrap_or_else(|| "p0#bx_0000".to_string());
        Ok(json!([{
            "op": "replace",
            "path": failure.path,
            "value": failure.expected.map(|d| d.to_string()),
            "rationale": "the component amounts balance to the expected total",
            "cites_bbox": [cite],
        }])
        .to_string())
    }

    fn model_info(&self) -> Value {
        json!({ "model": "grand-total-fixer" })
    }
}

/// Build a pipeline over mock collaborators.
pub async fn pipeline_with(
    rows: Rows,
    fixer: Arc<dyn LlmFixer>,
    tolerance: f64,
) -> (tempfile::TempDir, Pipeline) {
    let dir = tempfile::tempdir().unwrap();
    let audit = inv_audit::AuditLog::open(dir.path()).await.unwrap();
    let mut config = PipelineConfig::default();
    config.thresholds.arithmetic_tolerance = tolerance;
    let ctx = PipelineContext::new(
        Arc::new(MockOcr::new(&rows)),
        fixer,
        Arc::new(KeywordClassifier::new()),
        audit,
        config,
    );
    (dir, Pipeline::new(ctx))
}

/// Poll a job until it reaches a terminal state.
pub async fn wait_terminal(pipeline: &Pipeline, job_id: uuid::Uuid) -> JobState {
    for _ in 0..400 {
        if let Some(state) = pipeline.status(job_id).await {
            if state.status.is_terminal() {
                return state;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job did not reach a terminal state");
}
