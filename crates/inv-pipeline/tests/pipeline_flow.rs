// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end flow tests for the orchestrator with mock collaborators.

use async_trait::async_trait;
use inv_classify::KeywordClassifier;
use inv_model::ProcessingStatus;
use inv_ocr::{OcrEngine, OcrError, RawToken};
use inv_pipeline::{JobStatus, Pipeline, PipelineConfig, PipelineContext, PipelineError};
use inv_repair::{LlmError, LlmFixer, RepairRequest};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Mock collaborators
// ---------------------------------------------------------------------------

struct MockOcr {
    rows: Vec<(String, f64, f64)>,
}

impl MockOcr {
    fn new(rows: &[(&str, f64, f64)]) -> Self {
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

struct AbstainingFixer;

#[async_trait]
impl LlmFixer for AbstainingFixer {
    async fn propose(&self, _request: &RepairRequest) -> Result<String, LlmError> {
        Ok("[]".to_string())
    }

    fn model_info(&self) -> Value {
        json!({"model": "abstain"})
    }
}

struct GrandTotalFixer;

#[async_trait]
impl LlmFixer for GrandTotalFixer {
    async fn propose(&self, request: &RepairRequest) -> Result<String, LlmError> {
        let failure = request
            .rule_report
            .failures
            .iter()
            .find(|f| f.rule == "arithmetic_balance")
            .expect("arithmetic failure present");
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
        json!({"model": "grand-total-fixer"})
    }
}

fn clean_rows() -> Vec<(&'static str, f64, f64)> {
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

fn mismatched_rows() -> Vec<(&'static str, f64, f64)> {
    let mut rows = clean_rows();
    rows.last_mut().unwrap().0 = "€ 1.200,00";
    rows
}

async fn pipeline_with(
    ocr: MockOcr,
    fixer: Arc<dyn LlmFixer>,
    tolerance: f64,
) -> (tempfile::TempDir, Pipeline) {
    let dir = tempfile::tempdir().unwrap();
    let audit = inv_audit::AuditLog::open(dir.path()).await.unwrap();
    let mut config = PipelineConfig::default();
    config.thresholds.arithmetic_tolerance = tolerance;
    let ctx = PipelineContext::new(
        Arc::new(ocr),
        fixer,
        Arc::new(KeywordClassifier::new()),
        audit,
        config,
    );
    (dir, Pipeline::new(ctx))
}

async fn wait_terminal(pipeline: &Pipeline, job_id: uuid::Uuid) -> inv_pipeline::JobState {
    for _ in 0..200 {
        if let Some(state) = pipeline.status(job_id).await {
            if state.status.is_terminal() {
                return state;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job did not reach a terminal state");
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn clean_invoice_auto_posts() {
    let (_dir, pipeline) = pipeline_with(
        MockOcr::new(&clean_rows()),
        Arc::new(AbstainingFixer),
        0.02,
    )
    .await;

    let job_id = pipeline.ingest(b"pdf".to_vec(), "acme.pdf").await.unwrap();
    let state = wait_terminal(&pipeline, job_id).await;
    assert_eq!(state.status, JobStatus::Completed);

    let result = pipeline.result(job_id).await.unwrap();
    assert_eq!(result.status, ProcessingStatus::AutoPosted);
    assert!(result.rule_report.passed);
    assert!(!result.invoice.llm_patch_applied);
    assert!(result.llm_patch.is_none());
    assert!(!result.audit_trail.is_empty());
}

#[tokio::test]
async fn repairable_mismatch_is_patched_and_auto_posts() {
    let (_dir, pipeline) = pipeline_with(
        MockOcr::new(&mismatched_rows()),
        Arc::new(GrandTotalFixer),
        0.005,
    )
    .await;

    let job_id = pipeline.ingest(b"pdf".to_vec(), "acme.pdf").await.unwrap();
    let state = wait_terminal(&pipeline, job_id).await;
    assert_eq!(state.status, JobStatus::Completed);

    let result = pipeline.result(job_id).await.unwrap();
    assert_eq!(result.status, ProcessingStatus::AutoPosted);
    assert!(result.invoice.llm_patch_applied);
    assert_eq!(result.llm_patch.as_ref().map(Vec::len), Some(1));
    assert!(result.rule_report.passed);
    assert_eq!(
        result.invoice.amounts.grand_total.value.map(|d| d.to_string()),
        Some("1190.00".to_string())
    );
}

#[tokio::test]
async fn abstaining_fixer_routes_to_review() {
    let (_dir, pipeline) = pipeline_with(
        MockOcr::new(&mismatched_rows()),
        Arc::new(AbstainingFixer),
        0.005,
    )
    .await;

    let job_id = pipeline.ingest(b"pdf".to_vec(), "acme.pdf").await.unwrap();
    wait_terminal(&pipeline, job_id).await;

    let result = pipeline.result(job_id).await.unwrap();
    assert_eq!(result.status, ProcessingStatus::NeedsReview);
    assert!(!result.invoice.llm_patch_applied);
}

#[tokio::test]
async fn unsupported_extension_is_rejected_without_a_job() {
    let (_dir, pipeline) = pipeline_with(
        MockOcr::new(&clean_rows()),
        Arc::new(AbstainingFixer),
        0.02,
    )
    .await;

    let err = pipeline
        .ingest(b"zip".to_vec(), "archive.zip")
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Input { .. }));
}

#[tokio::test]
async fn missing_required_field_fails_job() {
    // No invoice-number row at all.
    let rows: Vec<(&str, f64, f64)> = clean_rows()
        .into_iter()
        .filter(|(t, _, _)| !t.contains("INV") && !t.contains("Invoice"))
        .collect();
    let (_dir, pipeline) =
        pipeline_with(MockOcr::new(&rows), Arc::new(AbstainingFixer), 0.02).await;

    let job_id = pipeline.ingest(b"pdf".to_vec(), "acme.pdf").await.unwrap();
    let state = wait_terminal(&pipeline, job_id).await;
    assert_eq!(state.status, JobStatus::Failed);
    assert!(state.error.unwrap().contains("/invoice_number"));
}

#[tokio::test]
async fn empty_ocr_output_fails_job() {
    let (_dir, pipeline) =
        pipeline_with(MockOcr::new(&[]), Arc::new(AbstainingFixer), 0.02).await;

    let job_id = pipeline.ingest(b"pdf".to_vec(), "blank.pdf").await.unwrap();
    let state = wait_terminal(&pipeline, job_id).await;
    assert_eq!(state.status, JobStatus::Failed);
}

#[tokio::test]
async fn cancelled_job_reports_cancelled_status() {
    struct SlowOcr;

    #[async_trait]
    impl OcrEngine for SlowOcr {
        async fn recognize(
            &self,
            _bytes: &[u8],
            _filename: &str,
        ) -> Result<Vec<RawToken>, OcrError> {
            tokio::time::sleep(Duration::from_millis(300)).await;
            MockOcr::new(&clean_rows()).recognize(&[], "x").await
        }

        fn name(&self) -> &str {
            "slow-ocr"
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let audit = inv_audit::AuditLog::open(dir.path()).await.unwrap();
    let ctx = PipelineContext::new(
        Arc::new(SlowOcr),
        Arc::new(AbstainingFixer),
        Arc::new(KeywordClassifier::new()),
        audit,
        PipelineConfig::default(),
    );
    let pipeline = Pipeline::new(ctx);

    let job_id = pipeline.ingest(b"pdf".to_vec(), "acme.pdf").await.unwrap();
    // Cancel while OCR is still sleeping; the next stage boundary aborts.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(pipeline.cancel(job_id).await);

    let state = wait_terminal(&pipeline, job_id).await;
    assert_eq!(state.status, JobStatus::Cancelled);

    pipeline.audit().flush().await.unwrap();
    let trail = pipeline.audit().trail(&job_id.to_string()).await.unwrap();
    assert!(trail
        .iter()
        .any(|e| e.status.as_deref() == Some("cancelled")));
}

#[tokio::test]
async fn review_patch_marks_human_reviewed() {
    let (_dir, pipeline) = pipeline_with(
        MockOcr::new(&mismatched_rows()),
        Arc::new(AbstainingFixer),
        0.005,
    )
    .await;

    let job_id = pipeline.ingest(b"pdf".to_vec(), "acme.pdf").await.unwrap();
    wait_terminal(&pipeline, job_id).await;

    let patch = inv_model::JsonPatch {
        op: inv_model::PatchOp::Replace,
        path: "/amounts/grand_total".to_string(),
        value: json!("1190.00"),
        rationale: "reviewer confirmed the printed grand total".to_string(),
        cites_bbox: vec!["p0#bx_0001".to_string()],
    };
    let status = pipeline
        .apply_review_patch(job_id, vec![patch], "reviewer-7")
        .await
        .unwrap();
    assert_eq!(status, ProcessingStatus::AutoPosted);

    let result = pipeline.result(job_id).await.unwrap();
    assert!(result.invoice.human_reviewed);
    assert!(result.rule_report.passed);
}

#[tokio::test]
async fn audit_trail_orders_stages_for_a_job() {
    let (_dir, pipeline) = pipeline_with(
        MockOcr::new(&clean_rows()),
        Arc::new(AbstainingFixer),
        0.02,
    )
    .await;

    let job_id = pipeline.ingest(b"pdf".to_vec(), "acme.pdf").await.unwrap();
    wait_terminal(&pipeline, job_id).await;
    pipeline.audit().flush().await.unwrap();

    let trail = pipeline.audit().trail(&job_id.to_string()).await.unwrap();
    let stages: Vec<_> = trail.iter().filter_map(|e| e.stage.as_deref()).collect();
    let expect = ["ocr", "extraction", "classification", "validation", "decision", "completed"];
    let mut cursor = 0;
    for stage in stages {
        if cursor < expect.len() && stage == expect[cursor] {
            cursor += 1;
        }
    }
    assert_eq!(cursor, expect.len(), "stage sequence incomplete");

    for pair in trail.windows(2) {
        assert!(pair[0].timestamp <= pair[1].timestamp);
    }
}
