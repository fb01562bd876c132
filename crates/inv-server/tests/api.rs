// SPDX-License-Identifier: MIT OR Apache-2.0
//! Route-level tests against the in-process router.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use inv_classify::KeywordClassifier;
use inv_ocr::{OcrEngine, OcrError, RawToken};
use inv_pipeline::{Pipeline, PipelineConfig, PipelineContext};
use inv_repair::{LlmError, LlmFixer, RepairRequest};
use inv_server::{build_app, AppState};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct FixedOcr;

#[async_trait]
impl OcrEngine for FixedOcr {
    async fn recognize(&self, _bytes: &[u8], _filename: &str) -> Result<Vec<RawToken>, OcrError> {
        let rows = [
            ("From:", 0.0, 0.0),
            ("ACME GmbH", 60.0, 0.0),
            ("Invoice No:", 0.0, 100.0),
            ("INV-2024-001", 60.0, 100.0),
            ("Datum:", 0.0, 200.0),
            ("15.03.2024", 60.0, 200.0),
            ("Grand Total:", 0.0, 300.0),
            ("€ 1.190,00", 60.0, 300.0),
        ];
        Ok(rows
            .iter()
            .map(|(text, x, y)| RawToken {
                text: text.to_string(),
                confidence: 0.95,
                scale: Default::default(),
                page: 0,
                bbox: Some([*x, *y, *x + 60.0, *y + 16.0]),
            })
            .collect())
    }

    fn name(&self) -> &str {
        "fixed-ocr"
    }
}

struct AbstainingFixer;

#[async_trait]
impl LlmFixer for AbstainingFixer {
    async fn propose(&self, _request: &RepairRequest) -> Result<String, LlmError> {
        Ok("[]".to_string())
    }

    fn model_info(&self) -> Value {
        serde_json::json!({"model": "abstain"})
    }
}

async fn test_state() -> (tempfile::TempDir, AppState) {
    let dir = tempfile::tempdir().unwrap();
    let audit = inv_audit::AuditLog::open(dir.path()).await.unwrap();
    let ctx = PipelineContext::new(
        Arc::new(FixedOcr),
        Arc::new(AbstainingFixer),
        Arc::new(KeywordClassifier::new()),
        audit,
        PipelineConfig::default(),
    );
    (dir, AppState {
        pipeline: Pipeline::new(ctx),
    })
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn multipart_request(filename: &str, payload: &[u8]) -> Request<Body> {
    let boundary = "inv-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(payload);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/pipeline/ingest")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let (_dir, state) = test_state().await;
    let response = build_app(state)
        .oneshot(
            Request::builder()
                .uri("/api/pipeline/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn unknown_job_is_404_with_error_body() {
    let (_dir, state) = test_state().await;
    let response = build_app(state)
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/api/pipeline/status?job_id={}",
                    uuid::Uuid::new_v4()
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "not_found");
}

#[tokio::test]
async fn ingest_accepts_supported_file_and_tracks_job() {
    let (_dir, state) = test_state().await;
    let app = build_app(state.clone());

    let response = app
        .clone()
        .oneshot(multipart_request("acme.pdf", b"pdf-bytes"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "processing");
    let job_id = json["job_id"].as_str().unwrap().to_string();

    // Poll status until the job finishes.
    let mut last = Value::Null;
    for _ in 0..200 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/pipeline/status?job_id={job_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        last = body_json(response).await;
        if last["status"] != "processing" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(last["status"], "completed");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/pipeline/result?job_id={job_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let result = body_json(response).await;
    assert_eq!(result["processing_status"], "auto_posted");
    assert!(result["invoice_json"].is_object());
    assert!(result["rule_report"]["passed"].as_bool().unwrap());

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/pipeline/audit?job_id={job_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let audit = body_json(response).await;
    assert!(audit["total_entries"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn ingest_rejects_unsupported_extension() {
    let (_dir, state) = test_state().await;
    let response = build_app(state)
        .oneshot(multipart_request("notes.txt", b"hello"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "INPUT_ERROR");
}

#[tokio::test]
async fn stats_returns_date_range() {
    let (_dir, state) = test_state().await;
    let response = build_app(state)
        .oneshot(
            Request::builder()
                .uri("/api/pipeline/stats")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["date_range"]["start"].is_string());
    assert!(json["statistics"]["total_jobs"].is_u64());
}
