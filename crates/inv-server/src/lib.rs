// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! HTTP ingress for the invoice pipeline.
//!
//! Thin adapter over [`Pipeline`]: multipart ingest, job status and
//! result queries, audit trails, stats, and human-review patches.

use axum::{
    extract::{Multipart, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use inv_model::{ErrorKind, JsonPatch};
use inv_pipeline::{Pipeline, PipelineError};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    /// The orchestrator all handlers drive.
    pub pipeline: Pipeline,
}

/// Structured API error with a stable code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: String,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        let status = match e.kind() {
            ErrorKind::Input => StatusCode::BAD_REQUEST,
            ErrorKind::Cancelled => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.kind().code(), e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": { "code": self.code, "message": self.message } }));
        (self.status, body).into_response()
    }
}

/// Build the router with all pipeline routes.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/api/pipeline/ingest", post(cmd_ingest))
        .route("/api/pipeline/status", get(cmd_status))
        .route("/api/pipeline/result", get(cmd_result))
        .route("/api/pipeline/audit", get(cmd_audit))
        .route("/api/pipeline/stats", get(cmd_stats))
        .route("/api/pipeline/review/apply", post(cmd_review_apply))
        .route("/api/pipeline/health", get(cmd_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the task is aborted.
///
/// # Errors
///
/// Returns an IO error if the address cannot be bound.
pub async fn serve(pipeline: Pipeline, bind: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(target: "inv.server", %bind, "listening");
    axum::serve(listener, build_app(AppState { pipeline })).await
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct JobQuery {
    job_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct StatsQuery {
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
}

async fn cmd_ingest(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    let field = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, "INPUT_ERROR", e.to_string()))?
        .ok_or_else(|| {
            ApiError::new(StatusCode::BAD_REQUEST, "INPUT_ERROR", "no file in request")
        })?;

    let filename = field
        .file_name()
        .map(str::to_string)
        .ok_or_else(|| ApiError::new(StatusCode::BAD_REQUEST, "INPUT_ERROR", "missing filename"))?;
    let bytes = field
        .bytes()
        .await
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, "INPUT_ERROR", e.to_string()))?;

    let job_id = state.pipeline.ingest(bytes.to_vec(), &filename).await?;
    Ok(Json(json!({
        "job_id": job_id,
        "status": "processing",
        "message": format!("processing started for {filename}"),
    })))
}

async fn cmd_status(
    State(state): State<AppState>,
    Query(q): Query<JobQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let job = state
        .pipeline
        .status(q.job_id)
        .await
        .ok_or_else(|| ApiError::not_found("job not found"))?;
    Ok(Json(json!({
        "job_id": q.job_id,
        "status": job.status,
        "current_stage": job.current_stage,
        "started_at": job.started_at,
        "filename": job.filename,
        "stages_completed": job.stages_completed,
        "error": job.error,
    })))
}

async fn cmd_result(
    State(state): State<AppState>,
    Query(q): Query<JobQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let job = state
        .pipeline
        .status(q.job_id)
        .await
        .ok_or_else(|| ApiError::not_found("job not found"))?;

    let mut body = json!({
        "job_id": q.job_id,
        "status": job.status,
        "current_stage": job.current_stage,
        "started_at": job.started_at,
        "filename": job.filename,
        "stages_completed": job.stages_completed,
        "error": job.error,
    });

    if let Some(result) = job.result.as_deref() {
        let extra = json!({
            "invoice_json": result.final_json,
            "rule_report": result.rule_report,
            "llm_patch": result.llm_patch,
            "final_json": result.final_json,
            "audit_trail": result.audit_trail,
            "processing_status": result.status,
        });
        merge(&mut body, extra);
    }
    Ok(Json(body))
}

async fn cmd_audit(
    State(state): State<AppState>,
    Query(q): Query<JobQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.pipeline.audit().flush().await.map_err(PipelineError::from)?;
    let trail = state
        .pipeline
        .audit()
        .trail(&q.job_id.to_string())
        .await
        .map_err(PipelineError::from)?;
    Ok(Json(json!({
        "job_id": q.job_id,
        "total_entries": trail.len(),
        "audit_trail": trail,
    })))
}

async fn cmd_stats(
    State(state): State<AppState>,
    Query(q): Query<StatsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let end = q.end_date.unwrap_or_else(Utc::now);
    let start = q.start_date.unwrap_or_else(|| {
        end.date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc())
            .unwrap_or(end)
    });
    let stats = state
        .pipeline
        .audit()
        .stats(start, end)
        .await
        .map_err(PipelineError::from)?;
    Ok(Json(json!({
        "date_range": { "start": start, "end": end },
        "statistics": stats,
    })))
}

async fn cmd_review_apply(
    State(state): State<AppState>,
    Query(q): Query<JobQuery>,
    Json(patches): Json<Vec<JsonPatch>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let status = state
        .pipeline
        .apply_review_patch(q.job_id, patches, "api")
        .await?;
    Ok(Json(json!({
        "job_id": q.job_id,
        "status": status,
        "message": "review patch applied",
    })))
}

async fn cmd_health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "message": "pipeline service is running",
        "timestamp": Utc::now(),
    }))
}

fn merge(base: &mut serde_json::Value, extra: serde_json::Value) {
    if let (Some(base), Some(extra)) = (base.as_object_mut(), extra.as_object()) {
        for (k, v) in extra {
            base.insert(k.clone(), v.clone());
        }
    }
}
