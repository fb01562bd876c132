// SPDX-License-Identifier: MIT OR Apache-2.0
//! Audit entry shapes and constructors.

use chrono::{DateTime, Utc};
use inv_model::hash::content_digest64;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A single audit record.
///
/// Stage transitions carry `stage`; event records (LLM calls, rule
/// failures, reviews, exports) carry `type` instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// When the entry was created (enqueue time).
    pub timestamp: DateTime<Utc>,
    /// Job this entry belongs to.
    pub job_id: String,
    /// Pipeline stage, for stage-transition entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Event type, for non-stage entries.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub entry_type: Option<String>,
    /// Stage status (`completed`, `failed`, `cancelled`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Free-form structured context.
    pub metadata: Value,
    /// Stage duration, when measured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl AuditEntry {
    /// A stage-transition entry.
    #[must_use]
    pub fn stage(
        job_id: impl Into<String>,
        stage: impl Into<String>,
        status: impl Into<String>,
        metadata: Value,
        duration_ms: Option<u64>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            job_id: job_id.into(),
            stage: Some(stage.into()),
            entry_type: None,
            status: Some(status.into()),
            metadata,
            duration_ms,
        }
    }

    /// An LLM-call entry: canonical-JSON digests and sizes only.
    #[must_use]
    pub fn llm_call(job_id: impl Into<String>, input: &Value, output: &Value, model_info: Value) -> Self {
        let input_hash = content_digest64(input).unwrap_or_default();
        let output_hash = content_digest64(output).unwrap_or_default();
        let input_size = serde_json::to_string(input).map(|s| s.len()).unwrap_or(0);
        let output_size = serde_json::to_string(output).map(|s| s.len()).unwrap_or(0);
        Self {
            timestamp: Utc::now(),
            job_id: job_id.into(),
            stage: None,
            entry_type: Some("llm_call".to_string()),
            status: None,
            metadata: json!({
                "input_hash": input_hash,
                "output_hash": output_hash,
                "input_size": input_size,
                "output_size": output_size,
                "model_info": model_info,
            }),
            duration_ms: None,
        }
    }

    /// A rule-failure event.
    #[must_use]
    pub fn rule_failure(job_id: impl Into<String>, rule: &str, details: Value) -> Self {
        Self {
            timestamp: Utc::now(),
            job_id: job_id.into(),
            stage: None,
            entry_type: Some("rule_failure".to_string()),
            status: None,
            metadata: json!({ "rule_name": rule, "failure_details": details }),
            duration_ms: None,
        }
    }

    /// A human-review event.
    #[must_use]
    pub fn human_review(
        job_id: impl Into<String>,
        action: &str,
        reviewer: &str,
        changes: Value,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            job_id: job_id.into(),
            stage: None,
            entry_type: Some("human_review".to_string()),
            status: None,
            metadata: json!({ "action": action, "reviewer_id": reviewer, "changes": changes }),
            duration_ms: None,
        }
    }

    /// An export event.
    #[must_use]
    pub fn export(
        job_id: impl Into<String>,
        format: &str,
        path: &str,
        record_count: usize,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            job_id: job_id.into(),
            stage: None,
            entry_type: Some("export".to_string()),
            status: None,
            metadata: json!({ "format": format, "path": path, "record_count": record_count }),
            duration_ms: None,
        }
    }
}
