// SPDX-License-Identifier: MIT OR Apache-2.0
//! inv-pipeline
#![deny(unsafe_code)]
//!
//! The orchestrator. Each accepted document runs as one task through
//! strictly sequential stages: OCR, extraction, classification,
//! validation, decision, and — when the decision allows — one bounded
//! LLM repair followed by a single re-validation. Every transition is
//! recorded in the audit log; the orchestrator alone mutates job state.

pub mod cancel;
mod error;
pub mod job;

pub use error::PipelineError;
pub use job::{JobState, JobStatus, StageRecord};

use cancel::CancellationToken;
use chrono::Utc;
use inv_audit::{AuditEntry, AuditLog};
use inv_classify::Classifier;
use inv_decision::{Action, DecisionPolicy};
use inv_extract::{Extraction, Extractor};
use inv_model::{
    pointer, Invoice, JsonPatch, ProcessingResult, ProcessingStatus, ProcessingThresholds,
    RuleReport, Token, Warning,
};
use inv_ocr::{OcrEngine, OcrError, TokenAdapter};
use inv_repair::{LlmError, LlmFixer, RepairGateway};
use inv_rules::RulesEngine;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

/// File extensions the ingress accepts.
pub const SUPPORTED_EXTENSIONS: [&str; 10] = [
    ".csv", ".xlsx", ".xls", ".pdf", ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".tiff",
];

/// Orchestrator tuning knobs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Thresholds shared by rules, decision, and repair.
    pub thresholds: ProcessingThresholds,
    /// Per-call OCR timeout.
    pub ocr_timeout_secs: u64,
    /// Per-call LLM timeout.
    pub llm_timeout_secs: u64,
    /// Vendor layout cache ceiling.
    pub layout_cache_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            thresholds: ProcessingThresholds::default(),
            ocr_timeout_secs: 60,
            llm_timeout_secs: 60,
            layout_cache_capacity: inv_extract::cache::DEFAULT_LAYOUT_CACHE_CAPACITY,
        }
    }
}

/// Explicit collaborator context handed to the orchestrator.
///
/// No globals: the extractor, engines, and audit log all live here and
/// are passed in at construction.
pub struct PipelineContext {
    ocr: Arc<dyn OcrEngine>,
    adapter: TokenAdapter,
    extractor: Extractor,
    classifier: Arc<dyn Classifier>,
    rules: RulesEngine,
    decision: DecisionPolicy,
    repair: RepairGateway,
    audit: AuditLog,
    config: PipelineConfig,
}

impl PipelineContext {
    /// Assemble a context from its collaborators.
    pub fn new(
        ocr: Arc<dyn OcrEngine>,
        fixer: Arc<dyn LlmFixer>,
        classifier: Arc<dyn Classifier>,
        audit: AuditLog,
        config: PipelineConfig,
    ) -> Self {
        Self {
            ocr,
            adapter: TokenAdapter::new(),
            extractor: Extractor::new(config.layout_cache_capacity),
            classifier,
            rules: RulesEngine::new(config.thresholds.clone()),
            decision: DecisionPolicy::new(config.thresholds.clone()),
            repair: RepairGateway::new(fixer),
            audit,
            config,
        }
    }

    /// The audit log handle.
    #[must_use]
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }
}

struct JobEntry {
    state: JobState,
    cancel: CancellationToken,
}

/// The pipeline orchestrator. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Pipeline {
    ctx: Arc<PipelineContext>,
    jobs: Arc<RwLock<HashMap<Uuid, JobEntry>>>,
}

impl Pipeline {
    /// Create an orchestrator over the given context.
    #[must_use]
    pub fn new(ctx: PipelineContext) -> Self {
        Self {
            ctx: Arc::new(ctx),
            jobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The audit log handle.
    #[must_use]
    pub fn audit(&self) -> &AuditLog {
        self.ctx.audit()
    }

    /// Accept a document and start processing it; returns the job id.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Input`] when the file is empty or its extension
    /// is unsupported; the job is not created.
    pub async fn ingest(&self, bytes: Vec<u8>, filename: &str) -> Result<Uuid, PipelineError> {
        check_supported(filename)?;
        if bytes.is_empty() {
            return Err(PipelineError::Input {
                message: format!("{filename} is empty"),
            });
        }

        let job_id = Uuid::new_v4();
        {
            let mut jobs = self.jobs.write().await;
            jobs.insert(
                job_id,
                JobEntry {
                    state: JobState::accepted(filename),
                    cancel: CancellationToken::new(),
                },
            );
        }

        let pipeline = self.clone();
        let filename = filename.to_string();
        tokio::spawn(async move {
            pipeline.run_job(job_id, bytes, filename).await;
        });

        info!(target: "inv.pipeline", %job_id, "job accepted");
        Ok(job_id)
    }

    /// Snapshot of a job's state.
    pub async fn status(&self, job_id: Uuid) -> Option<JobState> {
        self.jobs.read().await.get(&job_id).map(|j| j.state.clone())
    }

    /// The result of a completed job.
    pub async fn result(&self, job_id: Uuid) -> Option<ProcessingResult> {
        self.jobs
            .read()
            .await
            .get(&job_id)
            .and_then(|j| j.state.result.as_deref().cloned())
    }

    /// Abandon a job. The task aborts at its next stage boundary.
    pub async fn cancel(&self, job_id: Uuid) -> bool {
        match self.jobs.read().await.get(&job_id) {
            Some(entry) if !entry.state.status.is_terminal() => {
                entry.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Apply a human-review patch to a completed job and re-validate.
    ///
    /// # Errors
    ///
    /// [`PipelineError::UnknownJob`] for unknown ids,
    /// [`PipelineError::Input`] when the job has no result yet.
    pub async fn apply_review_patch(
        &self,
        job_id: Uuid,
        patches: Vec<JsonPatch>,
        reviewer: &str,
    ) -> Result<ProcessingStatus, PipelineError> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs.get_mut(&job_id).ok_or(PipelineError::UnknownJob(job_id))?;
        let result = entry.state.result.as_deref_mut().ok_or_else(|| PipelineError::Input {
            message: "job has no result to review".to_string(),
        })?;

        for patch in &patches {
            if let Err(e) = pointer::set(&mut result.invoice, &patch.path, patch.value.clone()) {
                warn!(target: "inv.pipeline", %job_id, path = %patch.path, error = %e, "review patch skipped");
            }
        }
        result.invoice.human_reviewed = true;

        let report = self.ctx.rules.validate(&result.invoice, &[]);
        result.rule_report = report.clone();
        result.status = if report.passed {
            ProcessingStatus::AutoPosted
        } else {
            ProcessingStatus::NeedsReview
        };
        result.final_json = serde_json::to_value(&result.invoice)
            .map_err(|e| PipelineError::Internal(e.to_string()))?;

        self.ctx.audit.record(AuditEntry::human_review(
            job_id.to_string(),
            "patch_applied",
            reviewer,
            serde_json::to_value(&patches).unwrap_or_default(),
        ));

        Ok(result.status)
    }

    // -----------------------------------------------------------------------
    // Job execution
    // -----------------------------------------------------------------------

    async fn run_job(&self, job_id: Uuid, bytes: Vec<u8>, filename: String) {
        let started = std::time::Instant::now();
        let cancel = match self.jobs.read().await.get(&job_id) {
            Some(entry) => entry.cancel.clone(),
            None => return,
        };

        let outcome = self.execute_stages(job_id, &bytes, &filename, &cancel).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(result) => {
                let status = result.status;
                self.update_job(job_id, |state| {
                    state.enter_stage("completed", "processing completed");
                    state.status = JobStatus::Completed;
                    state.result = Some(Box::new(result));
                })
                .await;
                self.ctx.audit.record(AuditEntry::stage(
                    job_id.to_string(),
                    "completed",
                    "completed",
                    json!({ "final_status": status.as_str(), "processing_time_ms": elapsed_ms }),
                    Some(elapsed_ms),
                ));
                info!(target: "inv.pipeline", %job_id, status = %status, "job completed");
            }
            Err(PipelineError::Cancelled) => {
                self.update_job(job_id, |state| {
                    state.status = JobStatus::Cancelled;
                    state.error = Some("cancelled by caller".to_string());
                })
                .await;
                self.ctx.audit.record(AuditEntry::stage(
                    job_id.to_string(),
                    "cancelled",
                    "cancelled",
                    json!({ "processing_time_ms": elapsed_ms }),
                    Some(elapsed_ms),
                ));
                info!(target: "inv.pipeline", %job_id, "job cancelled");
            }
            Err(e) => {
                let kind = e.kind();
                let message = e.to_string();
                self.update_job(job_id, |state| {
                    state.status = JobStatus::Failed;
                    state.error = Some(message.clone());
                })
                .await;
                self.ctx.audit.record(AuditEntry::stage(
                    job_id.to_string(),
                    "error",
                    "failed",
                    json!({ "error": message, "kind": kind.code(), "processing_time_ms": elapsed_ms }),
                    Some(elapsed_ms),
                ));
                error!(target: "inv.pipeline", %job_id, kind = %kind, %message, "job failed");
            }
        }
    }

    async fn execute_stages(
        &self,
        job_id: Uuid,
        bytes: &[u8],
        filename: &str,
        cancel: &CancellationToken,
    ) -> Result<ProcessingResult, PipelineError> {
        // -- OCR -----------------------------------------------------------
        self.checkpoint(cancel)?;
        self.enter_stage(job_id, "ocr", "extracting text from document").await;
        let tokens = self.run_ocr(bytes, filename).await?;
        let pages = tokens.iter().map(|t| t.page).collect::<std::collections::BTreeSet<_>>();
        self.stage_done(job_id, "ocr", json!({ "tokens_extracted": tokens.len(), "pages": pages.len() }));

        // -- Extraction ----------------------------------------------------
        self.checkpoint(cancel)?;
        self.enter_stage(job_id, "extraction", "extracting invoice data").await;
        let processing_id = format!("{job_id}_{}", Utc::now().format("%Y%m%d_%H%M%S"));
        let Extraction { mut invoice, warnings } =
            self.ctx.extractor.extract(&tokens, filename, &processing_id)?;
        self.stage_done(
            job_id,
            "extraction",
            json!({
                "vendor": invoice.vendor.name.value,
                "invoice_number": invoice.invoice_number.value,
                "grand_total": invoice.amounts.grand_total.value,
            }),
        );

        // -- Classification ------------------------------------------------
        self.checkpoint(cancel)?;
        self.enter_stage(job_id, "classification", "classifying line items").await;
        self.classify_line_items(&mut invoice);
        self.stage_done(
            job_id,
            "classification",
            json!({ "line_items_classified": invoice.line_items.len() }),
        );

        // -- Validation ----------------------------------------------------
        self.checkpoint(cancel)?;
        self.enter_stage(job_id, "validation", "validating business rules").await;
        let report = self.ctx.rules.validate(&invoice, &warnings);
        self.record_rule_failures(job_id, &report);
        self.stage_done(
            job_id,
            "validation",
            json!({
                "rules_passed": report.passed,
                "failures": report.failures.len(),
                "warnings": report.warnings.len(),
            }),
        );

        // -- Decision ------------------------------------------------------
        self.checkpoint(cancel)?;
        self.enter_stage(job_id, "decision", "evaluating processing decision").await;
        let trace = self.ctx.decision.decide(&invoice, &report);
        self.stage_done(job_id, "decision", serde_json::to_value(&trace).unwrap_or_default());

        match trace.action {
            Action::AutoPost => {
                self.finish(job_id, invoice, report, None, ProcessingStatus::AutoPosted)
                    .await
            }
            Action::NeedsReview => {
                self.finish(job_id, invoice, report, None, ProcessingStatus::NeedsReview)
                    .await
            }
            Action::LlmFallback => {
                self.checkpoint(cancel)?;
                self.llm_fallback(job_id, cancel, invoice, report, warnings, &tokens)
                    .await
            }
        }
    }

    async fn llm_fallback(
        &self,
        job_id: Uuid,
        cancel: &CancellationToken,
        mut invoice: Invoice,
        report: RuleReport,
        warnings: Vec<Warning>,
        tokens: &[Token],
    ) -> Result<ProcessingResult, PipelineError> {
        self.enter_stage(job_id, "llm_fallback", "requesting bounded repair").await;

        let request = self.ctx.repair.build_request(&invoice, &report, tokens)?;
        let timeout = Duration::from_secs(self.ctx.config.llm_timeout_secs);
        let proposed = match tokio::time::timeout(timeout, self.ctx.repair.propose(&request)).await
        {
            Ok(Ok(patches)) => patches,
            Ok(Err(e)) => {
                // Malformed responses and call failures mean "no patch".
                warn!(target: "inv.pipeline", %job_id, error = %e, "llm repair unavailable");
                Vec::new()
            }
            Err(_) => {
                warn!(
                    target: "inv.pipeline",
                    %job_id,
                    timeout_secs = self.ctx.config.llm_timeout_secs,
                    "llm repair timed out"
                );
                let e = LlmError::Timeout {
                    timeout_secs: self.ctx.config.llm_timeout_secs,
                };
                self.ctx.audit.record(AuditEntry::stage(
                    job_id.to_string(),
                    "llm_fallback",
                    "failed",
                    json!({ "error": e.to_string() }),
                    None,
                ));
                Vec::new()
            }
        };

        let (input, output) = inv_repair::audit_payload(&request, &proposed);
        self.ctx.audit.record(AuditEntry::llm_call(
            job_id.to_string(),
            &input,
            &output,
            self.ctx.repair.model_info(),
        ));
        self.stage_done(job_id, "llm_fallback", json!({ "patches": proposed.len() }));

        if proposed.is_empty() {
            return self
                .finish(job_id, invoice, report, None, ProcessingStatus::NeedsReview)
                .await;
        }

        // -- Patch application + single re-validation ----------------------
        self.checkpoint(cancel)?;
        self.enter_stage(job_id, "patch_apply", "applying validated patches").await;
        self.ctx.repair.apply(&mut invoice, &proposed);
        self.stage_done(job_id, "patch_apply", json!({ "patches_applied": proposed.len() }));

        self.checkpoint(cancel)?;
        self.enter_stage(job_id, "validation", "re-validating after repair").await;
        let report = self.ctx.rules.validate(&invoice, &warnings);
        self.record_rule_failures(job_id, &report);
        self.stage_done(
            job_id,
            "validation",
            json!({ "rules_passed": report.passed, "failures": report.failures.len() }),
        );

        let status = if report.passed {
            ProcessingStatus::AutoPosted
        } else {
            ProcessingStatus::NeedsReview
        };
        self.finish(job_id, invoice, report, Some(proposed), status).await
    }

    async fn finish(
        &self,
        job_id: Uuid,
        invoice: Invoice,
        report: RuleReport,
        llm_patch: Option<Vec<JsonPatch>>,
        status: ProcessingStatus,
    ) -> Result<ProcessingResult, PipelineError> {
        let final_json = serde_json::to_value(&invoice)
            .map_err(|e| PipelineError::Internal(e.to_string()))?;

        // Entries recorded so far belong to this job's trail; flush so
        // the read below observes them.
        self.ctx.audit.flush().await?;
        let audit_trail = self
            .ctx
            .audit
            .trail(&job_id.to_string())
            .await?
            .into_iter()
            .filter_map(|e| serde_json::to_value(e).ok())
            .collect();

        Ok(ProcessingResult {
            invoice,
            rule_report: report,
            llm_patch,
            final_json,
            audit_trail,
            status,
        })
    }

    async fn run_ocr(&self, bytes: &[u8], filename: &str) -> Result<Vec<Token>, PipelineError> {
        let timeout = Duration::from_secs(self.ctx.config.ocr_timeout_secs);
        let raw = tokio::time::timeout(timeout, self.ctx.ocr.recognize(bytes, filename))
            .await
            .map_err(|_| OcrError::Timeout {
                timeout_secs: self.ctx.config.ocr_timeout_secs,
            })??;
        let tokens = self.ctx.adapter.adapt(raw)?;
        if tokens.is_empty() {
            return Err(OcrError::NoTokens {
                filename: filename.to_string(),
            }
            .into());
        }
        Ok(tokens)
    }

    fn classify_line_items(&self, invoice: &mut Invoice) {
        let vendor = invoice.vendor.name.value.clone();
        for item in &mut invoice.line_items {
            if let Some(description) = item.description.value.as_deref() {
                let (category, confidence) =
                    self.ctx.classifier.classify(description, vendor.as_deref());
                item.category = Some(category);
                item.category_confidence = Some(confidence);
            }
        }
    }

    fn record_rule_failures(&self, job_id: Uuid, report: &RuleReport) {
        for failure in &report.failures {
            self.ctx.audit.record(AuditEntry::rule_failure(
                job_id.to_string(),
                &failure.rule,
                serde_json::to_value(failure).unwrap_or_default(),
            ));
        }
    }

    fn checkpoint(&self, cancel: &CancellationToken) -> Result<(), PipelineError> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }

    async fn enter_stage(&self, job_id: Uuid, stage: &str, message: &str) {
        self.update_job(job_id, |state| state.enter_stage(stage, message)).await;
    }

    fn stage_done(&self, job_id: Uuid, stage: &str, metadata: serde_json::Value) {
        self.ctx.audit.record(AuditEntry::stage(
            job_id.to_string(),
            stage,
            "completed",
            metadata,
            None,
        ));
    }

    async fn update_job(&self, job_id: Uuid, f: impl FnOnce(&mut JobState)) {
        let mut jobs = self.jobs.write().await;
        if let Some(entry) = jobs.get_mut(&job_id) {
            f(&mut entry.state);
        }
    }
}

fn check_supported(filename: &str) -> Result<(), PipelineError> {
    let lower = filename.to_lowercase();
    if SUPPORTED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        Ok(())
    } else {
        Err(PipelineError::Input {
            message: format!(
                "unsupported file type: {filename} (allowed: {})",
                SUPPORTED_EXTENSIONS.join(", ")
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_allow_list() {
        assert!(check_supported("invoice.PDF").is_ok());
        assert!(check_supported("scan.jpeg").is_ok());
        assert!(check_supported("table.xlsx").is_ok());
        assert!(check_supported("notes.txt").is_err());
        assert!(check_supported("archive.zip").is_err());
    }

    #[test]
    fn default_config_is_sane() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.ocr_timeout_secs, 60);
        assert_eq!(cfg.llm_timeout_secs, 60);
        assert!(cfg.layout_cache_capacity > 0);
    }
}
