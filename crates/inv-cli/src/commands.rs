// SPDX-License-Identifier: MIT OR Apache-2.0
//! Subcommand implementations.

use async_trait::async_trait;
use inv_classify::KeywordClassifier;
use inv_config::PipelineSettings;
use inv_model::ProcessingResult;
use inv_ocr::{ConfidenceScale, OcrEngine, OcrError, RawToken};
use inv_pipeline::{JobStatus, Pipeline, PipelineConfig, PipelineContext, SUPPORTED_EXTENSIONS};
use inv_repair::{LlmError, LlmFixer, RepairRequest};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Exit code for unreadable or malformed input.
pub const EXIT_BAD_INPUT: u8 = 2;
/// Exit code for unsupported file types.
pub const EXIT_UNSUPPORTED: u8 = 3;
/// Exit code for internal failures.
pub const EXIT_INTERNAL: u8 = 4;

/// CLI failure with its process exit code.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Unreadable or malformed input.
    #[error("{0}")]
    BadInput(String),
    /// The file type is not supported.
    #[error("{0}")]
    Unsupported(String),
    /// Anything unexpected.
    #[error("{0}")]
    Internal(String),
}

impl CliError {
    /// The documented process exit code.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::BadInput(_) => EXIT_BAD_INPUT,
            Self::Unsupported(_) => EXIT_UNSUPPORTED,
            Self::Internal(_) => EXIT_INTERNAL,
        }
    }
}

// ---------------------------------------------------------------------------
// Local collaborators
// ---------------------------------------------------------------------------

/// OCR for local runs: each UTF-8 line becomes one token on a
/// full-width line slot. Deployments with a real OCR service use the
/// server instead.
struct LineOcr;

#[async_trait]
impl OcrEngine for LineOcr {
    async fn recognize(&self, bytes: &[u8], filename: &str) -> Result<Vec<RawToken>, OcrError> {
        let text = String::from_utf8_lossy(bytes);
        if text.trim().is_empty() {
            return Err(OcrError::NoTokens {
                filename: filename.to_string(),
            });
        }
        Ok(text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .enumerate()
            .map(|(i, line)| RawToken {
                text: line.to_string(),
                confidence: 0.9,
                scale: ConfidenceScale::Unit,
                page: 0,
                bbox: Some([0.0, i as f64 * 20.0, 1000.0, i as f64 * 20.0 + 16.0]),
            })
            .collect())
    }

    fn name(&self) -> &str {
        "line-ocr"
    }
}

/// No LLM configured: always abstains.
struct NullFixer;

#[async_trait]
impl LlmFixer for NullFixer {
    async fn propose(&self, _request: &RepairRequest) -> Result<String, LlmError> {
        Ok("[]".to_string())
    }

    fn model_info(&self) -> Value {
        serde_json::json!({ "model": "none" })
    }
}

async fn build_pipeline(settings: &PipelineSettings) -> Result<Pipeline, CliError> {
    let audit = inv_audit::AuditLog::open(&settings.audit_dir)
        .await
        .map_err(|e| CliError::Internal(e.to_string()))?;
    let config = PipelineConfig {
        thresholds: settings.thresholds.clone(),
        ocr_timeout_secs: settings.timeouts.ocr_secs,
        llm_timeout_secs: settings.timeouts.llm_secs,
        layout_cache_capacity: settings.extractor.layout_cache_capacity,
    };
    let ctx = PipelineContext::new(
        Arc::new(LineOcr),
        Arc::new(NullFixer),
        Arc::new(KeywordClassifier::new()),
        audit,
        config,
    );
    Ok(Pipeline::new(ctx))
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

/// `invp process <file>`
pub async fn process(settings: &PipelineSettings, file: &Path) -> Result<(), CliError> {
    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| CliError::BadInput(format!("bad path: {}", file.display())))?
        .to_string();

    let lower = filename.to_lowercase();
    if !SUPPORTED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        return Err(CliError::Unsupported(format!(
            "unsupported file type: {filename}"
        )));
    }

    let bytes =
        std::fs::read(file).map_err(|e| CliError::BadInput(format!("{}: {e}", file.display())))?;

    let pipeline = build_pipeline(settings).await?;
    let job_id = pipeline
        .ingest(bytes, &filename)
        .await
        .map_err(|e| CliError::BadInput(e.to_string()))?;

    let state = loop {
        match pipeline.status(job_id).await {
            Some(state) if state.status.is_terminal() => break state,
            Some(_) => tokio::time::sleep(Duration::from_millis(25)).await,
            None => return Err(CliError::Internal("job vanished".to_string())),
        }
    };

    match state.status {
        JobStatus::Completed => {
            let result = pipeline
                .result(job_id)
                .await
                .ok_or_else(|| CliError::Internal("completed job without result".to_string()))?;
            let rendered = serde_json::to_string_pretty(&result)
                .map_err(|e| CliError::Internal(e.to_string()))?;
            println!("{rendered}");
            Ok(())
        }
        _ => Err(CliError::Internal(
            state.error.unwrap_or_else(|| "processing failed".to_string()),
        )),
    }
}

/// `invp export <result.json> --format csv|xlsx --out <path>`
pub async fn export(result_path: &Path, xlsx: bool, out: &Path) -> Result<(), CliError> {
    let raw = std::fs::read_to_string(result_path)
        .map_err(|e| CliError::BadInput(format!("{}: {e}", result_path.display())))?;
    let result: ProcessingResult =
        serde_json::from_str(&raw).map_err(|e| CliError::BadInput(e.to_string()))?;

    if xlsx {
        inv_export::write_xlsx(&result.invoice, out)
            .map_err(|e| CliError::Internal(e.to_string()))?;
    } else {
        let file =
            std::fs::File::create(out).map_err(|e| CliError::Internal(e.to_string()))?;
        inv_export::write_csv(&result.invoice, file)
            .map_err(|e| CliError::Internal(e.to_string()))?;
    }
    println!("wrote {}", out.display());
    Ok(())
}

/// `invp stats [--start-date ...] [--end-date ...]`
pub async fn stats(
    settings: &PipelineSettings,
    start: Option<chrono::DateTime<chrono::Utc>>,
    end: Option<chrono::DateTime<chrono::Utc>>,
) -> Result<(), CliError> {
    let audit = inv_audit::AuditLog::open(&settings.audit_dir)
        .await
        .map_err(|e| CliError::Internal(e.to_string()))?;
    let end = end.unwrap_or_else(chrono::Utc::now);
    let start = start.unwrap_or_else(|| {
        end.date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc())
            .unwrap_or(end)
    });
    let stats = audit
        .stats(start, end)
        .await
        .map_err(|e| CliError::Internal(e.to_string()))?;
    let rendered =
        serde_json::to_string_pretty(&stats).map_err(|e| CliError::Internal(e.to_string()))?;
    println!("{rendered}");
    Ok(())
}

/// `invp serve`
pub async fn serve(settings: &PipelineSettings) -> Result<(), CliError> {
    let pipeline = build_pipeline(settings).await?;
    inv_server::serve(pipeline, &settings.bind)
        .await
        .map_err(|e| CliError::Internal(e.to_string()))
}
