// SPDX-License-Identifier: MIT OR Apache-2.0
//! Orchestrator error type.

use inv_audit::AuditError;
use inv_model::{ErrorKind, SchemaError};
use inv_ocr::OcrError;
use inv_repair::LlmError;

/// Failures surfaced by the orchestrator.
///
/// Everything except [`PipelineError::Input`] is captured into the
/// audit log with full context; callers see the kind and a short
/// message.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Unreadable file or unsupported type; no job is created.
    #[error("input rejected: {message}")]
    Input {
        /// Why the input was rejected.
        message: String,
    },

    /// OCR produced no tokens or failed outright.
    #[error(transparent)]
    Ocr(#[from] OcrError),

    /// A required field could not be constructed.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// The repair call failed; treated as "no patch" where possible.
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// The audit log rejected a read.
    #[error(transparent)]
    Audit(#[from] AuditError),

    /// The job was abandoned by the caller.
    #[error("job cancelled")]
    Cancelled,

    /// The job id is unknown.
    #[error("unknown job: {0}")]
    UnknownJob(uuid::Uuid),

    /// Unexpected internal failure.
    #[error("internal: {0}")]
    Internal(String),
}

impl PipelineError {
    /// The transport-agnostic classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Input { .. } | Self::UnknownJob(_) => ErrorKind::Input,
            Self::Ocr(_) => ErrorKind::Ocr,
            Self::Schema(_) => ErrorKind::Schema,
            Self::Llm(_) => ErrorKind::Llm,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Audit(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_taxonomy() {
        let e = PipelineError::Input {
            message: "bad".into(),
        };
        assert_eq!(e.kind(), ErrorKind::Input);
        assert_eq!(PipelineError::Cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(
            PipelineError::Internal("x".into()).kind(),
            ErrorKind::Internal
        );
    }
}
