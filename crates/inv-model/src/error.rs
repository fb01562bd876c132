// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error taxonomy shared across the pipeline.
//!
//! Library crates return their own `thiserror` enums; every one of them
//! maps onto an [`ErrorKind`] — the transport-agnostic classification that
//! the orchestrator records in audit entries and the ingress layers show
//! to callers.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Transport-agnostic error classification.
///
/// Serialises to a stable `snake_case` tag; the `SCREAMING_SNAKE_CASE`
/// code from [`ErrorKind::code`] is guaranteed not to change across patch
/// releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Unreadable file or unsupported type; the job is never created.
    Input,
    /// OCR produced no tokens or the engine timed out.
    Ocr,
    /// A required field could not be constructed.
    Schema,
    /// The repair gateway failed (malformed response, timeout).
    Llm,
    /// The job was abandoned by the caller.
    Cancelled,
    /// Unexpected internal failure.
    Internal,
}

impl ErrorKind {
    /// Stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Input => "INPUT_ERROR",
            Self::Ocr => "OCR_ERROR",
            Self::Schema => "SCHEMA_ERROR",
            Self::Llm => "LLM_ERROR",
            Self::Cancelled => "CANCELLED",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    /// Whether a failure of this kind still yields a job record.
    ///
    /// Input errors are surfaced synchronously and never create a job;
    /// every other kind is captured into the audit log.
    #[must_use]
    pub fn creates_job(&self) -> bool {
        !matches!(self, Self::Input)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ---------------------------------------------------------------------------
// SchemaError
// ---------------------------------------------------------------------------

/// A schema invariant was violated while constructing a model value.
///
/// Carries the JSON-Pointer path of the offending field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("schema violation at {path}: {reason}")]
pub struct SchemaError {
    /// JSON-Pointer path into the invoice structure.
    pub path: String,
    /// Human-readable description of the violation.
    pub reason: String,
}

impl SchemaError {
    /// Construct a schema error for the given pointer path.
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// A required field is missing or empty.
    pub fn missing_required(path: impl Into<String>) -> Self {
        Self::new(path, "required field is missing or empty")
    }
}

// ---------------------------------------------------------------------------
// PointerError
// ---------------------------------------------------------------------------

/// JSON-Pointer access failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PointerError {
    /// The path does not name a field of the public invoice structure.
    #[error("unknown path: {0}")]
    UnknownPath(String),

    /// The path names a line item index that does not exist.
    #[error("line item index out of range: {0}")]
    IndexOutOfRange(String),

    /// The supplied value cannot be converted to the field's type.
    #[error("type mismatch at {path}: {reason}")]
    TypeMismatch {
        /// Pointer path of the target field.
        path: String,
        /// Why the conversion failed.
        reason: String,
    },
}
