// SPDX-License-Identifier: MIT OR Apache-2.0
//! inv-model
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The stable data contract for the invoice pipeline.
//!
//! Every extracted field carries provenance: the page, bounding box, raw
//! text, and OCR confidence it was read from. Constructors enforce the
//! schema invariants; downstream crates operate on values that are known
//! to be well-formed.

/// Error taxonomy shared across the pipeline.
pub mod error;
/// Stable content hashing over canonical JSON.
pub mod hash;
/// Invoice aggregate, vendor, amounts, and line items.
pub mod invoice;
/// JSON-Pointer accessors over the public invoice structure.
pub mod pointer;
/// Rule reports, patches, and processing results.
pub mod report;
/// Tunable processing thresholds.
pub mod thresholds;

pub use error::{ErrorKind, PointerError, SchemaError};
pub use invoice::{Amounts, Invoice, InvoiceBuilder, LineItem, ProcessingStatus, Vendor};
pub use report::{Failure, JsonPatch, PatchOp, ProcessingResult, RuleReport, Warning};
pub use thresholds::ProcessingThresholds;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Contract version embedded in processing results and audit entries.
pub const CONTRACT_VERSION: &str = "invp/v0.1";

// ---------------------------------------------------------------------------
// BBox
// ---------------------------------------------------------------------------

/// Axis-aligned bounding box in page units.
///
/// Invariant: `x1 < x2` and `y1 < y2`. Enforced by [`BBox::new`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BBox {
    /// Left edge.
    pub x1: f64,
    /// Top edge.
    pub y1: f64,
    /// Right edge.
    pub x2: f64,
    /// Bottom edge.
    pub y2: f64,
}

impl BBox {
    /// Construct a bounding box, rejecting degenerate coordinates.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Result<Self, SchemaError> {
        if !(x1 < x2 && y1 < y2) {
            return Err(SchemaError::new(
                "/bbox",
                format!("invalid bbox: require x1 < x2 and y1 < y2, got [{x1}, {y1}, {x2}, {y2}]"),
            ));
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    /// Center point of the box.
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// The box as the wire-format `[x1, y1, x2, y2]` array.
    #[must_use]
    pub fn as_array(&self) -> [f64; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

// ---------------------------------------------------------------------------
// Evidence
// ---------------------------------------------------------------------------

/// A provenance record binding a field value to OCR output.
///
/// Evidence is immutable once created; it is a copy sliced out of a
/// [`Token`] and embedded in the invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Evidence {
    /// Page number (0-indexed).
    pub page: u32,
    /// Bounding box of the source text.
    pub bbox: BBox,
    /// Raw text as read by OCR.
    pub text: String,
    /// OCR confidence in `[0, 1]`.
    pub confidence: f64,
}

impl Evidence {
    /// Construct an evidence record, validating the confidence range.
    pub fn new(
        page: u32,
        bbox: BBox,
        text: impl Into<String>,
        confidence: f64,
    ) -> Result<Self, SchemaError> {
        check_confidence("/evidence/confidence", confidence)?;
        Ok(Self {
            page,
            bbox,
            text: text.into(),
            confidence,
        })
    }

    /// Slice an evidence record out of a token.
    #[must_use]
    pub fn from_token(token: &Token) -> Self {
        Self {
            page: token.page,
            bbox: token.bbox,
            text: token.text.clone(),
            confidence: token.confidence,
        }
    }
}

// ---------------------------------------------------------------------------
// FieldValue
// ---------------------------------------------------------------------------

/// A parsed value with its confidence and supporting evidence.
///
/// Invariants:
/// - a present value implies `confidence > 0`;
/// - with no evidence the confidence is capped at `0.5` (unconfirmed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FieldValue<T> {
    /// The parsed value, if one was found.
    pub value: Option<T>,
    /// Extraction confidence in `[0, 1]`.
    pub confidence: f64,
    /// Evidence records supporting the value.
    pub evidence: Vec<Evidence>,
}

impl<T> FieldValue<T> {
    /// A field with a value backed by evidence.
    pub fn found(value: T, confidence: f64, evidence: Vec<Evidence>) -> Result<Self, SchemaError> {
        check_confidence("/field/confidence", confidence)?;
        if confidence <= 0.0 {
            return Err(SchemaError::new(
                "/field/confidence",
                "a present value requires confidence > 0",
            ));
        }
        if evidence.is_empty() && confidence > 0.5 {
            return Err(SchemaError::new(
                "/field/confidence",
                "confidence above 0.5 requires at least one evidence record",
            ));
        }
        Ok(Self {
            value: Some(value),
            confidence,
            evidence,
        })
    }

    /// A field with a value but no evidence; confidence is capped at `0.5`.
    pub fn unconfirmed(value: T, confidence: f64) -> Result<Self, SchemaError> {
        check_confidence("/field/confidence", confidence)?;
        let capped = confidence.min(0.5).max(f64::MIN_POSITIVE);
        Ok(Self {
            value: Some(value),
            confidence: capped,
            evidence: Vec::new(),
        })
    }

    /// An absent field: no value, zero confidence, no evidence.
    #[must_use]
    pub fn missing() -> Self {
        Self {
            value: None,
            confidence: 0.0,
            evidence: Vec::new(),
        }
    }

    /// Returns `true` if a value is present.
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }

    /// Replace the value in place, keeping confidence and evidence.
    ///
    /// Used by patch application: the patched value inherits the original
    /// provenance, and the patch itself records the citation.
    pub fn replace_value(&mut self, value: T) {
        self.value = Some(value);
        if self.confidence <= 0.0 {
            // A patched-in value must satisfy the presence invariant.
            self.confidence = f64::MIN_POSITIVE;
        }
    }
}

impl<T> Default for FieldValue<T> {
    fn default() -> Self {
        Self::missing()
    }
}

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

/// A normalized OCR token.
///
/// Tokens exist only for the duration of one job. Their ordering carries
/// no meaning; spatial proximity does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Token {
    /// Normalized text.
    pub text: String,
    /// OCR confidence in `[0, 1]`.
    pub confidence: f64,
    /// Page number (0-indexed).
    pub page: u32,
    /// Bounding box on the page.
    pub bbox: BBox,
}

impl Token {
    /// Construct a token, validating confidence and bbox.
    pub fn new(
        text: impl Into<String>,
        confidence: f64,
        page: u32,
        bbox: BBox,
    ) -> Result<Self, SchemaError> {
        check_confidence("/token/confidence", confidence)?;
        Ok(Self {
            text: text.into(),
            confidence,
            page,
            bbox,
        })
    }

    /// Euclidean distance between token centers.
    #[must_use]
    pub fn distance_to(&self, other: &Token) -> f64 {
        let (ax, ay) = self.bbox.center();
        let (bx, by) = other.bbox.center();
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }
}

// ---------------------------------------------------------------------------
// CurrencyCode
// ---------------------------------------------------------------------------

/// ISO 4217 currency codes accepted by the pipeline.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, PartialOrd, Ord,
)]
pub enum CurrencyCode {
    /// Euro.
    EUR,
    /// US dollar.
    USD,
    /// Pound sterling.
    GBP,
    /// Japanese yen.
    JPY,
    /// Saudi riyal.
    SAR,
    /// UAE dirham.
    AED,
    /// Egyptian pound.
    EGP,
    /// Qatari riyal.
    QAR,
    /// Kuwaiti dinar.
    KWD,
    /// Bahraini dinar.
    BHD,
}

impl CurrencyCode {
    /// All accepted codes, in declaration order.
    pub const ALL: [CurrencyCode; 10] = [
        Self::EUR,
        Self::USD,
        Self::GBP,
        Self::JPY,
        Self::SAR,
        Self::AED,
        Self::EGP,
        Self::QAR,
        Self::KWD,
        Self::BHD,
    ];

    /// The three-letter code as a static string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EUR => "EUR",
            Self::USD => "USD",
            Self::GBP => "GBP",
            Self::JPY => "JPY",
            Self::SAR => "SAR",
            Self::AED => "AED",
            Self::EGP => "EGP",
            Self::QAR => "QAR",
            Self::KWD => "KWD",
            Self::BHD => "BHD",
        }
    }

    /// Parse a three-letter code, case-insensitively.
    #[must_use]
    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(code.trim()))
    }
}

impl std::fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn check_confidence(path: &str, confidence: f64) -> Result<(), SchemaError> {
    if !(0.0..=1.0).contains(&confidence) || confidence.is_nan() {
        return Err(SchemaError::new(
            path,
            format!("confidence must be within [0, 1], got {confidence}"),
        ));
    }
    Ok(())
}
