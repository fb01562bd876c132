// SPDX-License-Identifier: MIT OR Apache-2.0
//! inv-ocr
#![deny(unsafe_code)]
//!
//! Adapter between heterogeneous OCR engines and the pipeline's
//! normalized [`Token`] stream. Engines report raw tokens in whatever
//! shape they have; the adapter normalizes text, renormalizes confidence
//! scales, and substitutes a sentinel bbox when the source has none.

pub mod normalize;

use async_trait::async_trait;
use inv_model::{BBox, SchemaError, Token};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use normalize::normalize_text;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// OCR-stage failures.
#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    /// The engine produced no tokens for the document.
    #[error("no tokens extracted from {filename}")]
    NoTokens {
        /// Name of the ingested file.
        filename: String,
    },

    /// The engine call did not complete within its timeout.
    #[error("ocr engine timed out after {timeout_secs}s")]
    Timeout {
        /// Configured timeout in seconds.
        timeout_secs: u64,
    },

    /// The engine reported a failure of its own.
    #[error("ocr engine failed: {0}")]
    Engine(String),

    /// A raw token could not be normalized into the model.
    #[error("invalid token: {0}")]
    InvalidToken(#[from] SchemaError),
}

// ---------------------------------------------------------------------------
// RawToken
// ---------------------------------------------------------------------------

/// Confidence scale an engine reports in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceScale {
    /// Fractions in `[0, 1]`.
    #[default]
    Unit,
    /// Percentages in `[0, 100]`.
    Percent,
}

/// An un-normalized token as an OCR engine reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawToken {
    /// Recognised text, possibly with Arabic-Indic digits and stray
    /// whitespace.
    pub text: String,
    /// Confidence in the engine's own scale.
    pub confidence: f64,
    /// Scale of the confidence value.
    #[serde(default)]
    pub scale: ConfidenceScale,
    /// Page number (0-indexed).
    pub page: u32,
    /// Bounding box `[x1, y1, x2, y2]`, when the engine provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f64; 4]>,
}

// ---------------------------------------------------------------------------
// OcrEngine
// ---------------------------------------------------------------------------

/// An OCR engine the pipeline can call.
///
/// Engines are external collaborators; the orchestrator wraps the call
/// in a timeout and treats an empty token list as [`OcrError::NoTokens`].
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Run recognition over the raw document bytes.
    async fn recognize(&self, bytes: &[u8], filename: &str) -> Result<Vec<RawToken>, OcrError>;

    /// Engine name used in audit metadata.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// TokenAdapter
// ---------------------------------------------------------------------------

/// Confidence ceiling for tokens whose source reported no bounding box.
pub const NO_BBOX_CONFIDENCE_CAP: f64 = 0.5;

/// Sentinel geometry used when the engine reports no boxes: a full-width
/// line slot derived from the token's position in the stream.
fn sentinel_bbox(index: usize) -> BBox {
    let y = index as f64 * 20.0;
    BBox::new(0.0, y, 1000.0, y + 20.0).expect("sentinel bbox is well-formed")
}

/// Normalizes raw engine output into the model's token stream.
#[derive(Debug, Clone, Default)]
pub struct TokenAdapter;

impl TokenAdapter {
    /// Create an adapter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Normalize a batch of raw tokens.
    ///
    /// Empty-after-normalization texts are dropped. The adapter never
    /// invents geometry: tokens without a source bbox get a sentinel box
    /// and a capped confidence.
    pub fn adapt(&self, raw: Vec<RawToken>) -> Result<Vec<Token>, OcrError> {
        let mut tokens = Vec::with_capacity(raw.len());
        for (index, rt) in raw.into_iter().enumerate() {
            let text = normalize_text(&rt.text);
            if text.is_empty() {
                continue;
            }

            let mut confidence = match rt.scale {
                ConfidenceScale::Unit => rt.confidence,
                ConfidenceScale::Percent => rt.confidence / 100.0,
            };
            confidence = confidence.clamp(0.0, 1.0);

            let bbox = match rt.bbox {
                Some([x1, y1, x2, y2]) => BBox::new(x1, y1, x2, y2)?,
                None => {
                    confidence = confidence.min(NO_BBOX_CONFIDENCE_CAP);
                    sentinel_bbox(index)
                }
            };

            tokens.push(Token::new(text, confidence, rt.page, bbox)?);
        }
        debug!(target: "inv.ocr", count = tokens.len(), "adapted tokens");
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(text: &str) -> RawToken {
        RawToken {
            text: text.to_string(),
            confidence: 0.9,
            scale: ConfidenceScale::Unit,
            page: 0,
            bbox: Some([0.0, 0.0, 50.0, 20.0]),
        }
    }

    #[test]
    fn adapt_normalizes_text() {
        let adapter = TokenAdapter::new();
        let tokens = adapter.adapt(vec![raw("  Total :  ١٢٣٤ ")]).unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text, "Total: 1234");
    }

    #[test]
    fn adapt_drops_empty_tokens() {
        let adapter = TokenAdapter::new();
        let tokens = adapter.adapt(vec![raw("   "), raw("x")]).unwrap();
        assert_eq!(tokens.len(), 1);
    }

    #[test]
    fn percent_scale_is_renormalized() {
        let adapter = TokenAdapter::new();
        let mut rt = raw("total");
        rt.confidence = 87.0;
        rt.scale = ConfidenceScale::Percent;
        let tokens = adapter.adapt(vec![rt]).unwrap();
        assert!((tokens[0].confidence - 0.87).abs() < 1e-9);
    }

    #[test]
    fn missing_bbox_gets_sentinel_and_cap() {
        let adapter = TokenAdapter::new();
        let mut rt = raw("total 12.00");
        rt.bbox = None;
        rt.confidence = 0.99;
        let tokens = adapter.adapt(vec![rt]).unwrap();
        assert!(tokens[0].confidence <= NO_BBOX_CONFIDENCE_CAP);
        assert!(tokens[0].bbox.x2 > tokens[0].bbox.x1);
        assert!(tokens[0].bbox.y2 > tokens[0].bbox.y1);
    }

    #[test]
    fn sentinel_boxes_stack_by_stream_position() {
        let adapter = TokenAdapter::new();
        let mut a = raw("first");
        a.bbox = None;
        let mut b = raw("second");
        b.bbox = None;
        let tokens = adapter.adapt(vec![a, b]).unwrap();
        assert!(tokens[0].bbox.y1 < tokens[1].bbox.y1);
    }

    #[test]
    fn degenerate_source_bbox_is_rejected() {
        let adapter = TokenAdapter::new();
        let mut rt = raw("total");
        rt.bbox = Some([10.0, 10.0, 10.0, 30.0]);
        assert!(matches!(
            adapter.adapt(vec![rt]),
            Err(OcrError::InvalidToken(_))
        ));
    }

    #[test]
    fn out_of_range_confidence_is_clamped() {
        let adapter = TokenAdapter::new();
        let mut rt = raw("total");
        rt.confidence = 1.7;
        let tokens = adapter.adapt(vec![rt]).unwrap();
        assert_eq!(tokens[0].confidence, 1.0);
    }
}
