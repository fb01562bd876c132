// SPDX-License-Identifier: MIT OR Apache-2.0
//! Evidence snippet curation for repair requests.

use inv_model::hash::stable_hash128;
use inv_model::Token;
use serde::{Deserialize, Serialize};

/// Default ceiling on snippets included in one request.
pub const DEFAULT_MAX_SNIPPETS: usize = 40;

/// Vertical window, in page units, for context tokens.
const CONTEXT_Y_WINDOW: f64 = 40.0;

/// Context tokens included per snippet.
const CONTEXT_TOKENS: usize = 5;

/// One evidence snippet with a stable citation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSnippet {
    /// Stable id of the form `p{page}#bx_{nnnn}`.
    pub bbox_id: String,
    /// The token's text.
    pub text: String,
    /// Neighbouring text on the same line band.
    pub context: String,
    /// Page number.
    pub page: u32,
    /// Bounding box `[x1, y1, x2, y2]`.
    pub bbox: [f64; 4],
}

/// Stable 4-digit citation id for a token.
#[must_use]
pub fn bbox_id(token: &Token) -> String {
    let digest = stable_hash128(&token.text);
    let h = u32::from_str_radix(&digest[..8], 16).unwrap_or(0) % 10_000;
    format!("p{}#bx_{h:04}", token.page)
}

/// Build up to `max` snippets, one per token in stream order.
///
/// Context is the text of up to five tokens on the same page within a
/// 40-unit vertical band, nearest first.
#[must_use]
pub fn build_snippets(tokens: &[Token], max: usize) -> Vec<EvidenceSnippet> {
    tokens
        .iter()
        .take(max)
        .map(|token| EvidenceSnippet {
            bbox_id: bbox_id(token),
            text: token.text.clone(),
            context: context_for(tokens, token),
            page: token.page,
            bbox: token.bbox.as_array(),
        })
        .collect()
}

fn context_for(tokens: &[Token], target: &Token) -> String {
    let mut nearby: Vec<(f64, &Token)> = tokens
        .iter()
        .filter(|t| t.page == target.page)
        .filter_map(|t| {
            let dy = (t.bbox.y1 - target.bbox.y1).abs();
            (dy < CONTEXT_Y_WINDOW).then_some((dy, t))
        })
        .collect();
    nearby.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    nearby
        .iter()
        .take(CONTEXT_TOKENS)
        .map(|(_, t)| t.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}
