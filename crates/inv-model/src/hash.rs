// SPDX-License-Identifier: MIT OR Apache-2.0
//! Stable content hashing over canonical JSON.
//!
//! All derived identifiers are hex prefixes of a SHA-256 digest. Object
//! keys are sorted (`serde_json` maps are `BTreeMap`-backed), so the
//! canonical form is deterministic regardless of construction order.

use crate::Token;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

/// Produce the canonical JSON string for any serialisable value.
///
/// # Errors
///
/// Returns the underlying `serde_json` error if serialization fails.
pub fn canonical_json<T: serde::Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let v = serde_json::to_value(value)?;
    serde_json::to_string(&v)
}

/// 128-bit hex digest (32 chars) of the given text.
#[must_use]
pub fn stable_hash128(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let full = format!("{:x}", hasher.finalize());
    full[..32].to_string()
}

/// 64-bit truncated hex digest (16 chars) of a value's canonical JSON.
///
/// Used by the audit log to record LLM inputs/outputs without storing
/// raw content.
pub fn content_digest64<T: serde::Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = canonical_json(value)?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    let full = format!("{:x}", hasher.finalize());
    Ok(full[..16].to_string())
}

/// Layout fingerprint: hash of the top-15 tokens in reading order.
///
/// Tokens are sorted by `(page, y1, x1)`; the first 15 texts are joined
/// with `|` and hashed. Permuting the input while preserving that set
/// yields the same fingerprint.
#[must_use]
pub fn layout_hash(tokens: &[Token]) -> String {
    let mut sorted: Vec<&Token> = tokens.iter().collect();
    sorted.sort_by(|a, b| {
        (a.page, a.bbox.y1, a.bbox.x1)
            .partial_cmp(&(b.page, b.bbox.y1, b.bbox.x1))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let joined = sorted
        .iter()
        .take(15)
        .map(|t| t.text.as_str())
        .collect::<Vec<_>>()
        .join("|");
    stable_hash128(&joined)
}

/// Duplicate-detection hash over the invoice key tuple.
///
/// The date is rendered `YYYY-MM-DD` and the total is normalised
/// (trailing zeros trimmed) so that `1190.00` and `1190.0` collide while
/// a one-cent difference does not.
#[must_use]
pub fn duplicate_hash(
    vendor_name: &str,
    invoice_number: &str,
    invoice_date: chrono::NaiveDate,
    grand_total: Decimal,
) -> String {
    let key = format!(
        "{vendor_name}|{invoice_number}|{}|{}",
        invoice_date.format("%Y-%m-%d"),
        grand_total.normalize()
    );
    stable_hash128(&key)
}
