// SPDX-License-Identifier: MIT OR Apache-2.0
//! Label-proximity field location.
//!
//! For every token that mentions a field label, candidate value tokens
//! on the same page within the distance ceiling are scored; the best
//! (score, then distance, then reading order) candidate wins.

use crate::labels::LabelField;
use crate::parse;
use inv_model::Token;

/// Distance ceiling for label/value pairing, in page units.
pub const MAX_LABEL_DISTANCE: f64 = 200.0;

/// Distance over which the proximity factor decays to its floor.
pub const DISTANCE_DECAY: f64 = 500.0;

/// Base strength of a dictionary label match.
const PATTERN_FACTOR: f64 = 0.8;

// ---------------------------------------------------------------------------
// Type predicates
// ---------------------------------------------------------------------------

/// Shape a candidate value token must have for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Monetary amount: contains digits, at most 50 chars.
    Monetary,
    /// Invoice number: contains alphanumerics, at most 30 chars.
    InvoiceNumber,
    /// Date: contains a date-shaped substring.
    Date,
    /// Vendor name: 3–99 chars, no digits.
    VendorName,
    /// Percentage such as `19%`.
    Percentage,
    /// Free contact text (address): 3–149 chars.
    FreeText,
    /// Phone number: at least five digits.
    Phone,
    /// Email address.
    Email,
}

impl ValueKind {
    /// Whether the text passes this kind's predicate.
    #[must_use]
    pub fn accepts(&self, text: &str) -> bool {
        let text = text.trim();
        match self {
            Self::Monetary => text.chars().any(|c| c.is_ascii_digit()) && text.len() <= 50,
            Self::InvoiceNumber => {
                text.chars().any(|c| c.is_ascii_alphanumeric()) && text.len() <= 30
            }
            Self::Date => parse::looks_like_date(text),
            Self::VendorName => {
                text.len() > 2 && text.len() < 100 && !text.chars().any(|c| c.is_ascii_digit())
            }
            Self::Percentage => parse::looks_like_percentage(text),
            Self::FreeText => text.len() > 2 && text.len() < 150,
            Self::Phone => text.chars().filter(|c| c.is_ascii_digit()).count() >= 5,
            Self::Email => text.contains('@') && text.contains('.'),
        }
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Score a (label, candidate) pairing for candidate selection.
///
/// `min(conf_label, conf_cand) · max(0.1, 1 − d/500) · 0.8 · type_factor`,
/// clamped to `[0, 1]`. The type factor is `1.0` for a predicate match
/// and `0.3` otherwise.
#[must_use]
pub fn pair_score(label: &Token, candidate: &Token, kind: ValueKind) -> f64 {
    (pair_confidence(label, candidate, kind) * PATTERN_FACTOR).clamp(0.0, 1.0)
}

/// Extraction confidence for a chosen pairing.
///
/// Same shape as [`pair_score`] minus the constant pattern dampener:
/// the dampener ranks candidates but must not push a cleanly extracted
/// field below the auto-post confidence gate.
#[must_use]
pub fn pair_confidence(label: &Token, candidate: &Token, kind: ValueKind) -> f64 {
    let base = label.confidence.min(candidate.confidence);
    let distance_factor = (1.0 - label.distance_to(candidate) / DISTANCE_DECAY).max(0.1);
    let type_factor = if kind.accepts(&candidate.text) { 1.0 } else { 0.3 };
    (base * distance_factor * type_factor).clamp(0.0, 1.0)
}

/// A located field value: candidate token index plus scoring outputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Located {
    /// Index of the winning value token.
    pub token_index: usize,
    /// Selection score of the winning pair.
    pub score: f64,
    /// Extraction confidence stored on the resulting field.
    pub confidence: f64,
}

/// Locate the best value token for a field.
///
/// `parses` additionally filters candidates to those whose text the
/// field's parser accepts, so a located field always yields a value.
pub fn find_field<F>(
    tokens: &[Token],
    field: LabelField,
    kind: ValueKind,
    mut parses: F,
) -> Option<Located>
where
    F: FnMut(&str) -> bool,
{
    let mut best: Option<(f64, f64, usize, f64)> = None; // (score, distance, index, confidence)

    for (label_idx, label) in tokens.iter().enumerate() {
        if !field.matches(&label.text.to_lowercase()) {
            continue;
        }
        for (cand_idx, cand) in tokens.iter().enumerate() {
            if cand_idx == label_idx || cand.page != label.page {
                continue;
            }
            let distance = label.distance_to(cand);
            if distance >= MAX_LABEL_DISTANCE {
                continue;
            }
            if !kind.accepts(&cand.text) || !parses(&cand.text) {
                continue;
            }
            let score = pair_score(label, cand, kind);
            if score <= 0.0 {
                continue;
            }
            let entry = (score, distance, cand_idx, pair_confidence(label, cand, kind));
            best = Some(match best {
                None => entry,
                Some(current) => {
                    // Higher score wins; ties broken by smaller distance,
                    // then by reading order.
                    let (s, d, i, _) = current;
                    if score > s
                        || (score == s && distance < d)
                        || (score == s && distance == d && cand_idx < i)
                    {
                        entry
                    } else {
                        current
                    }
                }
            });
        }
    }

    best.map(|(score, _, token_index, confidence)| Located {
        token_index,
        score,
        confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use inv_model::BBox;

    fn token(text: &str, conf: f64, x: f64, y: f64) -> Token {
        Token::new(text, conf, 0, BBox::new(x, y, x + 40.0, y + 16.0).unwrap()).unwrap()
    }

    #[test]
    fn monetary_predicate() {
        assert!(ValueKind::Monetary.accepts("€ 1.190,00"));
        assert!(!ValueKind::Monetary.accepts("no value"));
        assert!(!ValueKind::Monetary.accepts(&"9".repeat(51)));
    }

    #[test]
    fn invoice_number_predicate() {
        assert!(ValueKind::InvoiceNumber.accepts("INV-2024-001"));
        assert!(!ValueKind::InvoiceNumber.accepts("---"));
    }

    #[test]
    fn vendor_predicate_excludes_digits() {
        assert!(ValueKind::VendorName.accepts("ACME GmbH"));
        assert!(!ValueKind::VendorName.accepts("ACME 42"));
        assert!(!ValueKind::VendorName.accepts("ab"));
    }

    #[test]
    fn email_predicate() {
        assert!(ValueKind::Email.accepts("ap@acme.example"));
        assert!(!ValueKind::Email.accepts("acme.example"));
    }

    #[test]
    fn score_decays_with_distance() {
        let label = token("Total:", 0.9, 0.0, 0.0);
        let near = token("12.00", 0.9, 60.0, 0.0);
        let far = token("12.00", 0.9, 190.0, 0.0);
        assert!(
            pair_score(&label, &near, ValueKind::Monetary)
                > pair_score(&label, &far, ValueKind::Monetary)
        );
    }

    #[test]
    fn score_penalizes_type_mismatch() {
        let label = token("Total:", 0.9, 0.0, 0.0);
        let value = token("hello there friend", 0.9, 60.0, 0.0);
        let with = pair_score(&label, &value, ValueKind::Monetary);
        let without = pair_score(&label, &token("12.00", 0.9, 60.0, 0.0), ValueKind::Monetary);
        assert!(with < without);
    }

    #[test]
    fn find_field_picks_nearest_valid_candidate() {
        let tokens = vec![
            token("Total:", 0.95, 0.0, 0.0),
            token("1.190,00", 0.95, 60.0, 0.0),
            token("999,99", 0.95, 150.0, 0.0),
        ];
        let found =
            find_field(&tokens, LabelField::Total, ValueKind::Monetary, |t| {
                crate::parse::parse_amount(t).is_some()
            })
            .unwrap();
        assert_eq!(found.token_index, 1);
        assert!(found.score > 0.0);
    }

    #[test]
    fn find_field_ignores_other_pages() {
        let mut other_page =
            Token::new("12.00", 0.95, 1, BBox::new(60.0, 0.0, 100.0, 16.0).unwrap()).unwrap();
        other_page.page = 1;
        let tokens = vec![token("Total:", 0.95, 0.0, 0.0), other_page];
        assert!(find_field(&tokens, LabelField::Total, ValueKind::Monetary, |t| {
            crate::parse::parse_amount(t).is_some()
        })
        .is_none());
    }

    #[test]
    fn find_field_respects_distance_ceiling() {
        let tokens = vec![
            token("Total:", 0.95, 0.0, 0.0),
            token("12.00", 0.95, 500.0, 0.0),
        ];
        assert!(find_field(&tokens, LabelField::Total, ValueKind::Monetary, |t| {
            crate::parse::parse_amount(t).is_some()
        })
        .is_none());
    }

    #[test]
    fn find_field_returns_none_without_label() {
        let tokens = vec![token("12.00", 0.95, 0.0, 0.0)];
        assert!(find_field(&tokens, LabelField::Total, ValueKind::Monetary, |_| true).is_none());
    }
}
