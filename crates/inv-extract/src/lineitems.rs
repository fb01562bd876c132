// SPDX-License-Identifier: MIT OR Apache-2.0
//! Line-item grouping and per-run field extraction.
//!
//! Tokens that mix letters and digits are grouped into consecutive runs;
//! each run becomes one line item. Within a run the longest textual
//! token is the description, and the monetary/percentage parsers pick
//! out the numeric fields.

use crate::parse;
use inv_model::{Evidence, FieldValue, LineItem, SchemaError, Token};
use regex::Regex;
use std::sync::LazyLock;

static PURE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(\.\d+)?$").expect("pure number regex"));

const TAX_KEYWORDS: [&str; 3] = ["tax", "vat", "ضريبة"];

/// Whether a token belongs to a line-item run: letters and digits both
/// present, more than five characters.
#[must_use]
pub fn looks_like_line_item(text: &str) -> bool {
    let has_alpha = text.chars().any(|c| c.is_alphabetic());
    let has_digit = text.chars().any(|c| c.is_ascii_digit());
    has_alpha && has_digit && text.len() > 5
}

/// Group tokens into consecutive line-item runs.
#[must_use]
pub fn group_runs(tokens: &[Token]) -> Vec<Vec<&Token>> {
    let mut runs = Vec::new();
    let mut current: Vec<&Token> = Vec::new();
    for token in tokens {
        if looks_like_line_item(&token.text) {
            current.push(token);
        } else if !current.is_empty() {
            runs.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

/// Extract line items from the token stream.
pub fn extract_line_items(tokens: &[Token]) -> Result<Vec<LineItem>, SchemaError> {
    let mut items = Vec::new();
    for run in group_runs(tokens) {
        if let Some(item) = extract_run(&run)? {
            items.push(item);
        }
    }
    Ok(items)
}

fn extract_run(run: &[&Token]) -> Result<Option<LineItem>, SchemaError> {
    let Some(desc_token) = run.iter().copied().max_by_key(|t| t.text.len()) else {
        return Ok(None);
    };
    let description = field_from_token(desc_token, desc_token.text.clone())?;
    let mut item = LineItem::new(description)?;

    // Quantity: the first token that is a bare number.
    for t in run.iter().copied() {
        if PURE_NUMBER.is_match(t.text.trim()) {
            if let Some(q) = parse::parse_amount(&t.text) {
                item.quantity = Some(field_from_token(t, q)?);
                break;
            }
        }
    }

    // Unit price: first monetary parse; total: last monetary parse.
    let monetary: Vec<(&Token, rust_decimal::Decimal)> = run
        .iter()
        .copied()
        .filter_map(|t| parse::parse_amount(&t.text).map(|d| (t, d)))
        .collect();
    if let Some(&(t, d)) = monetary.first() {
        item.unit_price = Some(field_from_token(t, d)?);
    }
    if monetary.len() > 1 {
        if let Some(&(t, d)) = monetary.last() {
            item.total = Some(field_from_token(t, d)?);
        }
    }

    // Tax amount: a monetary value on a token that mentions tax.
    for t in run.iter().copied() {
        let lower = t.text.to_lowercase();
        if TAX_KEYWORDS.iter().any(|k| lower.contains(k)) {
            if let Some(d) = parse::parse_amount(&t.text) {
                item.tax_amount = Some(field_from_token(t, d)?);
                break;
            }
        }
    }

    // Tax rate: first percentage in the run.
    for t in run.iter().copied() {
        if let Some(rate) = parse::parse_percentage(&t.text) {
            item.tax_rate = Some(field_from_token(t, rate)?);
            break;
        }
    }

    // A run with a description but no numeric field is header or footer
    // text caught by the letters-and-digits heuristic, not a line item.
    let has_numeric = item.quantity.is_some()
        || item.unit_price.is_some()
        || item.total.is_some()
        || item.tax_amount.is_some()
        || item.tax_rate.is_some();
    if !has_numeric {
        return Ok(None);
    }

    Ok(Some(item))
}

fn field_from_token<T>(token: &Token, value: T) -> Result<FieldValue<T>, SchemaError> {
    FieldValue::found(value, token.confidence, vec![Evidence::from_token(token)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use inv_model::BBox;
    use rust_decimal_macros::dec;

    fn token(text: &str, y: f64) -> Token {
        Token::new(text, 0.9, 0, BBox::new(0.0, y, 400.0, y + 16.0).unwrap()).unwrap()
    }

    #[test]
    fn line_item_predicate_needs_mixed_content() {
        assert!(looks_like_line_item("Widget x2 12.50"));
        assert!(!looks_like_line_item("12.50"));
        assert!(!looks_like_line_item("Widget"));
        assert!(!looks_like_line_item("a1"));
    }

    #[test]
    fn runs_break_on_non_item_tokens() {
        let tokens = vec![
            token("Widget A 12.50", 0.0),
            token("Widget B 8.00", 20.0),
            token("Total:", 40.0),
            token("Gadget C 3.00", 60.0),
        ];
        let runs = group_runs(&tokens);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].len(), 2);
        assert_eq!(runs[1].len(), 1);
    }

    #[test]
    fn run_extracts_description_and_amounts() {
        // The description's digits form "2024-2025", which no monetary
        // parse accepts, so the priced tokens supply the amounts.
        let tokens = vec![
            token("Software license 2024-2025 term", 0.0),
            token("unit 12.50", 0.0),
            token("line 25.00", 0.0),
        ];
        let items = extract_line_items(&tokens).unwrap();
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(
            item.description.value.as_deref(),
            Some("Software license 2024-2025 term")
        );
        assert_eq!(item.unit_price.as_ref().unwrap().value, Some(dec!(12.50)));
        assert_eq!(item.total.as_ref().unwrap().value, Some(dec!(25.00)));
    }

    #[test]
    fn single_amount_is_unit_price_not_total() {
        let tokens = vec![token("Consulting retainer 800", 0.0)];
        let items = extract_line_items(&tokens).unwrap();
        let item = &items[0];
        assert_eq!(item.unit_price.as_ref().unwrap().value, Some(dec!(800)));
        assert!(item.total.is_none());
    }

    #[test]
    fn tax_fields_come_from_tax_tokens() {
        let tokens = vec![
            token("Server hosting plan 2024", 0.0),
            token("vat 19% charged", 0.0),
        ];
        let items = extract_line_items(&tokens).unwrap();
        let item = &items[0];
        assert_eq!(item.tax_rate.as_ref().unwrap().value, Some(dec!(19)));
        assert!(item.tax_amount.is_some());
    }

    #[test]
    fn run_without_numeric_fields_is_not_a_line_item() {
        // Invoice numbers satisfy the letters-and-digits heuristic but
        // carry nothing parseable as an amount.
        let tokens = vec![token("INV-2024-001", 0.0)];
        let items = extract_line_items(&tokens).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn every_extracted_field_carries_evidence() {
        let tokens = vec![token("Widget A7 kit 12.50", 0.0)];
        let items = extract_line_items(&tokens).unwrap();
        let item = &items[0];
        assert_eq!(item.description.evidence.len(), 1);
        assert_eq!(item.unit_price.as_ref().unwrap().evidence.len(), 1);
    }
}
