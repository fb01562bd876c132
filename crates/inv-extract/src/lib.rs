// SPDX-License-Identifier: MIT OR Apache-2.0
//! inv-extract
#![deny(unsafe_code)]
//!
//! Deterministic invoice extraction. Fields are located by proximity to
//! multilingual label tokens, parsed by type-specific parsers, and
//! emitted as evidence-backed field values. Given identical tokens and
//! configuration the output is byte-identical.

pub mod cache;
pub mod labels;
pub mod lineitems;
pub mod locate;
pub mod parse;

use cache::{CachedVendorZones, LayoutCache, DEFAULT_LAYOUT_CACHE_CAPACITY};
use chrono::{DateTime, NaiveDate, Utc};
use inv_model::hash::layout_hash;
use inv_model::{
    Amounts, CurrencyCode, Evidence, FieldValue, Invoice, InvoiceBuilder, SchemaError, Token,
    Vendor, Warning,
};
use labels::LabelField;
use locate::{find_field, Located, ValueKind};
use rust_decimal::Decimal;
use tracing::{debug, info};

/// Extraction output: the invoice plus advisory warnings for the rules
/// engine to surface.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// The constructed invoice.
    pub invoice: Invoice,
    /// Warnings collected during extraction (e.g. ambiguous dates).
    pub warnings: Vec<Warning>,
}

/// Deterministic label-proximity extractor.
///
/// Holds the process-scoped vendor layout cache; everything else is
/// stateless.
#[derive(Debug)]
pub struct Extractor {
    cache: LayoutCache,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(DEFAULT_LAYOUT_CACHE_CAPACITY)
    }
}

impl Extractor {
    /// Create an extractor with the given layout-cache ceiling.
    #[must_use]
    pub fn new(layout_cache_capacity: usize) -> Self {
        Self {
            cache: LayoutCache::new(layout_cache_capacity),
        }
    }

    /// The vendor layout cache (shared, process-scoped).
    #[must_use]
    pub fn layout_cache(&self) -> &LayoutCache {
        &self.cache
    }

    /// Extract an invoice from the token stream, stamped with the
    /// current time.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] naming the pointer path when a required
    /// field could not be located.
    pub fn extract(
        &self,
        tokens: &[Token],
        filename: &str,
        processing_id: &str,
    ) -> Result<Extraction, SchemaError> {
        self.extract_at(tokens, filename, processing_id, Utc::now())
    }

    /// Extract with a pinned creation timestamp.
    ///
    /// Everything except `created_at` is a pure function of the tokens,
    /// so replays and determinism checks pin the clock here.
    pub fn extract_at(
        &self,
        tokens: &[Token],
        filename: &str,
        processing_id: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Extraction, SchemaError> {
        info!(target: "inv.extract", %filename, tokens = tokens.len(), "starting extraction");
        let mut warnings = Vec::new();

        let layout = layout_hash(tokens);
        let vendor = self.extract_vendor(tokens, &layout)?;
        let amounts = extract_amounts(tokens)?;

        let invoice_number =
            text_field(tokens, LabelField::InvoiceNumber, ValueKind::InvoiceNumber)?
                .unwrap_or_default();
        let invoice_date = date_field(tokens, LabelField::Date, "/invoice_date", &mut warnings)?
            .unwrap_or_default();
        let due_date = date_field(tokens, LabelField::DueDate, "/due_date", &mut warnings)?;

        let line_items = lineitems::extract_line_items(tokens)?;
        let notes = extract_notes(tokens)?;
        let payment_terms = keyword_field(tokens, &PAYMENT_TERM_KEYWORDS)?;
        let po_number = keyword_field(tokens, &PO_KEYWORDS)?;

        let invoice = InvoiceBuilder::new(processing_id, filename)
            .invoice_number(invoice_number)
            .invoice_date(invoice_date)
            .due_date(due_date)
            .vendor(vendor)
            .amounts(amounts)
            .line_items(line_items)
            .notes(notes)
            .payment_terms(payment_terms)
            .po_number(po_number)
            .created_at(created_at)
            .build()?;

        debug!(
            target: "inv.extract",
            invoice_number = invoice.invoice_number.value.as_deref().unwrap_or(""),
            line_items = invoice.line_items.len(),
            "extraction complete"
        );
        Ok(Extraction { invoice, warnings })
    }

    fn extract_vendor(&self, tokens: &[Token], layout: &str) -> Result<Vendor, SchemaError> {
        let name =
            text_field(tokens, LabelField::Vendor, ValueKind::VendorName)?.unwrap_or_default();

        let cached = self.cache.get(layout).unwrap_or_default();
        let address =
            text_field(tokens, LabelField::Address, ValueKind::FreeText)?.or(cached.address);
        let tax_id = text_field(tokens, LabelField::TaxId, ValueKind::FreeText)?.or(cached.tax_id);
        let phone = text_field(tokens, LabelField::Phone, ValueKind::Phone)?.or(cached.phone);
        let email = text_field(tokens, LabelField::Email, ValueKind::Email)?.or(cached.email);

        self.cache.insert_if_absent(
            layout,
            CachedVendorZones {
                address: address.clone(),
                tax_id: tax_id.clone(),
                phone: phone.clone(),
                email: email.clone(),
            },
        );

        Ok(Vendor {
            name,
            address,
            tax_id,
            phone,
            email,
            layout_hash: layout.to_string(),
        })
    }
}

const PAYMENT_TERM_KEYWORDS: [&str; 4] = ["payment terms", "net 30", "net 14", "payable within"];
const PO_KEYWORDS: [&str; 5] = [
    "purchase order",
    "order no",
    "order number",
    "po number",
    "p.o.",
];

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

fn located_field<T>(
    tokens: &[Token],
    located: Located,
    value: T,
) -> Result<FieldValue<T>, SchemaError> {
    let token = &tokens[located.token_index];
    FieldValue::found(value, located.confidence, vec![Evidence::from_token(token)])
}

fn monetary_field(
    tokens: &[Token],
    field: LabelField,
) -> Result<Option<FieldValue<Decimal>>, SchemaError> {
    let Some(located) = find_field(tokens, field, ValueKind::Monetary, |t| {
        parse::parse_amount(t).is_some()
    }) else {
        return Ok(None);
    };
    let text = &tokens[located.token_index].text;
    let value = parse::parse_amount(text).expect("candidate filtered by parse");
    Ok(Some(located_field(tokens, located, value)?))
}

fn percentage_field(
    tokens: &[Token],
    field: LabelField,
) -> Result<Option<FieldValue<Decimal>>, SchemaError> {
    let Some(located) = find_field(tokens, field, ValueKind::Percentage, |t| {
        parse::parse_percentage(t).is_some()
    }) else {
        return Ok(None);
    };
    let text = &tokens[located.token_index].text;
    let value = parse::parse_percentage(text).expect("candidate filtered by parse");
    Ok(Some(located_field(tokens, located, value)?))
}

fn text_field(
    tokens: &[Token],
    field: LabelField,
    kind: ValueKind,
) -> Result<Option<FieldValue<String>>, SchemaError> {
    let Some(located) = find_field(tokens, field, kind, |_| true) else {
        return Ok(None);
    };
    let value = tokens[located.token_index].text.trim().to_string();
    Ok(Some(located_field(tokens, located, value)?))
}

fn date_field(
    tokens: &[Token],
    field: LabelField,
    path: &str,
    warnings: &mut Vec<Warning>,
) -> Result<Option<FieldValue<NaiveDate>>, SchemaError> {
    let Some(located) = find_field(tokens, field, ValueKind::Date, |t| {
        parse::parse_date(t).is_some()
    }) else {
        return Ok(None);
    };
    let text = &tokens[located.token_index].text;
    let parsed = parse::parse_date(text).expect("candidate filtered by parse");
    if parsed.ambiguous {
        warnings.push(Warning {
            rule: "date_ambiguous".to_string(),
            path: path.to_string(),
            message: format!(
                "'{}' parses as both day-first and month-first; day-first reading {} was kept",
                text.trim(),
                parsed.date
            ),
        });
    }
    Ok(Some(located_field(tokens, located, parsed.date)?))
}

fn extract_amounts(tokens: &[Token]) -> Result<Amounts, SchemaError> {
    let subtotal = monetary_field(tokens, LabelField::Subtotal)?;
    let tax_amount = monetary_field(tokens, LabelField::Tax)?;
    let tax_rate = percentage_field(tokens, LabelField::Tax)?;
    let discount = monetary_field(tokens, LabelField::Discount)?;
    let shipping = monetary_field(tokens, LabelField::Shipping)?;
    let grand_total = monetary_field(tokens, LabelField::Total)?.unwrap_or_default();
    let currency = extract_currency(tokens)?;

    Ok(Amounts {
        subtotal,
        tax_amount,
        tax_rate,
        discount,
        shipping,
        grand_total,
        currency,
    })
}

fn extract_currency(tokens: &[Token]) -> Result<FieldValue<CurrencyCode>, SchemaError> {
    for token in tokens {
        if let Some(code) = parse::detect_currency(&token.text) {
            return FieldValue::found(code, 0.9, vec![Evidence::from_token(token)]);
        }
    }
    // Required but unobserved: default with a confidence low enough that
    // the decision policy routes the invoice to review.
    FieldValue::unconfirmed(CurrencyCode::EUR, 0.1)
}

fn extract_notes(tokens: &[Token]) -> Result<Option<FieldValue<String>>, SchemaError> {
    let note_tokens: Vec<&Token> = tokens
        .iter()
        .filter(|t| t.text.len() > 20 && !ValueKind::Monetary.accepts(&t.text))
        .collect();
    if note_tokens.is_empty() {
        return Ok(None);
    }
    let combined = note_tokens
        .iter()
        .map(|t| t.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let confidence = note_tokens
        .iter()
        .map(|t| t.confidence)
        .fold(f64::INFINITY, f64::min);
    let evidence = note_tokens.iter().map(|t| Evidence::from_token(t)).collect();
    Ok(Some(FieldValue::found(combined, confidence, evidence)?))
}

fn keyword_field(
    tokens: &[Token],
    keywords: &[&str],
) -> Result<Option<FieldValue<String>>, SchemaError> {
    for token in tokens {
        let lower = token.text.to_lowercase();
        if keywords.iter().any(|k| lower.contains(k)) {
            return Ok(Some(FieldValue::found(
                token.text.trim().to_string(),
                token.confidence,
                vec![Evidence::from_token(token)],
            )?));
        }
    }
    Ok(None)
}
