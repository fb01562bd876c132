// SPDX-License-Identifier: MIT OR Apache-2.0
//! Invoice aggregate, vendor, amounts, and line items.
//!
//! Construction goes through [`InvoiceBuilder`], which enforces the
//! required-field invariants and derives the duplicate hash. A built
//! invoice is immutable except through the JSON-Pointer accessor used by
//! patch application.

use crate::error::SchemaError;
use crate::{hash, CurrencyCode, FieldValue};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Vendor
// ---------------------------------------------------------------------------

/// Vendor identity with a layout fingerprint for cache matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Vendor {
    /// Vendor/company name. Required and non-empty.
    pub name: FieldValue<String>,
    /// Postal address, if found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<FieldValue<String>>,
    /// Tax identifier, if found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<FieldValue<String>>,
    /// Phone number, if found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<FieldValue<String>>,
    /// Email address, if found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<FieldValue<String>>,
    /// Fingerprint of the document's top-15 read-order tokens.
    pub layout_hash: String,
}

// ---------------------------------------------------------------------------
// Amounts
// ---------------------------------------------------------------------------

/// Financial totals. All monetary values are arbitrary-precision decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Amounts {
    /// Pre-tax subtotal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtotal: Option<FieldValue<Decimal>>,
    /// Total tax amount.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_amount: Option<FieldValue<Decimal>>,
    /// Tax rate as a percentage in `[0, 100]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_rate: Option<FieldValue<Decimal>>,
    /// Discount amount.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount: Option<FieldValue<Decimal>>,
    /// Shipping amount.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping: Option<FieldValue<Decimal>>,
    /// Grand total. Required.
    pub grand_total: FieldValue<Decimal>,
    /// Currency code. Required.
    pub currency: FieldValue<CurrencyCode>,
}

impl Amounts {
    /// The optional monetary fields with their pointer paths, for rules
    /// that iterate over every amount.
    #[must_use]
    pub fn optional_fields(&self) -> [(&'static str, Option<&FieldValue<Decimal>>); 4] {
        [
            ("/amounts/subtotal", self.subtotal.as_ref()),
            ("/amounts/tax_amount", self.tax_amount.as_ref()),
            ("/amounts/discount", self.discount.as_ref()),
            ("/amounts/shipping", self.shipping.as_ref()),
        ]
    }
}

// ---------------------------------------------------------------------------
// LineItem
// ---------------------------------------------------------------------------

/// A single invoice line with optional classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LineItem {
    /// Item description. Required and non-empty.
    pub description: FieldValue<String>,
    /// Quantity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<FieldValue<Decimal>>,
    /// Price per unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<FieldValue<Decimal>>,
    /// Line total.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<FieldValue<Decimal>>,
    /// Tax amount for this line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_amount: Option<FieldValue<Decimal>>,
    /// Tax rate for this line, percentage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_rate: Option<FieldValue<Decimal>>,
    /// GL category code assigned by the classifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Classifier confidence in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_confidence: Option<f64>,
}

impl LineItem {
    /// Construct a line item, requiring a non-empty description.
    pub fn new(description: FieldValue<String>) -> Result<Self, SchemaError> {
        match &description.value {
            Some(d) if !d.trim().is_empty() => Ok(Self {
                description,
                quantity: None,
                unit_price: None,
                total: None,
                tax_amount: None,
                tax_rate: None,
                category: None,
                category_confidence: None,
            }),
            _ => Err(SchemaError::missing_required("/line_items/-/description")),
        }
    }
}

// ---------------------------------------------------------------------------
// ProcessingStatus
// ---------------------------------------------------------------------------

/// Final decision state for a processed invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    /// Rules passed and confidences cleared the thresholds.
    AutoPosted,
    /// A human must inspect the invoice.
    NeedsReview,
    /// Processing failed before a decision could be made.
    Failed,
}

impl ProcessingStatus {
    /// Stable string form used in audit entries.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoPosted => "auto_posted",
            Self::NeedsReview => "needs_review",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Invoice
// ---------------------------------------------------------------------------

/// A complete extracted invoice with provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Invoice {
    /// Invoice number. Required and non-empty.
    pub invoice_number: FieldValue<String>,
    /// Invoice issue date. Required.
    pub invoice_date: FieldValue<NaiveDate>,
    /// Payment due date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<FieldValue<NaiveDate>>,
    /// Vendor identity.
    pub vendor: Vendor,
    /// Financial totals.
    pub amounts: Amounts,
    /// Line items, possibly empty.
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    /// Free-form notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<FieldValue<String>>,
    /// Payment terms text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_terms: Option<FieldValue<String>>,
    /// Purchase order number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub po_number: Option<FieldValue<String>>,
    /// Unique processing identifier assigned by the orchestrator.
    pub processing_id: String,
    /// Timestamp at which processing created this record.
    pub created_at: DateTime<Utc>,
    /// Name of the ingested file.
    pub source_file: String,
    /// Extraction method tag (e.g. `"deterministic"`).
    pub extraction_method: String,
    /// Whether an LLM patch has been applied.
    pub llm_patch_applied: bool,
    /// Whether a human has reviewed the record.
    pub human_reviewed: bool,
    /// Duplicate-detection hash over the key tuple.
    pub duplicate_hash: String,
}

impl Invoice {
    /// The required fields with their pointer paths and confidences, for
    /// the decision policy's confidence gate.
    #[must_use]
    pub fn required_field_confidences(&self) -> [(&'static str, f64); 5] {
        [
            ("/invoice_number", self.invoice_number.confidence),
            ("/invoice_date", self.invoice_date.confidence),
            ("/vendor/name", self.vendor.name.confidence),
            ("/amounts/grand_total", self.amounts.grand_total.confidence),
            ("/amounts/currency", self.amounts.currency.confidence),
        ]
    }
}

// ---------------------------------------------------------------------------
// InvoiceBuilder
// ---------------------------------------------------------------------------

/// Builder that enforces the invoice schema at construction time.
///
/// `build` fails with a [`SchemaError`] naming the pointer path of the
/// first missing required field.
#[derive(Debug, Clone)]
pub struct InvoiceBuilder {
    invoice_number: FieldValue<String>,
    invoice_date: FieldValue<NaiveDate>,
    due_date: Option<FieldValue<NaiveDate>>,
    vendor: Option<Vendor>,
    amounts: Option<Amounts>,
    line_items: Vec<LineItem>,
    notes: Option<FieldValue<String>>,
    payment_terms: Option<FieldValue<String>>,
    po_number: Option<FieldValue<String>>,
    processing_id: String,
    source_file: String,
    extraction_method: String,
    created_at: DateTime<Utc>,
}

impl InvoiceBuilder {
    /// Start a builder for the given processing id and source file.
    #[must_use]
    pub fn new(processing_id: impl Into<String>, source_file: impl Into<String>) -> Self {
        Self {
            invoice_number: FieldValue::missing(),
            invoice_date: FieldValue::missing(),
            due_date: None,
            vendor: None,
            amounts: None,
            line_items: Vec::new(),
            notes: None,
            payment_terms: None,
            po_number: None,
            processing_id: processing_id.into(),
            source_file: source_file.into(),
            extraction_method: "deterministic".to_string(),
            created_at: Utc::now(),
        }
    }

    /// Set the invoice number field.
    #[must_use]
    pub fn invoice_number(mut self, field: FieldValue<String>) -> Self {
        self.invoice_number = field;
        self
    }

    /// Set the invoice date field.
    #[must_use]
    pub fn invoice_date(mut self, field: FieldValue<NaiveDate>) -> Self {
        self.invoice_date = field;
        self
    }

    /// Set the due date field.
    #[must_use]
    pub fn due_date(mut self, field: Option<FieldValue<NaiveDate>>) -> Self {
        self.due_date = field;
        self
    }

    /// Set the vendor block.
    #[must_use]
    pub fn vendor(mut self, vendor: Vendor) -> Self {
        self.vendor = Some(vendor);
        self
    }

    /// Set the amounts block.
    #[must_use]
    pub fn amounts(mut self, amounts: Amounts) -> Self {
        self.amounts = Some(amounts);
        self
    }

    /// Set the line items.
    #[must_use]
    pub fn line_items(mut self, items: Vec<LineItem>) -> Self {
        self.line_items = items;
        self
    }

    /// Set the notes field.
    #[must_use]
    pub fn notes(mut self, field: Option<FieldValue<String>>) -> Self {
        self.notes = field;
        self
    }

    /// Set the payment terms field.
    #[must_use]
    pub fn payment_terms(mut self, field: Option<FieldValue<String>>) -> Self {
        self.payment_terms = field;
        self
    }

    /// Set the purchase order number field.
    #[must_use]
    pub fn po_number(mut self, field: Option<FieldValue<String>>) -> Self {
        self.po_number = field;
        self
    }

    /// Override the extraction method tag.
    #[must_use]
    pub fn extraction_method(mut self, method: impl Into<String>) -> Self {
        self.extraction_method = method.into();
        self
    }

    /// Pin the creation timestamp (tests and replays).
    #[must_use]
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    /// Validate invariants and produce the invoice.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] with the pointer path of the first missing
    /// required field.
    pub fn build(self) -> Result<Invoice, SchemaError> {
        let number = match &self.invoice_number.value {
            Some(n) if !n.trim().is_empty() => n.clone(),
            _ => return Err(SchemaError::missing_required("/invoice_number")),
        };
        let date = self
            .invoice_date
            .value
            .ok_or_else(|| SchemaError::missing_required("/invoice_date"))?;
        let vendor = self
            .vendor
            .ok_or_else(|| SchemaError::missing_required("/vendor"))?;
        let vendor_name = match &vendor.name.value {
            Some(n) if !n.trim().is_empty() => n.clone(),
            _ => return Err(SchemaError::missing_required("/vendor/name")),
        };
        let amounts = self
            .amounts
            .ok_or_else(|| SchemaError::missing_required("/amounts"))?;
        let grand_total = amounts
            .grand_total
            .value
            .ok_or_else(|| SchemaError::missing_required("/amounts/grand_total"))?;
        if amounts.currency.value.is_none() {
            return Err(SchemaError::missing_required("/amounts/currency"));
        }
        if grand_total.is_sign_negative() {
            return Err(SchemaError::new(
                "/amounts/grand_total",
                "amounts must be non-negative",
            ));
        }
        for item in &self.line_items {
            match &item.description.value {
                Some(d) if !d.trim().is_empty() => {}
                _ => return Err(SchemaError::missing_required("/line_items/-/description")),
            }
        }

        let duplicate_hash = hash::duplicate_hash(&vendor_name, &number, date, grand_total);

        Ok(Invoice {
            invoice_number: self.invoice_number,
            invoice_date: self.invoice_date,
            due_date: self.due_date,
            vendor,
            amounts,
            line_items: self.line_items,
            notes: self.notes,
            payment_terms: self.payment_terms,
            po_number: self.po_number,
            processing_id: self.processing_id,
            created_at: self.created_at,
            source_file: self.source_file,
            extraction_method: self.extraction_method,
            llm_patch_applied: false,
            human_reviewed: false,
            duplicate_hash,
        })
    }
}
