// SPDX-License-Identifier: MIT OR Apache-2.0
//! inv-export
#![deny(unsafe_code)]
//!
//! Tabular exports for accounting hand-off. Every populated field
//! becomes one row carrying its value, confidence, and first evidence
//! record; line-item fields are prefixed `line_item_{n}_`.

use inv_model::{Evidence, FieldValue, Invoice};
use rust_xlsxwriter::{Format, Workbook};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Export failures.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// CSV writing failed.
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    /// XLSX writing failed.
    #[error("xlsx: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    /// Filesystem failure.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Column headers, in order.
pub const HEADERS: [&str; 7] = [
    "Field Name",
    "Field Value",
    "Confidence",
    "Evidence Page",
    "Evidence Bbox (JSON array)",
    "Extraction Method",
    "Human Reviewed",
];

/// One export row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    /// Flat field name (e.g. `grand_total`, `line_item_0_description`).
    pub field_name: String,
    /// Rendered value.
    pub field_value: String,
    /// Extraction confidence.
    pub confidence: f64,
    /// Page of the first evidence record.
    pub evidence_page: Option<u32>,
    /// Bbox of the first evidence record.
    pub evidence_bbox: Option<[f64; 4]>,
    /// The invoice's extraction method tag.
    pub extraction_method: String,
    /// Whether a human reviewed the invoice.
    pub human_reviewed: bool,
}

// ---------------------------------------------------------------------------
// Row collection
// ---------------------------------------------------------------------------

/// Flatten an invoice into export rows, skipping absent fields.
#[must_use]
pub fn collect_rows(invoice: &Invoice) -> Vec<ExportRow> {
    let mut rows = Vec::new();
    let mut push = |name: &str, value: Option<String>, confidence: f64, ev: Option<&Evidence>| {
        if let Some(field_value) = value {
            rows.push(ExportRow {
                field_name: name.to_string(),
                field_value,
                confidence,
                evidence_page: ev.map(|e| e.page),
                evidence_bbox: ev.map(|e| e.bbox.as_array()),
                extraction_method: invoice.extraction_method.clone(),
                human_reviewed: invoice.human_reviewed,
            });
        }
    };

    push_field(&mut push, "invoice_number", &invoice.invoice_number, |v| v.clone());
    push_field(&mut push, "invoice_date", &invoice.invoice_date, |d| {
        d.format("%Y-%m-%d").to_string()
    });
    push_opt(&mut push, "due_date", &invoice.due_date, |d| {
        d.format("%Y-%m-%d").to_string()
    });
    push_field(&mut push, "vendor_name", &invoice.vendor.name, |v| v.clone());
    push_opt(&mut push, "vendor_address", &invoice.vendor.address, |v| v.clone());
    push_opt(&mut push, "vendor_tax_id", &invoice.vendor.tax_id, |v| v.clone());
    push_opt(&mut push, "vendor_phone", &invoice.vendor.phone, |v| v.clone());
    push_opt(&mut push, "vendor_email", &invoice.vendor.email, |v| v.clone());
    push_field(&mut push, "grand_total", &invoice.amounts.grand_total, |d| d.to_string());
    push_field(&mut push, "currency", &invoice.amounts.currency, |c| c.to_string());
    push_opt(&mut push, "subtotal", &invoice.amounts.subtotal, |d| d.to_string());
    push_opt(&mut push, "tax_amount", &invoice.amounts.tax_amount, |d| d.to_string());
    push_opt(&mut push, "tax_rate", &invoice.amounts.tax_rate, |d| d.to_string());
    push_opt(&mut push, "discount", &invoice.amounts.discount, |d| d.to_string());
    push_opt(&mut push, "shipping", &invoice.amounts.shipping, |d| d.to_string());
    push_opt(&mut push, "notes", &invoice.notes, |v| v.clone());
    push_opt(&mut push, "payment_terms", &invoice.payment_terms, |v| v.clone());
    push_opt(&mut push, "po_number", &invoice.po_number, |v| v.clone());

    for (i, item) in invoice.line_items.iter().enumerate() {
        let name = |f: &str| format!("line_item_{i}_{f}");
        push_field(&mut push, &name("description"), &item.description, |v| v.clone());
        push_opt(&mut push, &name("quantity"), &item.quantity, |d| d.to_string());
        push_opt(&mut push, &name("unit_price"), &item.unit_price, |d| d.to_string());
        push_opt(&mut push, &name("total"), &item.total, |d| d.to_string());
        push_opt(&mut push, &name("tax_amount"), &item.tax_amount, |d| d.to_string());
        push_opt(&mut push, &name("tax_rate"), &item.tax_rate, |d| d.to_string());
        if let Some(category) = &item.category {
            push(
                &name("category"),
                Some(category.clone()),
                item.category_confidence.unwrap_or(0.0),
                None,
            );
        }
    }

    rows
}

fn push_field<T>(
    push: &mut impl FnMut(&str, Option<String>, f64, Option<&Evidence>),
    name: &str,
    field: &FieldValue<T>,
    render: impl Fn(&T) -> String,
) {
    push(
        name,
        field.value.as_ref().map(render),
        field.confidence,
        field.evidence.first(),
    );
}

fn push_opt<T>(
    push: &mut impl FnMut(&str, Option<String>, f64, Option<&Evidence>),
    name: &str,
    field: &Option<FieldValue<T>>,
    render: impl Fn(&T) -> String,
) {
    if let Some(f) = field {
        push_field(push, name, f, render);
    }
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

/// Write one invoice as CSV.
///
/// # Errors
///
/// Returns [`ExportError`] on write failure.
pub fn write_csv<W: std::io::Write>(invoice: &Invoice, out: W) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(HEADERS)?;
    for row in collect_rows(invoice) {
        write_csv_row(&mut writer, None, &row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write several invoices as one CSV with a leading `Job Id` column.
///
/// # Errors
///
/// Returns [`ExportError`] on write failure.
pub fn write_csv_many<W: std::io::Write>(
    invoices: &[(String, &Invoice)],
    out: W,
) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_writer(out);
    let mut headers = vec!["Job Id"];
    headers.extend(HEADERS);
    writer.write_record(&headers)?;
    for (job_id, invoice) in invoices {
        for row in collect_rows(invoice) {
            write_csv_row(&mut writer, Some(job_id), &row)?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn write_csv_row<W: std::io::Write>(
    writer: &mut csv::Writer<W>,
    job_id: Option<&str>,
    row: &ExportRow,
) -> Result<(), ExportError> {
    let bbox = row
        .evidence_bbox
        .map(|b| serde_json::to_string(&b).unwrap_or_default())
        .unwrap_or_default();
    let mut record = Vec::new();
    if let Some(id) = job_id {
        record.push(id.to_string());
    }
    record.extend([
        row.field_name.clone(),
        row.field_value.clone(),
        row.confidence.to_string(),
        row.evidence_page.map(|p| p.to_string()).unwrap_or_default(),
        bbox,
        row.extraction_method.clone(),
        row.human_reviewed.to_string(),
    ]);
    writer.write_record(&record)?;
    Ok(())
}

/// Re-parse an exported CSV into `(field_name, field_value)` pairs.
///
/// # Errors
///
/// Returns [`ExportError`] when the CSV cannot be read.
pub fn read_csv_fields<R: std::io::Read>(input: R) -> Result<Vec<(String, String)>, ExportError> {
    let mut reader = csv::Reader::from_reader(input);
    let mut out = Vec::new();
    for record in reader.records() {
        let record = record?;
        let name = record.get(0).unwrap_or_default().to_string();
        let value = record.get(1).unwrap_or_default().to_string();
        out.push((name, value));
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// XLSX
// ---------------------------------------------------------------------------

/// Write one invoice as XLSX with a bolded header row.
///
/// # Errors
///
/// Returns [`ExportError`] on write failure.
pub fn write_xlsx(invoice: &Invoice, path: &Path) -> Result<(), ExportError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    let bold = Format::new().set_bold();

    for (col, header) in HEADERS.iter().enumerate() {
        sheet.write_with_format(0, col as u16, *header, &bold)?;
    }
    for (i, row) in collect_rows(invoice).iter().enumerate() {
        let r = (i + 1) as u32;
        sheet.write(r, 0, &row.field_name)?;
        sheet.write(r, 1, &row.field_value)?;
        sheet.write(r, 2, row.confidence)?;
        if let Some(page) = row.evidence_page {
            sheet.write(r, 3, page)?;
        }
        if let Some(bbox) = row.evidence_bbox {
            sheet.write(r, 4, serde_json::to_string(&bbox).unwrap_or_default())?;
        }
        sheet.write(r, 5, &row.extraction_method)?;
        sheet.write(r, 6, row.human_reviewed.to_string())?;
    }

    workbook.save(path)?;
    Ok(())
}
