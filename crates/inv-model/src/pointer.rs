// SPDX-License-Identifier: MIT OR Apache-2.0
//! JSON-Pointer accessors over the public invoice structure.
//!
//! Patches and rules address fields by `/`-delimited pointer paths. The
//! accessor knows the public structure only: unknown paths are rejected
//! rather than resolved dynamically, so a patch can never reach into
//! processing metadata or evidence records.

use crate::error::PointerError;
use crate::invoice::Invoice;
use crate::{CurrencyCode, FieldValue};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

/// Read the value at a pointer path.
///
/// Returns `Value::Null` when the addressed field is absent.
///
/// # Errors
///
/// [`PointerError::UnknownPath`] for paths outside the public structure,
/// [`PointerError::IndexOutOfRange`] for missing line items.
pub fn get(invoice: &Invoice, path: &str) -> Result<Value, PointerError> {
    match segments(path)?.as_slice() {
        ["invoice_number"] => Ok(string_value(&invoice.invoice_number)),
        ["invoice_date"] => Ok(date_value(&invoice.invoice_date)),
        ["due_date"] => Ok(opt(invoice.due_date.as_ref(), date_value)),
        ["notes"] => Ok(opt(invoice.notes.as_ref(), string_value)),
        ["payment_terms"] => Ok(opt(invoice.payment_terms.as_ref(), string_value)),
        ["po_number"] => Ok(opt(invoice.po_number.as_ref(), string_value)),
        ["vendor", "name"] => Ok(string_value(&invoice.vendor.name)),
        ["vendor", "address"] => Ok(opt(invoice.vendor.address.as_ref(), string_value)),
        ["vendor", "tax_id"] => Ok(opt(invoice.vendor.tax_id.as_ref(), string_value)),
        ["vendor", "phone"] => Ok(opt(invoice.vendor.phone.as_ref(), string_value)),
        ["vendor", "email"] => Ok(opt(invoice.vendor.email.as_ref(), string_value)),
        ["amounts", "subtotal"] => Ok(opt(invoice.amounts.subtotal.as_ref(), decimal_value)),
        ["amounts", "tax_amount"] => Ok(opt(invoice.amounts.tax_amount.as_ref(), decimal_value)),
        ["amounts", "tax_rate"] => Ok(opt(invoice.amounts.tax_rate.as_ref(), decimal_value)),
        ["amounts", "discount"] => Ok(opt(invoice.amounts.discount.as_ref(), decimal_value)),
        ["amounts", "shipping"] => Ok(opt(invoice.amounts.shipping.as_ref(), decimal_value)),
        ["amounts", "grand_total"] => Ok(decimal_value(&invoice.amounts.grand_total)),
        ["amounts", "currency"] => Ok(invoice
            .amounts
            .currency
            .value
            .map(|c| Value::String(c.as_str().to_string()))
            .unwrap_or(Value::Null)),
        ["line_items", idx, field] => {
            let item = line_item(invoice, path, *idx)?;
            match *field {
                "description" => Ok(string_value(&item.description)),
                "quantity" => Ok(opt(item.quantity.as_ref(), decimal_value)),
                "unit_price" => Ok(opt(item.unit_price.as_ref(), decimal_value)),
                "total" => Ok(opt(item.total.as_ref(), decimal_value)),
                "tax_amount" => Ok(opt(item.tax_amount.as_ref(), decimal_value)),
                "tax_rate" => Ok(opt(item.tax_rate.as_ref(), decimal_value)),
                "category" => Ok(item
                    .category
                    .clone()
                    .map(Value::String)
                    .unwrap_or(Value::Null)),
                _ => Err(PointerError::UnknownPath(path.to_string())),
            }
        }
        _ => Err(PointerError::UnknownPath(path.to_string())),
    }
}

/// Write the value at a pointer path.
///
/// A present field keeps its evidence and confidence; an absent optional
/// field is created unconfirmed (no evidence, confidence capped at 0.5).
///
/// # Errors
///
/// [`PointerError::UnknownPath`], [`PointerError::IndexOutOfRange`], or
/// [`PointerError::TypeMismatch`] when the value cannot be converted to
/// the field's type.
pub fn set(invoice: &mut Invoice, path: &str, value: Value) -> Result<(), PointerError> {
    match segments(path)?.as_slice() {
        ["invoice_number"] => set_string(&mut invoice.invoice_number, path, value),
        ["invoice_date"] => set_date(&mut invoice.invoice_date, path, value),
        ["due_date"] => set_opt_date(&mut invoice.due_date, path, value),
        ["notes"] => set_opt_string(&mut invoice.notes, path, value),
        ["payment_terms"] => set_opt_string(&mut invoice.payment_terms, path, value),
        ["po_number"] => set_opt_string(&mut invoice.po_number, path, value),
        ["vendor", "name"] => set_string(&mut invoice.vendor.name, path, value),
        ["vendor", "address"] => set_opt_string(&mut invoice.vendor.address, path, value),
        ["vendor", "tax_id"] => set_opt_string(&mut invoice.vendor.tax_id, path, value),
        ["vendor", "phone"] => set_opt_string(&mut invoice.vendor.phone, path, value),
        ["vendor", "email"] => set_opt_string(&mut invoice.vendor.email, path, value),
        ["amounts", "subtotal"] => set_opt_decimal(&mut invoice.amounts.subtotal, path, value),
        ["amounts", "tax_amount"] => set_opt_decimal(&mut invoice.amounts.tax_amount, path, value),
        ["amounts", "tax_rate"] => set_opt_decimal(&mut invoice.amounts.tax_rate, path, value),
        ["amounts", "discount"] => set_opt_decimal(&mut invoice.amounts.discount, path, value),
        ["amounts", "shipping"] => set_opt_decimal(&mut invoice.amounts.shipping, path, value),
        ["amounts", "grand_total"] => {
            let d = parse_decimal(path, &value)?;
            invoice.amounts.grand_total.replace_value(d);
            Ok(())
        }
        ["amounts", "currency"] => {
            let code = value
                .as_str()
                .and_then(CurrencyCode::parse)
                .ok_or_else(|| PointerError::TypeMismatch {
                    path: path.to_string(),
                    reason: format!("not a known currency code: {value}"),
                })?;
            invoice.amounts.currency.replace_value(code);
            Ok(())
        }
        ["line_items", idx, field] => {
            let i = parse_index(path, *idx)?;
            let len = invoice.line_items.len();
            let item = invoice
                .line_items
                .get_mut(i)
                .ok_or_else(|| PointerError::IndexOutOfRange(format!("{path} (len {len})")))?;
            match *field {
                "description" => set_string(&mut item.description, path, value),
                "quantity" => set_opt_decimal(&mut item.quantity, path, value),
                "unit_price" => set_opt_decimal(&mut item.unit_price, path, value),
                "total" => set_opt_decimal(&mut item.total, path, value),
                "tax_amount" => set_opt_decimal(&mut item.tax_amount, path, value),
                "tax_rate" => set_opt_decimal(&mut item.tax_rate, path, value),
                _ => Err(PointerError::UnknownPath(path.to_string())),
            }
        }
        _ => Err(PointerError::UnknownPath(path.to_string())),
    }
}

/// The required-field paths a patch may always target.
pub const REQUIRED_FIELD_PATHS: [&str; 5] = [
    "/invoice_number",
    "/invoice_date",
    "/vendor/name",
    "/amounts/grand_total",
    "/amounts/currency",
];

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn segments(path: &str) -> Result<Vec<&str>, PointerError> {
    let rest = path
        .strip_prefix('/')
        .ok_or_else(|| PointerError::UnknownPath(path.to_string()))?;
    if rest.is_empty() {
        return Err(PointerError::UnknownPath(path.to_string()));
    }
    Ok(rest.split('/').collect())
}

fn line_item<'a>(
    invoice: &'a Invoice,
    path: &str,
    idx: &str,
) -> Result<&'a crate::invoice::LineItem, PointerError> {
    let i = parse_index(path, idx)?;
    invoice
        .line_items
        .get(i)
        .ok_or_else(|| PointerError::IndexOutOfRange(path.to_string()))
}

fn parse_index(path: &str, idx: &str) -> Result<usize, PointerError> {
    idx.parse::<usize>()
        .map_err(|_| PointerError::UnknownPath(path.to_string()))
}

fn opt<T, F: Fn(&FieldValue<T>) -> Value>(field: Option<&FieldValue<T>>, f: F) -> Value {
    field.map(f).unwrap_or(Value::Null)
}

fn string_value(field: &FieldValue<String>) -> Value {
    field
        .value
        .clone()
        .map(Value::String)
        .unwrap_or(Value::Null)
}

fn date_value(field: &FieldValue<NaiveDate>) -> Value {
    field
        .value
        .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
        .unwrap_or(Value::Null)
}

fn decimal_value(field: &FieldValue<Decimal>) -> Value {
    field
        .value
        .map(|d| Value::String(d.to_string()))
        .unwrap_or(Value::Null)
}

fn parse_string(path: &str, value: &Value) -> Result<String, PointerError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| PointerError::TypeMismatch {
            path: path.to_string(),
            reason: format!("expected a string, got {value}"),
        })
}

fn parse_date(path: &str, value: &Value) -> Result<NaiveDate, PointerError> {
    let s = parse_string(path, value)?;
    NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|_| PointerError::TypeMismatch {
        path: path.to_string(),
        reason: format!("expected YYYY-MM-DD, got '{s}'"),
    })
}

fn parse_decimal(path: &str, value: &Value) -> Result<Decimal, PointerError> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => {
            return Err(PointerError::TypeMismatch {
                path: path.to_string(),
                reason: format!("expected a decimal, got {other}"),
            })
        }
    };
    Decimal::from_str(text.trim()).map_err(|e| PointerError::TypeMismatch {
        path: path.to_string(),
        reason: format!("not a decimal '{text}': {e}"),
    })
}

fn set_string(
    field: &mut FieldValue<String>,
    path: &str,
    value: Value,
) -> Result<(), PointerError> {
    let s = parse_string(path, &value)?;
    field.replace_value(s);
    Ok(())
}

fn set_date(
    field: &mut FieldValue<NaiveDate>,
    path: &str,
    value: Value,
) -> Result<(), PointerError> {
    let d = parse_date(path, &value)?;
    field.replace_value(d);
    Ok(())
}

fn set_opt_string(
    field: &mut Option<FieldValue<String>>,
    path: &str,
    value: Value,
) -> Result<(), PointerError> {
    let s = parse_string(path, &value)?;
    match field {
        Some(f) => f.replace_value(s),
        None => {
            let mut f = FieldValue::missing();
            f.replace_value(s);
            *field = Some(f);
        }
    }
    Ok(())
}

fn set_opt_date(
    field: &mut Option<FieldValue<NaiveDate>>,
    path: &str,
    value: Value,
) -> Result<(), PointerError> {
    let d = parse_date(path, &value)?;
    match field {
        Some(f) => f.replace_value(d),
        None => {
            let mut f = FieldValue::missing();
            f.replace_value(d);
            *field = Some(f);
        }
    }
    Ok(())
}

fn set_opt_decimal(
    field: &mut Option<FieldValue<Decimal>>,
    path: &str,
    value: Value,
) -> Result<(), PointerError> {
    let d = parse_decimal(path, &value)?;
    match field {
        Some(f) => f.replace_value(d),
        None => {
            let mut f = FieldValue::missing();
            f.replace_value(d);
            *field = Some(f);
        }
    }
    Ok(())
}
