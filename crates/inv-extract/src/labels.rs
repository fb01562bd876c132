// SPDX-License-Identifier: MIT OR Apache-2.0
//! Multilingual label dictionaries.
//!
//! Matching is case-insensitive substring over normalized token text.
//! English and Arabic spellings live in the same list per field.

/// Logical fields the extractor locates by label proximity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelField {
    /// Grand total.
    Total,
    /// Tax amount (also anchors the tax-rate percentage).
    Tax,
    /// Discount amount.
    Discount,
    /// Shipping amount.
    Shipping,
    /// Pre-tax subtotal.
    Subtotal,
    /// Invoice number.
    InvoiceNumber,
    /// Invoice issue date.
    Date,
    /// Payment due date.
    DueDate,
    /// Vendor name.
    Vendor,
    /// Vendor postal address.
    Address,
    /// Vendor tax identifier.
    TaxId,
    /// Vendor phone number.
    Phone,
    /// Vendor email address.
    Email,
}

impl LabelField {
    /// Label spellings for this field.
    #[must_use]
    pub fn labels(&self) -> &'static [&'static str] {
        match self {
            Self::Total => &[
                "total",
                "grand total",
                "amount due",
                "final total",
                "total amount",
                "invoice total",
                "الإجمالي",
                "المجموع",
                "المبلغ الإجمالي",
                "المبلغ المستحق",
                "المبلغ النهائي",
                "إجمالي الفاتورة",
            ],
            Self::Tax => &[
                "tax",
                "vat",
                "gst",
                "sales tax",
                "tax amount",
                "tax total",
                "value added tax",
                "ضريبة",
                "ضريبة القيمة المضافة",
                "مبلغ الضريبة",
                "إجمالي الضريبة",
                "نسبة الضريبة",
            ],
            Self::Discount => &[
                "discount",
                "deduction",
                "rebate",
                "reduction",
                "less",
                "خصم",
                "تخفيض",
                "إجمالي الخصم",
            ],
            Self::Shipping => &[
                "shipping",
                "delivery",
                "freight",
                "transport",
                "الشحن",
                "التوصيل",
                "رسوم الشحن",
            ],
            Self::Subtotal => &[
                "subtotal",
                "sub total",
                "net total",
                "net amount",
                "المجموع الفرعي",
                "الصافي",
            ],
            Self::InvoiceNumber => &[
                "invoice",
                "invoice no",
                "invoice number",
                "inv no",
                "bill no",
                "receipt no",
                "rechnung",
                "فاتورة",
                "رقم الفاتورة",
                "رقم الإيصال",
            ],
            Self::Date => &[
                "date",
                "invoice date",
                "issue date",
                "billing date",
                "datum",
                "تاريخ",
                "تاريخ الفاتورة",
                "تاريخ الإصدار",
            ],
            Self::DueDate => &[
                "due date",
                "payment due",
                "valid until",
                "expiry",
                "تاريخ الاستحقاق",
                "صالح حتى",
            ],
            Self::Vendor => &[
                "from",
                "vendor",
                "supplier",
                "company",
                "seller",
                "merchant",
                "provider",
                "من",
                "المورد",
                "الشركة",
                "التاجر",
            ],
            Self::Address => &["address", "عنوان"],
            Self::TaxId => &["tax id", "vat no", "vat id", "trn", "الرقم الضريبي"],
            Self::Phone => &["phone", "tel", "هاتف"],
            Self::Email => &["email", "e-mail", "البريد الإلكتروني"],
        }
    }

    /// Whether the lowercased token text mentions one of this field's
    /// labels.
    #[must_use]
    pub fn matches(&self, lowercased: &str) -> bool {
        self.labels().iter().any(|l| lowercased.contains(l))
    }
}
