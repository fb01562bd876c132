// SPDX-License-Identifier: MIT OR Apache-2.0
//! inv-classify
#![deny(unsafe_code)]
//!
//! Category classification for invoice line items. The pipeline depends
//! only on the [`Classifier`] trait; the keyword baseline shipped here
//! covers deployments without a trained model. Model binaries load
//! behind the same trait, so the core never touches their format.

use regex::Regex;
use std::collections::BTreeMap;
use tracing::trace;

/// GL category codes with display names.
pub const GL_CATEGORIES: [(&str, &str); 17] = [
    ("office_supplies", "Office Supplies"),
    ("software", "Software & Licenses"),
    ("travel", "Travel & Transportation"),
    ("meals", "Meals & Entertainment"),
    ("utilities", "Utilities"),
    ("rent", "Rent & Facilities"),
    ("marketing", "Marketing & Advertising"),
    ("professional_services", "Professional Services"),
    ("equipment", "Equipment & Hardware"),
    ("training", "Training & Education"),
    ("insurance", "Insurance"),
    ("legal", "Legal & Compliance"),
    ("taxes", "Taxes & Fees"),
    ("banking", "Banking & Finance"),
    ("telecommunications", "Telecommunications"),
    ("maintenance", "Maintenance & Repairs"),
    ("other", "Other Expenses"),
];

/// Maps a line-item description to a `(category_code, confidence)` pair.
///
/// Implementations must be deterministic for a given input.
pub trait Classifier: Send + Sync {
    /// Classify a description, optionally biased by the vendor name.
    fn classify(&self, description: &str, vendor: Option<&str>) -> (String, f64);

    /// Name recorded in audit metadata.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Keyword baseline
// ---------------------------------------------------------------------------

/// Keyword-driven baseline classifier with optional vendor priors.
pub struct KeywordClassifier {
    patterns: Vec<(&'static str, Regex)>,
    vendor_priors: BTreeMap<String, String>,
}

impl KeywordClassifier {
    /// Build the baseline with the default keyword sets.
    #[must_use]
    pub fn new() -> Self {
        let patterns = KEYWORDS
            .iter()
            .map(|(category, words)| {
                let alternation = words.join("|");
                let re = Regex::new(&format!(r"(?i)\b({alternation})\b"))
                    .expect("keyword alternation compiles");
                (*category, re)
            })
            .collect();
        Self {
            patterns,
            vendor_priors: BTreeMap::new(),
        }
    }

    /// Register a vendor prior: line items from this vendor default to
    /// the given category when keywords are inconclusive.
    pub fn with_vendor_prior(mut self, vendor: impl Into<String>, category: impl Into<String>) -> Self {
        self.vendor_priors
            .insert(vendor.into().to_lowercase(), category.into());
        self
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier for KeywordClassifier {
    fn classify(&self, description: &str, vendor: Option<&str>) -> (String, f64) {
        let description = description.trim().to_lowercase();
        if description.is_empty() {
            return ("other".to_string(), 0.0);
        }

        let mut best: Option<(&str, usize)> = None;
        for (category, re) in &self.patterns {
            let hits = re.find_iter(&description).count();
            if hits > 0 {
                best = Some(match best {
                    None => (category, hits),
                    Some((c, h)) if hits > h => (category, hits),
                    Some(current) => current,
                });
            }
        }

        if let Some((category, hits)) = best {
            // One hit is a decent signal; more hits saturate quickly.
            let confidence = (0.6 + 0.15 * (hits as f64 - 1.0)).min(0.95);
            trace!(target: "inv.classify", category, hits, "keyword match");
            return (category.to_string(), confidence);
        }

        if let Some(vendor) = vendor {
            if let Some(category) = self.vendor_priors.get(&vendor.to_lowercase()) {
                return (category.clone(), 0.5);
            }
        }

        ("other".to_string(), 0.1)
    }

    fn name(&self) -> &str {
        "keyword-baseline"
    }
}

const KEYWORDS: [(&str, &[&str]); 16] = [
    (
        "office_supplies",
        &["pen", "pencil", "paper", "notebook", "folder", "stapler", "envelope", "ink", "toner", "printer", "desk", "chair", "ورق", "قلم", "حبر", "طابعة"],
    ),
    (
        "software",
        &["software", "license", "subscription", "saas", "cloud", "hosting", "microsoft", "adobe", "slack", "zoom", "برنامج", "ترخيص", "اشتراك"],
    ),
    (
        "travel",
        &["travel", "flight", "hotel", "taxi", "uber", "rental", "fuel", "parking", "airline", "train", "سفر", "طيران", "فندق", "وقود"],
    ),
    (
        "meals",
        &["meal", "food", "restaurant", "lunch", "dinner", "breakfast", "catering", "coffee", "وجبة", "طعام", "مطعم", "قهوة"],
    ),
    (
        "utilities",
        &["electricity", "water", "gas", "utility", "power", "energy", "broadband", "كهرباء", "ماء", "غاز"],
    ),
    (
        "rent",
        &["rent", "lease", "facility", "warehouse", "storage", "property", "إيجار", "مستودع"],
    ),
    (
        "marketing",
        &["marketing", "advertising", "promotion", "campaign", "ads", "تسويق", "إعلان", "حملة"],
    ),
    (
        "professional_services",
        &["consulting", "accounting", "audit", "lawyer", "accountant", "consultant", "advisor", "استشارات", "محاسبة", "محامي"],
    ),
    (
        "equipment",
        &["computer", "laptop", "server", "monitor", "keyboard", "hardware", "equipment", "machine", "كمبيوتر", "خادم", "معدات"],
    ),
    (
        "training",
        &["training", "course", "seminar", "workshop", "conference", "certification", "تدريب", "دورة", "مؤتمر"],
    ),
    (
        "insurance",
        &["insurance", "coverage", "policy", "premium", "liability", "تأمين", "بوليصة"],
    ),
    (
        "legal",
        &["legal", "court", "litigation", "contract", "compliance", "patent", "trademark", "قانوني", "محكمة", "عقد"],
    ),
    (
        "taxes",
        &["tax", "vat", "gst", "levy", "penalty", "ضريبة", "غرامة"],
    ),
    (
        "banking",
        &["bank", "banking", "loan", "credit", "interest", "transfer", "بنك", "قرض", "فائدة"],
    ),
    (
        "telecommunications",
        &["phone", "mobile", "telecom", "internet", "data", "roaming", "sim", "هاتف", "جوال", "إنترنت"],
    ),
    (
        "maintenance",
        &["maintenance", "repair", "upgrade", "installation", "cleaning", "plumbing", "صيانة", "إصلاح", "تنظيف"],
    ),
];
