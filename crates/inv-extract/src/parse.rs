// SPDX-License-Identifier: MIT OR Apache-2.0
//! Value parsers: amounts, dates, percentages, currencies.
//!
//! All parsers are total functions over arbitrary token text — they
//! return `None` rather than guessing when the text does not carry a
//! value of the requested shape.

use inv_model::CurrencyCode;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::LazyLock;

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})-(\d{2})-(\d{2})").expect("iso date regex"));
static SLASH_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})/(\d{1,2})/(\d{4})").expect("slash date regex"));
static DASH_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})-(\d{1,2})-(\d{4})").expect("dash date regex"));
static DOT_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})\.(\d{1,2})\.(\d{4})").expect("dot date regex"));
static DATE_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{1,4}[/\-.]\d{1,2}[/\-.]\d{1,4}").expect("date shape regex"));
static PERCENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*%").expect("percent regex"));

// ---------------------------------------------------------------------------
// Amounts
// ---------------------------------------------------------------------------

/// Parse a monetary amount out of token text.
///
/// Strips everything outside `[0-9.,-]`, then disambiguates the comma:
/// with both separators present the rightmost one is the decimal point
/// (`1,234.56` and `1.234,56` both parse to `1234.56`); a lone comma is
/// a decimal point only when it is single and followed by at most two
/// digits (`1,56` → `1.56`, `1,234` → `1234`).
#[must_use]
pub fn parse_amount(text: &str) -> Option<Decimal> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect();
    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let has_comma = cleaned.contains(',');
    let has_dot = cleaned.contains('.');
    let normalized = if has_comma && has_dot {
        let last_comma = cleaned.rfind(',').expect("comma present");
        let last_dot = cleaned.rfind('.').expect("dot present");
        if last_comma > last_dot {
            // European style: dot groups thousands, comma is decimal.
            cleaned.replace('.', "").replace(',', ".")
        } else {
            cleaned.replace(',', "")
        }
    } else if has_comma {
        let after = cleaned.rsplit(',').next().unwrap_or("");
        if cleaned.matches(',').count() == 1 && after.len() <= 2 {
            cleaned.replace(',', ".")
        } else {
            cleaned.replace(',', "")
        }
    } else {
        cleaned
    };

    Decimal::from_str(&normalized).ok()
}

// ---------------------------------------------------------------------------
// Dates
// ---------------------------------------------------------------------------

/// A parsed date plus an ambiguity flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedDate {
    /// The calendar date the first matching pattern produced.
    pub date: chrono::NaiveDate,
    /// Set when day-first and month-first readings both parse to
    /// different valid dates; the first registered pattern won.
    pub ambiguous: bool,
}

/// Whether the text contains a date-shaped substring at all.
#[must_use]
pub fn looks_like_date(text: &str) -> bool {
    DATE_SHAPE.is_match(text)
}

/// Parse a date from token text.
///
/// Patterns are tried in registration order: ISO, `DD/MM/YYYY`,
/// `MM/DD/YYYY`, `DD-MM-YYYY`, `MM-DD-YYYY`, `DD.MM.YYYY`, `MM.DD.YYYY`.
/// The first pattern producing a possible calendar date wins; impossible
/// dates are rejected.
#[must_use]
pub fn parse_date(text: &str) -> Option<ParsedDate> {
    if let Some(c) = ISO_DATE.captures(text) {
        let (y, m, d) = (num(&c, 1), num(&c, 2), num(&c, 3));
        if let Some(date) = chrono::NaiveDate::from_ymd_opt(y as i32, m, d) {
            return Some(ParsedDate {
                date,
                ambiguous: false,
            });
        }
    }
    for re in [&*SLASH_DATE, &*DASH_DATE, &*DOT_DATE] {
        if let Some(c) = re.captures(text) {
            let (a, b, y) = (num(&c, 1), num(&c, 2), num(&c, 3));
            let day_first = chrono::NaiveDate::from_ymd_opt(y as i32, b, a);
            let month_first = chrono::NaiveDate::from_ymd_opt(y as i32, a, b);
            match (day_first, month_first) {
                (Some(date), Some(other)) => {
                    return Some(ParsedDate {
                        date,
                        ambiguous: date != other,
                    })
                }
                (Some(date), None) => {
                    return Some(ParsedDate {
                        date,
                        ambiguous: false,
                    })
                }
                (None, Some(date)) => {
                    return Some(ParsedDate {
                        date,
                        ambiguous: false,
                    })
                }
                (None, None) => {}
            }
        }
    }
    None
}

fn num(c: &regex::Captures<'_>, i: usize) -> u32 {
    c.get(i)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Percentages
// ---------------------------------------------------------------------------

/// Parse a percentage such as `19%` or `7.5 %`.
#[must_use]
pub fn parse_percentage(text: &str) -> Option<Decimal> {
    let c = PERCENT.captures(text)?;
    let raw = c.get(1)?.as_str();
    Decimal::from_str(raw).ok().filter(|d| {
        *d >= Decimal::ZERO && *d <= Decimal::from(100)
    })
}

/// Whether the text carries a percentage.
#[must_use]
pub fn looks_like_percentage(text: &str) -> bool {
    PERCENT.is_match(text)
}

// ---------------------------------------------------------------------------
// Currencies
// ---------------------------------------------------------------------------

/// Symbols and spellings recognised per supported currency.
const CURRENCY_TABLE: [(CurrencyCode, &[&str]); 10] = [
    (CurrencyCode::EUR, &["€", "EUR", "euro", "euros", "يورو"]),
    (CurrencyCode::USD, &["$", "USD", "dollar", "dollars", "دولار"]),
    (CurrencyCode::GBP, &["£", "GBP", "pound", "pounds", "جنيه"]),
    (CurrencyCode::JPY, &["¥", "JPY", "yen", "ين"]),
    (CurrencyCode::SAR, &["SAR", "riyal", "ريال"]),
    (CurrencyCode::AED, &["AED", "dirham", "درهم"]),
    (CurrencyCode::EGP, &["EGP", "جنيه مصري"]),
    (CurrencyCode::QAR, &["QAR", "ريال قطري"]),
    (CurrencyCode::KWD, &["KWD", "dinar", "دينار"]),
    (CurrencyCode::BHD, &["BHD", "دينار بحريني"]),
];

/// Detect a supported currency mentioned in the text.
///
/// The table is scanned in declaration order; the first hit wins.
#[must_use]
pub fn detect_currency(text: &str) -> Option<CurrencyCode> {
    for (code, symbols) in CURRENCY_TABLE {
        for sym in symbols {
            if text.contains(sym) {
                return Some(code);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    #[test]
    fn amount_us_style() {
        assert_eq!(parse_amount("1,234.56"), Some(dec!(1234.56)));
    }

    #[test]
    fn amount_european_style() {
        assert_eq!(parse_amount("1.234,56"), Some(dec!(1234.56)));
    }

    #[test]
    fn amount_single_comma_decimal() {
        assert_eq!(parse_amount("1,56"), Some(dec!(1.56)));
    }

    #[test]
    fn amount_comma_thousands() {
        assert_eq!(parse_amount("1,234"), Some(dec!(1234)));
    }

    #[test]
    fn amount_strips_currency_noise() {
        assert_eq!(parse_amount("€ 1.190,00"), Some(dec!(1190.00)));
        assert_eq!(parse_amount("$ 42"), Some(dec!(42)));
    }

    #[test]
    fn amount_rejects_non_numeric() {
        assert_eq!(parse_amount("no digits here"), None);
        assert_eq!(parse_amount("..,,"), None);
    }

    #[test]
    fn amount_rejects_garbled_multi_dot() {
        assert_eq!(parse_amount("212.5025.00"), None);
    }

    #[test]
    fn date_iso() {
        let p = parse_date("2024-03-15").unwrap();
        assert_eq!(p.date, NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
        assert!(!p.ambiguous);
    }

    #[test]
    fn date_day_first_slash() {
        let p = parse_date("15/02/2024").unwrap();
        assert_eq!(p.date, NaiveDate::from_ymd_opt(2024, 2, 15).unwrap());
        assert!(!p.ambiguous);
    }

    #[test]
    fn date_month_first_slash_when_day_reading_impossible() {
        // 02/15 cannot be day-first (month 15), so the MM/DD reading wins.
        let p = parse_date("02/15/2024").unwrap();
        assert_eq!(p.date, NaiveDate::from_ymd_opt(2024, 2, 15).unwrap());
    }

    #[test]
    fn date_ambiguous_when_both_readings_valid() {
        let p = parse_date("03/04/2024").unwrap();
        // Day-first pattern is registered earlier.
        assert_eq!(p.date, NaiveDate::from_ymd_opt(2024, 4, 3).unwrap());
        assert!(p.ambiguous);
    }

    #[test]
    fn date_same_day_and_month_not_ambiguous() {
        let p = parse_date("04/04/2024").unwrap();
        assert!(!p.ambiguous);
    }

    #[test]
    fn date_dotted_german() {
        let p = parse_date("15.03.2024").unwrap();
        assert_eq!(p.date, NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
    }

    #[test]
    fn date_rejects_impossible() {
        assert!(parse_date("32/13/2024").is_none());
        assert!(parse_date("2024-02-30").is_none());
    }

    #[test]
    fn date_embedded_in_text() {
        let p = parse_date("Datum: 15.03.2024 Rechnung").unwrap();
        assert_eq!(p.date, NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
    }

    #[test]
    fn percentage_basic() {
        assert_eq!(parse_percentage("19%"), Some(dec!(19)));
        assert_eq!(parse_percentage("7.5 %"), Some(dec!(7.5)));
        assert_eq!(parse_percentage("VAT 19% incl."), Some(dec!(19)));
    }

    #[test]
    fn percentage_rejects_over_100() {
        assert_eq!(parse_percentage("250%"), None);
    }

    #[test]
    fn percentage_requires_sign() {
        assert_eq!(parse_percentage("19"), None);
    }

    #[test]
    fn currency_symbols() {
        assert_eq!(detect_currency("€ 1.190,00"), Some(CurrencyCode::EUR));
        assert_eq!(detect_currency("$99"), Some(CurrencyCode::USD));
        assert_eq!(detect_currency("ريال 500"), Some(CurrencyCode::SAR));
        assert_eq!(detect_currency("1000 ₹"), None);
    }

    #[test]
    fn currency_codes() {
        assert_eq!(detect_currency("Total KWD 12.000"), Some(CurrencyCode::KWD));
        assert_eq!(detect_currency("AED 75"), Some(CurrencyCode::AED));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn amount_parser_is_total(s in "\\PC{0,48}") {
                let _ = parse_amount(&s);
            }

            #[test]
            fn date_parser_is_total(s in "\\PC{0,48}") {
                let _ = parse_date(&s);
            }

            #[test]
            fn parsed_amounts_are_finite_decimals(n in 0u64..10_000_000, cents in 0u32..100) {
                let text = format!("{n}.{cents:02}");
                let parsed = parse_amount(&text).unwrap();
                prop_assert_eq!(parsed.to_string(), text);
            }
        }
    }
}
