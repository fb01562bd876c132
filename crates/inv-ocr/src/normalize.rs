// SPDX-License-Identifier: MIT OR Apache-2.0
//! Token text normalization.
//!
//! Applied once per token before anything downstream sees the text.
//! The function is idempotent: `normalize_text(normalize_text(t)) ==
//! normalize_text(t)`.

/// Map Arabic-Indic and Persian digits to ASCII, fold Arabic numeric
/// punctuation, collapse whitespace, and strip spaces before closing
/// punctuation.
#[must_use]
pub fn normalize_text(text: &str) -> String {
    let mapped: String = text.chars().map(map_char).collect();

    // Collapse runs of whitespace into single spaces and trim the ends.
    let mut collapsed = String::with_capacity(mapped.len());
    let mut last_was_space = true;
    for c in mapped.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                collapsed.push(' ');
                last_was_space = true;
            }
        } else {
            collapsed.push(c);
            last_was_space = false;
        }
    }
    while collapsed.ends_with(' ') {
        collapsed.pop();
    }

    // Remove the space a collapse may have left before punctuation.
    let mut out = String::with_capacity(collapsed.len());
    for c in collapsed.chars() {
        if matches!(c, '.' | ',' | ':' | ';' | '!' | '?') && out.ends_with(' ') {
            out.pop();
        }
        out.push(c);
    }
    out
}

fn map_char(c: char) -> char {
    match c {
        // Arabic-Indic digits.
        '٠' => '0',
        '١' => '1',
        '٢' => '2',
        '٣' => '3',
        '٤' => '4',
        '٥' => '5',
        '٦' => '6',
        '٧' => '7',
        '٨' => '8',
        '٩' => '9',
        // Persian digits.
        '۰' => '0',
        '۱' => '1',
        '۲' => '2',
        '۳' => '3',
        '۴' => '4',
        '۵' => '5',
        '۶' => '6',
        '۷' => '7',
        '۸' => '8',
        '۹' => '9',
        // Arabic numeric punctuation.
        '٫' => '.',
        '٬' => ',',
        '،' => ',',
        other => other,
    }
}
