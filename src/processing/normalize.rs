//! Text normalization applied to every extracted document before tokenization.
//!
//! Normalization strips characters that are neither printable nor whitespace, folds every
//! whitespace run (newlines included) into a single space, and deletes recurring boilerplate:
//! copyright footers, "... User Guide" banners, "Table of Contents" markers and
//! "Page N of M" footers. Deleting a pattern can leave two spaces side by side or expose a new
//! match, so removal and collapsing repeat until the text stops changing. That makes the
//! function idempotent.

use regex::Regex;
use std::sync::LazyLock;

static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| compile(r"\s+"));

/// Ordered boilerplate patterns, all case-insensitive.
static BOILERPLATE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)Copyright © \d{4}.*?Amazon\.com.*?All rights reserved\.",
        r"(?i)AWS.*?User Guide",
        r"(?i)Table of Contents",
        r"(?i)Page \d+ of \d+",
    ]
    .into_iter()
    .map(compile)
    .collect()
});

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("built-in normalization pattern is valid")
}

/// Normalize raw extracted text. Pure; never fails.
pub fn normalize(raw: &str) -> String {
    let printable: String = raw.chars().filter(|c| is_kept(*c)).collect();
    let mut text = collapse_whitespace(&printable);

    loop {
        let mut stripped = text.clone();
        for pattern in BOILERPLATE.iter() {
            stripped = pattern.replace_all(&stripped, "").into_owned();
        }
        let next = collapse_whitespace(&stripped);
        if next == text {
            return text;
        }
        text = next;
    }
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_RUN.replace_all(text, " ").trim().to_string()
}

/// Whitespace always survives; otherwise drop control, format and private-use characters.
fn is_kept(c: char) -> bool {
    if c.is_whitespace() {
        return true;
    }
    if c.is_control() {
        return false;
    }
    !matches!(
        c,
        '\u{00AD}'
            | '\u{200B}'..='\u{200F}'
            | '\u{202A}'..='\u{202E}'
            | '\u{2060}'..='\u{2064}'
            | '\u{FEFF}'
            | '\u{FFF9}'..='\u{FFFB}'
            | '\u{E000}'..='\u{F8FF}'
    )
}
