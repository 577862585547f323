//! Normalisation of text pulled out of documents

use regex::Regex;
use std::sync::LazyLock;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static SPACE_BEFORE_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+([,.!?;:])").expect("valid regex"));

/// Collapse whitespace, drop control characters, straighten curly quotes and
/// remove stray spaces before punctuation
pub fn clean_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let without_controls: String = text
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            other => other,
        })
        .collect();

    let collapsed = WHITESPACE.replace_all(&without_controls, " ");
    let tightened = SPACE_BEFORE_PUNCT.replace_all(&collapsed, "$1");

    tightened.trim().to_string()
}

/// [`clean_text`] plus fixes for glyphs Tesseract commonly confuses
pub fn clean_ocr_text(text: &str) -> String {
    let fixed = text.replace("l|", "ll").replace("|l", "ll").replace('|', "I");
    clean_text(&fixed)
}

/// Characters that are not whitespace
pub fn visible_chars(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}
