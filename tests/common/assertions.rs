//! Custom assertions for PDF redaction testing.
//!
//! Provides domain-specific assertions that make tests more readable
//! and provide better error messages.

#![allow(dead_code)]

use super::pdf_helpers::{page_text, reparse_content};

/// Asserts that `pattern` no longer appears in the text drawn on `page`.
///
/// # Panics
/// Panics if the pattern is still found in the page text.
pub fn assert_redacted(pdf: &[u8], page: usize, pattern: &str) {
    let text = page_text(pdf, page);
    assert!(
        !text.contains(pattern),
        "Pattern '{}' should be redacted but was found on page {}.\nExtracted text: {:?}",
        pattern,
        page,
        text
    );
}

/// Asserts that `pattern` is still drawn on `page`.
///
/// # Panics
/// Panics if the pattern is not found in the page text.
pub fn assert_preserved(pdf: &[u8], page: usize, pattern: &str) {
    let text = page_text(pdf, page);
    assert!(
        text.contains(pattern),
        "Pattern '{}' should be preserved but was not found on page {}.\nExtracted text: {:?}",
        pattern,
        page,
        text
    );
}

/// Asserts that `output` is `original` followed by one incremental update.
///
/// # Panics
/// Panics if the original bytes were altered or no update was appended.
pub fn assert_incremental(original: &[u8], output: &[u8]) {
    assert!(
        output.len() > original.len(),
        "Output ({} bytes) should extend the original ({} bytes)",
        output.len(),
        original.len()
    );
    assert!(
        output.starts_with(original),
        "Output should begin with the unmodified original bytes"
    );
    let tail = &output[original.len()..];
    assert!(
        contains_bytes(tail, b"\nxref\n") || tail.starts_with(b"xref\n"),
        "Incremental update should carry its own cross-reference section"
    );
    assert!(
        output.ends_with(b"%%EOF\n"),
        "Output should end with an end-of-file marker"
    );
}

/// Asserts that the decoded content of `page` contains `needle`.
///
/// # Panics
/// Panics if the needle is absent.
pub fn assert_content_contains(pdf: &[u8], page: usize, needle: &str) {
    let content = reparse_content(pdf, page);
    assert!(
        contains_bytes(&content, needle.as_bytes()),
        "Decoded content of page {} should contain {:?}.\nContent: {}",
        page,
        needle,
        String::from_utf8_lossy(&content)
    );
}

/// Asserts that `actual` is within `tolerance` of `expected`.
pub fn assert_close(actual: f64, expected: f64, tolerance: f64) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "Expected {} within {} of {}",
        actual,
        tolerance,
        expected
    );
}

pub fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}
