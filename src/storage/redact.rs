//! Privacy redaction for write paths.
//!
//! Content between `<private>` and `</private>` tags is replaced with
//! `[REDACTED]` before anything is stored or indexed, so secrets never
//! enter the database or the FTS index. Tags are case-sensitive,
//! non-nested, longest-match-per-pair.

/// Opening tag.
const OPEN: &str = "<private>";
/// Closing tag.
const CLOSE: &str = "</private>";
/// Replacement for each redacted span.
const PLACEHOLDER: &str = "[REDACTED]";

/// Replace every `<private>…</private>` span with `[REDACTED]`.
///
/// An opening tag with no closing tag is left verbatim (nothing after it
/// is removed), so a stray tag cannot silently swallow the rest of a
/// document.
#[must_use]
pub fn redact_private(input: &str) -> String {
    if !input.contains(OPEN) {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];
        match after_open.find(CLOSE) {
            Some(end) => {
                out.push_str(&rest[..start]);
                out.push_str(PLACEHOLDER);
                rest = &after_open[end + CLOSE.len()..];
            }
            None => break,
        }
    }

    out.push_str(rest);
    out
}
