//! FTS5 query sanitizer.
//!
//! FTS5 treats `-`, `"`, parentheses, and operator words specially, so raw
//! user input can raise syntax errors. The sanitizer turns any string into
//! an expression whose failure modes are bounded: worst case it matches
//! zero rows, never errors.

/// Sentinel expression that matches no rows without raising a syntax
/// error. `"` is a phrase of zero tokens in FTS5.
pub const MATCH_NOTHING: &str = "\"\"";

/// Sanitize a free-form query into a safe FTS5 MATCH expression.
///
/// Lowercases, splits on whitespace, keeps bare alphanumeric/underscore
/// tokens as-is, wraps everything else in double quotes (doubling interior
/// quotes), and joins with `AND`. All-punctuation input collapses to
/// [`MATCH_NOTHING`].
#[must_use]
pub fn sanitize_query(query: &str) -> String {
    let tokens: Vec<String> = query
        .to_lowercase()
        .split_whitespace()
        .filter_map(sanitize_token)
        .collect();

    if tokens.is_empty() {
        return MATCH_NOTHING.to_string();
    }

    tokens.join(" AND ")
}

/// Sanitize one whitespace-delimited token, or drop it entirely.
fn sanitize_token(token: &str) -> Option<String> {
    if token.is_empty() {
        return None;
    }

    if token.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Some(token.to_string());
    }

    // Quoted phrase: strip nothing, just escape interior quotes. A token
    // that quotes down to only punctuation still matches nothing on its
    // own, which is the bounded failure we want.
    let escaped = token.replace('"', "\"\"");
    Some(format!("\"{escaped}\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_words_pass_through() {
        assert_eq!(sanitize_query("fix auth bug"), "fix AND auth AND bug");
    }

    #[test]
    fn test_lowercased() {
        assert_eq!(sanitize_query("Fix AUTH"), "fix AND auth");
    }

    #[test]
    fn test_punctuation_is_quoted() {
        assert_eq!(sanitize_query("bug!!"), "\"bug!!\"");
        assert_eq!(sanitize_query("c++ tips"), "\"c++\" AND tips");
    }

    #[test]
    fn test_interior_quotes_doubled() {
        assert_eq!(sanitize_query("say\"hi\""), "\"say\"\"hi\"\"\"");
    }

    #[test]
    fn test_operators_are_neutralized() {
        // FTS5 operators survive only as quoted literals.
        assert_eq!(sanitize_query("NOT (a)"), "not AND \"(a)\"");
        assert_eq!(sanitize_query("-exclude"), "\"-exclude\"");
    }

    #[test]
    fn test_empty_and_whitespace_input() {
        assert_eq!(sanitize_query(""), MATCH_NOTHING);
        assert_eq!(sanitize_query("   \t\n"), MATCH_NOTHING);
    }

    #[test]
    fn test_underscores_kept_bare() {
        assert_eq!(sanitize_query("topic_key"), "topic_key");
    }

    #[test]
    fn test_never_panics_on_arbitrary_input() {
        for s in ["\"\"\"", "((((", "a AND OR NOT b", "日本語 text", "* ^ :"] {
            let out = sanitize_query(s);
            assert!(!out.is_empty());
        }
    }
}
