//! Topic-key suggestion and normalization.
//!
//! A topic key is a stable `family/slug` identifier under which an
//! evolving memory upserts. The family comes from the observation type,
//! the slug from the title (or the leading words of the content when the
//! title is empty).

/// Number of content words used for the slug when the title is empty.
const SLUG_CONTENT_WORDS: usize = 12;

/// Signature for an injectable topic-key suggester.
///
/// The store configuration carries one of these; production wiring passes
/// [`suggest_topic_key`], tests may substitute their own.
pub type TopicSuggester = fn(kind: &str, title: &str, content: &str) -> String;

/// Suggest a stable topic key for an observation.
///
/// Returns `family/slug`, or the empty string when neither title nor
/// content yields any slug characters. Callers must treat an empty result
/// as "no suggestion".
#[must_use]
pub fn suggest_topic_key(kind: &str, title: &str, content: &str) -> String {
    let source = if title.trim().is_empty() {
        content
            .split_whitespace()
            .take(SLUG_CONTENT_WORDS)
            .collect::<Vec<_>>()
            .join(" ")
    } else {
        title.to_string()
    };

    let slug = slugify(&source);
    if slug.is_empty() {
        return String::new();
    }

    format!("{}/{slug}", family_for(kind))
}

/// Canonicalize a caller-supplied topic key.
///
/// Lowercases, collapses non-alphanumerics within each `/`-separated part
/// to `-`, and drops empty parts. An input with no usable characters
/// normalizes to the empty string (meaning "no key").
#[must_use]
pub fn normalize_topic_key(key: &str) -> String {
    let parts: Vec<String> = key
        .split('/')
        .map(slugify)
        .filter(|p| !p.is_empty())
        .collect();
    parts.join("/")
}

/// Map an observation type to its key family.
fn family_for(kind: &str) -> &'static str {
    match kind {
        "decision" => "decision",
        "bugfix" => "bugfix",
        "architecture" => "architecture",
        "pattern" => "pattern",
        "discovery" => "discovery",
        _ => "note",
    }
}

/// Lowercase ASCII slug: non-alphanumerics collapse to single `-`,
/// trimmed at both ends.
fn slugify(s: &str) -> String {
    let mut slug = String::with_capacity(s.len());
    let mut pending_dash = false;

    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}
