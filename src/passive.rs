//! Passive learning capture.
//!
//! Agent transcripts often end with a "Key Learnings" section. This module
//! scans a transcript for such a section, extracts its numbered or
//! bulleted items, and feeds each one back into the store as a `learning`
//! observation.
//!
//! The grammar is deliberately forgiving and encoded as a small state
//! machine: *scanning* until a recognized heading, *in-section* between
//! items, *in-item* while a list item (and its continuation lines) is
//! being collected. The section ends at the next heading, at prose
//! following the list, or at end of input.

use crate::error::Result;
use crate::model::AddObservation;
use crate::storage::{AddOutcome, Store};

/// Default `tool_name` recorded on captured learnings.
pub const DEFAULT_SOURCE: &str = "mcp-passive";

/// Observation type assigned to captured learnings.
pub const LEARNING_KIND: &str = "learning";

/// Items shorter than this (after trimming) are noise, not learnings.
const MIN_ITEM_LEN: usize = 8;

/// Maximum characters of an item promoted into the observation title.
const TITLE_LEN: usize = 80;

/// Headings that open a learnings section (matched case-insensitively,
/// trailing colon tolerated).
const HEADINGS: &[&str] = &["## key learnings", "## aprendizajes clave", "### learnings"];

/// Counts reported by a capture run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct PassiveOutcome {
    /// Items found in the transcript.
    pub extracted: usize,
    /// Items the store accepted (duplicates coalesce and do not count).
    pub saved: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    Scanning,
    InSection { seen_items: bool },
    InItem,
}

/// Extract learnings items from a raw transcript.
///
/// Returns the trimmed items, in order, with short fragments dropped.
#[must_use]
pub fn extract_learnings(content: &str) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut state = State::Scanning;

    for line in content.lines() {
        let trimmed = line.trim();

        match state {
            State::Scanning => {
                if is_heading_match(trimmed) {
                    state = State::InSection { seen_items: false };
                }
            }
            State::InSection { seen_items } => {
                if trimmed.is_empty() {
                    continue;
                }
                if trimmed.starts_with('#') {
                    break;
                }
                if let Some(text) = item_text(trimmed) {
                    current = text.to_string();
                    state = State::InItem;
                } else if seen_items {
                    // Prose after the list: the section is over.
                    break;
                }
                // Prose between heading and list is ignored.
            }
            State::InItem => {
                if trimmed.is_empty() {
                    flush(&mut items, &mut current);
                    state = State::InSection { seen_items: true };
                } else if trimmed.starts_with('#') {
                    flush(&mut items, &mut current);
                    break;
                } else if let Some(text) = item_text(trimmed) {
                    flush(&mut items, &mut current);
                    current = text.to_string();
                } else {
                    // Continuation of a wrapped item.
                    current.push(' ');
                    current.push_str(trimmed);
                }
            }
        }
    }
    flush(&mut items, &mut current);

    items
}

fn flush(items: &mut Vec<String>, current: &mut String) {
    let item = std::mem::take(current);
    let item = item.trim().to_string();
    if item.len() >= MIN_ITEM_LEN {
        items.push(item);
    }
}

/// Does this line open a learnings section?
fn is_heading_match(line: &str) -> bool {
    let lowered = line.to_lowercase();
    let lowered = lowered.trim_end_matches(':').trim_end();
    HEADINGS.contains(&lowered)
}

/// Strip a list-item marker, returning the item text, or `None` for
/// non-item lines. Recognizes `1. …` / `2) …` and `- …` / `* …`.
fn item_text(line: &str) -> Option<&str> {
    if let Some(rest) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
        return Some(rest.trim_start());
    }

    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(text) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            if text.starts_with(' ') {
                return Some(text.trim_start());
            }
        }
    }

    None
}

/// Extract learnings from `content` and store each as an observation.
///
/// Returns `{extracted: 0, saved: 0}` without touching the store when no
/// section is recognized. All inserts run in one transaction; any failure
/// rolls the batch back.
///
/// # Errors
///
/// `NotFound` if the session does not exist (and at least one item was
/// extracted), or any store error from the batch write.
pub fn capture(
    store: &mut Store,
    session_id: &str,
    content: &str,
    project: Option<&str>,
    source: Option<&str>,
) -> Result<PassiveOutcome> {
    let items = extract_learnings(content);
    if items.is_empty() {
        return Ok(PassiveOutcome::default());
    }

    let source = source.unwrap_or(DEFAULT_SOURCE);
    let batch: Vec<AddObservation> = items
        .iter()
        .map(|item| AddObservation {
            session_id: session_id.to_string(),
            kind: Some(LEARNING_KIND.to_string()),
            title: item.chars().take(TITLE_LEN).collect(),
            content: item.clone(),
            project: project.map(ToString::to_string),
            scope: None,
            topic_key: None,
            tool_name: Some(source.to_string()),
        })
        .collect();

    let results = store.add_observations(&batch)?;
    let saved = results
        .iter()
        .filter(|r| r.outcome != AddOutcome::Coalesced)
        .count();

    Ok(PassiveOutcome {
        extracted: items.len(),
        saved,
    })
}
