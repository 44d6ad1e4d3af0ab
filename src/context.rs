//! Context block rendering.
//!
//! Frontends inject a deterministic text block at session start (or after
//! compaction) so an agent regains its memory. The block is a pure
//! function of read-only store queries: same store state, same string.

use crate::error::Result;
use crate::model::Scope;
use crate::storage::Store;

/// Sessions shown in the block.
const SESSION_COUNT: usize = 5;
/// Observations shown in the block.
const OBSERVATION_COUNT: usize = 10;
/// Session summaries are trimmed to this many characters.
const SUMMARY_LEN: usize = 100;
/// Observation content is trimmed to this many characters.
const CONTENT_LEN: usize = 300;

/// Render the memory context block.
///
/// Starts with the literal heading `## Memory from Previous Sessions`,
/// lists the last five sessions, then the last ten live observations
/// under `Recent Observations`. Purely a rendering function: no
/// mutations, no hidden state.
///
/// # Errors
///
/// Returns an error if an underlying query fails.
pub fn format_context(
    store: &Store,
    project: Option<&str>,
    scope: Option<Scope>,
) -> Result<String> {
    let sessions = store.recent_sessions(project, SESSION_COUNT)?;
    let observations = store.recent_observations(project, scope, OBSERVATION_COUNT)?;

    let mut out = String::from("## Memory from Previous Sessions\n");

    if sessions.is_empty() {
        out.push_str("\n(no sessions recorded)\n");
    } else {
        for s in &sessions {
            out.push('\n');
            out.push_str(&format!(
                "- {} (started {}, {} observation{})\n",
                s.session.id,
                s.session.started_at,
                s.observation_count,
                plural(s.observation_count)
            ));
            if let Some(summary) = &s.session.summary {
                if !summary.is_empty() {
                    out.push_str(&format!("  {}\n", truncate(summary, SUMMARY_LEN)));
                }
            }
        }
    }

    out.push_str("\n### Recent Observations\n");
    if observations.is_empty() {
        out.push_str("\n(none)\n");
    } else {
        for o in &observations {
            out.push('\n');
            let project_tag = o
                .project
                .as_deref()
                .map(|p| format!(" [{p}]"))
                .unwrap_or_default();
            out.push_str(&format!(
                "- #{} {}: {} ({}){project_tag}\n",
                o.id, o.kind, o.title, o.created_at
            ));
            out.push_str(&format!("  {}\n", truncate(&o.content, CONTENT_LEN)));
        }
    }

    Ok(out)
}

/// Trim to `max` characters on a char boundary, appending an ellipsis
/// when anything was cut.
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max).collect();
    format!("{}…", cut.trim_end())
}

fn plural(n: i64) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}
