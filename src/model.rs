//! Data types: sessions, observations, prompts, and the shapes derived
//! from them (search results, timelines, snapshots, stats).
//!
//! Optional attributes are `Option<T>`; a `None` means "absent", and
//! serialization skips absent fields so exports stay compact and
//! line-diffable.
//!
//! # Timestamps
//!
//! All stored timestamps use the canonical form `YYYY-MM-DD HH:MM:SS` in
//! UTC, so lexicographic ordering equals chronological ordering. The sync
//! manifest is the one place RFC3339 appears; [`ts_to_rfc3339`] and
//! [`rfc3339_to_ts`] convert at that boundary.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Canonical timestamp format stored in the database and export JSON.
pub const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current time in the canonical format.
#[must_use]
pub fn now_ts() -> String {
    Utc::now().format(TS_FORMAT).to_string()
}

/// Convert a canonical timestamp to RFC3339 UTC (manifest form).
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the input is not in canonical form.
pub fn ts_to_rfc3339(ts: &str) -> Result<String> {
    let naive = NaiveDateTime::parse_from_str(ts, TS_FORMAT)
        .map_err(|e| Error::invalid_input(format!("bad timestamp {ts:?}: {e}")))?;
    Ok(Utc
        .from_utc_datetime(&naive)
        .to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Convert an RFC3339 timestamp (manifest form) to canonical form.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the input is not valid RFC3339.
pub fn rfc3339_to_ts(ts: &str) -> Result<String> {
    let parsed = DateTime::parse_from_rfc3339(ts)
        .map_err(|e| Error::invalid_input(format!("bad RFC3339 timestamp {ts:?}: {e}")))?;
    Ok(parsed.with_timezone(&Utc).format(TS_FORMAT).to_string())
}

/// Visibility scope of an observation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Scoped to one project (the default).
    #[default]
    Project,
    /// Follows the developer across projects.
    Personal,
}

impl Scope {
    /// Stored string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Personal => "personal",
        }
    }

    /// Parse the stored string form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for anything but `project` or
    /// `personal`.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "project" => Ok(Self::Project),
            "personal" => Ok(Self::Personal),
            other => Err(Error::invalid_input(format!(
                "invalid scope {other:?} (expected \"project\" or \"personal\")"
            ))),
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One agent run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub project: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    pub started_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// A single memory record: a learning, decision, pattern, or discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: i64,
    pub session_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    pub revision_count: i64,
    pub duplicate_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// A raw user utterance captured during a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub id: i64,
    pub session_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    pub created_at: String,
}

/// Session row enriched with counts, as returned by recency queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    #[serde(flatten)]
    pub session: Session,
    pub observation_count: i64,
    pub has_summary: bool,
}

/// One FTS-ranked search hit.
///
/// `rank` is the engine's relevance score; smaller is better.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    #[serde(flatten)]
    pub observation: Observation,
    pub rank: f64,
}

/// Observations around a focus point, reconstructed within one session.
#[derive(Debug, Clone, Serialize)]
pub struct Timeline {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,
    pub before: Vec<Observation>,
    pub focus: Observation,
    pub after: Vec<Observation>,
    pub total_in_range: usize,
}

/// Whole-database snapshot used by export/import and the sync layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub exported_at: String,
    #[serde(default)]
    pub sessions: Vec<Session>,
    #[serde(default)]
    pub observations: Vec<Observation>,
    #[serde(default)]
    pub prompts: Vec<Prompt>,
}

/// Snapshot format version written by `Store::export`.
pub const SNAPSHOT_VERSION: u32 = 1;

impl Snapshot {
    /// True when the snapshot carries no rows at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty() && self.observations.is_empty() && self.prompts.is_empty()
    }
}

/// Counts reported by `Store::import`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportCounts {
    pub sessions_imported: usize,
    pub observations_imported: usize,
    pub prompts_imported: usize,
}

/// Store-wide statistics backing `mem_stats`, `GET /stats`, and the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub total_sessions: i64,
    pub active_sessions: i64,
    pub observation_count: i64,
    pub prompt_count: i64,
    pub projects: Vec<String>,
    pub db_size_bytes: u64,
}

/// Inputs for creating (or topic-upserting) an observation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddObservation {
    pub session_id: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub scope: Option<Scope>,
    #[serde(default)]
    pub topic_key: Option<String>,
    #[serde(default)]
    pub tool_name: Option<String>,
}

/// Partial update of an observation. Absent fields are untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateObservation {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub scope: Option<Scope>,
    #[serde(default)]
    pub topic_key: Option<String>,
}

impl UpdateObservation {
    /// True when no field is supplied at all.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.kind.is_none()
            && self.title.is_none()
            && self.content.is_none()
            && self.project.is_none()
            && self.scope.is_none()
            && self.topic_key.is_none()
    }
}

/// Inputs for capturing a prompt.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddPrompt {
    pub session_id: String,
    pub content: String,
    #[serde(default)]
    pub project: Option<String>,
}

/// Search filters and limits.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub kind: Option<String>,
    pub project: Option<String>,
    pub scope: Option<Scope>,
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ts_round_trip() {
        let ts = "2026-03-01 12:30:45";
        let rfc = ts_to_rfc3339(ts).unwrap();
        assert_eq!(rfc, "2026-03-01T12:30:45Z");
        assert_eq!(rfc3339_to_ts(&rfc).unwrap(), ts);
    }

    #[test]
    fn test_rfc3339_offset_normalized_to_utc() {
        let ts = rfc3339_to_ts("2026-03-01T14:30:45+02:00").unwrap();
        assert_eq!(ts, "2026-03-01 12:30:45");
    }

    #[test]
    fn test_bad_timestamp_rejected() {
        assert!(ts_to_rfc3339("not a date").is_err());
        assert!(rfc3339_to_ts("2026-03-01 12:30:45").is_err());
    }

    #[test]
    fn test_scope_parse() {
        assert_eq!(Scope::parse("project").unwrap(), Scope::Project);
        assert_eq!(Scope::parse("personal").unwrap(), Scope::Personal);
        assert!(Scope::parse("global").is_err());
    }

    #[test]
    fn test_observation_type_field_name() {
        let obs = Observation {
            id: 1,
            session_id: "s1".into(),
            kind: "decision".into(),
            title: "t".into(),
            content: "c".into(),
            project: None,
            scope: Scope::Project,
            topic_key: None,
            tool_name: None,
            revision_count: 1,
            duplicate_count: 1,
            created_at: "2026-01-01 00:00:00".into(),
            updated_at: "2026-01-01 00:00:00".into(),
        };
        let json = serde_json::to_value(&obs).unwrap();
        assert_eq!(json["type"], "decision");
        assert!(json.get("kind").is_none());
        assert!(json.get("topic_key").is_none());
    }

    #[test]
    fn test_snapshot_is_empty() {
        let mut snap = Snapshot::default();
        assert!(snap.is_empty());
        snap.sessions.push(Session {
            id: "s1".into(),
            project: "p".into(),
            directory: None,
            started_at: now_ts(),
            ended_at: None,
            summary: None,
        });
        assert!(!snap.is_empty());
    }
}
