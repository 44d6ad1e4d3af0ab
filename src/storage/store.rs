//! SQLite store: the single source of truth for durable state.
//!
//! The store owns the only database handle. Mutations run inside
//! IMMEDIATE transactions so writers are serialized; readers use plain
//! queries and may proceed concurrently from other connections' point of
//! view. No operation is retried internally.
//!
//! Topic upsert, duplicate coalescing, soft/hard delete, FTS search,
//! timeline reconstruction, stats, and snapshot export/import all live
//! here; frontends are thin wrappers over these methods.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

use crate::error::{Error, Result};
use crate::model::{
    now_ts, AddObservation, AddPrompt, ImportCounts, Observation, Prompt, Scope, SearchOptions,
    SearchResult, Session, SessionSummary, Snapshot, Stats, Timeline, UpdateObservation,
    SNAPSHOT_VERSION,
};
use crate::storage::redact::redact_private;
use crate::storage::sanitize::sanitize_query;
use crate::storage::schema::apply_schema;
use crate::storage::topic::{normalize_topic_key, suggest_topic_key, TopicSuggester};

/// Hard cap for recency queries.
pub const RECENT_LIMIT_MAX: usize = 200;
/// Default search result count.
pub const SEARCH_LIMIT_DEFAULT: usize = 10;
/// Hard cap for search result count.
pub const SEARCH_LIMIT_MAX: usize = 20;
/// Hard cap for timeline before/after windows.
pub const TIMELINE_LIMIT_MAX: usize = 50;

/// Observation type assigned when the caller supplies none.
pub const DEFAULT_KIND: &str = "note";

/// Observation columns selected for model rows, in mapping order.
const OBS_COLS: &str = "o.id, o.session_id, o.type, o.title, o.content, o.project, o.scope, \
                        o.topic_key, o.tool_name, o.revision_count, o.duplicate_count, \
                        o.created_at, o.updated_at";

/// Store configuration: explicit dependency-injected seams.
///
/// Production wiring uses the defaults; tests substitute their own
/// functions instead of patching globals.
#[derive(Clone)]
pub struct StoreConfig {
    /// Suggests a topic key from (type, title, content).
    pub topic_suggester: TopicSuggester,
    /// How long to wait on another writer before giving up.
    pub busy_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            topic_suggester: suggest_topic_key,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("busy_timeout", &self.busy_timeout)
            .finish_non_exhaustive()
    }
}

/// How `add_observation` resolved the write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// A new row was inserted.
    Inserted,
    /// An existing row with the same topic key was updated in place.
    Upserted,
    /// An identical (session, title, content) row absorbed the write.
    Coalesced,
}

/// Result of `add_observation`: the row id plus how it was resolved.
#[derive(Debug, Clone, Copy)]
pub struct AddResult {
    pub id: i64,
    pub outcome: AddOutcome,
}

/// SQLite-backed store.
#[derive(Debug)]
pub struct Store {
    conn: Connection,
    config: StoreConfig,
}

impl Store {
    /// Open (creating if necessary) the database at `path`.
    ///
    /// The parent directory is created if missing, foreign keys are
    /// enforced, journaling is WAL, and the idempotent schema bootstrap
    /// runs before the store is handed out.
    ///
    /// # Errors
    ///
    /// Any connection or DDL failure is fatal; the store refuses to open.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_config(path, StoreConfig::default())
    }

    /// Open with an explicit configuration.
    ///
    /// # Errors
    ///
    /// See [`Store::open`].
    pub fn open_with_config(path: &Path, config: StoreConfig) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(config.busy_timeout)?;
        apply_schema(&conn)?;
        Ok(Self { conn, config })
    }

    /// Open an in-memory database (tests).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self {
            conn,
            config: StoreConfig::default(),
        })
    }

    /// Suggest a topic key using the configured suggester.
    #[must_use]
    pub fn suggest_topic(&self, kind: &str, title: &str, content: &str) -> String {
        (self.config.topic_suggester)(kind, title, content)
    }

    /// Run a mutation inside an IMMEDIATE transaction.
    ///
    /// The write lock is taken up front; on error the transaction rolls
    /// back and no partial state is visible.
    fn mutate<F, R>(&mut self, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    // ==================
    // Sessions
    // ==================

    /// Create a session, idempotently.
    ///
    /// Re-creating an existing id succeeds silently only when project and
    /// directory match; otherwise the call fails with a conflict.
    ///
    /// # Errors
    ///
    /// `Conflict` on id reuse with different metadata; `InvalidInput` on
    /// an empty id or project.
    pub fn create_session(
        &mut self,
        id: &str,
        project: &str,
        directory: Option<&str>,
    ) -> Result<()> {
        if id.trim().is_empty() {
            return Err(Error::invalid_input("session id must not be empty"));
        }
        if project.trim().is_empty() {
            return Err(Error::invalid_input("project must not be empty"));
        }

        self.mutate(|tx| {
            let existing: Option<(String, Option<String>)> = tx
                .query_row(
                    "SELECT project, directory FROM sessions WHERE id = ?1",
                    [id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            match existing {
                Some((ref p, ref d)) if p.as_str() == project && d.as_deref() == directory => Ok(()),
                Some(_) => Err(Error::SessionConflict { id: id.to_string() }),
                None => {
                    tx.execute(
                        "INSERT INTO sessions (id, project, directory, started_at)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![id, project, directory, now_ts()],
                    )?;
                    Ok(())
                }
            }
        })
    }

    /// Close a session, setting `ended_at` and the summary.
    ///
    /// Idempotent: re-ending overwrites the summary and refreshes
    /// `ended_at`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the session does not exist.
    pub fn end_session(&mut self, id: &str, summary: &str) -> Result<Session> {
        self.mutate(|tx| {
            let changed = tx.execute(
                "UPDATE sessions SET ended_at = ?1, summary = ?2 WHERE id = ?3",
                params![now_ts(), summary, id],
            )?;
            if changed == 0 {
                return Err(Error::SessionNotFound { id: id.to_string() });
            }
            session_by_id(tx, id)
        })
    }

    /// Fetch one session.
    ///
    /// # Errors
    ///
    /// `NotFound` if missing.
    pub fn get_session(&self, id: &str) -> Result<Session> {
        session_by_id(&self.conn, id)
    }

    /// Recent sessions, newest first, with observation counts.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn recent_sessions(
        &self,
        project: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SessionSummary>> {
        let limit = clamp_limit(limit, RECENT_LIMIT_MAX);
        let (filter, params): (&str, Vec<String>) = match project {
            Some(p) => ("WHERE s.project = ?1", vec![p.to_string()]),
            None => ("", Vec::new()),
        };

        let sql = format!(
            "SELECT s.id, s.project, s.directory, s.started_at, s.ended_at, s.summary,
                    COUNT(o.id) AS observation_count
             FROM sessions s
             LEFT JOIN observations o ON o.session_id = s.id AND o.deleted_at IS NULL
             {filter}
             GROUP BY s.id
             ORDER BY s.started_at DESC, s.id DESC
             LIMIT {limit}"
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params), |row| {
            let summary: Option<String> = row.get(5)?;
            Ok(SessionSummary {
                session: Session {
                    id: row.get(0)?,
                    project: row.get(1)?,
                    directory: row.get(2)?,
                    started_at: row.get(3)?,
                    ended_at: row.get(4)?,
                    summary: summary.clone(),
                },
                observation_count: row.get(6)?,
                has_summary: summary.map_or(false, |s| !s.is_empty()),
            })
        })?;

        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    // ==================
    // Observations
    // ==================

    /// Create an observation, with topic upsert and duplicate coalescing.
    ///
    /// Resolution order inside one write transaction:
    /// 1. A live row with the same `(project, scope, topic_key)` absorbs
    ///    the write as an in-place revision.
    /// 2. A live row with the same `(session_id, title, content)` absorbs
    ///    it as a counted duplicate.
    /// 3. Otherwise a new row is inserted.
    ///
    /// # Errors
    ///
    /// `InvalidInput` on empty title/content, `NotFound` if the session
    /// does not exist.
    pub fn add_observation(&mut self, params: &AddObservation) -> Result<AddResult> {
        let prepared = prepare_add(params)?;
        self.mutate(|tx| add_observation_tx(tx, &prepared))
    }

    /// Create many observations in one transaction.
    ///
    /// Used by passive capture: failure of any single insert rolls the
    /// whole batch back.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Store::add_observation`]; the first failure
    /// aborts the batch.
    pub fn add_observations(&mut self, batch: &[AddObservation]) -> Result<Vec<AddResult>> {
        let prepared: Vec<PreparedAdd> = batch.iter().map(prepare_add).collect::<Result<_>>()?;
        self.mutate(|tx| {
            prepared
                .iter()
                .map(|p| add_observation_tx(tx, p))
                .collect::<Result<Vec<_>>>()
        })
    }

    /// Apply a partial update to a live observation.
    ///
    /// Unspecified fields are untouched; `updated_at` refreshes and
    /// `revision_count` increments. Changing the topic triple onto another
    /// live row is a conflict.
    ///
    /// # Errors
    ///
    /// `NotFound` if the row is absent or soft-deleted; `Conflict` on a
    /// topic-key collision.
    pub fn update_observation(&mut self, id: i64, update: &UpdateObservation) -> Result<Observation> {
        self.mutate(|tx| {
            let current = observation_by_id(tx, id)?;

            let kind = update.kind.clone().unwrap_or(current.kind);
            let title = update
                .title
                .as_deref()
                .map_or(current.title, |t| redact_private(t));
            let content = update
                .content
                .as_deref()
                .map_or(current.content, |c| redact_private(c));
            let project = match &update.project {
                Some(p) => p.clone(),
                None => current.project.clone().unwrap_or_default(),
            };
            let scope = update.scope.unwrap_or(current.scope);
            let topic_key = match &update.topic_key {
                Some(k) => normalize_topic_key(k),
                None => current.topic_key.clone().unwrap_or_default(),
            };

            if title.trim().is_empty() {
                return Err(Error::invalid_input("title must not be empty"));
            }
            if content.trim().is_empty() {
                return Err(Error::invalid_input("content must not be empty"));
            }

            if !topic_key.is_empty() {
                let clash: Option<i64> = tx
                    .query_row(
                        "SELECT id FROM observations
                         WHERE project = ?1 AND scope = ?2 AND topic_key = ?3
                           AND deleted_at IS NULL AND id != ?4",
                        params![project, scope.as_str(), topic_key, id],
                        |row| row.get(0),
                    )
                    .optional()?;
                if clash.is_some() {
                    return Err(Error::TopicKeyConflict {
                        project,
                        scope: scope.as_str().to_string(),
                        topic_key,
                    });
                }
            }

            tx.execute(
                "UPDATE observations
                 SET type = ?1, title = ?2, content = ?3, project = ?4, scope = ?5,
                     topic_key = ?6, revision_count = revision_count + 1, updated_at = ?7
                 WHERE id = ?8",
                params![kind, title, content, project, scope.as_str(), topic_key, now_ts(), id],
            )?;

            observation_by_id(tx, id)
        })
    }

    /// Delete an observation.
    ///
    /// Soft by default: sets `deleted_at` and drops the FTS entry while
    /// leaving the row in place. Hard removes the row entirely. Deleting
    /// a missing (or, for soft deletes, already-deleted) id reports
    /// `NotFound`, consistently, across every frontend.
    ///
    /// # Errors
    ///
    /// `NotFound` as described above.
    pub fn delete_observation(&mut self, id: i64, hard: bool) -> Result<()> {
        self.mutate(|tx| {
            let changed = if hard {
                tx.execute("DELETE FROM observations WHERE id = ?1", [id])?
            } else {
                tx.execute(
                    "UPDATE observations SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
                    params![now_ts(), id],
                )?
            };
            if changed == 0 {
                return Err(Error::ObservationNotFound { id });
            }
            Ok(())
        })
    }

    /// Fetch one live observation.
    ///
    /// # Errors
    ///
    /// `NotFound` if the row is absent or soft-deleted.
    pub fn get_observation(&self, id: i64) -> Result<Observation> {
        observation_by_id(&self.conn, id)
    }

    /// Recent live observations, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn recent_observations(
        &self,
        project: Option<&str>,
        scope: Option<Scope>,
        limit: usize,
    ) -> Result<Vec<Observation>> {
        let limit = clamp_limit(limit, RECENT_LIMIT_MAX);

        let mut conditions = vec!["o.deleted_at IS NULL".to_string()];
        let mut params: Vec<String> = Vec::new();
        if let Some(p) = project {
            params.push(p.to_string());
            conditions.push(format!("o.project = ?{}", params.len()));
        }
        if let Some(s) = scope {
            params.push(s.as_str().to_string());
            conditions.push(format!("o.scope = ?{}", params.len()));
        }

        let sql = format!(
            "SELECT {OBS_COLS} FROM observations o
             WHERE {}
             ORDER BY o.created_at DESC, o.id DESC
             LIMIT {limit}",
            conditions.join(" AND ")
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params), row_to_observation)?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    // ==================
    // Prompts
    // ==================

    /// Capture a prompt against an existing session.
    ///
    /// # Errors
    ///
    /// `InvalidInput` on empty content, `NotFound` if the session does
    /// not exist.
    pub fn add_prompt(&mut self, prompt: &AddPrompt) -> Result<i64> {
        if prompt.content.trim().is_empty() {
            return Err(Error::invalid_input("prompt content must not be empty"));
        }
        let content = redact_private(&prompt.content);
        let project = prompt.project.clone().unwrap_or_default();

        self.mutate(|tx| {
            require_session(tx, &prompt.session_id)?;
            tx.execute(
                "INSERT INTO prompts (session_id, content, project, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![prompt.session_id, content, project, now_ts()],
            )?;
            Ok(tx.last_insert_rowid())
        })
    }

    /// Recent prompts, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn recent_prompts(&self, project: Option<&str>, limit: usize) -> Result<Vec<Prompt>> {
        let limit = clamp_limit(limit, RECENT_LIMIT_MAX);
        let (filter, params): (&str, Vec<String>) = match project {
            Some(p) => ("WHERE project = ?1", vec![p.to_string()]),
            None => ("", Vec::new()),
        };

        let sql = format!(
            "SELECT id, session_id, content, project, created_at FROM prompts
             {filter}
             ORDER BY created_at DESC, id DESC
             LIMIT {limit}"
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params), row_to_prompt)?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    /// Full-text search over prompt content.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails. Sanitized input never raises
    /// an FTS syntax error; unmatched queries return an empty list.
    pub fn search_prompts(
        &self,
        query: &str,
        project: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Prompt>> {
        let limit = clamp_limit(limit, RECENT_LIMIT_MAX);
        let mut params: Vec<String> = vec![sanitize_query(query)];
        let mut filter = String::new();
        if let Some(p) = project {
            params.push(p.to_string());
            filter = format!("AND p.project = ?{}", params.len());
        }

        let sql = format!(
            "SELECT p.id, p.session_id, p.content, p.project, p.created_at
             FROM prompts p
             JOIN prompts_fts ON prompts_fts.rowid = p.id
             WHERE prompts_fts MATCH ?1 {filter}
             ORDER BY prompts_fts.rank, p.created_at DESC, p.id DESC
             LIMIT {limit}"
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params), |row| {
            row_to_prompt(row)
        })?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    // ==================
    // Search & timeline
    // ==================

    /// FTS-ranked observation search with optional equality filters.
    ///
    /// Ordering is rank (best first), then `created_at DESC, id DESC`.
    /// The limit defaults to 10 and is capped at 20.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails; never an FTS syntax error.
    pub fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        let limit = clamp_limit(
            options.limit.unwrap_or(SEARCH_LIMIT_DEFAULT),
            SEARCH_LIMIT_MAX,
        );

        let mut conditions = vec!["o.deleted_at IS NULL".to_string()];
        let mut params: Vec<String> = vec![sanitize_query(query)];
        if let Some(kind) = &options.kind {
            params.push(kind.clone());
            conditions.push(format!("o.type = ?{}", params.len()));
        }
        if let Some(project) = &options.project {
            params.push(project.clone());
            conditions.push(format!("o.project = ?{}", params.len()));
        }
        if let Some(scope) = options.scope {
            params.push(scope.as_str().to_string());
            conditions.push(format!("o.scope = ?{}", params.len()));
        }

        let sql = format!(
            "SELECT {OBS_COLS}, observations_fts.rank
             FROM observations o
             JOIN observations_fts ON observations_fts.rowid = o.id
             WHERE observations_fts MATCH ?1 AND {}
             ORDER BY observations_fts.rank, o.created_at DESC, o.id DESC
             LIMIT {limit}",
            conditions.join(" AND ")
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params), |row| {
            Ok(SearchResult {
                observation: row_to_observation(row)?,
                rank: row.get(13)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    /// Reconstruct the in-session timeline around an observation.
    ///
    /// `before` holds up to `before_n` live observations strictly older
    /// than the focus, `after` up to `after_n` strictly newer; both are
    /// returned in ascending time order and capped at 50.
    ///
    /// # Errors
    ///
    /// `NotFound` if the focus is absent or soft-deleted.
    pub fn timeline(&self, observation_id: i64, before_n: usize, after_n: usize) -> Result<Timeline> {
        let focus = self.get_observation(observation_id)?;
        let before_n = before_n.min(TIMELINE_LIMIT_MAX);
        let after_n = after_n.min(TIMELINE_LIMIT_MAX);

        let sql_before = format!(
            "SELECT {OBS_COLS} FROM observations o
             WHERE o.session_id = ?1 AND o.deleted_at IS NULL
               AND (o.created_at < ?2 OR (o.created_at = ?2 AND o.id < ?3))
             ORDER BY o.created_at DESC, o.id DESC
             LIMIT {before_n}"
        );
        let mut stmt = self.conn.prepare(&sql_before)?;
        let mut before: Vec<Observation> = stmt
            .query_map(
                params![focus.session_id, focus.created_at, focus.id],
                row_to_observation,
            )?
            .collect::<std::result::Result<_, _>>()?;
        before.reverse();

        let sql_after = format!(
            "SELECT {OBS_COLS} FROM observations o
             WHERE o.session_id = ?1 AND o.deleted_at IS NULL
               AND (o.created_at > ?2 OR (o.created_at = ?2 AND o.id > ?3))
             ORDER BY o.created_at ASC, o.id ASC
             LIMIT {after_n}"
        );
        let mut stmt = self.conn.prepare(&sql_after)?;
        let after: Vec<Observation> = stmt
            .query_map(
                params![focus.session_id, focus.created_at, focus.id],
                row_to_observation,
            )?
            .collect::<std::result::Result<_, _>>()?;

        let session = session_by_id(&self.conn, &focus.session_id).ok();
        let total_in_range = before.len() + 1 + after.len();

        Ok(Timeline {
            session,
            before,
            focus,
            after,
            total_in_range,
        })
    }

    // ==================
    // Stats
    // ==================

    /// Store-wide counts and the project list.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub fn stats(&self) -> Result<Stats> {
        let total_sessions: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM sessions", [], |r| r.get(0))?;
        let active_sessions: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sessions WHERE ended_at IS NULL",
            [],
            |r| r.get(0),
        )?;
        let observation_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM observations WHERE deleted_at IS NULL",
            [],
            |r| r.get(0),
        )?;
        let prompt_count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM prompts", [], |r| r.get(0))?;

        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT project FROM sessions
             UNION
             SELECT DISTINCT project FROM observations WHERE project != ''
             ORDER BY 1",
        )?;
        let projects: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;

        let db_size_bytes: u64 = self.conn.query_row(
            "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
            [],
            |r| r.get::<_, i64>(0).map(|v| v.unsigned_abs()),
        )?;

        Ok(Stats {
            total_sessions,
            active_sessions,
            observation_count,
            prompt_count,
            projects,
            db_size_bytes,
        })
    }

    // ==================
    // Export / import
    // ==================

    /// Consistent whole-database snapshot, excluding deleted observations.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub fn export(&self) -> Result<Snapshot> {
        let mut stmt = self.conn.prepare(
            "SELECT id, project, directory, started_at, ended_at, summary
             FROM sessions ORDER BY started_at, id",
        )?;
        let sessions: Vec<Session> = stmt
            .query_map([], row_to_session)?
            .collect::<std::result::Result<_, _>>()?;

        let sql = format!(
            "SELECT {OBS_COLS} FROM observations o WHERE o.deleted_at IS NULL ORDER BY o.id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let observations: Vec<Observation> = stmt
            .query_map([], row_to_observation)?
            .collect::<std::result::Result<_, _>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT id, session_id, content, project, created_at FROM prompts ORDER BY id",
        )?;
        let prompts: Vec<Prompt> = stmt
            .query_map([], row_to_prompt)?
            .collect::<std::result::Result<_, _>>()?;

        Ok(Snapshot {
            version: SNAPSHOT_VERSION,
            exported_at: now_ts(),
            sessions,
            observations,
            prompts,
        })
    }

    /// Import a snapshot in one transaction.
    ///
    /// Sessions land first (skipped when the id exists with matching
    /// metadata, conflicting otherwise), then observations (skipped on id
    /// collision or an existing live topic triple), then prompts (skipped
    /// on id collision). Importing a store's own export is a no-op.
    ///
    /// # Errors
    ///
    /// `Conflict` on session metadata mismatch; `Internal` rolls the
    /// whole batch back.
    pub fn import(&mut self, snapshot: &Snapshot) -> Result<ImportCounts> {
        self.mutate(|tx| {
            let mut counts = ImportCounts::default();

            for session in &snapshot.sessions {
                let existing: Option<(String, Option<String>)> = tx
                    .query_row(
                        "SELECT project, directory FROM sessions WHERE id = ?1",
                        [&session.id],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;
                match existing {
                    Some((ref p, ref d))
                        if *p == session.project && *d == session.directory => {}
                    Some(_) => {
                        return Err(Error::SessionConflict {
                            id: session.id.clone(),
                        })
                    }
                    None => {
                        tx.execute(
                            "INSERT INTO sessions (id, project, directory, started_at, ended_at, summary)
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                            params![
                                session.id,
                                session.project,
                                session.directory,
                                session.started_at,
                                session.ended_at,
                                session.summary
                            ],
                        )?;
                        counts.sessions_imported += 1;
                    }
                }
            }

            for obs in &snapshot.observations {
                let id_taken = tx
                    .prepare("SELECT 1 FROM observations WHERE id = ?1")?
                    .exists([obs.id])?;
                if id_taken {
                    continue;
                }
                let topic_key = obs.topic_key.clone().unwrap_or_default();
                if !topic_key.is_empty() {
                    let topic_taken = tx
                        .prepare(
                            "SELECT 1 FROM observations
                             WHERE project = ?1 AND scope = ?2 AND topic_key = ?3
                               AND deleted_at IS NULL",
                        )?
                        .exists(params![
                            obs.project.clone().unwrap_or_default(),
                            obs.scope.as_str(),
                            topic_key
                        ])?;
                    if topic_taken {
                        continue;
                    }
                }
                tx.execute(
                    "INSERT INTO observations
                       (id, session_id, type, title, content, project, scope, topic_key,
                        tool_name, revision_count, duplicate_count, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                    params![
                        obs.id,
                        obs.session_id,
                        obs.kind,
                        redact_private(&obs.title),
                        redact_private(&obs.content),
                        obs.project.clone().unwrap_or_default(),
                        obs.scope.as_str(),
                        topic_key,
                        obs.tool_name,
                        obs.revision_count,
                        obs.duplicate_count,
                        obs.created_at,
                        obs.updated_at
                    ],
                )?;
                counts.observations_imported += 1;
            }

            for prompt in &snapshot.prompts {
                let id_taken = tx
                    .prepare("SELECT 1 FROM prompts WHERE id = ?1")?
                    .exists([prompt.id])?;
                if id_taken {
                    continue;
                }
                tx.execute(
                    "INSERT INTO prompts (id, session_id, content, project, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        prompt.id,
                        prompt.session_id,
                        redact_private(&prompt.content),
                        prompt.project.clone().unwrap_or_default(),
                        prompt.created_at
                    ],
                )?;
                counts.prompts_imported += 1;
            }

            Ok(counts)
        })
    }

    // ==================
    // Synced chunks
    // ==================

    /// Ids of every chunk already materialized locally.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn synced_chunk_ids(&self) -> Result<HashSet<String>> {
        let mut stmt = self.conn.prepare("SELECT chunk_id FROM synced_chunks")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;
        Ok(ids)
    }

    /// Record a chunk id as materialized. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn record_synced_chunk(&mut self, chunk_id: &str) -> Result<()> {
        self.mutate(|tx| {
            tx.execute(
                "INSERT OR IGNORE INTO synced_chunks (chunk_id, recorded_at) VALUES (?1, ?2)",
                params![chunk_id, now_ts()],
            )?;
            Ok(())
        })
    }
}

/// Validated, redacted, normalized inputs for one observation write.
struct PreparedAdd {
    session_id: String,
    kind: String,
    title: String,
    content: String,
    project: String,
    scope: Scope,
    topic_key: String,
    tool_name: Option<String>,
}

fn prepare_add(params: &AddObservation) -> Result<PreparedAdd> {
    if params.session_id.trim().is_empty() {
        return Err(Error::invalid_input("session_id is required"));
    }
    if params.title.trim().is_empty() {
        return Err(Error::invalid_input("title must not be empty"));
    }
    if params.content.trim().is_empty() {
        return Err(Error::invalid_input("content must not be empty"));
    }

    Ok(PreparedAdd {
        session_id: params.session_id.clone(),
        kind: params
            .kind
            .clone()
            .filter(|k| !k.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_KIND.to_string()),
        title: redact_private(&params.title),
        content: redact_private(&params.content),
        project: params.project.clone().unwrap_or_default(),
        scope: params.scope.unwrap_or_default(),
        topic_key: params
            .topic_key
            .as_deref()
            .map(normalize_topic_key)
            .unwrap_or_default(),
        tool_name: params.tool_name.clone(),
    })
}

fn add_observation_tx(tx: &Transaction, p: &PreparedAdd) -> Result<AddResult> {
    require_session(tx, &p.session_id)?;
    let now = now_ts();

    if !p.topic_key.is_empty() {
        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM observations
                 WHERE project = ?1 AND scope = ?2 AND topic_key = ?3 AND deleted_at IS NULL",
                params![p.project, p.scope.as_str(), p.topic_key],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            tx.execute(
                "UPDATE observations
                 SET type = ?1, title = ?2, content = ?3, tool_name = ?4,
                     revision_count = revision_count + 1, updated_at = ?5
                 WHERE id = ?6",
                params![p.kind, p.title, p.content, p.tool_name, now, id],
            )?;
            return Ok(AddResult {
                id,
                outcome: AddOutcome::Upserted,
            });
        }
    }

    let duplicate: Option<i64> = tx
        .query_row(
            "SELECT id FROM observations
             WHERE session_id = ?1 AND title = ?2 AND content = ?3 AND deleted_at IS NULL",
            params![p.session_id, p.title, p.content],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = duplicate {
        tx.execute(
            "UPDATE observations SET duplicate_count = duplicate_count + 1 WHERE id = ?1",
            [id],
        )?;
        return Ok(AddResult {
            id,
            outcome: AddOutcome::Coalesced,
        });
    }

    tx.execute(
        "INSERT INTO observations
           (session_id, type, title, content, project, scope, topic_key, tool_name,
            revision_count, duplicate_count, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, 1, ?9, ?9)",
        params![
            p.session_id,
            p.kind,
            p.title,
            p.content,
            p.project,
            p.scope.as_str(),
            p.topic_key,
            p.tool_name,
            now
        ],
    )?;
    Ok(AddResult {
        id: tx.last_insert_rowid(),
        outcome: AddOutcome::Inserted,
    })
}

/// Fail with `NotFound` unless the session exists.
fn require_session(conn: &Connection, id: &str) -> Result<()> {
    let exists = conn
        .prepare("SELECT 1 FROM sessions WHERE id = ?1")?
        .exists([id])?;
    if exists {
        Ok(())
    } else {
        Err(Error::SessionNotFound { id: id.to_string() })
    }
}

fn session_by_id(conn: &Connection, id: &str) -> Result<Session> {
    conn.query_row(
        "SELECT id, project, directory, started_at, ended_at, summary
         FROM sessions WHERE id = ?1",
        [id],
        row_to_session,
    )
    .optional()?
    .ok_or_else(|| Error::SessionNotFound { id: id.to_string() })
}

fn observation_by_id(conn: &Connection, id: i64) -> Result<Observation> {
    let sql = format!(
        "SELECT {OBS_COLS} FROM observations o WHERE o.id = ?1 AND o.deleted_at IS NULL"
    );
    conn.query_row(&sql, [id], row_to_observation)
        .optional()?
        .ok_or(Error::ObservationNotFound { id })
}

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        project: row.get(1)?,
        directory: row.get(2)?,
        started_at: row.get(3)?,
        ended_at: row.get(4)?,
        summary: row.get(5)?,
    })
}

fn row_to_observation(row: &Row<'_>) -> rusqlite::Result<Observation> {
    let project: String = row.get(5)?;
    let scope_str: String = row.get(6)?;
    let topic_key: String = row.get(7)?;
    let scope = Scope::parse(&scope_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            6,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())),
        )
    })?;

    Ok(Observation {
        id: row.get(0)?,
        session_id: row.get(1)?,
        kind: row.get(2)?,
        title: row.get(3)?,
        content: row.get(4)?,
        project: (!project.is_empty()).then_some(project),
        scope,
        topic_key: (!topic_key.is_empty()).then_some(topic_key),
        tool_name: row.get(8)?,
        revision_count: row.get(9)?,
        duplicate_count: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn row_to_prompt(row: &Row<'_>) -> rusqlite::Result<Prompt> {
    let project: String = row.get(3)?;
    Ok(Prompt {
        id: row.get(0)?,
        session_id: row.get(1)?,
        content: row.get(2)?,
        project: (!project.is_empty()).then_some(project),
        created_at: row.get(4)?,
    })
}

/// Clamp a caller-supplied limit into `1..=max`.
fn clamp_limit(limit: usize, max: usize) -> usize {
    limit.clamp(1, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn store_with_session() -> Store {
        let mut store = Store::open_memory().unwrap();
        store.create_session("s1", "p", Some("/tmp")).unwrap();
        store
    }

    fn add(store: &mut Store, title: &str, content: &str, topic: Option<&str>) -> AddResult {
        store
            .add_observation(&AddObservation {
                session_id: "s1".into(),
                kind: Some("architecture".into()),
                title: title.into(),
                content: content.into(),
                project: Some("p".into()),
                scope: Some(Scope::Project),
                topic_key: topic.map(Into::into),
                tool_name: None,
            })
            .unwrap()
    }

    #[test]
    fn test_create_session_idempotent_on_match() {
        let mut store = store_with_session();
        store.create_session("s1", "p", Some("/tmp")).unwrap();
    }

    #[test]
    fn test_create_session_conflict_on_mismatch() {
        let mut store = store_with_session();
        let err = store.create_session("s1", "other", Some("/tmp")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_end_session_idempotent_overwrite() {
        let mut store = store_with_session();
        let first = store.end_session("s1", "did things").unwrap();
        assert_eq!(first.summary.as_deref(), Some("did things"));
        let second = store.end_session("s1", "did more").unwrap();
        assert_eq!(second.summary.as_deref(), Some("did more"));
        assert!(second.ended_at.is_some());
    }

    #[test]
    fn test_end_missing_session() {
        let mut store = Store::open_memory().unwrap();
        assert_eq!(
            store.end_session("nope", "").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_topic_upsert_returns_same_id_and_bumps_revision() {
        let mut store = store_with_session();
        let first = add(&mut store, "Auth", "middleware chain", Some("architecture/auth-model"));
        assert_eq!(first.outcome, AddOutcome::Inserted);

        let second = add(&mut store, "Auth", "move to gateway", Some("architecture/auth-model"));
        assert_eq!(second.id, first.id);
        assert_eq!(second.outcome, AddOutcome::Upserted);

        let obs = store.get_observation(first.id).unwrap();
        assert_eq!(obs.content, "move to gateway");
        assert_eq!(obs.revision_count, 2);
    }

    #[test]
    fn test_duplicate_coalescing_without_topic() {
        let mut store = store_with_session();
        let first = add(&mut store, "same", "thing", None);
        let second = add(&mut store, "same", "thing", None);
        assert_eq!(second.id, first.id);
        assert_eq!(second.outcome, AddOutcome::Coalesced);

        let obs = store.get_observation(first.id).unwrap();
        assert_eq!(obs.duplicate_count, 2);
        assert_eq!(obs.revision_count, 1);
    }

    #[test]
    fn test_add_requires_existing_session() {
        let mut store = Store::open_memory().unwrap();
        let err = store
            .add_observation(&AddObservation {
                session_id: "ghost".into(),
                title: "t".into(),
                content: "c".into(),
                ..AddObservation::default()
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_add_rejects_empty_content() {
        let mut store = store_with_session();
        let err = store
            .add_observation(&AddObservation {
                session_id: "s1".into(),
                title: "t".into(),
                content: "   ".into(),
                ..AddObservation::default()
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_soft_delete_then_reinsert_same_topic() {
        let mut store = store_with_session();
        let first = add(&mut store, "Auth", "v1", Some("architecture/auth-model"));

        store.delete_observation(first.id, false).unwrap();
        assert_eq!(
            store.get_observation(first.id).unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert!(store.search("auth", &SearchOptions::default()).unwrap().is_empty());

        let fresh = add(&mut store, "Auth", "fresh", Some("architecture/auth-model"));
        assert_ne!(fresh.id, first.id);
        assert_eq!(fresh.outcome, AddOutcome::Inserted);
        assert_eq!(store.get_observation(fresh.id).unwrap().revision_count, 1);
    }

    #[test]
    fn test_hard_delete_missing_reports_not_found() {
        let mut store = store_with_session();
        let r = add(&mut store, "a", "b", None);
        store.delete_observation(r.id, true).unwrap();
        assert_eq!(
            store.delete_observation(r.id, true).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_hard_delete_of_soft_deleted_row() {
        let mut store = store_with_session();
        let r = add(&mut store, "a", "b", None);
        store.delete_observation(r.id, false).unwrap();
        store.delete_observation(r.id, true).unwrap();
    }

    #[test]
    fn test_update_observation_partial() {
        let mut store = store_with_session();
        let r = add(&mut store, "Auth", "v1", None);

        let updated = store
            .update_observation(
                r.id,
                &UpdateObservation {
                    content: Some("v2".into()),
                    ..UpdateObservation::default()
                },
            )
            .unwrap();
        assert_eq!(updated.title, "Auth");
        assert_eq!(updated.content, "v2");
        assert_eq!(updated.revision_count, 2);
    }

    #[test]
    fn test_update_topic_collision_conflicts() {
        let mut store = store_with_session();
        add(&mut store, "a", "a", Some("decision/a"));
        let other = add(&mut store, "b", "b", Some("decision/b"));

        let err = store
            .update_observation(
                other.id,
                &UpdateObservation {
                    topic_key: Some("decision/a".into()),
                    ..UpdateObservation::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_update_deleted_row_not_found() {
        let mut store = store_with_session();
        let r = add(&mut store, "a", "b", None);
        store.delete_observation(r.id, false).unwrap();
        let err = store
            .update_observation(
                r.id,
                &UpdateObservation {
                    content: Some("x".into()),
                    ..UpdateObservation::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_search_filters_and_ordering() {
        let mut store = store_with_session();
        add(&mut store, "auth bug", "token refresh fails", None);
        store
            .add_observation(&AddObservation {
                session_id: "s1".into(),
                kind: Some("decision".into()),
                title: "auth decision".into(),
                content: "use jwt".into(),
                project: Some("q".into()),
                ..AddObservation::default()
            })
            .unwrap();

        let all = store.search("auth", &SearchOptions::default()).unwrap();
        assert_eq!(all.len(), 2);

        let scoped = store
            .search(
                "auth",
                &SearchOptions {
                    project: Some("q".into()),
                    ..SearchOptions::default()
                },
            )
            .unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].observation.kind, "decision");
    }

    #[test]
    fn test_search_equivalent_for_punctuated_queries() {
        let mut store = store_with_session();
        add(&mut store, "fix auth bug", "details", None);

        let plain = store.search("fix auth bug", &SearchOptions::default()).unwrap();
        let noisy = store.search("fix auth bug!!", &SearchOptions::default()).unwrap();
        // The quoted "bug!!" phrase tokenizes down to the same bare term.
        assert_eq!(plain.len(), 1);
        assert_eq!(noisy.len(), plain.len());

        // Never an error, whatever the input.
        for q in ["((((", "\"\"", "- - -", ""] {
            store.search(q, &SearchOptions::default()).unwrap();
        }
    }

    #[test]
    fn test_search_all_punctuation_matches_nothing() {
        let mut store = store_with_session();
        add(&mut store, "auth", "content", None);
        assert!(store.search("!!! ???", &SearchOptions::default()).unwrap().is_empty());
    }

    #[test]
    fn test_timeline_window() {
        let mut store = store_with_session();
        let a = add(&mut store, "A", "first", None);
        let b = add(&mut store, "B", "second", None);
        let c = add(&mut store, "C", "third", None);

        let t = store.timeline(b.id, 1, 1).unwrap();
        assert_eq!(t.focus.id, b.id);
        assert_eq!(t.before.iter().map(|o| o.id).collect::<Vec<_>>(), vec![a.id]);
        assert_eq!(t.after.iter().map(|o| o.id).collect::<Vec<_>>(), vec![c.id]);
        assert_eq!(t.total_in_range, 3);
        assert!(t.session.is_some());
        assert!(t.before.iter().all(|o| o.session_id == "s1"));
    }

    #[test]
    fn test_timeline_excludes_deleted_neighbors() {
        let mut store = store_with_session();
        let a = add(&mut store, "A", "first", None);
        let b = add(&mut store, "B", "second", None);
        let c = add(&mut store, "C", "third", None);
        store.delete_observation(a.id, false).unwrap();

        let t = store.timeline(b.id, 5, 5).unwrap();
        assert!(t.before.is_empty());
        assert_eq!(t.after.iter().map(|o| o.id).collect::<Vec<_>>(), vec![c.id]);
        assert_eq!(t.total_in_range, 2);
    }

    #[test]
    fn test_recent_observations_order_and_cap() {
        let mut store = store_with_session();
        for i in 0..5 {
            add(&mut store, &format!("t{i}"), &format!("c{i}"), None);
        }
        let recent = store.recent_observations(None, None, 3).unwrap();
        assert_eq!(recent.len(), 3);
        assert!(recent[0].id > recent[1].id);
    }

    #[test]
    fn test_recent_sessions_counts() {
        let mut store = store_with_session();
        store.create_session("s2", "p", None).unwrap();
        add(&mut store, "x", "y", None);

        let sessions = store.recent_sessions(Some("p"), 10).unwrap();
        assert_eq!(sessions.len(), 2);
        let s1 = sessions.iter().find(|s| s.session.id == "s1").unwrap();
        assert_eq!(s1.observation_count, 1);
        assert!(!s1.has_summary);
    }

    #[test]
    fn test_prompts_round_trip_and_search() {
        let mut store = store_with_session();
        let id = store
            .add_prompt(&AddPrompt {
                session_id: "s1".into(),
                content: "please fix the login flow".into(),
                project: Some("p".into()),
            })
            .unwrap();
        assert!(id > 0);

        let recent = store.recent_prompts(Some("p"), 10).unwrap();
        assert_eq!(recent.len(), 1);

        let hits = store.search_prompts("login", Some("p"), 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(store.search_prompts("nothing-here", None, 10).unwrap().is_empty());
    }

    #[test]
    fn test_prompt_requires_session_and_content() {
        let mut store = Store::open_memory().unwrap();
        let err = store
            .add_prompt(&AddPrompt {
                session_id: "ghost".into(),
                content: "hello".into(),
                project: None,
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let mut store = store_with_session();
        let err = store
            .add_prompt(&AddPrompt {
                session_id: "s1".into(),
                content: "".into(),
                project: None,
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_redaction_on_write_paths() {
        let mut store = store_with_session();
        let r = store
            .add_observation(&AddObservation {
                session_id: "s1".into(),
                title: "api keys".into(),
                content: "token is <private>sk-secret</private>".into(),
                ..AddObservation::default()
            })
            .unwrap();

        let obs = store.get_observation(r.id).unwrap();
        assert_eq!(obs.content, "token is [REDACTED]");
        // The secret never reached the FTS index.
        assert!(store.search("secret", &SearchOptions::default()).unwrap().is_empty());
        assert_eq!(store.search("redacted", &SearchOptions::default()).unwrap().len(), 1);
    }

    #[test]
    fn test_export_import_round_trip_is_noop() {
        let mut store = store_with_session();
        add(&mut store, "Auth", "v1", Some("architecture/auth-model"));
        store
            .add_prompt(&AddPrompt {
                session_id: "s1".into(),
                content: "hello".into(),
                project: None,
            })
            .unwrap();

        let snapshot = store.export().unwrap();
        assert_eq!(snapshot.sessions.len(), 1);
        assert_eq!(snapshot.observations.len(), 1);
        assert_eq!(snapshot.prompts.len(), 1);

        let counts = store.import(&snapshot).unwrap();
        assert_eq!(counts, ImportCounts::default());
        assert_eq!(store.export().unwrap().observations.len(), 1);
    }

    #[test]
    fn test_export_excludes_deleted() {
        let mut store = store_with_session();
        let r = add(&mut store, "gone", "soon", None);
        store.delete_observation(r.id, false).unwrap();
        assert!(store.export().unwrap().observations.is_empty());
    }

    #[test]
    fn test_import_into_fresh_store() {
        let mut source = store_with_session();
        add(&mut source, "Auth", "v1", Some("architecture/auth-model"));
        let snapshot = source.export().unwrap();

        let mut dest = Store::open_memory().unwrap();
        let counts = dest.import(&snapshot).unwrap();
        assert_eq!(counts.sessions_imported, 1);
        assert_eq!(counts.observations_imported, 1);

        let found = dest.search("auth", &SearchOptions::default()).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_import_session_conflict() {
        let source = store_with_session();
        let snapshot = source.export().unwrap();

        let mut dest = Store::open_memory().unwrap();
        dest.create_session("s1", "different", None).unwrap();
        let err = dest.import(&snapshot).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_import_skips_existing_topic_triple() {
        let mut source = store_with_session();
        add(&mut source, "Auth", "theirs", Some("architecture/auth-model"));
        let mut snapshot = source.export().unwrap();
        // Shift the id so only the topic triple collides.
        snapshot.observations[0].id = 999;

        let mut dest = store_with_session();
        add(&mut dest, "Auth", "ours", Some("architecture/auth-model"));

        let counts = dest.import(&snapshot).unwrap();
        assert_eq!(counts.observations_imported, 0);
        let obs = dest.search("auth", &SearchOptions::default()).unwrap();
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].observation.content, "ours");
    }

    #[test]
    fn test_synced_chunk_bookkeeping() {
        let mut store = Store::open_memory().unwrap();
        assert!(store.synced_chunk_ids().unwrap().is_empty());
        store.record_synced_chunk("abcd1234").unwrap();
        store.record_synced_chunk("abcd1234").unwrap();
        let ids = store.synced_chunk_ids().unwrap();
        assert_eq!(ids.len(), 1);
        assert!(ids.contains("abcd1234"));
    }

    #[test]
    fn test_stats() {
        let mut store = store_with_session();
        add(&mut store, "a", "b", None);
        store.end_session("s1", "done").unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_sessions, 1);
        assert_eq!(stats.active_sessions, 0);
        assert_eq!(stats.observation_count, 1);
        assert_eq!(stats.projects, vec!["p".to_string()]);
        assert!(stats.db_size_bytes > 0);
    }

    #[test]
    fn test_injected_topic_suggester() {
        fn fixed(_k: &str, _t: &str, _c: &str) -> String {
            "note/fixed".to_string()
        }
        let tmp = tempfile::TempDir::new().unwrap();
        let store = Store::open_with_config(
            &tmp.path().join("engram.db"),
            StoreConfig {
                topic_suggester: fixed,
                ..StoreConfig::default()
            },
        )
        .unwrap();
        assert_eq!(store.suggest_topic("decision", "title", "content"), "note/fixed");
    }

    #[test]
    fn test_batch_rolls_back_on_failure() {
        let mut store = store_with_session();
        let batch = vec![
            AddObservation {
                session_id: "s1".into(),
                title: "ok".into(),
                content: "fine".into(),
                ..AddObservation::default()
            },
            AddObservation {
                session_id: "missing".into(),
                title: "bad".into(),
                content: "fails".into(),
                ..AddObservation::default()
            },
        ];
        assert!(store.add_observations(&batch).is_err());
        assert!(store.recent_observations(None, None, 10).unwrap().is_empty());
    }
}
