//! Database schema and bootstrap.
//!
//! The whole schema is applied on every open with `CREATE … IF NOT EXISTS`
//! statements, so bootstrap is idempotent. Columns added after the first
//! release are probed through `pragma_table_info` and added with safe
//! defaults, so older databases open without a migration tool.
//!
//! # FTS
//!
//! `observations_fts` and `prompts_fts` are external-content FTS5 tables
//! mirroring their base tables. Triggers keep them in sync; the
//! observation triggers are guarded so soft-deleted rows never appear in
//! the index:
//!
//! - insert indexes the row only while `deleted_at IS NULL`
//! - update removes the old entry if the old row was live, and re-adds
//!   the new entry if the new row is live (covering live→live refresh,
//!   live→deleted removal, and deleted→live resurrection)
//! - delete removes the entry only if the row was live

use rusqlite::Connection;

use crate::error::Result;

/// Base tables, applied before the additive column probes.
pub const SCHEMA_TABLES_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    project TEXT NOT NULL,
    directory TEXT,
    started_at TEXT NOT NULL,
    ended_at TEXT,
    summary TEXT
);

-- Observations: the memory records themselves.
-- project and topic_key use '' (not NULL) for "absent" so the partial
-- unique index below has well-defined semantics.
CREATE TABLE IF NOT EXISTS observations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    type TEXT NOT NULL DEFAULT 'note',
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    project TEXT NOT NULL DEFAULT '',
    scope TEXT NOT NULL DEFAULT 'project',
    topic_key TEXT NOT NULL DEFAULT '',
    tool_name TEXT,
    revision_count INTEGER NOT NULL DEFAULT 1,
    duplicate_count INTEGER NOT NULL DEFAULT 1,
    deleted_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (session_id) REFERENCES sessions(id)
);

CREATE TABLE IF NOT EXISTS prompts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    content TEXT NOT NULL,
    project TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    FOREIGN KEY (session_id) REFERENCES sessions(id)
);

-- Sync chunks already materialized locally.
CREATE TABLE IF NOT EXISTS synced_chunks (
    chunk_id TEXT PRIMARY KEY,
    recorded_at TEXT NOT NULL
);
"#;

/// Indexes, FTS tables, and triggers.
///
/// Applied after the column probes so indexes may reference columns that
/// were added to an older database moments earlier.
pub const SCHEMA_INDEX_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_sessions_project ON sessions(project);
CREATE INDEX IF NOT EXISTS idx_sessions_started ON sessions(started_at DESC);

CREATE INDEX IF NOT EXISTS idx_observations_session ON observations(session_id);
CREATE INDEX IF NOT EXISTS idx_observations_created ON observations(created_at DESC);
CREATE INDEX IF NOT EXISTS idx_observations_project ON observations(project);

-- At most one live observation per (project, scope, topic_key).
-- Soft-deleted rows fall out of the index so the topic can be reused.
CREATE UNIQUE INDEX IF NOT EXISTS idx_observations_topic
    ON observations(project, scope, topic_key)
    WHERE deleted_at IS NULL AND topic_key != '';

CREATE INDEX IF NOT EXISTS idx_prompts_session ON prompts(session_id);
CREATE INDEX IF NOT EXISTS idx_prompts_created ON prompts(created_at DESC);

-- ====================
-- Full-text search
-- ====================

CREATE VIRTUAL TABLE IF NOT EXISTS observations_fts USING fts5(
    title,
    content,
    type,
    content='observations',
    content_rowid='id',
    tokenize='porter ascii'
);

CREATE VIRTUAL TABLE IF NOT EXISTS prompts_fts USING fts5(
    content,
    content='prompts',
    content_rowid='id',
    tokenize='porter ascii'
);

-- ====================
-- FTS sync triggers
-- ====================

CREATE TRIGGER IF NOT EXISTS observations_ai AFTER INSERT ON observations
WHEN NEW.deleted_at IS NULL
BEGIN
    INSERT INTO observations_fts(rowid, title, content, type)
    VALUES (NEW.id, NEW.title, NEW.content, NEW.type);
END;

CREATE TRIGGER IF NOT EXISTS observations_ad AFTER DELETE ON observations
WHEN OLD.deleted_at IS NULL
BEGIN
    INSERT INTO observations_fts(observations_fts, rowid, title, content, type)
    VALUES ('delete', OLD.id, OLD.title, OLD.content, OLD.type);
END;

-- Delete-then-insert in one trigger body so the order is fixed.
CREATE TRIGGER IF NOT EXISTS observations_au AFTER UPDATE ON observations
BEGIN
    INSERT INTO observations_fts(observations_fts, rowid, title, content, type)
    SELECT 'delete', OLD.id, OLD.title, OLD.content, OLD.type
    WHERE OLD.deleted_at IS NULL;
    INSERT INTO observations_fts(rowid, title, content, type)
    SELECT NEW.id, NEW.title, NEW.content, NEW.type
    WHERE NEW.deleted_at IS NULL;
END;

CREATE TRIGGER IF NOT EXISTS prompts_ai AFTER INSERT ON prompts
BEGIN
    INSERT INTO prompts_fts(rowid, content) VALUES (NEW.id, NEW.content);
END;

CREATE TRIGGER IF NOT EXISTS prompts_ad AFTER DELETE ON prompts
BEGIN
    INSERT INTO prompts_fts(prompts_fts, rowid, content)
    VALUES ('delete', OLD.id, OLD.content);
END;

CREATE TRIGGER IF NOT EXISTS prompts_au AFTER UPDATE ON prompts
BEGIN
    INSERT INTO prompts_fts(prompts_fts, rowid, content)
    VALUES ('delete', OLD.id, OLD.content);
    INSERT INTO prompts_fts(rowid, content) VALUES (NEW.id, NEW.content);
END;
";

/// Columns added after the first schema revision.
///
/// Each entry is probed via `pragma_table_info` and added with a safe
/// default when missing, so databases created by older builds open
/// without a migration tool.
const ADDITIVE_COLUMNS: &[(&str, &str, &str)] = &[
    (
        "observations",
        "scope",
        "ALTER TABLE observations ADD COLUMN scope TEXT NOT NULL DEFAULT 'project'",
    ),
    (
        "observations",
        "topic_key",
        "ALTER TABLE observations ADD COLUMN topic_key TEXT NOT NULL DEFAULT ''",
    ),
    (
        "observations",
        "tool_name",
        "ALTER TABLE observations ADD COLUMN tool_name TEXT",
    ),
    (
        "observations",
        "revision_count",
        "ALTER TABLE observations ADD COLUMN revision_count INTEGER NOT NULL DEFAULT 1",
    ),
    (
        "observations",
        "duplicate_count",
        "ALTER TABLE observations ADD COLUMN duplicate_count INTEGER NOT NULL DEFAULT 1",
    ),
];

/// Apply pragmas and the full schema to a connection.
///
/// Idempotent: all DDL uses `IF NOT EXISTS`, and additive columns are
/// probed before being added.
///
/// # Errors
///
/// Any DDL or pragma failure is fatal; the store refuses to open.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;

    conn.execute_batch(SCHEMA_TABLES_SQL)?;
    ensure_additive_columns(conn)?;
    conn.execute_batch(SCHEMA_INDEX_SQL)?;

    Ok(())
}

/// Probe and add any missing additive columns.
fn ensure_additive_columns(conn: &Connection) -> Result<()> {
    for &(table, column, ddl) in ADDITIVE_COLUMNS {
        if !column_exists(conn, table, column)? {
            tracing::info!(table, column, "adding missing column");
            conn.execute_batch(ddl)?;
        }
    }
    Ok(())
}

/// Check if a column exists in a table.
fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let sql = format!("SELECT 1 FROM pragma_table_info('{table}') WHERE name = ?1");
    Ok(conn.prepare(&sql)?.exists([column])?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).expect("schema should apply");
        conn
    }

    #[test]
    fn test_apply_schema_creates_tables() {
        let conn = open();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();

        for expected in ["sessions", "observations", "prompts", "synced_chunks"] {
            assert!(tables.contains(&expected.to_string()), "missing {expected}");
        }
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = open();
        apply_schema(&conn).expect("second apply should succeed");
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let conn = open();
        let fk: i32 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn test_fts_insert_trigger_skips_deleted() {
        let conn = open();
        conn.execute(
            "INSERT INTO sessions (id, project, started_at) VALUES ('s1', 'p', '2026-01-01 00:00:00')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO observations (session_id, type, title, content, created_at, updated_at, deleted_at)
             VALUES ('s1', 'note', 'dead', 'gone', '2026-01-01 00:00:00', '2026-01-01 00:00:00', '2026-01-01 00:00:01')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO observations (session_id, type, title, content, created_at, updated_at)
             VALUES ('s1', 'note', 'alive', 'here', '2026-01-01 00:00:00', '2026-01-01 00:00:00')",
            [],
        )
        .unwrap();

        let indexed: i64 = conn
            .query_row("SELECT COUNT(*) FROM observations_fts", [], |r| r.get(0))
            .unwrap();
        assert_eq!(indexed, 1);
    }

    #[test]
    fn test_fts_update_trigger_tracks_soft_delete() {
        let conn = open();
        conn.execute(
            "INSERT INTO sessions (id, project, started_at) VALUES ('s1', 'p', '2026-01-01 00:00:00')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO observations (session_id, type, title, content, created_at, updated_at)
             VALUES ('s1', 'note', 'auth', 'middleware', '2026-01-01 00:00:00', '2026-01-01 00:00:00')",
            [],
        )
        .unwrap();

        let hits = |conn: &Connection| -> i64 {
            conn.query_row(
                "SELECT COUNT(*) FROM observations_fts WHERE observations_fts MATCH 'auth'",
                [],
                |r| r.get(0),
            )
            .unwrap()
        };
        assert_eq!(hits(&conn), 1);

        // Soft delete removes the FTS entry.
        conn.execute(
            "UPDATE observations SET deleted_at = '2026-01-01 00:00:01' WHERE id = 1",
            [],
        )
        .unwrap();
        assert_eq!(hits(&conn), 0);

        // Resurrection re-adds the entry.
        conn.execute("UPDATE observations SET deleted_at = NULL WHERE id = 1", [])
            .unwrap();
        assert_eq!(hits(&conn), 1);

        // A live update reindexes the new terms and drops the old ones.
        conn.execute("UPDATE observations SET title = 'gateway' WHERE id = 1", [])
            .unwrap();
        assert_eq!(hits(&conn), 0);
        let gateway: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM observations_fts WHERE observations_fts MATCH 'gateway'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(gateway, 1);
    }

    #[test]
    fn test_topic_unique_ignores_deleted_and_empty() {
        let conn = open();
        conn.execute(
            "INSERT INTO sessions (id, project, started_at) VALUES ('s1', 'p', '2026-01-01 00:00:00')",
            [],
        )
        .unwrap();

        let insert = |conn: &Connection, topic: &str, deleted: Option<&str>| {
            conn.execute(
                "INSERT INTO observations (session_id, type, title, content, project, scope, topic_key, deleted_at, created_at, updated_at)
                 VALUES ('s1', 'note', 't', 'c', 'p', 'project', ?1, ?2, '2026-01-01 00:00:00', '2026-01-01 00:00:00')",
                rusqlite::params![topic, deleted],
            )
        };

        insert(&conn, "decision/auth", None).unwrap();
        // Same live topic triple is rejected.
        assert!(insert(&conn, "decision/auth", None).is_err());
        // A deleted row with the same triple is allowed.
        insert(&conn, "decision/auth", Some("2026-01-01 00:00:01")).unwrap();
        // Empty topic keys never collide.
        insert(&conn, "", None).unwrap();
        insert(&conn, "", None).unwrap();
    }

    #[test]
    fn test_additive_column_probe() {
        let conn = Connection::open_in_memory().unwrap();
        // Simulate an older database lacking the newer columns.
        conn.execute_batch(
            "CREATE TABLE observations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                type TEXT NOT NULL DEFAULT 'note',
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                project TEXT NOT NULL DEFAULT '',
                deleted_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )
        .unwrap();

        assert!(!column_exists(&conn, "observations", "topic_key").unwrap());
        apply_schema(&conn).unwrap();
        assert!(column_exists(&conn, "observations", "topic_key").unwrap());
        assert!(column_exists(&conn, "observations", "revision_count").unwrap());
    }
}
