//! Configuration and path resolution.
//!
//! Engram keeps a single global database under the data directory and a
//! per-project sync directory for chunk exchange:
//!
//! - **Database**: `$ENGRAM_DATA_DIR/engram.db` (default `~/.engram/engram.db`)
//! - **Sync root**: a project-local `.engram/` directory, discovered by
//!   walking up from the current directory.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable overriding the data directory.
pub const ENV_DATA_DIR: &str = "ENGRAM_DATA_DIR";

/// Environment variable overriding the default HTTP port.
pub const ENV_PORT: &str = "ENGRAM_PORT";

/// Default HTTP port when `ENGRAM_PORT` is unset.
pub const DEFAULT_PORT: u16 = 7437;

/// Database file name inside the data directory.
pub const DB_FILE: &str = "engram.db";

/// Name of the project-local sync directory.
pub const SYNC_DIR: &str = ".engram";

/// Resolve the data directory.
///
/// Priority:
/// 1. Explicit path (CLI `--data-dir` flag)
/// 2. `ENGRAM_DATA_DIR` environment variable
/// 3. `~/.engram`
///
/// # Errors
///
/// Returns [`Error::Config`] if no home directory can be determined and no
/// override was supplied.
pub fn data_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    if let Ok(dir) = std::env::var(ENV_DATA_DIR) {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }

    directories::BaseDirs::new()
        .map(|b| b.home_dir().join(".engram"))
        .ok_or_else(|| Error::Config("cannot determine home directory".to_string()))
}

/// Resolve the database file path inside the data directory.
///
/// # Errors
///
/// Propagates [`data_dir`] failures.
pub fn db_path(explicit_data_dir: Option<&Path>) -> Result<PathBuf> {
    Ok(data_dir(explicit_data_dir)?.join(DB_FILE))
}

/// Resolve the HTTP port.
///
/// Priority: explicit CLI argument, then `ENGRAM_PORT`, then 7437.
/// A malformed `ENGRAM_PORT` value falls back to the default.
#[must_use]
pub fn http_port(explicit: Option<u16>) -> u16 {
    if let Some(port) = explicit {
        return port;
    }

    std::env::var(ENV_PORT)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(DEFAULT_PORT)
}

/// Discover the project-local sync root.
///
/// Walks up from `start` looking for an existing `.engram/` directory.
/// Returns `None` if no ancestor carries one.
#[must_use]
pub fn discover_sync_dir(start: &Path) -> Option<PathBuf> {
    let mut dir = start;
    loop {
        let candidate = dir.join(SYNC_DIR);
        if candidate.is_dir() {
            return Some(candidate);
        }
        match dir.parent() {
            Some(parent) => dir = parent,
            None => return None,
        }
    }
}

/// Resolve the sync root for sync commands.
///
/// Uses an existing `.engram/` directory found by walking up from the
/// current directory, else `<cwd>/.engram` (created lazily by export).
///
/// # Errors
///
/// Returns an error if the current directory cannot be read.
pub fn sync_dir() -> Result<PathBuf> {
    let cwd = std::env::current_dir()?;
    Ok(discover_sync_dir(&cwd).unwrap_or_else(|| cwd.join(SYNC_DIR)))
}

/// Name recorded as `created_by` on exported sync chunks.
///
/// Priority: `ENGRAM_ACTOR`, then the system username, then "unknown".
#[must_use]
pub fn actor() -> String {
    if let Ok(actor) = std::env::var("ENGRAM_ACTOR") {
        if !actor.is_empty() {
            return actor;
        }
    }
    if let Ok(user) = std::env::var("USER") {
        if !user.is_empty() {
            return user;
        }
    }
    "unknown".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_is_never_empty() {
        assert!(!actor().is_empty());
    }

    #[test]
    fn test_explicit_data_dir_wins() {
        let explicit = PathBuf::from("/custom/engram");
        assert_eq!(data_dir(Some(&explicit)).unwrap(), explicit);
    }

    #[test]
    fn test_db_path_appends_file_name() {
        let path = db_path(Some(Path::new("/data"))).unwrap();
        assert_eq!(path, PathBuf::from("/data/engram.db"));
    }

    #[test]
    fn test_explicit_port_wins() {
        assert_eq!(http_port(Some(9000)), 9000);
    }

    #[test]
    fn test_discover_sync_dir_walks_up() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join(".engram")).unwrap();
        let nested = root.join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();

        let found = discover_sync_dir(&nested).unwrap();
        assert_eq!(found, root.join(".engram"));
    }

    #[test]
    fn test_discover_sync_dir_missing() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert_eq!(discover_sync_dir(tmp.path()), None);
    }
}
