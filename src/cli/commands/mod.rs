//! Command implementations, one module per command family.

pub mod memory;
pub mod serve;
pub mod setup;
pub mod sync;
pub mod transfer;
pub mod version;

use std::path::PathBuf;

use crate::error::Result;
use crate::model::Scope;
use crate::storage::Store;

/// Open the store at the resolved data directory.
pub fn open_store(data_dir: Option<&PathBuf>) -> Result<Store> {
    let path = crate::config::db_path(data_dir.map(PathBuf::as_path))?;
    Store::open(&path)
}

/// Parse an optional `--scope` string.
pub fn parse_scope(scope: Option<&str>) -> Result<Option<Scope>> {
    scope.map(Scope::parse).transpose()
}

/// Resolve the sync root for sync commands.
pub fn sync_root() -> Result<crate::sync::SyncRoot> {
    Ok(crate::sync::SyncRoot::new(crate::config::sync_dir()?))
}

/// Helper shared by save-like commands: resolve (or create) the session
/// an ad-hoc write lands in.
pub fn ensure_session(
    store: &mut Store,
    explicit: Option<&str>,
    project: Option<&str>,
) -> Result<String> {
    if let Some(id) = explicit {
        if !id.trim().is_empty() {
            return Ok(id.to_string());
        }
    }
    let project = match project {
        Some(p) if !p.trim().is_empty() => p,
        _ => "default",
    };
    let id = format!("manual-save-{project}");
    store.create_session(&id, project, None)?;
    Ok(id)
}
