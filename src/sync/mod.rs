//! Chunked sync: exchange memories between machines without merge
//! conflicts.
//!
//! The sync root holds an append-only `manifest.json` and a `chunks/`
//! directory of content-addressed, gzipped JSONL files. Export writes the
//! delta since the last manifest entry as a new chunk; import replays
//! chunks the local store has not yet materialized. Both directions are
//! idempotent: identical content hashes to an already-known chunk id, and
//! imported chunk ids are recorded in the store.

pub mod chunk;
pub mod manifest;

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Result;
use crate::model::{now_ts, rfc3339_to_ts, ts_to_rfc3339, Snapshot};
use crate::storage::Store;

use self::manifest::{ChunkEntry, Manifest};

/// Result of a sync export.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportOutcome {
    /// True when there was nothing new to write.
    pub is_empty: bool,
    /// Id of the chunk written, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
    pub sessions: usize,
    pub memories: usize,
    pub prompts: usize,
}

/// Result of a sync import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportOutcome {
    pub chunks_imported: usize,
    pub chunks_skipped: usize,
    pub sessions_imported: usize,
    pub observations_imported: usize,
    pub prompts_imported: usize,
}

/// Counts reported by `status`.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    /// Chunks materialized in the local store.
    pub local_chunks: usize,
    /// Chunks listed in the manifest.
    pub remote_chunks: usize,
    /// Manifest chunks not yet imported locally.
    pub pending_import: usize,
}

/// A sync root directory (`.engram/` next to a project).
#[derive(Debug, Clone)]
pub struct SyncRoot {
    dir: PathBuf,
}

impl SyncRoot {
    /// Wrap a sync root directory. Nothing is created until export runs.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The root directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Export the delta since the last manifest entry as a new chunk.
    ///
    /// With `project` set, only matching sessions (and their
    /// observations/prompts) are considered. Content-addressed dedup: a
    /// delta whose bytes hash to an already-known chunk id writes
    /// nothing.
    ///
    /// # Errors
    ///
    /// Manifest or chunk I/O failures, or store read failures.
    pub fn export(
        &self,
        store: &mut Store,
        created_by: &str,
        project: Option<&str>,
    ) -> Result<ExportOutcome> {
        let mut manifest = Manifest::load(&self.dir)?;

        let mut known = store.synced_chunk_ids()?;
        for entry in &manifest.chunks {
            known.insert(entry.id.clone());
        }

        let mut snapshot = store.export()?;
        if let Some(p) = project {
            filter_project(&mut snapshot, p);
        }

        // Cutoff: everything at or before the newest manifest entry has
        // been exported already. First export keeps the whole snapshot.
        if let Some(latest) = manifest.latest_created_at() {
            let cutoff = rfc3339_to_ts(latest)?;
            filter_after(&mut snapshot, &cutoff);
        }

        if snapshot.is_empty() {
            return Ok(ExportOutcome {
                is_empty: true,
                ..ExportOutcome::default()
            });
        }

        let bytes = chunk::encode(&snapshot)?;
        let id = chunk::chunk_id(&bytes);
        if known.contains(&id) {
            return Ok(ExportOutcome {
                is_empty: true,
                ..ExportOutcome::default()
            });
        }

        chunk::write(&self.dir, &id, &bytes)?;
        manifest.chunks.push(ChunkEntry {
            id: id.clone(),
            created_by: created_by.to_string(),
            created_at: ts_to_rfc3339(&now_ts())?,
            sessions: snapshot.sessions.len(),
            memories: snapshot.observations.len(),
            prompts: snapshot.prompts.len(),
        });
        manifest.save(&self.dir)?;
        store.record_synced_chunk(&id)?;

        tracing::info!(chunk = %id, sessions = snapshot.sessions.len(),
            memories = snapshot.observations.len(), "exported sync chunk");

        Ok(ExportOutcome {
            is_empty: false,
            chunk_id: Some(id),
            sessions: snapshot.sessions.len(),
            memories: snapshot.observations.len(),
            prompts: snapshot.prompts.len(),
        })
    }

    /// Import every manifest chunk not yet materialized locally.
    ///
    /// Chunks are replayed in manifest (creation) order. Already-imported
    /// and missing chunk files count as skipped. Each chunk imports
    /// transactionally: a malformed payload fails with the chunk id in
    /// the message and commits nothing for that chunk.
    ///
    /// # Errors
    ///
    /// Malformed manifest (store untouched) or malformed chunk payload.
    pub fn import(&self, store: &mut Store) -> Result<ImportOutcome> {
        let manifest = Manifest::load(&self.dir)?;
        let known = store.synced_chunk_ids()?;

        let mut outcome = ImportOutcome::default();
        for entry in &manifest.chunks {
            if known.contains(&entry.id) {
                outcome.chunks_skipped += 1;
                continue;
            }

            let Some(bytes) = chunk::read(&self.dir, &entry.id)? else {
                tracing::warn!(chunk = %entry.id, "chunk file missing, skipping");
                outcome.chunks_skipped += 1;
                continue;
            };

            let snapshot = chunk::decode(&entry.id, &bytes)?;
            let counts = store.import(&snapshot)?;
            store.record_synced_chunk(&entry.id)?;

            outcome.chunks_imported += 1;
            outcome.sessions_imported += counts.sessions_imported;
            outcome.observations_imported += counts.observations_imported;
            outcome.prompts_imported += counts.prompts_imported;
        }

        Ok(outcome)
    }

    /// Chunk counts: local, remote, and pending.
    ///
    /// # Errors
    ///
    /// Manifest or store read failures.
    pub fn status(&self, store: &Store) -> Result<SyncStatus> {
        let manifest = Manifest::load(&self.dir)?;
        let local = store.synced_chunk_ids()?;
        let pending = manifest
            .chunks
            .iter()
            .filter(|c| !local.contains(&c.id))
            .count();

        Ok(SyncStatus {
            local_chunks: local.len(),
            remote_chunks: manifest.chunks.len(),
            pending_import: pending,
        })
    }
}

/// Keep only sessions matching `project`, and rows belonging to them.
fn filter_project(snapshot: &mut Snapshot, project: &str) {
    snapshot.sessions.retain(|s| s.project == project);
    let kept: std::collections::HashSet<&str> =
        snapshot.sessions.iter().map(|s| s.id.as_str()).collect();
    snapshot
        .observations
        .retain(|o| kept.contains(o.session_id.as_str()));
    snapshot
        .prompts
        .retain(|p| kept.contains(p.session_id.as_str()));
}

/// Keep only rows strictly newer than the cutoff (canonical timestamps
/// compare lexicographically).
fn filter_after(snapshot: &mut Snapshot, cutoff: &str) {
    snapshot.sessions.retain(|s| s.started_at.as_str() > cutoff);
    snapshot
        .observations
        .retain(|o| o.created_at.as_str() > cutoff);
    snapshot.prompts.retain(|p| p.created_at.as_str() > cutoff);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AddObservation, AddPrompt, SearchOptions};

    fn seeded_store() -> Store {
        let mut store = Store::open_memory().unwrap();
        store.create_session("s1", "p", None).unwrap();
        store
            .add_observation(&AddObservation {
                session_id: "s1".into(),
                kind: Some("decision".into()),
                title: "Ship it".into(),
                content: "we ship on fridays now".into(),
                project: Some("p".into()),
                ..AddObservation::default()
            })
            .unwrap();
        store
    }

    #[test]
    fn test_round_trip_between_two_stores() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = SyncRoot::new(tmp.path());

        let mut x = seeded_store();
        let exported = root.export(&mut x, "alice", Some("p")).unwrap();
        assert!(!exported.is_empty);
        assert_eq!(exported.sessions, 1);
        assert_eq!(exported.memories, 1);
        let chunk_id = exported.chunk_id.clone().unwrap();
        assert!(chunk::chunk_path(tmp.path(), &chunk_id).exists());

        let mut y = Store::open_memory().unwrap();
        let imported = root.import(&mut y).unwrap();
        assert_eq!(imported.chunks_imported, 1);
        assert_eq!(imported.observations_imported, 1);
        assert_eq!(y.search("ship", &SearchOptions::default()).unwrap().len(), 1);

        // Second export with no new writes: nothing to do.
        let again = root.export(&mut x, "alice", Some("p")).unwrap();
        assert!(again.is_empty);

        // Second import: the chunk is already materialized.
        let again = root.import(&mut y).unwrap();
        assert_eq!(again.chunks_imported, 0);
        assert_eq!(again.chunks_skipped, 1);
        assert_eq!(again.sessions_imported, 0);
    }

    #[test]
    fn test_content_addressed_dedup_without_manifest() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = SyncRoot::new(tmp.path());
        let mut store = seeded_store();

        let first = root.export(&mut store, "alice", None).unwrap();
        assert!(!first.is_empty);

        // Blow away the manifest; the store still remembers the chunk id,
        // so identical content is not re-emitted.
        std::fs::remove_file(tmp.path().join(manifest::MANIFEST_FILE)).unwrap();
        let second = root.export(&mut store, "alice", None).unwrap();
        assert!(second.is_empty);
    }

    #[test]
    fn test_incremental_export_after_cutoff() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = SyncRoot::new(tmp.path());

        // Seed a manifest whose cutoff predates everything in the store.
        let mut manifest = Manifest::default();
        manifest.chunks.push(ChunkEntry {
            id: "00000000".into(),
            created_by: "bob".into(),
            created_at: "2000-01-01T00:00:00Z".into(),
            sessions: 0,
            memories: 0,
            prompts: 0,
        });
        manifest.save(tmp.path()).unwrap();

        let mut store = seeded_store();
        let exported = root.export(&mut store, "alice", None).unwrap();
        assert!(!exported.is_empty);
        assert_eq!(exported.sessions, 1);
        assert_eq!(exported.memories, 1);

        let manifest = Manifest::load(tmp.path()).unwrap();
        assert_eq!(manifest.chunks.len(), 2);
    }

    #[test]
    fn test_cutoff_excludes_old_rows() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = SyncRoot::new(tmp.path());

        // Cutoff far in the future: nothing qualifies.
        let mut manifest = Manifest::default();
        manifest.chunks.push(ChunkEntry {
            id: "00000000".into(),
            created_by: "bob".into(),
            created_at: "2099-01-01T00:00:00Z".into(),
            sessions: 0,
            memories: 0,
            prompts: 0,
        });
        manifest.save(tmp.path()).unwrap();

        let mut store = seeded_store();
        let exported = root.export(&mut store, "alice", None).unwrap();
        assert!(exported.is_empty);
    }

    #[test]
    fn test_project_filter_drops_other_sessions() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = SyncRoot::new(tmp.path());

        let mut store = seeded_store();
        store.create_session("s2", "other", None).unwrap();
        store
            .add_prompt(&AddPrompt {
                session_id: "s2".into(),
                content: "unrelated".into(),
                project: Some("other".into()),
            })
            .unwrap();

        let exported = root.export(&mut store, "alice", Some("p")).unwrap();
        assert_eq!(exported.sessions, 1);
        assert_eq!(exported.prompts, 0);
    }

    #[test]
    fn test_missing_chunk_file_is_skipped() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = SyncRoot::new(tmp.path());

        let mut x = seeded_store();
        let exported = root.export(&mut x, "alice", None).unwrap();
        std::fs::remove_file(chunk::chunk_path(tmp.path(), &exported.chunk_id.unwrap())).unwrap();

        let mut y = Store::open_memory().unwrap();
        let imported = root.import(&mut y).unwrap();
        assert_eq!(imported.chunks_imported, 0);
        assert_eq!(imported.chunks_skipped, 1);
    }

    #[test]
    fn test_malformed_manifest_never_touches_store() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join(manifest::MANIFEST_FILE), "garbage").unwrap();

        let root = SyncRoot::new(tmp.path());
        let mut store = Store::open_memory().unwrap();
        assert!(root.import(&mut store).is_err());
        assert!(store.synced_chunk_ids().unwrap().is_empty());
    }

    #[test]
    fn test_status_counts() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = SyncRoot::new(tmp.path());

        let mut x = seeded_store();
        root.export(&mut x, "alice", None).unwrap();

        // Exporter already materialized its own chunk.
        let status = root.status(&x).unwrap();
        assert_eq!(status.remote_chunks, 1);
        assert_eq!(status.local_chunks, 1);
        assert_eq!(status.pending_import, 0);

        // A fresh store sees one pending chunk.
        let y = Store::open_memory().unwrap();
        let status = root.status(&y).unwrap();
        assert_eq!(status.local_chunks, 0);
        assert_eq!(status.pending_import, 1);
    }
}
