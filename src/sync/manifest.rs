//! Sync manifest: the append-only index of known chunks.
//!
//! `manifest.json` is small, line-diffable, and only ever gains entries,
//! which keeps it merge-friendly in git. Writes go through a
//! write-then-rename so a concurrent reader never observes a torn file.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Manifest file name inside the sync root.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Current manifest format version.
pub const MANIFEST_VERSION: u32 = 1;

/// Index of every chunk ever exported at this sync root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    #[serde(default)]
    pub chunks: Vec<ChunkEntry>,
}

/// One exported chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkEntry {
    /// 8-hex prefix of the sha256 of the chunk bytes.
    pub id: String,
    /// Who exported the chunk.
    pub created_by: String,
    /// RFC3339 UTC export time; doubles as the incremental cutoff.
    pub created_at: String,
    /// Session rows in the chunk.
    pub sessions: usize,
    /// Observation rows in the chunk.
    pub memories: usize,
    /// Prompt rows in the chunk.
    pub prompts: usize,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION,
            chunks: Vec::new(),
        }
    }
}

impl Manifest {
    /// Load the manifest from a sync root.
    ///
    /// A missing file yields an empty manifest; a malformed one is an
    /// error (the store is never touched in that case).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sync`] on unreadable or malformed content.
    pub fn load(sync_dir: &Path) -> Result<Self> {
        let path = sync_dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(&path)?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::Sync(format!("malformed manifest {}: {e}", path.display())))
    }

    /// Write the manifest back atomically (write-then-rename).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, sync_dir: &Path) -> Result<()> {
        fs::create_dir_all(sync_dir)?;
        let path = sync_dir.join(MANIFEST_FILE);
        let tmp = sync_dir.join(format!("{MANIFEST_FILE}.tmp"));

        {
            let file = File::create(&tmp)?;
            let mut writer = std::io::BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, self)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &path)?;

        Ok(())
    }

    /// Most recent `created_at` across all entries (RFC3339 compares
    /// lexicographically in UTC). `None` on the first export.
    #[must_use]
    pub fn latest_created_at(&self) -> Option<&str> {
        self.chunks
            .iter()
            .map(|c| c.created_at.as_str())
            .max()
    }

    /// Whether a chunk id is already indexed.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.chunks.iter().any(|c| c.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_yields_empty() {
        let tmp = tempfile::TempDir::new().unwrap();
        let manifest = Manifest::load(tmp.path()).unwrap();
        assert_eq!(manifest.version, MANIFEST_VERSION);
        assert!(manifest.chunks.is_empty());
    }

    #[test]
    fn test_save_load_round_trip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut manifest = Manifest::default();
        manifest.chunks.push(ChunkEntry {
            id: "a1b2c3d4".into(),
            created_by: "alice".into(),
            created_at: "2026-03-01T12:00:00Z".into(),
            sessions: 1,
            memories: 2,
            prompts: 0,
        });
        manifest.save(tmp.path()).unwrap();

        let loaded = Manifest::load(tmp.path()).unwrap();
        assert_eq!(loaded.chunks.len(), 1);
        assert_eq!(loaded.chunks[0].id, "a1b2c3d4");
        assert!(loaded.contains("a1b2c3d4"));
        assert!(!loaded.contains("ffffffff"));
    }

    #[test]
    fn test_malformed_manifest_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join(MANIFEST_FILE), "{not json").unwrap();
        assert!(Manifest::load(tmp.path()).is_err());
    }

    #[test]
    fn test_latest_created_at_is_lexicographic_max() {
        let mut manifest = Manifest::default();
        for ts in ["2026-01-02T00:00:00Z", "2026-03-01T00:00:00Z", "2026-02-01T00:00:00Z"] {
            manifest.chunks.push(ChunkEntry {
                id: format!("{:08x}", manifest.chunks.len()),
                created_by: "x".into(),
                created_at: ts.into(),
                sessions: 0,
                memories: 0,
                prompts: 0,
            });
        }
        assert_eq!(manifest.latest_created_at(), Some("2026-03-01T00:00:00Z"));
    }

    #[test]
    fn test_no_tmp_file_left_behind() {
        let tmp = tempfile::TempDir::new().unwrap();
        Manifest::default().save(tmp.path()).unwrap();
        assert!(tmp.path().join(MANIFEST_FILE).exists());
        assert!(!tmp.path().join("manifest.json.tmp").exists());
    }
}
