//! Chunk files: content-addressed, gzipped JSONL.
//!
//! A chunk is one export's delta, serialized as JSON lines (one tagged
//! record per line, sessions first, then observations, then prompts) and
//! gzipped. The chunk id is the first 8 hex characters of the sha256 of
//! the *uncompressed* bytes, so identical content always dedups to the
//! same id regardless of compression settings.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::model::{Observation, Prompt, Session, Snapshot};

/// Subdirectory of the sync root holding chunk files.
pub const CHUNKS_DIR: &str = "chunks";

/// Hex characters of sha256 kept as the chunk id.
const ID_LEN: usize = 8;

/// One line of a chunk file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum ChunkRecord {
    Session(Session),
    Observation(Observation),
    Prompt(Prompt),
}

/// Compute a chunk id: `hex(sha256(bytes))[0..8]`.
#[must_use]
pub fn chunk_id(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let hex = format!("{digest:x}");
    hex[..ID_LEN].to_string()
}

/// Serialize a delta snapshot to canonical JSONL bytes.
///
/// Record order is fixed (sessions, observations, prompts; each in
/// snapshot order) so equal content always yields equal bytes.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode(delta: &Snapshot) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for session in &delta.sessions {
        serde_json::to_writer(&mut out, &ChunkRecord::Session(session.clone()))?;
        out.push(b'\n');
    }
    for obs in &delta.observations {
        serde_json::to_writer(&mut out, &ChunkRecord::Observation(obs.clone()))?;
        out.push(b'\n');
    }
    for prompt in &delta.prompts {
        serde_json::to_writer(&mut out, &ChunkRecord::Prompt(prompt.clone()))?;
        out.push(b'\n');
    }
    Ok(out)
}

/// Parse chunk bytes back into a snapshot.
///
/// # Errors
///
/// Returns [`Error::MalformedChunk`] naming the failing id and line.
pub fn decode(id: &str, bytes: &[u8]) -> Result<Snapshot> {
    let text = std::str::from_utf8(bytes).map_err(|e| Error::MalformedChunk {
        chunk_id: id.to_string(),
        message: format!("not utf-8: {e}"),
    })?;

    let mut snapshot = Snapshot::default();
    for (line_no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: ChunkRecord =
            serde_json::from_str(line).map_err(|e| Error::MalformedChunk {
                chunk_id: id.to_string(),
                message: format!("line {}: {e}", line_no + 1),
            })?;
        match record {
            ChunkRecord::Session(s) => snapshot.sessions.push(s),
            ChunkRecord::Observation(o) => snapshot.observations.push(o),
            ChunkRecord::Prompt(p) => snapshot.prompts.push(p),
        }
    }
    Ok(snapshot)
}

/// Path of a chunk file inside the sync root.
#[must_use]
pub fn chunk_path(sync_dir: &Path, id: &str) -> PathBuf {
    sync_dir.join(CHUNKS_DIR).join(format!("{id}.jsonl.gz"))
}

/// Write a chunk file (gzipped, write-then-rename).
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write(sync_dir: &Path, id: &str, bytes: &[u8]) -> Result<()> {
    let path = chunk_path(sync_dir, id);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("gz.tmp");

    {
        let file = File::create(&tmp)?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(bytes)?;
        let file = encoder.finish()?;
        file.sync_all()?;
    }
    fs::rename(&tmp, &path)?;

    Ok(())
}

/// Read and decompress a chunk file.
///
/// Returns `None` when the file is missing; a teammate may have gc'd it
/// locally, and import tolerates that as a skip.
///
/// # Errors
///
/// Returns an error on I/O or decompression failure.
pub fn read(sync_dir: &Path, id: &str) -> Result<Option<Vec<u8>>> {
    let path = chunk_path(sync_dir, id);
    if !path.exists() {
        return Ok(None);
    }

    let file = File::open(&path)?;
    let mut decoder = GzDecoder::new(file);
    let mut bytes = Vec::new();
    decoder
        .read_to_end(&mut bytes)
        .map_err(|e| Error::MalformedChunk {
            chunk_id: id.to_string(),
            message: format!("decompression failed: {e}"),
        })?;
    Ok(Some(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Scope;

    fn sample_snapshot() -> Snapshot {
        Snapshot {
            version: 1,
            exported_at: "2026-03-01 12:00:00".into(),
            sessions: vec![Session {
                id: "s1".into(),
                project: "p".into(),
                directory: Some("/tmp".into()),
                started_at: "2026-03-01 11:00:00".into(),
                ended_at: None,
                summary: None,
            }],
            observations: vec![Observation {
                id: 1,
                session_id: "s1".into(),
                kind: "decision".into(),
                title: "t".into(),
                content: "c".into(),
                project: Some("p".into()),
                scope: Scope::Project,
                topic_key: Some("decision/t".into()),
                tool_name: None,
                revision_count: 1,
                duplicate_count: 1,
                created_at: "2026-03-01 11:30:00".into(),
                updated_at: "2026-03-01 11:30:00".into(),
            }],
            prompts: Vec::new(),
        }
    }

    #[test]
    fn test_chunk_id_is_8_hex() {
        let id = chunk_id(b"hello");
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_chunk_id_deterministic() {
        assert_eq!(chunk_id(b"same"), chunk_id(b"same"));
        assert_ne!(chunk_id(b"same"), chunk_id(b"different"));
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let snapshot = sample_snapshot();
        let bytes = encode(&snapshot).unwrap();
        let id = chunk_id(&bytes);

        let decoded = decode(&id, &bytes).unwrap();
        assert_eq!(decoded.sessions, snapshot.sessions);
        assert_eq!(decoded.observations, snapshot.observations);
        assert!(decoded.prompts.is_empty());
    }

    #[test]
    fn test_encode_is_deterministic() {
        let snapshot = sample_snapshot();
        assert_eq!(encode(&snapshot).unwrap(), encode(&snapshot).unwrap());
    }

    #[test]
    fn test_record_tag_does_not_clash_with_type_field() {
        let bytes = encode(&sample_snapshot()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let obs_line = text.lines().nth(1).unwrap();
        let value: serde_json::Value = serde_json::from_str(obs_line).unwrap();
        assert_eq!(value["record"], "observation");
        assert_eq!(value["type"], "decision");
    }

    #[test]
    fn test_decode_malformed_names_line() {
        let err = decode("deadbeef", b"{\"record\":\"session\"\n").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("deadbeef"));
        assert!(msg.contains("line 1"));
    }

    #[test]
    fn test_write_read_gzip_round_trip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let bytes = encode(&sample_snapshot()).unwrap();
        let id = chunk_id(&bytes);

        write(tmp.path(), &id, &bytes).unwrap();
        let read_back = read(tmp.path(), &id).unwrap().unwrap();
        assert_eq!(read_back, bytes);

        // File on disk is actually gzipped (magic bytes).
        let raw = std::fs::read(chunk_path(tmp.path(), &id)).unwrap();
        assert_eq!(&raw[..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn test_read_missing_chunk_is_none() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(read(tmp.path(), "cafef00d").unwrap().is_none());
    }
}
