//! Flat-file persistence for the knowledge base.
//!
//! ```text
//! <root>/registry.json               source id -> manifest, rewritten on every update
//! <root>/sources/<id>/manifest.json  manifest of one source
//! <root>/sources/<id>/chunks.jsonl   one chunk record per line
//! <root>/archives/<id>.zip           retained archive payload
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Where a source's files come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Origin {
    /// Local directory, re-read on every ingestion
    LocalDirectory { path: PathBuf },
    /// ZIP archive kept under `archives/<id>.zip`
    Archive {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        sha256: String,
    },
}

impl Origin {
    pub fn kind(&self) -> &'static str {
        match self {
            Origin::LocalDirectory { .. } => "local_directory",
            Origin::Archive { .. } => "archive",
        }
    }
}

/// Persisted metadata of one ingested source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub source_id: String,
    pub origin: Origin,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Extension allow-list used for the ingestion, replayed by re-indexing
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub max_files: Option<usize>,
    pub file_count: usize,
    pub chunk_count: usize,
    pub updated_at: DateTime<Utc>,
}

/// One persisted chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub source_id: String,
    pub path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub extension: String,
    pub text: String,
}

pub type Registry = BTreeMap<String, Manifest>;

/// Handle on the on-disk store
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn registry_path(&self) -> PathBuf {
        self.root.join("registry.json")
    }

    fn source_dir(&self, source_id: &str) -> PathBuf {
        self.root.join("sources").join(source_id)
    }

    fn chunks_path(&self, source_id: &str) -> PathBuf {
        self.source_dir(source_id).join("chunks.jsonl")
    }

    fn manifest_path(&self, source_id: &str) -> PathBuf {
        self.source_dir(source_id).join("manifest.json")
    }

    pub fn archive_path(&self, source_id: &str) -> PathBuf {
        self.root.join("archives").join(format!("{}.zip", source_id))
    }

    /// Load the registry; a missing file is an empty registry.
    pub fn load_registry(&self) -> Result<Registry> {
        let path = self.registry_path();
        if !path.exists() {
            return Ok(Registry::new());
        }
        let content = fs::read_to_string(&path)?;
        if content.trim().is_empty() {
            return Ok(Registry::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    /// Rewrite the whole registry.
    pub fn save_registry(&self, registry: &Registry) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        let json = serde_json::to_vec_pretty(registry)?;
        write_atomically(&self.registry_path(), &json)
    }

    /// Replace the registry entry for `manifest.source_id` (read-modify-write).
    pub fn upsert_manifest(&self, manifest: &Manifest) -> Result<()> {
        let mut registry = self.load_registry()?;
        registry.insert(manifest.source_id.clone(), manifest.clone());
        self.save_registry(&registry)
    }

    pub fn manifest(&self, source_id: &str) -> Result<Manifest> {
        self.load_registry()?
            .remove(source_id)
            .ok_or_else(|| Error::not_found(format!("source '{}'", source_id)))
    }

    pub fn write_manifest(&self, manifest: &Manifest) -> Result<()> {
        fs::create_dir_all(self.source_dir(&manifest.source_id))?;
        let json = serde_json::to_vec_pretty(manifest)?;
        write_atomically(&self.manifest_path(&manifest.source_id), &json)
    }

    /// Drop every persisted chunk of `source_id` and write `chunks` in their place.
    pub fn replace_chunks(&self, source_id: &str, chunks: &[ChunkRecord]) -> Result<()> {
        let dir = self.source_dir(source_id);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;

        let file = fs::File::create(self.chunks_path(source_id))?;
        let mut writer = BufWriter::new(file);
        for chunk in chunks {
            serde_json::to_writer(&mut writer, chunk)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Read every chunk of `source_id`. Missing store files read as no chunks;
    /// unparsable lines are skipped.
    pub fn read_chunks(&self, source_id: &str) -> Result<Vec<ChunkRecord>> {
        let path = self.chunks_path(source_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(fs::File::open(&path)?);
        let mut chunks = Vec::new();
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ChunkRecord>(&line) {
                Ok(chunk) => chunks.push(chunk),
                Err(e) => {
                    tracing::warn!(source = %source_id, line = n + 1, error = %e, "skipping corrupt chunk record")
                }
            }
        }
        Ok(chunks)
    }

    /// Number of persisted chunks, counted from the chunk file.
    pub fn count_chunks(&self, source_id: &str) -> Result<usize> {
        Ok(self.read_chunks(source_id)?.len())
    }

    pub fn save_archive(&self, source_id: &str, bytes: &[u8]) -> Result<()> {
        let path = self.archive_path(source_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        write_atomically(&path, bytes)
    }

    pub fn read_archive(&self, source_id: &str) -> Result<Vec<u8>> {
        let path = self.archive_path(source_id);
        if !path.exists() {
            return Err(Error::not_found(format!(
                "archive payload for source '{}'",
                source_id
            )));
        }
        Ok(fs::read(path)?)
    }

    pub fn remove_archive(&self, source_id: &str) -> Result<()> {
        let path = self.archive_path(source_id);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manifest(id: &str, chunks: usize) -> Manifest {
        Manifest {
            source_id: id.to_string(),
            origin: Origin::LocalDirectory {
                path: PathBuf::from("/tmp/docs"),
            },
            tags: ["docs".to_string()].into_iter().collect(),
            extensions: vec!["md".to_string()],
            max_files: None,
            file_count: 1,
            chunk_count: chunks,
            updated_at: Utc::now(),
        }
    }

    fn chunk(source: &str, id: &str) -> ChunkRecord {
        ChunkRecord {
            id: id.to_string(),
            source_id: source.to_string(),
            path: "README.md".to_string(),
            start_line: 1,
            end_line: 2,
            extension: "md".to_string(),
            text: "hello\nworld".to_string(),
        }
    }

    #[test]
    fn test_missing_registry_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path());
        assert!(store.load_registry().unwrap().is_empty());
        assert!(store.read_chunks("nothing").unwrap().is_empty());
    }

    #[test]
    fn test_upsert_replaces_entry() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path());

        store.upsert_manifest(&manifest("a", 1)).unwrap();
        store.upsert_manifest(&manifest("b", 2)).unwrap();
        store.upsert_manifest(&manifest("a", 5)).unwrap();

        let registry = store.load_registry().unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry["a"].chunk_count, 5);
        assert_eq!(store.manifest("b").unwrap().chunk_count, 2);
        assert_eq!(store.manifest("zzz").unwrap_err().kind(), "not_found");
    }

    #[test]
    fn test_replace_chunks_discards_previous_set() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path());

        store
            .replace_chunks("s", &[chunk("s", "old-1"), chunk("s", "old-2")])
            .unwrap();
        assert_eq!(store.count_chunks("s").unwrap(), 2);

        store.replace_chunks("s", &[chunk("s", "new-1")]).unwrap();
        let chunks = store.read_chunks("s").unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "new-1");
    }

    #[test]
    fn test_corrupt_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path());
        store.replace_chunks("s", &[chunk("s", "c1")]).unwrap();

        let path = dir.path().join("sources/s/chunks.jsonl");
        let mut content = fs::read_to_string(&path).unwrap();
        content.push_str("{not json\n");
        fs::write(&path, content).unwrap();

        assert_eq!(store.count_chunks("s").unwrap(), 1);
    }

    #[test]
    fn test_origin_serialization_is_tagged() {
        let origin = Origin::Archive {
            url: None,
            sha256: "ab".to_string(),
        };
        let value = serde_json::to_value(&origin).unwrap();
        assert_eq!(value["type"], "archive");
        assert!(value.get("url").is_none());
        assert_eq!(origin.kind(), "archive");
    }

    #[test]
    fn test_archive_roundtrip_and_missing() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path());
        assert_eq!(store.read_archive("x").unwrap_err().kind(), "not_found");

        store.save_archive("x", b"PK").unwrap();
        assert_eq!(store.read_archive("x").unwrap(), b"PK".to_vec());
        store.remove_archive("x").unwrap();
        assert!(!store.archive_path("x").exists());
    }
}
