//! Registry-level operations: status, retrieval by reference, re-indexing.

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::path::{Component, Path};

use super::indexer::{self, read_archive_entry};
use super::store::{ChunkRecord, Origin, Store};
use crate::error::{Error, Result};

/// Per-source status line
#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub source_id: String,
    pub origin: Origin,
    pub tags: BTreeSet<String>,
    pub updated_at: DateTime<Utc>,
    pub file_count: usize,
    /// Counted from the chunk store, not taken from the manifest
    pub chunk_count: usize,
}

/// Raw file content; binary files travel base64-encoded
#[derive(Debug, Clone, Serialize)]
pub struct FileContent {
    pub source_id: String,
    pub path: String,
    pub encoding: &'static str,
    pub size_bytes: usize,
    pub content: String,
}

/// Outcome of re-indexing one source
#[derive(Debug, Clone, Serialize)]
pub struct ReindexResult {
    pub source_id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

pub fn status(store: &Store) -> Result<Vec<SourceStatus>> {
    let registry = store.load_registry()?;
    registry
        .into_values()
        .map(|manifest| {
            let chunk_count = store.count_chunks(&manifest.source_id)?;
            Ok(SourceStatus {
                source_id: manifest.source_id,
                origin: manifest.origin,
                tags: manifest.tags,
                updated_at: manifest.updated_at,
                file_count: manifest.file_count,
                chunk_count,
            })
        })
        .collect()
}

/// Scan every source for the chunk with this fingerprint.
pub fn get_chunk(store: &Store, chunk_id: &str) -> Result<ChunkRecord> {
    let registry = store.load_registry()?;
    for source_id in registry.keys() {
        if let Some(chunk) = store
            .read_chunks(source_id)?
            .into_iter()
            .find(|c| c.id == chunk_id)
        {
            return Ok(chunk);
        }
    }
    Err(Error::not_found(format!("chunk '{}'", chunk_id)))
}

/// Reject absolute paths and parent-directory hops.
pub fn validate_relative_path(path: &str) -> Result<String> {
    let trimmed = path.trim().replace('\\', "/");
    if trimmed.is_empty() {
        return Err(Error::invalid("path must not be empty"));
    }
    let escapes = Path::new(&trimmed)
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(Error::invalid(format!(
            "path '{}' must be relative to the source root without '..'",
            path
        )));
    }
    Ok(trimmed.trim_start_matches("./").to_string())
}

/// Read one file of a source from its recorded origin.
pub fn get_file(store: &Store, source_id: &str, path: &str) -> Result<FileContent> {
    let path = validate_relative_path(path)?;
    let manifest = store.manifest(source_id)?;

    let bytes = match &manifest.origin {
        Origin::LocalDirectory { path: root } => {
            let full = root.join(&path);
            if !full.is_file() {
                return Err(Error::not_found(format!(
                    "file '{}' in source '{}'",
                    path, source_id
                )));
            }
            let inside = full.canonicalize()?.starts_with(root.canonicalize()?);
            if !inside {
                return Err(Error::invalid(format!(
                    "path '{}' resolves outside the root of source '{}'",
                    path, source_id
                )));
            }
            std::fs::read(full)?
        }
        Origin::Archive { .. } => {
            let archive = store.read_archive(source_id)?;
            read_archive_entry(&archive, &path).map_err(|e| match e {
                Error::NotFound(_) => {
                    Error::not_found(format!("file '{}' in source '{}'", path, source_id))
                }
                other => other,
            })?
        }
    };

    let size_bytes = bytes.len();
    let (encoding, content) = match String::from_utf8(bytes) {
        Ok(text) => ("utf-8", text),
        Err(e) => (
            "base64",
            base64::engine::general_purpose::STANDARD.encode(e.into_bytes()),
        ),
    };
    Ok(FileContent {
        source_id: source_id.to_string(),
        path,
        encoding,
        size_bytes,
        content,
    })
}

/// Re-ingest every registered source from its recorded origin; one failure
/// does not stop the others.
pub fn reindex_all(store: &Store) -> Result<Vec<ReindexResult>> {
    let registry = store.load_registry()?;
    let results = registry
        .values()
        .map(|manifest| {
            let outcome = indexer::request_from_manifest(store, manifest)
                .and_then(|request| indexer::ingest(store, request));
            match outcome {
                Ok(outcome) => ReindexResult {
                    source_id: manifest.source_id.clone(),
                    ok: true,
                    file_count: Some(outcome.manifest.file_count),
                    chunk_count: Some(outcome.manifest.chunk_count),
                    error: None,
                },
                Err(e) => {
                    tracing::warn!(source = %manifest.source_id, error = %e, "re-index failed");
                    ReindexResult {
                        source_id: manifest.source_id.clone(),
                        ok: false,
                        file_count: None,
                        chunk_count: None,
                        error: Some(e.to_json()),
                    }
                }
            }
        })
        .collect();
    Ok(results)
}

/// Registry as JSON, served as the `kb://sources` resource.
pub fn sources_json(store: &Store) -> Result<Value> {
    let registry = store.load_registry()?;
    Ok(json!({
        "root": store.root(),
        "count": registry.len(),
        "sources": registry,
    }))
}
