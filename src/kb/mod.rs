//! Local knowledge base of chunked text files.
//!
//! Sources (directories or ZIP archives) are split into line-range chunks,
//! fingerprinted, and persisted as flat files under one root directory.
//! Search is a plain lexical scan over the persisted chunks.

pub mod chunker;
pub mod indexer;
pub mod registry;
pub mod search;
pub mod store;

use serde_json::Value;
use std::path::PathBuf;

pub use indexer::{IngestOutcome, IngestRequest, IngestRoot, SkippedFile};
pub use registry::{FileContent, ReindexResult, SourceStatus};
pub use search::{SearchHit, SearchQuery};
pub use store::{ChunkRecord, Manifest, Origin, Store};

use crate::error::Result;

/// Facade over the store with the configured ingestion defaults
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    store: Store,
    default_extensions: Vec<String>,
    max_files: usize,
}

impl KnowledgeBase {
    pub fn new(root: impl Into<PathBuf>, default_extensions: Vec<String>, max_files: usize) -> Self {
        Self {
            store: Store::new(root),
            default_extensions,
            max_files,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Ingest a source. Empty extension lists take the configured defaults and
    /// the file cap never exceeds the configured maximum.
    pub fn ingest(&self, mut request: IngestRequest) -> Result<IngestOutcome> {
        if request.extensions.is_empty() {
            request.extensions = self.default_extensions.clone();
        }
        request.max_files = Some(
            request
                .max_files
                .map_or(self.max_files, |cap| cap.min(self.max_files)),
        );
        indexer::ingest(&self.store, request)
    }

    pub fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>> {
        search::search(&self.store, query)
    }

    pub fn get_chunk(&self, chunk_id: &str) -> Result<ChunkRecord> {
        registry::get_chunk(&self.store, chunk_id)
    }

    pub fn get_file(&self, source_id: &str, path: &str) -> Result<FileContent> {
        registry::get_file(&self.store, source_id, path)
    }

    pub fn status(&self) -> Result<Vec<SourceStatus>> {
        registry::status(&self.store)
    }

    pub fn reindex_all(&self) -> Result<Vec<ReindexResult>> {
        registry::reindex_all(&self.store)
    }

    pub fn sources_json(&self) -> Result<Value> {
        registry::sources_json(&self.store)
    }
}
