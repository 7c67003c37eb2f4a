//! Knowledge-base MCP tools

use base64::Engine;
use rmcp::model::{CallToolResult, Tool};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::kb::{IngestRequest, IngestRoot, KnowledgeBase, SearchQuery};
use crate::response;
use crate::schema::{self, invalid_params, parse_params, EmptyParams, JsonObject};

type ToolResult = std::result::Result<CallToolResult, rmcp::ErrorData>;

/// Largest archive accepted inline or by URL
pub const MAX_ARCHIVE_BYTES: usize = 64 * 1024 * 1024;

/// Shared state for knowledge-base tools
#[derive(Clone)]
pub struct KbContext {
    pub kb: Arc<KnowledgeBase>,
    http: reqwest::Client,
}

impl KbContext {
    pub fn new(kb: KnowledgeBase, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("chain-mcp/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            kb: Arc::new(kb),
            http,
        })
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct KbIngestParams {
    /// Source identifier; derived from the directory name or archive hash when omitted
    #[serde(default)]
    pub source_id: Option<String>,
    /// Local directory to ingest
    #[serde(default)]
    pub path: Option<String>,
    /// ZIP archive, base64-encoded
    #[serde(default)]
    pub archive_base64: Option<String>,
    /// URL of a ZIP archive to download
    #[serde(default)]
    pub archive_url: Option<String>,
    /// File extensions to include (e.g. ["md", "sol"]); defaults from the config
    #[serde(default)]
    pub extensions: Option<Vec<String>>,
    /// Maximum number of files to ingest
    #[serde(default)]
    pub max_files: Option<usize>,
    /// Free-form tags stored with the source
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct KbSearchParams {
    /// Whitespace-separated search terms
    pub query: String,
    /// Number of results (default 10, max 50)
    #[serde(default)]
    pub top_k: Option<usize>,
    /// Restrict to these source ids
    #[serde(default)]
    pub source_ids: Option<Vec<String>>,
    /// Only chunks whose path starts with this prefix
    #[serde(default)]
    pub path_prefix: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct KbGetChunkParams {
    /// Chunk fingerprint returned by kb_search
    pub chunk_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct KbGetFileParams {
    pub source_id: String,
    /// Path relative to the source root
    pub path: String,
}

/// Get all knowledge-base tools
pub fn get_kb_tools() -> Vec<Tool> {
    vec![
        Tool::new(
            "kb_ingest".to_string(),
            "Ingest a local directory or a ZIP archive (base64 or URL) into the knowledge base. Files are split into line-range chunks; re-ingesting an existing source id replaces it completely. Unreadable or non-UTF-8 files are skipped and listed.".to_string(),
            schema::input_schema::<KbIngestParams>(),
        ),
        Tool::new(
            "kb_search".to_string(),
            "Search ingested chunks by counting occurrences of the query terms (case-insensitive). Returns ranked snippets with chunk ids and line ranges.".to_string(),
            schema::input_schema::<KbSearchParams>(),
        ),
        Tool::new(
            "kb_get_chunk".to_string(),
            "Fetch the full text of one chunk by its id.".to_string(),
            schema::input_schema::<KbGetChunkParams>(),
        ),
        Tool::new(
            "kb_get_file".to_string(),
            "Fetch a whole file of an ingested source by its relative path.".to_string(),
            schema::input_schema::<KbGetFileParams>(),
        ),
        Tool::new(
            "kb_status".to_string(),
            "List ingested sources with tags, last update time, file count and current chunk count.".to_string(),
            schema::input_schema::<EmptyParams>(),
        ),
        Tool::new(
            "kb_reindex_all".to_string(),
            "Re-ingest every registered source from its recorded origin. Failures are reported per source.".to_string(),
            schema::input_schema::<EmptyParams>(),
        ),
    ]
}

/// Dispatch a knowledge-base tool call. Returns `None` for names this module does not own.
pub async fn dispatch(ctx: &KbContext, name: &str, args: &Option<JsonObject>) -> Option<ToolResult> {
    let result = match name {
        "kb_ingest" => handle_kb_ingest(ctx, args).await,
        "kb_search" => handle_kb_search(ctx, args).await,
        "kb_get_chunk" => handle_kb_get_chunk(ctx, args).await,
        "kb_get_file" => handle_kb_get_file(ctx, args).await,
        "kb_status" => handle_kb_status(ctx).await,
        "kb_reindex_all" => handle_kb_reindex_all(ctx).await,
        _ => return None,
    };
    Some(result)
}

/// Run store work off the async runtime and shape its outcome.
async fn run_blocking<T, F>(work: F) -> ToolResult
where
    T: Serialize + Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let outcome = tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| rmcp::ErrorData::internal_error(format!("Task error: {}", e), None))?;
    Ok(response::from_result(outcome))
}

enum RootSpec {
    Directory(PathBuf),
    Inline(String),
    Url(String),
}

fn root_spec(params: &KbIngestParams) -> Result<RootSpec> {
    let given = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
    match (
        given(&params.path),
        given(&params.archive_base64),
        given(&params.archive_url),
    ) {
        (Some(path), None, None) => Ok(RootSpec::Directory(PathBuf::from(path))),
        (None, Some(data), None) => Ok(RootSpec::Inline(data)),
        (None, None, Some(url)) => {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(Error::invalid(format!("archive_url '{}' must be an http(s) URL", url)));
            }
            Ok(RootSpec::Url(url))
        }
        (None, None, None) => Err(Error::invalid(
            "provide one of 'path', 'archive_base64' or 'archive_url'",
        )),
        _ => Err(Error::invalid(
            "'path', 'archive_base64' and 'archive_url' are mutually exclusive",
        )),
    }
}

fn decode_archive(data: &str) -> Result<Vec<u8>> {
    let compact: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| Error::invalid(format!("'archive_base64' is not valid base64: {}", e)))?;
    check_archive_size(bytes.len())?;
    Ok(bytes)
}

fn check_archive_size(len: usize) -> Result<()> {
    if len > MAX_ARCHIVE_BYTES {
        return Err(Error::invalid(format!(
            "archive is {} bytes; the limit is {} bytes",
            len, MAX_ARCHIVE_BYTES
        )));
    }
    Ok(())
}

async fn fetch_archive(http: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    tracing::info!(url, "downloading archive");
    let response = http.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::upstream(format!(
            "archive download from {} returned HTTP {}",
            url,
            status.as_u16()
        )));
    }
    if let Some(len) = response.content_length() {
        check_archive_size(len as usize)?;
    }
    let bytes = response.bytes().await?;
    check_archive_size(bytes.len())?;
    Ok(bytes.to_vec())
}

/// Handle kb_ingest tool call
pub async fn handle_kb_ingest(ctx: &KbContext, args: &Option<JsonObject>) -> ToolResult {
    let params: KbIngestParams = parse_params(args)?;
    let spec = root_spec(&params).map_err(invalid_params)?;

    let root = match spec {
        RootSpec::Directory(path) => IngestRoot::Directory(path),
        RootSpec::Inline(data) => IngestRoot::Archive {
            bytes: decode_archive(&data).map_err(invalid_params)?,
            url: None,
        },
        RootSpec::Url(url) => match fetch_archive(&ctx.http, &url).await {
            Ok(bytes) => IngestRoot::Archive {
                bytes,
                url: Some(url),
            },
            Err(e) => return Ok(response::error_result(&e)),
        },
    };

    let request = IngestRequest {
        source_id: params.source_id,
        root,
        extensions: params.extensions.unwrap_or_default(),
        max_files: params.max_files,
        tags: params.tags.unwrap_or_default().into_iter().collect(),
    };
    let kb = ctx.kb.clone();
    run_blocking(move || kb.ingest(request)).await
}

/// Handle kb_search tool call
pub async fn handle_kb_search(ctx: &KbContext, args: &Option<JsonObject>) -> ToolResult {
    let params: KbSearchParams = parse_params(args)?;
    if params.query.trim().is_empty() {
        return Err(rmcp::ErrorData::invalid_params("'query' must not be empty", None));
    }
    let query = SearchQuery {
        query: params.query,
        top_k: params.top_k,
        source_ids: params.source_ids,
        path_prefix: params.path_prefix,
    };
    let kb = ctx.kb.clone();
    run_blocking(move || {
        let hits = kb.search(&query)?;
        Ok(serde_json::json!({
            "query": query.query,
            "count": hits.len(),
            "results": hits,
        }))
    })
    .await
}

/// Handle kb_get_chunk tool call
pub async fn handle_kb_get_chunk(ctx: &KbContext, args: &Option<JsonObject>) -> ToolResult {
    let params: KbGetChunkParams = parse_params(args)?;
    let kb = ctx.kb.clone();
    run_blocking(move || kb.get_chunk(params.chunk_id.trim())).await
}

/// Handle kb_get_file tool call
pub async fn handle_kb_get_file(ctx: &KbContext, args: &Option<JsonObject>) -> ToolResult {
    let params: KbGetFileParams = parse_params(args)?;
    let kb = ctx.kb.clone();
    run_blocking(move || kb.get_file(params.source_id.trim(), &params.path)).await
}

/// Handle kb_status tool call
pub async fn handle_kb_status(ctx: &KbContext) -> ToolResult {
    let kb = ctx.kb.clone();
    run_blocking(move || {
        let sources = kb.status()?;
        Ok(serde_json::json!({
            "root": kb.store().root(),
            "count": sources.len(),
            "sources": sources,
        }))
    })
    .await
}

/// Handle kb_reindex_all tool call
pub async fn handle_kb_reindex_all(ctx: &KbContext) -> ToolResult {
    let kb = ctx.kb.clone();
    run_blocking(move || {
        let results = kb.reindex_all()?;
        let failed = results.iter().filter(|r| !r.ok).count();
        Ok(serde_json::json!({
            "total": results.len(),
            "failed": failed,
            "results": results,
        }))
    })
    .await
}
