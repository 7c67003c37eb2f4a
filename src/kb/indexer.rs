//! Source ingestion: enumerate files, chunk them, fingerprint the chunks and
//! persist the result.

use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::chunker;
use super::store::{ChunkRecord, Manifest, Origin, Store};
use crate::error::{Error, Result};

/// Extensions the indexer will ever read as text
pub const TEXT_EXTENSIONS: &[&str] = &[
    "md", "markdown", "mdx", "txt", "rst", "adoc", "sol", "vy", "rs", "ts", "tsx", "js", "jsx",
    "mjs", "py", "go", "java", "c", "h", "cpp", "hpp", "json", "toml", "yaml", "yml", "sh",
    "html", "css", "graphql", "proto", "cairo", "move",
];

/// Directories never descended into when walking a local source
const SKIPPED_DIRS: &[&str] = &[".git", "target", "node_modules", ".hg", ".svn"];

const MAX_SOURCE_ID_LEN: usize = 128;

/// What to ingest
#[derive(Debug, Clone)]
pub enum IngestRoot {
    Directory(PathBuf),
    Archive { bytes: Vec<u8>, url: Option<String> },
}

#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub source_id: Option<String>,
    pub root: IngestRoot,
    pub extensions: Vec<String>,
    pub max_files: Option<usize>,
    pub tags: BTreeSet<String>,
}

/// A file left out of the index, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

/// Batch outcome of one ingestion
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub manifest: Manifest,
    pub skipped: Vec<SkippedFile>,
}

/// Stable chunk identifier over owner, position and content.
pub fn fingerprint(source_id: &str, path: &str, start_line: usize, end_line: usize, text: &str) -> String {
    let text_hash = hex::encode(Sha256::digest(text.as_bytes()));
    let start = start_line.to_string();
    let end = end_line.to_string();
    let mut hasher = Sha256::new();
    for part in [source_id, path, start.as_str(), end.as_str(), text_hash.as_str()] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

/// Validate a caller-supplied source id.
pub fn validate_source_id(id: &str) -> Result<String> {
    let id = id.trim();
    let valid_chars = id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if id.is_empty() || id == "." || id == ".." || id.len() > MAX_SOURCE_ID_LEN || !valid_chars {
        return Err(Error::invalid(format!(
            "source id '{}' must be 1-{} characters of letters, digits, '.', '-' or '_'",
            id, MAX_SOURCE_ID_LEN
        )));
    }
    Ok(id.to_string())
}

fn sanitize_id(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .take(MAX_SOURCE_ID_LEN)
        .collect();
    let cleaned = cleaned.trim_matches(|c| c == '-' || c == '.').to_string();
    if cleaned.is_empty() {
        "source".to_string()
    } else {
        cleaned
    }
}

/// Lower-case and strip the leading dot; fall back to every text extension.
pub fn normalize_extensions(extensions: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = extensions
        .iter()
        .map(|e| e.trim().trim_start_matches('.').to_lowercase())
        .filter(|e| !e.is_empty())
        .collect();
    if normalized.is_empty() {
        normalized = TEXT_EXTENSIONS.iter().map(|e| e.to_string()).collect();
    }
    normalized.sort();
    normalized.dedup();
    normalized
}

fn extension_of(path: &str) -> String {
    Path::new(path)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn accepts(extensions: &[String], path: &str) -> bool {
    let ext = extension_of(path);
    !ext.is_empty() && TEXT_EXTENSIONS.contains(&ext.as_str()) && extensions.contains(&ext)
}

/// One candidate file: relative path plus its decoded text, or why it could not be read
type FileRead = (String, Result<String>);

fn decode(path: &str, bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|_| Error::Decode(format!("{} is not valid UTF-8", path)))
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn read_directory(root: &Path, extensions: &[String], max_files: Option<usize>) -> Vec<FileRead> {
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            e.depth() == 0 || !e.file_type().is_dir() || !SKIPPED_DIRS.iter().any(|d| name == *d)
        });

    let mut candidates = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = relative_path(root, entry.path());
        if accepts(extensions, &rel) {
            candidates.push((rel, entry.into_path()));
        }
    }
    candidates.sort();
    if let Some(cap) = max_files {
        candidates.truncate(cap);
    }

    candidates
        .into_iter()
        .map(|(rel, path)| {
            let text = std::fs::read(&path)
                .map_err(Error::from)
                .and_then(|bytes| decode(&rel, bytes));
            (rel, text)
        })
        .collect()
}

fn read_archive(bytes: &[u8], extensions: &[String], max_files: Option<usize>) -> Result<Vec<FileRead>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| Error::invalid(format!("archive payload is not a readable ZIP file: {}", e)))?;

    let mut files = Vec::new();
    let mut accepted = 0;
    for index in 0..archive.len() {
        if max_files.is_some_and(|cap| accepted >= cap) {
            break;
        }
        let mut entry = match archive.by_index(index) {
            Ok(entry) => entry,
            Err(e) => {
                files.push((format!("#{}", index), Err(Error::from(e))));
                continue;
            }
        };
        if entry.is_dir() || !accepts(extensions, entry.name()) {
            continue;
        }
        let Some(name) = entry.enclosed_name() else {
            files.push((
                entry.name().to_string(),
                Err(Error::invalid("entry path escapes the archive root")),
            ));
            continue;
        };
        let rel = relative_path(Path::new(""), &name);
        accepted += 1;
        let mut buf = Vec::new();
        let text = entry
            .read_to_end(&mut buf)
            .map_err(Error::from)
            .and_then(|_| decode(&rel, buf));
        files.push((rel, text));
    }
    Ok(files)
}

/// Open a stored archive and return one entry's bytes.
pub fn read_archive_entry(bytes: &[u8], path: &str) -> Result<Vec<u8>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let matches = entry
            .enclosed_name()
            .map(|name| relative_path(Path::new(""), &name) == path)
            .unwrap_or(false);
        if matches && !entry.is_dir() {
            let mut buf = Vec::new();
            entry.read_to_end(&mut buf)?;
            return Ok(buf);
        }
    }
    Err(Error::not_found(format!("file '{}' in archive", path)))
}

fn derive_source_id(root: &IngestRoot) -> Result<String> {
    match root {
        IngestRoot::Directory(path) => {
            let name = path
                .canonicalize()
                .ok()
                .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
                .ok_or_else(|| {
                    Error::invalid(format!(
                        "cannot derive a source id from '{}'; pass source_id",
                        path.display()
                    ))
                })?;
            Ok(sanitize_id(&name))
        }
        IngestRoot::Archive { bytes, .. } => {
            let digest = hex::encode(Sha256::digest(bytes));
            Ok(format!("archive-{}", &digest[..12]))
        }
    }
}

/// Ingest one source, replacing anything previously stored under its id.
pub fn ingest(store: &Store, request: IngestRequest) -> Result<IngestOutcome> {
    let source_id = match &request.source_id {
        Some(id) => validate_source_id(id)?,
        None => derive_source_id(&request.root)?,
    };
    let extensions = normalize_extensions(&request.extensions);

    let (origin, files) = match &request.root {
        IngestRoot::Directory(path) => {
            if !path.is_dir() {
                return Err(Error::invalid(format!(
                    "'{}' is not a directory",
                    path.display()
                )));
            }
            let root = path.canonicalize()?;
            let files = read_directory(&root, &extensions, request.max_files);
            (Origin::LocalDirectory { path: root }, files)
        }
        IngestRoot::Archive { bytes, url } => {
            let files = read_archive(bytes, &extensions, request.max_files)?;
            let origin = Origin::Archive {
                url: url.clone(),
                sha256: hex::encode(Sha256::digest(bytes)),
            };
            (origin, files)
        }
    };

    let mut records = Vec::new();
    let mut skipped = Vec::new();
    let mut file_count = 0;
    for (path, text) in files {
        match text {
            Ok(text) => {
                file_count += 1;
                let extension = extension_of(&path);
                for chunk in chunker::chunk_file(&text, &extension) {
                    records.push(ChunkRecord {
                        id: fingerprint(&source_id, &path, chunk.start_line, chunk.end_line, &chunk.text),
                        source_id: source_id.clone(),
                        path: path.clone(),
                        start_line: chunk.start_line,
                        end_line: chunk.end_line,
                        extension: extension.clone(),
                        text: chunk.text,
                    });
                }
            }
            Err(e) => {
                tracing::debug!(source = %source_id, path = %path, error = %e, "skipping file");
                skipped.push(SkippedFile {
                    path,
                    reason: e.to_string(),
                });
            }
        }
    }

    store.replace_chunks(&source_id, &records)?;
    match &request.root {
        IngestRoot::Archive { bytes, .. } => store.save_archive(&source_id, bytes)?,
        IngestRoot::Directory(_) => store.remove_archive(&source_id)?,
    }

    let manifest = Manifest {
        source_id: source_id.clone(),
        origin,
        tags: request.tags,
        extensions,
        max_files: request.max_files,
        file_count,
        chunk_count: records.len(),
        updated_at: Utc::now(),
    };
    store.write_manifest(&manifest)?;
    store.upsert_manifest(&manifest)?;

    tracing::info!(
        source = %source_id,
        origin = manifest.origin.kind(),
        files = file_count,
        chunks = manifest.chunk_count,
        skipped = skipped.len(),
        "ingested source"
    );

    Ok(IngestOutcome { manifest, skipped })
}

/// Rebuild the ingestion request that produced `manifest`.
pub fn request_from_manifest(store: &Store, manifest: &Manifest) -> Result<IngestRequest> {
    let root = match &manifest.origin {
        Origin::LocalDirectory { path } => IngestRoot::Directory(path.clone()),
        Origin::Archive { url, .. } => IngestRoot::Archive {
            bytes: store.read_archive(&manifest.source_id)?,
            url: url.clone(),
        },
    };
    Ok(IngestRequest {
        source_id: Some(manifest.source_id.clone()),
        root,
        extensions: manifest.extensions.clone(),
        max_files: manifest.max_files,
        tags: manifest.tags.clone(),
    })
}


#[cfg(test)]
mod tests {
    use super::test_support::zip_bytes;
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn dir_request(path: &Path, id: Option<&str>) -> IngestRequest {
        IngestRequest {
            source_id: id.map(str::to_string),
            root: IngestRoot::Directory(path.to_path_buf()),
            extensions: vec![],
            max_files: None,
            tags: BTreeSet::new(),
        }
    }

    #[test]
    fn test_fingerprint_sensitivity() {
        let base = fingerprint("s", "a.md", 1, 10, "hello world");
        assert_eq!(base, fingerprint("s", "a.md", 1, 10, "hello world"));
        assert_ne!(base, fingerprint("s", "a.md", 1, 10, "hello World"));
        assert_ne!(base, fingerprint("s", "b.md", 1, 10, "hello world"));
        assert_ne!(base, fingerprint("s", "a.md", 2, 10, "hello world"));
        assert_ne!(base, fingerprint("t", "a.md", 1, 10, "hello world"));
        assert_eq!(base.len(), 64);
    }

    #[test]
    fn test_validate_source_id() {
        assert_eq!(validate_source_id(" docs-v1.2 ").unwrap(), "docs-v1.2");
        assert!(validate_source_id("").is_err());
        assert!(validate_source_id("..").is_err());
        assert!(validate_source_id("a/b").is_err());
        assert!(validate_source_id(&"x".repeat(200)).is_err());
    }

    #[test]
    fn test_normalize_extensions() {
        let exts = normalize_extensions(&[".MD".to_string(), "rs".to_string(), "md".to_string()]);
        assert_eq!(exts, vec!["md".to_string(), "rs".to_string()]);
        assert_eq!(normalize_extensions(&[]).len(), TEXT_EXTENSIONS.len());
    }

    #[test]
    fn test_ingest_directory_skips_binary_and_unlisted() {
        let src = TempDir::new().unwrap();
        fs::write(src.path().join("a.md"), "# Title\nbody").unwrap();
        fs::write(src.path().join("bad.txt"), [0xff, 0xfe, 0x00]).unwrap();
        fs::write(src.path().join("image.png"), [1, 2, 3]).unwrap();
        fs::create_dir(src.path().join("node_modules")).unwrap();
        fs::write(src.path().join("node_modules/dep.md"), "# dep").unwrap();

        let store_dir = TempDir::new().unwrap();
        let store = Store::new(store_dir.path());
        let outcome = ingest(&store, dir_request(src.path(), Some("docs"))).unwrap();

        assert_eq!(outcome.manifest.file_count, 1);
        assert_eq!(outcome.manifest.chunk_count, 1);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].path, "bad.txt");
        assert_eq!(store.load_registry().unwrap()["docs"].file_count, 1);
    }

    #[test]
    fn test_ingest_respects_file_cap() {
        let src = TempDir::new().unwrap();
        for i in 0..5 {
            fs::write(src.path().join(format!("f{}.txt", i)), "text").unwrap();
        }
        let store_dir = TempDir::new().unwrap();
        let store = Store::new(store_dir.path());
        let mut request = dir_request(src.path(), Some("capped"));
        request.max_files = Some(2);

        let outcome = ingest(&store, request).unwrap();
        assert_eq!(outcome.manifest.file_count, 2);
    }

    #[test]
    fn test_ingest_missing_directory_is_invalid_input() {
        let store_dir = TempDir::new().unwrap();
        let store = Store::new(store_dir.path());
        let err = ingest(
            &store,
            dir_request(&store_dir.path().join("nope"), Some("x")),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[test]
    fn test_derived_directory_id() {
        let parent = TempDir::new().unwrap();
        let src = parent.path().join("My Docs");
        fs::create_dir(&src).unwrap();
        fs::write(src.join("a.txt"), "x").unwrap();

        let store_dir = TempDir::new().unwrap();
        let store = Store::new(store_dir.path());
        let outcome = ingest(&store, dir_request(&src, None)).unwrap();
        assert_eq!(outcome.manifest.source_id, "My-Docs");
    }

    #[test]
    fn test_ingest_archive_keeps_order_and_payload() {
        let bytes = zip_bytes(&[
            ("docs/z.md", "# Zed\ntext"),
            ("docs/a.sol", "contract A {}"),
            ("docs/blob.bin", "\x00\x01"),
        ]);
        let store_dir = TempDir::new().unwrap();
        let store = Store::new(store_dir.path());
        let outcome = ingest(
            &store,
            IngestRequest {
                source_id: None,
                root: IngestRoot::Archive {
                    bytes: bytes.clone(),
                    url: None,
                },
                extensions: vec![],
                max_files: None,
                tags: BTreeSet::new(),
            },
        )
        .unwrap();

        let id = outcome.manifest.source_id.clone();
        assert!(id.starts_with("archive-"));
        assert_eq!(outcome.manifest.file_count, 2);
        let chunks = store.read_chunks(&id).unwrap();
        assert_eq!(chunks[0].path, "docs/z.md");
        assert_eq!(chunks[1].path, "docs/a.sol");
        assert_eq!(store.read_archive(&id).unwrap(), bytes);
        assert_eq!(read_archive_entry(&bytes, "docs/a.sol").unwrap(), b"contract A {}".to_vec());
    }

    /// Test that rejected and unlisted archive entries do not use up the file cap
    #[test]
    fn test_archive_cap_counts_accepted_entries_only() {
        let bytes = zip_bytes(&[
            ("dir/../../evil.md", "escape"),
            ("docs/blob.bin", "skip"),
            ("docs/a.md", "alpha"),
            ("docs/b.md", "beta"),
            ("docs/c.md", "gamma"),
        ]);
        let store_dir = TempDir::new().unwrap();
        let store = Store::new(store_dir.path());
        let outcome = ingest(
            &store,
            IngestRequest {
                source_id: Some("capped".to_string()),
                root: IngestRoot::Archive { bytes, url: None },
                extensions: vec![],
                max_files: Some(2),
                tags: BTreeSet::new(),
            },
        )
        .unwrap();

        assert_eq!(outcome.manifest.file_count, 2);
        assert!(outcome.skipped.iter().any(|s| s.path == "dir/../../evil.md"));
        let paths: Vec<String> = store.read_chunks("capped").unwrap().into_iter().map(|c| c.path).collect();
        assert_eq!(paths, vec!["docs/a.md", "docs/b.md"]);
    }

    #[test]
    fn test_corrupt_archive_is_invalid_input() {
        let store_dir = TempDir::new().unwrap();
        let store = Store::new(store_dir.path());
        let err = ingest(
            &store,
            IngestRequest {
                source_id: Some("broken".to_string()),
                root: IngestRoot::Archive {
                    bytes: b"not a zip".to_vec(),
                    url: None,
                },
                extensions: vec![],
                max_files: None,
                tags: BTreeSet::new(),
            },
        )
        .unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }
}
