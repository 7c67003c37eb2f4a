//! Line-range chunker.
//!
//! Documentation files (`md`, `markdown`, `mdx`) are split at headings; every
//! other file is cut into fixed windows of [`WINDOW_LINES`] lines overlapping
//! by [`OVERLAP_LINES`]. Line numbers are 1-based and inclusive.

/// Lines per fixed window.
pub const WINDOW_LINES: usize = 150;
/// Lines shared by consecutive windows.
pub const OVERLAP_LINES: usize = 30;

const HEADING_EXTENSIONS: &[&str] = &["md", "markdown", "mdx"];

/// One contiguous slice of a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub start_line: usize,
    pub end_line: usize,
    pub text: String,
}

/// Split a file's text into chunks according to its extension.
pub fn chunk_file(text: &str, extension: &str) -> Vec<TextChunk> {
    let lines: Vec<&str> = text.lines().collect();
    if lines.is_empty() {
        return Vec::new();
    }

    let ext = extension.trim_start_matches('.').to_lowercase();
    if HEADING_EXTENSIONS.contains(&ext.as_str()) {
        if let Some(chunks) = split_on_headings(&lines) {
            return chunks;
        }
    }
    split_windows(&lines)
}

/// `^#{1,3}\s+\S`
pub fn is_heading(line: &str) -> bool {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    if !(1..=3).contains(&hashes) {
        return false;
    }
    let rest = &line[hashes..];
    let trimmed = rest.trim_start();
    trimmed.len() < rest.len() && !trimmed.is_empty()
}

fn split_on_headings(lines: &[&str]) -> Option<Vec<TextChunk>> {
    if !lines.iter().any(|l| is_heading(l)) {
        return None;
    }

    // A heading on the first line opens the first chunk instead of splitting
    let mut starts = vec![0];
    starts.extend(
        lines
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, l)| is_heading(l))
            .map(|(i, _)| i),
    );

    let chunks = starts
        .iter()
        .enumerate()
        .map(|(n, &start)| {
            let end = starts.get(n + 1).copied().unwrap_or(lines.len());
            make_chunk(lines, start, end)
        })
        .collect();
    Some(chunks)
}

fn split_windows(lines: &[&str]) -> Vec<TextChunk> {
    let total = lines.len();
    let step = WINDOW_LINES - OVERLAP_LINES;
    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let mut end = (start + WINDOW_LINES).min(total);
        // A trailing window adding no more than the overlap is folded into this one
        if total - end <= OVERLAP_LINES {
            end = total;
        }
        chunks.push(make_chunk(lines, start, end));
        if end == total {
            break;
        }
        start += step;
    }
    chunks
}

fn make_chunk(lines: &[&str], start: usize, end: usize) -> TextChunk {
    TextChunk {
        start_line: start + 1,
        end_line: end,
        text: lines[start..end].join("\n"),
    }
}
