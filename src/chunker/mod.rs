
use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::tokenizer::Bpe;

/// Marker introducing the document title line.
const TITLE_MARKER: &str = "# ";
/// Literal prefix of the source URL line emitted by the normalizer.
const URL_MARKER: &str = "Article URL: ";

/// Configuration for document chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk size in tokens, including the repeated citation header
    pub max_tokens: usize,
    /// Overlap in tokens between adjacent windows of an over-long section
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_tokens: 800,
            overlap_tokens: 100,
        }
    }
}

/// A token-bounded slice of a document, ready for upload.
///
/// When the source document carries a recognizable title and URL header,
/// every chunk of that document starts with the same citation header so a
/// retrieved chunk can be attributed without a lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position of this chunk within the document's chunk sequence
    pub index: usize,
    /// The chunk text, citation header included
    pub text: String,
    /// Token count of `text`
    pub token_count: usize,
}

/// Split a normalized markdown document into citation-friendly chunks.
///
/// Sections are cut at `##`/`###` headings; a section that fits the token
/// budget is emitted whole, anything larger is windowed over its token
/// sequence with the configured overlap. Chunks are ordered by position in
/// the document.
#[inline]
pub fn chunk_document(bpe: &Bpe, markdown: &str, config: &ChunkingConfig) -> Result<Vec<Chunk>> {
    if config.overlap_tokens >= config.max_tokens {
        bail!(
            "overlap_tokens ({}) must be smaller than max_tokens ({})",
            config.overlap_tokens,
            config.max_tokens
        );
    }

    let (header, body) = split_header(markdown);

    if body.trim().is_empty() {
        return Ok(Vec::new());
    }

    let header_tokens = bpe.count(&header);

    let mut texts = Vec::new();
    for section in split_sections(&body) {
        // a blank stretch before the first heading is not a section
        if section.trim().is_empty() {
            continue;
        }
        emit_section(bpe, &header, header_tokens, &section, config, &mut texts)?;
    }

    let chunks: Vec<Chunk> = texts
        .into_iter()
        .enumerate()
        .map(|(index, text)| {
            let token_count = bpe.count(&text);
            Chunk {
                index,
                text,
                token_count,
            }
        })
        .collect();

    debug!(
        "Chunked document into {} chunks (avg {} tokens)",
        chunks.len(),
        chunks.iter().map(|c| c.token_count).sum::<usize>() / chunks.len().max(1)
    );

    Ok(chunks)
}

/// Extract the repeated citation header and the body to segment.
///
/// The header is only assembled when both the title line and the URL line
/// are present; otherwise chunks carry no preamble and the whole input is
/// treated as body.
fn split_header(markdown: &str) -> (String, String) {
    let mut title_line = None;
    let mut url_line = None;

    for (idx, line) in markdown.lines().enumerate() {
        if title_line.is_none() && line.starts_with(TITLE_MARKER) {
            title_line = Some(line);
        }
        if url_line.is_none() && line.starts_with(URL_MARKER) {
            url_line = Some((idx, line));
        }
        if title_line.is_some() && url_line.is_some() {
            break;
        }
    }

    match (title_line, url_line) {
        (Some(title), Some((url_idx, url))) => {
            let header = format!("{title}\n\n{url}\n\n---\n\n");
            let body = markdown
                .lines()
                .skip(url_idx + 1)
                .collect::<Vec<_>>()
                .join("\n");
            (header, body)
        }
        _ => (String::new(), markdown.to_string()),
    }
}

/// Cut the body into sections at level 2 and 3 heading lines.
///
/// Content before the first heading forms the first section; a body with
/// no heading lines is a single section.
fn split_sections(body: &str) -> Vec<String> {
    let mut sections = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in body.lines() {
        if is_section_heading(line) && !current.is_empty() {
            sections.push(current.join("\n"));
            current = vec![line];
        } else {
            current.push(line);
        }
    }

    if !current.is_empty() {
        sections.push(current.join("\n"));
    }

    sections
}

fn is_section_heading(line: &str) -> bool {
    line.starts_with("## ") || line.starts_with("### ")
}

/// Emit one section as either a single chunk or a run of overlapping windows.
fn emit_section(
    bpe: &Bpe,
    header: &str,
    header_tokens: usize,
    section: &str,
    config: &ChunkingConfig,
    out: &mut Vec<String>,
) -> Result<()> {
    let whole = format!("{header}{section}");
    if bpe.count(&whole) <= config.max_tokens {
        out.push(whole);
        return Ok(());
    }

    let Some(available) = config.max_tokens.checked_sub(header_tokens).filter(|n| *n > 0) else {
        bail!(
            "Citation header occupies {} tokens, leaving no room inside max_tokens ({})",
            header_tokens,
            config.max_tokens
        );
    };
    if available <= config.overlap_tokens {
        bail!(
            "Citation header leaves only {} tokens per window, not enough to advance past an overlap of {}",
            available,
            config.overlap_tokens
        );
    }

    // stride >= 1 by the check above, so the window start always advances
    let stride = available - config.overlap_tokens;
    let tokens = bpe.encode(section);

    let mut start = 0;
    while start < tokens.len() {
        let end = (start + available).min(tokens.len());
        let window_text = bpe.decode_window(&tokens[start..end])?;
        out.push(format!("{header}{window_text}"));
        start += stride;
    }

    Ok(())
}
