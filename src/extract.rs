//! Upload-side text extraction and cleanup.
//!
//! Turns an uploaded file into the ordered, cleaned pages the retrieval pipeline indexes. PDFs
//! are read with `pdf-extract` and split on form feeds; anything else is decoded as UTF-8.

use crate::retrieval::PageText;
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// PDFs yielding fewer characters than this are probably scanned images.
pub const SPARSE_PDF_CHARS: usize = 200;

static NON_ASCII: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\x00-\x7F]+").unwrap());
static SPACE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]{2,}").unwrap());
static HYPHEN_BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-\s*\n\s*").unwrap());
static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Errors raised while turning an upload into pages.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The PDF could not be parsed.
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    /// Nothing readable remained after cleanup.
    #[error("File empty or unreadable")]
    Empty,
}

/// Normalize extracted text: drop non-ASCII noise, collapse spacing, join hyphenated breaks.
pub fn clean_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let text = text.replace('_', " ");
    let text = NON_ASCII.replace_all(&text, " ");
    let text = SPACE_RUNS.replace_all(&text, " ");
    let text = HYPHEN_BREAK.replace_all(&text, "");
    let text = BLANK_LINES.replace_all(&text, "\n\n");
    text.lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Clean each page and drop pages left empty.
pub fn clean_pages(pages: Vec<PageText>) -> Vec<PageText> {
    pages
        .into_iter()
        .filter_map(|page| {
            let text = clean_text(&page.text);
            (!text.is_empty()).then_some(PageText {
                page: page.page,
                text,
            })
        })
        .collect()
}

/// Extract cleaned pages from an uploaded file.
///
/// Files whose name ends in `.pdf` are parsed as PDF; everything else is treated as text.
pub fn extract_pages(bytes: &[u8], filename: &str) -> Result<Vec<PageText>, ExtractError> {
    let raw_pages = if filename.to_lowercase().ends_with(".pdf") {
        extract_pdf_pages(bytes)?
    } else {
        vec![PageText::new(1, String::from_utf8_lossy(bytes).into_owned())]
    };

    let pages = clean_pages(raw_pages);
    if pages.is_empty() {
        return Err(ExtractError::Empty);
    }
    Ok(pages)
}

fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<PageText>, ExtractError> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|error| ExtractError::Pdf(error.to_string()))?;
    let pages = split_pages(&text);

    let total: usize = pages.iter().map(|page| page.text.len()).sum();
    if total < SPARSE_PDF_CHARS {
        tracing::warn!(
            chars = total,
            "PDF has little extractable text; it may be a scanned image"
        );
    }
    Ok(pages)
}

/// Split extracted PDF text on form feeds into one-based pages, skipping blank pages.
fn split_pages(text: &str) -> Vec<PageText> {
    text.split('\u{c}')
        .enumerate()
        .filter(|(_, page)| !page.trim().is_empty())
        .map(|(idx, page)| PageText::new(idx as u32 + 1, page))
        .collect()
}
