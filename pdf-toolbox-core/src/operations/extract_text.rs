//! PDF to plain text
//!
//! Pages are written one after another, each preceded by a
//! `--- Page N ---` header and followed by a blank line.

use std::fs;
use std::path::{Path, PathBuf};

use lopdf::Document;
use tracing::{debug, info};

use super::PageRange;
use crate::document;
use crate::error::Result;
use crate::text::TextExtractor;

/// Options for text extraction
#[derive(Debug, Clone, Default)]
pub struct ExtractTextOptions {
    /// Page range, parsed leniently; empty means every page
    pub pages: String,
    /// Keep whitespace as extracted instead of collapsing runs of it
    pub preserve_layout: bool,
    /// Password for encrypted inputs
    pub password: Option<String>,
}

/// Render the selected pages of `doc` as text
pub fn document_text(doc: &Document, options: &ExtractTextOptions) -> Result<String> {
    let page_ids = document::page_ids(doc);
    let indices = PageRange::parse_lenient(&options.pages, page_ids.len());
    let extractor = TextExtractor::new();

    let mut out = String::new();
    for idx in indices {
        let text = extractor.extract_page(doc, page_ids[idx])?;
        let text = if options.preserve_layout {
            text
        } else {
            collapse_whitespace(&text)
        };
        debug!("Page {}: {} characters", idx + 1, text.chars().count());
        out.push_str(&format!("--- Page {} ---\n", idx + 1));
        out.push_str(&text);
        out.push_str("\n\n");
    }
    Ok(out)
}

/// Extract text from `input` into `output` (default `<stem>.txt` next to
/// the input). Returns the path written.
pub fn extract_text<P: AsRef<Path>>(
    input: P,
    output: Option<&Path>,
    options: &ExtractTextOptions,
) -> Result<PathBuf> {
    let input = input.as_ref();
    let doc = document::load(input, options.password.as_deref())?;
    let text = document_text(&doc, options)?;

    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| input.with_extension("txt"));
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(&output, text)?;
    info!("Extracted text of {} to {}", input.display(), output.display());
    Ok(output)
}

fn collapse_whitespace(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n")
}
