//! PDF splitting functionality
//!
//! This module provides functionality to split PDF documents into multiple files
//! based on page ranges or other criteria.

use std::path::{Path, PathBuf};

use lopdf::Document;
use tracing::{debug, info};

use super::merge::extract_pages;
use super::PageRange;
use crate::document;
use crate::error::{Result, ToolboxError};

/// Options for PDF splitting
#[derive(Debug, Clone)]
pub struct SplitOptions {
    /// How to split the document
    pub mode: SplitMode,
    /// Directory receiving the pieces; next to the input when unset
    pub output_dir: Option<PathBuf>,
    /// File name prefix, pieces are named `<prefix><n>.pdf`
    pub prefix: String,
    /// Password for encrypted inputs
    pub password: Option<String>,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            mode: SplitMode::EveryPage,
            output_dir: None,
            prefix: "split_".to_string(),
            password: None,
        }
    }
}

/// Split mode specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitMode {
    /// One file per page, numbered by page
    EveryPage,
    /// One file per range, e.g. from `"1-3,5,7-9"`
    Ranges(PageRange),
    /// Chunks of N pages
    FixedPages(usize),
}

impl SplitMode {
    /// Parse the mode name used on the command line: `every-page`,
    /// `ranges` (with `spec`) or `fixed` (with a page count in `spec`).
    pub fn parse(mode: &str, spec: Option<&str>) -> Result<Self> {
        match mode.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "every-page" | "pages" | "single" => Ok(SplitMode::EveryPage),
            "ranges" | "range" => {
                let spec = spec.filter(|s| !s.trim().is_empty()).ok_or_else(|| {
                    ToolboxError::InvalidPageRange("a page range is required".to_string())
                })?;
                Ok(SplitMode::Ranges(PageRange::parse(spec)?))
            }
            "fixed" | "fixed-pages" | "chunks" => {
                let count = spec
                    .and_then(|s| s.trim().parse::<usize>().ok())
                    .filter(|n| *n > 0)
                    .ok_or_else(|| {
                        ToolboxError::InvalidOption(
                            "pages per file must be a positive number".to_string(),
                        )
                    })?;
                Ok(SplitMode::FixedPages(count))
            }
            other => Err(ToolboxError::InvalidOption(format!(
                "unknown split mode: {other}"
            ))),
        }
    }
}

/// PDF splitter
pub struct PdfSplitter {
    document: Document,
    options: SplitOptions,
}

impl PdfSplitter {
    /// Create a new PDF splitter
    pub fn new(document: Document, options: SplitOptions) -> Self {
        Self { document, options }
    }

    /// Inclusive page spans of every output file, with the number used in
    /// its file name.
    pub fn plan(&self) -> Result<Vec<(usize, usize, usize)>> {
        let total_pages = document::page_count(&self.document);
        if total_pages == 0 {
            return Err(ToolboxError::NoPagesToProcess);
        }

        let plan = match &self.options.mode {
            SplitMode::EveryPage => (0..total_pages).map(|p| (p + 1, p, p)).collect(),
            SplitMode::Ranges(range) => range
                .spans(total_pages)?
                .into_iter()
                .enumerate()
                .map(|(i, (start, end))| (i + 1, start, end))
                .collect(),
            SplitMode::FixedPages(0) => {
                return Err(ToolboxError::InvalidOption(
                    "pages per file must be greater than 0".to_string(),
                ))
            }
            SplitMode::FixedPages(size) => (0..total_pages)
                .step_by(*size)
                .enumerate()
                .map(|(i, start)| (i + 1, start, (start + size - 1).min(total_pages - 1)))
                .collect(),
        };
        Ok(plan)
    }

    /// Split into files under `output_dir`
    pub fn split_into(&self, output_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut output_files = Vec::new();
        for (number, start, end) in self.plan()? {
            let indices: Vec<usize> = (start..=end).collect();
            let mut piece = extract_pages(&self.document, &indices)?;
            let output_path = output_dir.join(format!("{}{}.pdf", self.options.prefix, number));
            document::save(&mut piece, &output_path)?;
            debug!("Wrote pages {}-{} to {}", start + 1, end + 1, output_path.display());
            output_files.push(output_path);
        }
        Ok(output_files)
    }
}

/// Split a PDF file according to `options`
pub fn split_pdf<P: AsRef<Path>>(input_path: P, options: SplitOptions) -> Result<Vec<PathBuf>> {
    let input_path = input_path.as_ref();
    let document = document::load(input_path, options.password.as_deref())?;
    let output_dir = options
        .output_dir
        .clone()
        .or_else(|| input_path.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));

    let splitter = PdfSplitter::new(document, options);
    let files = splitter.split_into(&output_dir)?;
    info!(
        "Split {} into {} file(s)",
        input_path.display(),
        files.len()
    );
    Ok(files)
}
