//! PDF operations module
//!
//! High-level page and document operations: merging, splitting, rotating,
//! compressing, stamping overlays (watermarks, headers and footers,
//! signatures), outline and annotation editing, form filling, metadata
//! editing, comparison, optimization and text extraction.

pub mod annotations;
pub mod bookmarks;
pub mod compare;
pub mod compress;
pub mod extract_text;
pub mod forms;
pub mod header_footer;
pub mod merge;
pub mod metadata;
pub mod optimize;
pub mod overlay;
pub mod rotate;
pub mod signature;
pub mod split;
pub mod watermark;

pub use annotations::{add_annotations, list_annotations, AnnotationInfo, AnnotationKind, AnnotationSpec};
pub use bookmarks::{apply_bookmarks, list_bookmarks, BookmarkEditor, BookmarkEntry};
pub use compare::{compare_pdfs, CompareOptions, ComparisonReport};
pub use compress::{compress_pdf, CompressionEngine, CompressionLevel, CompressOptions};
pub use extract_text::{extract_text, ExtractTextOptions};
pub use forms::{add_fields, fill_form, list_fields, FieldKind, FieldSpec, FillReport, FormField};
pub use header_footer::{apply_header_footer, Alignment, HeaderFooterOptions};
pub use merge::{merge_pdf_files, MergeInput, MergeOptions, PdfMerger};
pub use metadata::{read_metadata, write_metadata, Metadata};
pub use optimize::{optimize_pdf, OptimizeLevel, OptimizeOptions, OptimizeReport};
pub use rotate::{rotate_pdf_pages, RotateOptions, RotationAngle};
pub use signature::{sign_pdf, SignatureKind, SignatureOptions};
pub use split::{split_pdf, PdfSplitter, SplitMode, SplitOptions};
pub use watermark::{add_watermark, WatermarkContent, WatermarkOptions, WatermarkPosition};

use crate::error::{Result, ToolboxError};
use tracing::warn;

/// Page range specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRange {
    /// All pages
    All,
    /// Single page (0-based index)
    Single(usize),
    /// Range of pages (inclusive, 0-based)
    Range(usize, usize),
    /// From a page to the end of the document (0-based)
    From(usize),
    /// Comma separated items, kept in the order given
    List(Vec<PageRange>),
}

impl PageRange {
    /// Parse a page range from a string
    ///
    /// Examples:
    /// - "all" or "" -> All pages
    /// - "3" -> Single page (converts to 0-based)
    /// - "1-5" -> Range of pages
    /// - "4-" -> Page 4 to the last page
    /// - "-3" -> Pages 1 to 3
    /// - "1,3-5,7" -> List
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();

        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            return Ok(PageRange::All);
        }

        if s.contains(',') {
            let items = s
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(Self::parse_item)
                .collect::<Result<Vec<_>>>()?;
            if items.is_empty() {
                return Err(ToolboxError::InvalidPageRange(format!("Invalid format: {s}")));
            }
            return Ok(PageRange::List(items));
        }

        Self::parse_item(s)
    }

    fn parse_item(s: &str) -> Result<Self> {
        if let Ok(page) = s.parse::<usize>() {
            return Ok(PageRange::Single(one_based(page)?));
        }

        let Some((start, end)) = s.split_once('-') else {
            return Err(ToolboxError::InvalidPageRange(format!("Invalid format: {s}")));
        };
        let (start, end) = (start.trim(), end.trim());

        let start = if start.is_empty() {
            0
        } else {
            let page = start
                .parse::<usize>()
                .map_err(|_| ToolboxError::InvalidPageRange(format!("Invalid start: {start}")))?;
            one_based(page)?
        };

        if end.is_empty() {
            return Ok(PageRange::From(start));
        }

        let end = end
            .parse::<usize>()
            .map_err(|_| ToolboxError::InvalidPageRange(format!("Invalid end: {end}")))?;
        let end = one_based(end)?;

        if start > end {
            return Err(ToolboxError::InvalidPageRange(format!(
                "Start {} is greater than end {}",
                start + 1,
                end + 1
            )));
        }

        Ok(PageRange::Range(start, end))
    }

    /// Get the page indices for this range, failing on out-of-bounds pages.
    ///
    /// Indices keep the order they were written in; repeated pages are
    /// reported once.
    pub fn get_indices(&self, total_pages: usize) -> Result<Vec<usize>> {
        let mut indices = Vec::new();
        self.collect_indices(total_pages, &mut indices)?;

        let mut seen = std::collections::HashSet::new();
        indices.retain(|idx| seen.insert(*idx));
        Ok(indices)
    }

    fn collect_indices(&self, total_pages: usize, out: &mut Vec<usize>) -> Result<()> {
        match self {
            PageRange::All => out.extend(0..total_pages),
            PageRange::Single(idx) => {
                if *idx >= total_pages {
                    return Err(ToolboxError::PageIndexOutOfBounds(*idx, total_pages));
                }
                out.push(*idx);
            }
            PageRange::Range(start, end) => {
                if *start >= total_pages {
                    return Err(ToolboxError::PageIndexOutOfBounds(*start, total_pages));
                }
                if *end >= total_pages {
                    return Err(ToolboxError::PageIndexOutOfBounds(*end, total_pages));
                }
                out.extend(*start..=*end);
            }
            PageRange::From(start) => {
                if *start >= total_pages {
                    return Err(ToolboxError::PageIndexOutOfBounds(*start, total_pages));
                }
                out.extend(*start..total_pages);
            }
            PageRange::List(items) => {
                for item in items {
                    item.collect_indices(total_pages, out)?;
                }
            }
        }
        Ok(())
    }

    /// Clamp the range to the document instead of failing.
    ///
    /// Page 0 and pages past the end are dropped, a start below 1 is
    /// raised to 1 and a reversed range selects nothing. The result is
    /// sorted without duplicates. Only a string that does not parse
    /// selects every page.
    pub fn parse_lenient(s: &str, total_pages: usize) -> Vec<usize> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            return (0..total_pages).collect();
        }

        let mut pages = std::collections::BTreeSet::new();
        for item in s.split(',').map(str::trim).filter(|item| !item.is_empty()) {
            match lenient_span(item, total_pages) {
                Some((start, end)) => pages.extend((start.max(1)..=end.min(total_pages)).map(|p| p - 1)),
                None => {
                    warn!("Page range '{}' is invalid at '{}', using all pages", s, item);
                    return (0..total_pages).collect();
                }
            }
        }
        pages.into_iter().collect()
    }

    /// Inclusive (start, end) spans, as used by the range split mode.
    pub fn spans(&self, total_pages: usize) -> Result<Vec<(usize, usize)>> {
        match self {
            PageRange::All => {
                if total_pages == 0 {
                    return Err(ToolboxError::NoPagesToProcess);
                }
                Ok(vec![(0, total_pages - 1)])
            }
            PageRange::Single(idx) => {
                if *idx >= total_pages {
                    return Err(ToolboxError::PageIndexOutOfBounds(*idx, total_pages));
                }
                Ok(vec![(*idx, *idx)])
            }
            PageRange::Range(start, end) => {
                if *end >= total_pages {
                    return Err(ToolboxError::PageIndexOutOfBounds(*end, total_pages));
                }
                Ok(vec![(*start, *end)])
            }
            PageRange::From(start) => {
                if *start >= total_pages {
                    return Err(ToolboxError::PageIndexOutOfBounds(*start, total_pages));
                }
                Ok(vec![(*start, total_pages - 1)])
            }
            PageRange::List(items) => {
                let mut spans = Vec::new();
                for item in items {
                    spans.extend(item.spans(total_pages)?);
                }
                Ok(spans)
            }
        }
    }
}

/// Whether every item of `s` is a page number or an `A-B` span, in any order
pub(crate) fn is_lenient_syntax(s: &str) -> bool {
    s.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .all(|item| lenient_span(item, 0).is_some())
}

/// One-based inclusive bounds of a lenient item, `None` on a syntax error
fn lenient_span(item: &str, total_pages: usize) -> Option<(usize, usize)> {
    let number = |text: &str, default: usize| -> Option<usize> {
        let text = text.trim();
        if text.is_empty() {
            Some(default)
        } else {
            text.parse().ok()
        }
    };
    match item.split_once('-') {
        Some((start, end)) => Some((number(start, 1)?, number(end, total_pages)?)),
        None => {
            let page = item.parse().ok()?;
            Some((page, page))
        }
    }
}

fn one_based(page: usize) -> Result<usize> {
    if page == 0 {
        return Err(ToolboxError::InvalidPageRange(
            "Page numbers start at 1".to_string(),
        ));
    }
    Ok(page - 1)
}

/// Which pages of a document an overlay or rotation applies to
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PageSelection {
    #[default]
    All,
    Odd,
    Even,
    FirstOnly,
    ExceptFirst,
    Range(PageRange),
    /// Range text resolved with [`PageRange::parse_lenient`]
    Lenient(String),
}

impl PageSelection {
    /// Parse `all`, `odd`, `even`, `first`, `except-first` or a page range.
    pub fn parse(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Ok(match normalized.as_str() {
            "" | "all" => PageSelection::All,
            "odd" => PageSelection::Odd,
            "even" => PageSelection::Even,
            "first" | "first-only" => PageSelection::FirstOnly,
            "except-first" => PageSelection::ExceptFirst,
            _ => PageSelection::Range(PageRange::parse(s)?),
        })
    }

    /// Whether the 0-based page index is selected.
    pub fn contains(&self, index: usize, total_pages: usize) -> bool {
        if index >= total_pages {
            return false;
        }
        match self {
            PageSelection::All => true,
            // page numbers are 1-based, so index 0 is an odd page
            PageSelection::Odd => index % 2 == 0,
            PageSelection::Even => index % 2 == 1,
            PageSelection::FirstOnly => index == 0,
            PageSelection::ExceptFirst => index > 0,
            PageSelection::Range(range) => range.clamped_indices(total_pages).contains(&index),
            PageSelection::Lenient(text) => PageRange::parse_lenient(text, total_pages).contains(&index),
        }
    }

    /// Selected 0-based indices in ascending order.
    pub fn indices(&self, total_pages: usize) -> Vec<usize> {
        match self {
            PageSelection::Range(range) => range.clamped_indices(total_pages),
            PageSelection::Lenient(text) => PageRange::parse_lenient(text, total_pages),
            _ => (0..total_pages)
                .filter(|idx| self.contains(*idx, total_pages))
                .collect(),
        }
    }
}

#[cfg(test)]
mod rotate_tests;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_page_range_parsing() {
        assert!(matches!(PageRange::parse("all").unwrap(), PageRange::All));
        assert!(matches!(PageRange::parse("ALL").unwrap(), PageRange::All));
        assert!(matches!(PageRange::parse("  ").unwrap(), PageRange::All));

        assert_eq!(PageRange::parse("1").unwrap(), PageRange::Single(0));
        assert_eq!(PageRange::parse("2-5").unwrap(), PageRange::Range(1, 4));
        assert_eq!(PageRange::parse("4-").unwrap(), PageRange::From(3));
        assert_eq!(PageRange::parse("-3").unwrap(), PageRange::Range(0, 2));

        assert_eq!(
            PageRange::parse("1,3-5,7").unwrap(),
            PageRange::List(vec![
                PageRange::Single(0),
                PageRange::Range(2, 4),
                PageRange::Single(6),
            ])
        );
    }

    #[test]
    fn test_invalid_page_ranges() {
        assert!(PageRange::parse("0").is_err());
        assert!(PageRange::parse("5-2").is_err());
        assert!(PageRange::parse("abc").is_err());
        assert!(PageRange::parse("1-a").is_err());
        assert!(PageRange::parse("1,,x").is_err());
    }

    #[test]
    fn test_page_range_indices() {
        assert_eq!(PageRange::All.get_indices(5).unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(PageRange::Single(2).get_indices(5).unwrap(), vec![2]);
        assert_eq!(PageRange::Range(1, 3).get_indices(5).unwrap(), vec![1, 2, 3]);
        assert_eq!(PageRange::From(3).get_indices(5).unwrap(), vec![3, 4]);

        let list = PageRange::parse("5,1-2,2").unwrap();
        assert_eq!(list.get_indices(5).unwrap(), vec![4, 0, 1]);

        assert!(PageRange::Single(10).get_indices(5).is_err());
        assert!(PageRange::Range(2, 10).get_indices(5).is_err());
    }

    #[test]
    fn test_lenient_parsing_clamps() {
        assert_eq!(PageRange::parse_lenient("2-100", 4), vec![1, 2, 3]);
        assert_eq!(PageRange::parse_lenient("9,1", 4), vec![0]);
        assert_eq!(PageRange::parse_lenient("3,1,3", 4), vec![0, 2]);
        assert_eq!(PageRange::parse_lenient("garbage", 3), vec![0, 1, 2]);
        assert_eq!(PageRange::parse_lenient("", 2), vec![0, 1]);
    }

    #[test]
    fn test_spans() {
        let range = PageRange::parse("1-3,5,7-9").unwrap();
        assert_eq!(range.spans(10).unwrap(), vec![(0, 2), (4, 4), (6, 8)]);
        assert!(range.spans(8).is_err());
    }

    #[test]
    fn test_page_selection() {
        assert_eq!(PageSelection::Odd.indices(5), vec![0, 2, 4]);
        assert_eq!(PageSelection::Even.indices(5), vec![1, 3]);
        assert_eq!(PageSelection::FirstOnly.indices(5), vec![0]);
        assert_eq!(PageSelection::ExceptFirst.indices(3), vec![1, 2]);
        assert_eq!(PageSelection::All.indices(2), vec![0, 1]);
        assert!(!PageSelection::All.contains(2, 2));

        let custom = PageSelection::parse("2-3").unwrap();
        assert_eq!(custom.indices(5), vec![1, 2]);
        assert!(custom.contains(2, 5));
        assert!(!custom.contains(3, 5));
    }

    #[test]
    fn test_page_selection_parse() {
        assert_eq!(PageSelection::parse("odd").unwrap(), PageSelection::Odd);
        assert_eq!(PageSelection::parse("Even").unwrap(), PageSelection::Even);
        assert_eq!(
            PageSelection::parse("except_first").unwrap(),
            PageSelection::ExceptFirst
        );
        assert_eq!(PageSelection::parse("first").unwrap(), PageSelection::FirstOnly);
        assert!(PageSelection::parse("sideways").is_err());
    }
}
