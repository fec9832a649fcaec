//! Headers, footers and page numbers

use std::path::Path;
use std::str::FromStr;

use lopdf::Document;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::overlay::{append_content, font_resource, TextRun};
use super::PageSelection;
use crate::color::Color;
use crate::document::{self, media_box};
use crate::error::{Result, ToolboxError};
use crate::fonts::StampFont;
use crate::geometry::Rectangle;

pub const DEFAULT_SUFFIX: &str = "_header_footer";

/// Horizontal placement of a header or footer line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    Left,
    #[default]
    Center,
    Right,
}

impl FromStr for Alignment {
    type Err = ToolboxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Alignment::Left),
            "center" | "centre" => Ok(Alignment::Center),
            "right" => Ok(Alignment::Right),
            other => Err(ToolboxError::InvalidOption(format!("unknown alignment: {other}"))),
        }
    }
}

/// Options for headers and footers
///
/// `{page}` and `{total}` in any text are replaced with the page number and
/// page count.
#[derive(Debug, Clone)]
pub struct HeaderFooterOptions {
    pub header: String,
    pub footer: String,
    pub header_size: f64,
    pub footer_size: f64,
    pub header_alignment: Alignment,
    pub footer_alignment: Alignment,
    /// Appended to the footer; empty for no page number
    pub page_number_format: String,
    pub pages: PageSelection,
    /// Distance from the page edges, in points
    pub margin: f64,
    pub color: Color,
    pub password: Option<String>,
}

impl Default for HeaderFooterOptions {
    fn default() -> Self {
        Self {
            header: String::new(),
            footer: String::new(),
            header_size: 10.0,
            footer_size: 10.0,
            header_alignment: Alignment::Center,
            footer_alignment: Alignment::Center,
            page_number_format: "{page}".to_string(),
            pages: PageSelection::All,
            margin: 36.0,
            color: Color::black(),
            password: None,
        }
    }
}

impl HeaderFooterOptions {
    fn footer_template(&self) -> String {
        match (self.footer.trim().is_empty(), self.page_number_format.trim().is_empty()) {
            (true, _) => self.page_number_format.clone(),
            (false, true) => self.footer.clone(),
            (false, false) => format!("{}  {}", self.footer, self.page_number_format),
        }
    }
}

/// Replace `{page}` and `{total}`
pub fn expand_placeholders(template: &str, page: usize, total: usize) -> String {
    template
        .replace("{page}", &page.to_string())
        .replace("{total}", &total.to_string())
}

fn line_x(alignment: Alignment, page: &Rectangle, margin: f64, width: f64) -> f64 {
    match alignment {
        Alignment::Left => page.lower_left.x + margin,
        Alignment::Center => page.center().x - width / 2.0,
        Alignment::Right => page.upper_right.x - margin - width,
    }
}

/// Stamp headers and footers onto the selected pages. Returns the number of
/// pages stamped.
pub fn apply_header_footer_to(doc: &mut Document, options: &HeaderFooterOptions) -> Result<usize> {
    let footer = options.footer_template();
    if options.header.trim().is_empty() && footer.trim().is_empty() {
        return Err(ToolboxError::InvalidOption(
            "header, footer and page number are all empty".to_string(),
        ));
    }

    let page_ids = document::page_ids(doc);
    let total = page_ids.len();
    if total == 0 {
        return Err(ToolboxError::NoPagesToProcess);
    }
    let face = StampFont::for_text([options.header.as_str(), footer.as_str()]);
    let font_id = face.add_to(doc);

    let mut stamped = 0;
    for idx in options.pages.indices(total) {
        let page_id = page_ids[idx];
        let font = font_resource(doc, page_id, font_id)?;
        let page_box = media_box(doc, page_id);
        let mut content = String::from("q\n");

        let lines = [
            (&options.header, options.header_size, options.header_alignment, true),
            (&footer, options.footer_size, options.footer_alignment, false),
        ];
        for (template, size, alignment, is_header) in lines {
            let text = expand_placeholders(template, idx + 1, total);
            if text.trim().is_empty() {
                continue;
            }
            let width = face.text_width(&text, size);
            let y = if is_header {
                page_box.upper_right.y - options.margin - size
            } else {
                page_box.lower_left.y + options.margin
            };
            let run = TextRun {
                text: &text,
                font: &font,
                face,
                size,
                color: options.color,
                x: line_x(alignment, &page_box, options.margin, width),
                y,
                rotation: 0.0,
            };
            content.push_str(&run.operators());
        }
        content.push_str("Q\n");
        append_content(doc, page_id, content.into_bytes())?;
        stamped += 1;
    }
    Ok(stamped)
}

/// Add headers and footers to a PDF file
pub fn apply_header_footer<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    options: &HeaderFooterOptions,
) -> Result<usize> {
    let mut doc = document::load(input.as_ref(), options.password.as_deref())?;
    let stamped = apply_header_footer_to(&mut doc, options)?;
    document::save(&mut doc, output.as_ref())?;
    info!(
        "Added header/footer to {} page(s) of {}",
        stamped,
        input.as_ref().display()
    );
    Ok(stamped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::test_support::{sample_doc, write_sample};
    use crate::text::extract_pages;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_expand_placeholders() {
        assert_eq!(expand_placeholders("Page {page} of {total}", 3, 9), "Page 3 of 9");
        assert_eq!(expand_placeholders("no placeholders", 1, 1), "no placeholders");
    }

    #[test]
    fn test_footer_template() {
        let options = HeaderFooterOptions::default();
        assert_eq!(options.footer_template(), "{page}");

        let options = HeaderFooterOptions {
            footer: "ACME".to_string(),
            page_number_format: "{page}/{total}".to_string(),
            ..Default::default()
        };
        assert_eq!(options.footer_template(), "ACME  {page}/{total}");
    }

    #[test]
    fn test_alignment_positions() {
        let page = Rectangle::new(Point::new(0.0, 0.0), Point::new(600.0, 800.0));
        assert_eq!(line_x(Alignment::Left, &page, 36.0, 100.0), 36.0);
        assert_eq!(line_x(Alignment::Center, &page, 36.0, 100.0), 250.0);
        assert_eq!(line_x(Alignment::Right, &page, 36.0, 100.0), 464.0);
    }

    #[test]
    fn test_page_numbers_except_first() {
        let mut doc = sample_doc(3, "hf");
        let options = HeaderFooterOptions {
            header: "Annual report".to_string(),
            page_number_format: "Page {page} of {total}".to_string(),
            pages: PageSelection::ExceptFirst,
            ..Default::default()
        };
        assert_eq!(apply_header_footer_to(&mut doc, &options).unwrap(), 2);

        let text = extract_pages(&doc).unwrap();
        assert_eq!(text[0], "Page 1");
        assert!(text[1].contains("Annual report"));
        assert!(text[1].contains("Page 2 of 3"));
        assert!(text[2].contains("Page 3 of 3"));
    }

    #[test]
    fn test_chinese_header_uses_cjk_font() {
        let mut doc = sample_doc(1, "hf");
        let options = HeaderFooterOptions {
            header: "年度报告".to_string(),
            ..Default::default()
        };
        apply_header_footer_to(&mut doc, &options).unwrap();

        let text = extract_pages(&doc).unwrap();
        assert!(text[0].contains("年度报告"));
        assert!(text[0].ends_with('1'));
    }

    #[test]
    fn test_nothing_to_stamp() {
        let mut doc = sample_doc(1, "hf");
        let options = HeaderFooterOptions {
            page_number_format: String::new(),
            ..Default::default()
        };
        assert!(matches!(
            apply_header_footer_to(&mut doc, &options),
            Err(ToolboxError::InvalidOption(_))
        ));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_sample(dir.path(), "doc.pdf", 2);
        let output = dir.path().join("doc_header_footer.pdf");
        let options = HeaderFooterOptions {
            footer: "Confidential".to_string(),
            footer_alignment: Alignment::Right,
            ..Default::default()
        };
        assert_eq!(apply_header_footer(&input, &output, &options).unwrap(), 2);

        let doc = document::load(&output, None).unwrap();
        let text = extract_pages(&doc).unwrap();
        assert!(text[1].contains("Confidential  2"));
    }
}
