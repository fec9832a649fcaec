//! Plain text laid out as PDF pages
//!
//! Used by `pdftoolbox create` and by the built-in `.docx` converter when
//! LibreOffice is not installed.

use std::path::Path;

use lopdf::{dictionary, Document, Object, Stream};
use tracing::debug;

use crate::document::{self, text_string};
use crate::error::Result;
use crate::fonts::StampFont;
use crate::geometry::PageSize;
use crate::operations::overlay::fmt_num;

#[derive(Debug, Clone, PartialEq)]
pub struct TextLayout {
    pub page_size: PageSize,
    pub font_size: f64,
    pub margin: f64,
    /// Baseline distance as a multiple of the font size
    pub line_spacing: f64,
}

impl Default for TextLayout {
    fn default() -> Self {
        Self {
            page_size: PageSize::A4,
            font_size: 11.0,
            margin: 72.0,
            line_spacing: 1.4,
        }
    }
}

impl TextLayout {
    fn leading(&self) -> f64 {
        self.font_size * self.line_spacing
    }

    /// Lines that fit between the top and bottom margins
    pub fn lines_per_page(&self) -> usize {
        let (_, height) = self.page_size.dimensions();
        let usable = height - 2.0 * self.margin;
        ((usable / self.leading()).floor() as usize).max(1)
    }

    /// Wrap `paragraphs` and break them into pages of lines
    pub fn paginate(&self, face: StampFont, paragraphs: &[String]) -> Vec<Vec<String>> {
        let (width, _) = self.page_size.dimensions();
        let max_width = width - 2.0 * self.margin;
        let lines: Vec<String> = paragraphs
            .iter()
            .flat_map(|p| {
                if p.trim().is_empty() {
                    vec![String::new()]
                } else {
                    face.wrap(p, self.font_size, max_width)
                }
            })
            .collect();

        if lines.is_empty() {
            return vec![Vec::new()];
        }
        lines
            .chunks(self.lines_per_page())
            .map(|chunk| chunk.to_vec())
            .collect()
    }

    /// Build a document from paragraphs. An empty input still yields one
    /// blank page.
    pub fn layout(&self, paragraphs: &[String], title: Option<&str>) -> Result<Document> {
        let face = StampFont::for_text(paragraphs.iter().map(String::as_str));
        let (mut doc, pages_id) = document::new_document();
        let font_id = face.add_to(&mut doc);
        let resources = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id }
        });
        let (width, height) = self.page_size.dimensions();

        let pages = self.paginate(face, paragraphs);
        for lines in &pages {
            let mut content = format!(
                "BT /F1 {} Tf {} TL {} {} Td\n",
                fmt_num(self.font_size),
                fmt_num(self.leading()),
                fmt_num(self.margin),
                fmt_num(height - self.margin - self.font_size)
            );
            for line in lines {
                if !line.is_empty() {
                    content.push_str(&face.encode(line));
                    content.push_str(" Tj ");
                }
                content.push_str("T*\n");
            }
            content.push_str("ET\n");

            let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
            document::append_page(
                &mut doc,
                pages_id,
                dictionary! {
                    "MediaBox" => vec![0.into(), 0.into(), Object::Real(width as f32), Object::Real(height as f32)],
                    "Contents" => content_id,
                    "Resources" => resources
                },
            )?;
        }

        if let Some(title) = title.filter(|t| !t.is_empty()) {
            document::set_info_dictionary(
                &mut doc,
                dictionary! {
                    "Title" => text_string(title),
                    "Producer" => text_string(&format!("pdf-toolbox {}", crate::VERSION))
                },
            );
        }
        debug!("Laid out {} paragraph(s) on {} page(s)", paragraphs.len(), pages.len());
        Ok(doc)
    }
}

/// Write `text` to `output` as a PDF. Returns the written size.
pub fn text_to_pdf<P: AsRef<Path>>(
    text: &str,
    output: P,
    layout: &TextLayout,
    title: Option<&str>,
) -> Result<u64> {
    let paragraphs: Vec<String> = text.lines().map(str::to_string).collect();
    let mut doc = layout.layout(&paragraphs, title)?;
    document::save(&mut doc, output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::extract_pages;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_lines_per_page() {
        let layout = TextLayout::default();
        // (841.89 - 144) / 15.4
        assert_eq!(layout.lines_per_page(), 45);
    }

    #[test]
    fn test_long_text_spans_pages() {
        let layout = TextLayout::default();
        let paragraphs: Vec<String> = (1..=100).map(|n| format!("Line {n}")).collect();
        let doc = layout.layout(&paragraphs, Some("Notes")).unwrap();

        assert_eq!(document::page_count(&doc), 3);
        let text = extract_pages(&doc).unwrap();
        assert!(text[0].contains("Line 1"));
        assert!(text[2].contains("Line 100"));
        let info = document::info_dictionary(&doc).unwrap();
        assert_eq!(
            document::object_text(&doc, info.get(b"Title").unwrap()).unwrap(),
            "Notes"
        );
    }

    #[test]
    fn test_empty_text_gives_blank_page() {
        let doc = TextLayout::default().layout(&[], None).unwrap();
        assert_eq!(document::page_count(&doc), 1);
        assert!(document::info_dictionary(&doc).is_none());
    }

    #[test]
    fn test_chinese_text_uses_cjk_font() {
        let layout = TextLayout::default();
        let pages = layout.paginate(StampFont::Cjk, &["你好".to_string()]);
        assert_eq!(pages, vec![vec!["你好".to_string()]]);

        let doc = layout.layout(&["你好，世界".to_string()], None).unwrap();
        let page = document::page_ids(&doc)[0];
        let content = String::from_utf8(doc.get_page_content(page).unwrap()).unwrap();
        assert!(content.contains("<4F60597D"));
    }

    #[test]
    fn test_text_to_pdf_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("hello.pdf");
        let size = text_to_pdf("Hello\n\nWorld", &path, &TextLayout::default(), None).unwrap();
        assert!(size > 0);
        let doc = document::load(&path, None).unwrap();
        let text = extract_pages(&doc).unwrap().join("\n");
        assert!(text.contains("Hello"));
        assert!(text.contains("World"));
    }
}
