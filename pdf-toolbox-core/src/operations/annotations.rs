//! Page annotations: text markup, sticky notes, free text and squares

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::Local;
use lopdf::{dictionary, Dictionary, Document, Object};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::overlay::{page_annotations, push_annotation};
use crate::color::Color;
use crate::document::{self, media_box, object_text, pdf_date, rect_from_object, text_string};
use crate::error::{Result, ToolboxError};
use crate::files::stem_of;
use crate::geometry::Rectangle;

pub const DEFAULT_SUFFIX: &str = "_with_annotations";

/// Annotation types that can be added
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    #[default]
    Highlight,
    Underline,
    StrikeOut,
    /// Sticky note
    Note,
    FreeText,
    Square,
}

impl AnnotationKind {
    /// PDF `/Subtype`
    pub fn subtype(&self) -> &'static str {
        match self {
            AnnotationKind::Highlight => "Highlight",
            AnnotationKind::Underline => "Underline",
            AnnotationKind::StrikeOut => "StrikeOut",
            AnnotationKind::Note => "Text",
            AnnotationKind::FreeText => "FreeText",
            AnnotationKind::Square => "Square",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AnnotationKind::Highlight => "highlight",
            AnnotationKind::Underline => "underline",
            AnnotationKind::StrikeOut => "strikeout",
            AnnotationKind::Note => "note",
            AnnotationKind::FreeText => "freetext",
            AnnotationKind::Square => "square",
        }
    }

    fn is_markup(&self) -> bool {
        matches!(
            self,
            AnnotationKind::Highlight | AnnotationKind::Underline | AnnotationKind::StrikeOut
        )
    }
}

impl FromStr for AnnotationKind {
    type Err = ToolboxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "highlight" => Ok(AnnotationKind::Highlight),
            "underline" => Ok(AnnotationKind::Underline),
            "strikeout" | "strike-out" => Ok(AnnotationKind::StrikeOut),
            "note" | "text" => Ok(AnnotationKind::Note),
            "freetext" | "free-text" => Ok(AnnotationKind::FreeText),
            "square" | "box" => Ok(AnnotationKind::Square),
            other => Err(ToolboxError::InvalidOption(format!(
                "unknown annotation type: {other}"
            ))),
        }
    }
}

/// One annotation to add
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationSpec {
    pub kind: AnnotationKind,
    /// 1-based
    pub page: usize,
    /// Defaults to a band near the top of the page
    pub rect: Option<Rectangle>,
    pub text: String,
    /// A color name or `#rrggbb`
    pub color: String,
}

impl Default for AnnotationSpec {
    fn default() -> Self {
        Self {
            kind: AnnotationKind::Highlight,
            page: 1,
            rect: None,
            text: String::new(),
            color: "yellow".to_string(),
        }
    }
}

impl AnnotationSpec {
    pub fn new(kind: AnnotationKind, page: usize) -> Self {
        Self {
            kind,
            page,
            ..Default::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_rect(mut self, rect: Rectangle) -> Self {
        self.rect = Some(rect);
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    /// Check the page number, the color and that notes carry text
    pub fn validate(&self) -> Result<Color> {
        if self.page == 0 {
            return Err(ToolboxError::InvalidOption("page numbers start at 1".to_string()));
        }
        if matches!(self.kind, AnnotationKind::Note | AnnotationKind::FreeText)
            && self.text.trim().is_empty()
        {
            return Err(ToolboxError::InvalidOption(format!(
                "{} annotations need text",
                self.kind.label()
            )));
        }
        self.color.parse()
    }
}

/// An annotation found in a document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotationInfo {
    /// 1-based
    pub page: usize,
    pub subtype: String,
    pub contents: Option<String>,
    pub rect: Option<Rectangle>,
}

fn default_rect(page: &Rectangle) -> Rectangle {
    Rectangle::from_array([
        page.lower_left.x + 72.0,
        page.upper_right.y - 110.0,
        page.upper_right.x - 72.0,
        page.upper_right.y - 90.0,
    ])
}

fn annotation_dictionary(spec: &AnnotationSpec, color: Color, rect: &Rectangle) -> Dictionary {
    let mut annot = dictionary! {
        "Type" => "Annot",
        "Subtype" => spec.kind.subtype(),
        "Rect" => rect.to_object(),
        "C" => color.to_object(),
        "F" => 4,
        "M" => Object::string_literal(pdf_date(&Local::now()))
    };
    if !spec.text.is_empty() {
        annot.set("Contents", text_string(&spec.text));
    }

    match spec.kind {
        kind if kind.is_markup() => {
            // upper-left, upper-right, lower-left, lower-right as viewers expect
            let (l, b) = (rect.lower_left.x, rect.lower_left.y);
            let (r, t) = (rect.upper_right.x, rect.upper_right.y);
            let quad = [l, t, r, t, l, b, r, b]
                .iter()
                .map(|v| Object::Real(*v as f32))
                .collect::<Vec<_>>();
            annot.set("QuadPoints", quad);
        }
        AnnotationKind::Note => {
            annot.set("Name", "Comment");
            annot.set("Open", false);
        }
        AnnotationKind::FreeText => {
            let [r, g, b] = color.components();
            annot.set(
                "DA",
                Object::string_literal(format!("/Helv 12 Tf {r:.3} {g:.3} {b:.3} rg")),
            );
        }
        AnnotationKind::Square => {
            annot.set("BS", dictionary! { "W" => 1, "S" => "S" });
        }
        _ => {}
    }
    annot
}

/// Add `specs` to `doc`. Returns the number of annotations written.
pub fn annotate_document(doc: &mut Document, specs: &[AnnotationSpec]) -> Result<usize> {
    for spec in specs {
        let color = spec.validate()?;
        let page_id = document::page_id(doc, spec.page)?;
        let rect = spec
            .rect
            .unwrap_or_else(|| default_rect(&media_box(doc, page_id)));

        let mut annot = annotation_dictionary(spec, color, &rect);
        annot.set("P", page_id);
        let annot_id = doc.add_object(annot);
        push_annotation(doc, page_id, annot_id)?;
    }
    Ok(specs.len())
}

/// Annotations of every page in document order
pub fn read_annotations(doc: &Document) -> Vec<AnnotationInfo> {
    let mut found = Vec::new();
    for (idx, page_id) in document::page_ids(doc).into_iter().enumerate() {
        for (_, annot) in page_annotations(doc, page_id) {
            let subtype = annot
                .get(b"Subtype")
                .ok()
                .and_then(|obj| obj.as_name().ok())
                .map(|name| String::from_utf8_lossy(name).into_owned())
                .unwrap_or_default();
            found.push(AnnotationInfo {
                page: idx + 1,
                subtype,
                contents: annot.get(b"Contents").ok().and_then(|obj| object_text(doc, obj)),
                rect: annot.get(b"Rect").ok().and_then(|obj| rect_from_object(doc, obj)),
            });
        }
    }
    found
}

pub fn list_annotations<P: AsRef<Path>>(path: P, password: Option<&str>) -> Result<Vec<AnnotationInfo>> {
    let doc = document::load(path, password)?;
    Ok(read_annotations(&doc))
}

/// Plain text summary of `specs`
pub fn annotation_summary(specs: &[AnnotationSpec]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "PDF注释信息");
    let _ = writeln!(out, "{}", "=".repeat(50));
    for (i, spec) in specs.iter().enumerate() {
        let _ = writeln!(out, "注释 {}:", i + 1);
        let _ = writeln!(out, "  类型: {}", spec.kind.label());
        let _ = writeln!(out, "  页码: {}", spec.page);
        if !spec.text.is_empty() {
            let _ = writeln!(out, "  文本: {}", spec.text);
        }
        if !spec.color.is_empty() {
            let _ = writeln!(out, "  颜色: {}", spec.color);
        }
        out.push('\n');
    }
    out
}

/// Annotate `input` into `output` and write `<stem>_annotations.txt` beside
/// the output. Returns the path of the summary file.
pub fn add_annotations<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    specs: &[AnnotationSpec],
    password: Option<&str>,
) -> Result<PathBuf> {
    let (input, output) = (input.as_ref(), output.as_ref());
    if specs.is_empty() {
        return Err(ToolboxError::InvalidOption("no annotations given".to_string()));
    }
    let mut doc = document::load(input, password)?;
    let added = annotate_document(&mut doc, specs)?;
    document::save(&mut doc, output)?;

    let summary_path = output.with_file_name(format!("{}_annotations.txt", stem_of(input)));
    fs::write(&summary_path, annotation_summary(specs))?;
    info!("Added {} annotation(s) to {}", added, output.display());
    Ok(summary_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::page_ids;
    use crate::geometry::Point;
    use crate::test_support::{sample_doc, write_sample};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("StrikeOut".parse::<AnnotationKind>().unwrap(), AnnotationKind::StrikeOut);
        assert_eq!("note".parse::<AnnotationKind>().unwrap().subtype(), "Text");
        assert!("scribble".parse::<AnnotationKind>().is_err());
    }

    #[test]
    fn test_validation() {
        assert!(AnnotationSpec::new(AnnotationKind::Note, 1).validate().is_err());
        assert!(AnnotationSpec::new(AnnotationKind::Highlight, 0).validate().is_err());
        assert!(AnnotationSpec::new(AnnotationKind::Highlight, 1)
            .with_color("mauve")
            .validate()
            .is_err());
        assert_eq!(
            AnnotationSpec::new(AnnotationKind::Square, 1)
                .with_color("#0000ff")
                .validate()
                .unwrap(),
            Color::Rgb(0.0, 0.0, 1.0)
        );
    }

    #[test]
    fn test_highlight_gets_quad_points() {
        let mut doc = sample_doc(2, "a");
        let rect = Rectangle::new(Point::new(72.0, 690.0), Point::new(200.0, 720.0));
        let spec = AnnotationSpec::new(AnnotationKind::Highlight, 2).with_rect(rect);
        annotate_document(&mut doc, &[spec]).unwrap();

        let page = page_ids(&doc)[1];
        let annots = page_annotations(&doc, page);
        assert_eq!(annots.len(), 1);
        let (_, annot) = annots[0];
        let quad = annot.get(b"QuadPoints").unwrap().as_array().unwrap();
        let quad: Vec<f32> = quad.iter().map(|v| v.as_float().unwrap()).collect();
        assert_eq!(quad, vec![72.0, 720.0, 200.0, 720.0, 72.0, 690.0, 200.0, 690.0]);
        assert_eq!(annot.get(b"P").unwrap().as_reference().unwrap(), page);
        assert!(page_annotations(&doc, page_ids(&doc)[0]).is_empty());
    }

    #[test]
    fn test_annotations_appended_to_existing_array() {
        let mut doc = sample_doc(1, "a");
        let page = page_ids(&doc)[0];
        let existing = doc.add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Square",
            "Rect" => vec![0.into(), 0.into(), 10.into(), 10.into()]
        });
        let array = doc.add_object(vec![Object::Reference(existing)]);
        doc.get_dictionary_mut(page).unwrap().set("Annots", array);

        let spec = AnnotationSpec::new(AnnotationKind::Note, 1).with_text("check this");
        annotate_document(&mut doc, &[spec]).unwrap();

        let found = read_annotations(&doc);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].subtype, "Square");
        assert_eq!(found[1].subtype, "Text");
        assert_eq!(found[1].contents.as_deref(), Some("check this"));
        // default band near the top of a Letter page
        assert_eq!(found[1].rect, Some(Rectangle::from_array([72.0, 682.0, 540.0, 702.0])));
    }

    #[test]
    fn test_page_out_of_range() {
        let mut doc = sample_doc(1, "a");
        let spec = AnnotationSpec::new(AnnotationKind::Underline, 4);
        assert!(matches!(
            annotate_document(&mut doc, &[spec]),
            Err(ToolboxError::PageIndexOutOfBounds(3, 1))
        ));
    }

    #[test]
    fn test_summary_format() {
        let specs = vec![
            AnnotationSpec::new(AnnotationKind::Highlight, 1),
            AnnotationSpec::new(AnnotationKind::Note, 2)
                .with_text("备注")
                .with_color("red"),
        ];
        assert_eq!(
            annotation_summary(&specs),
            format!(
                "PDF注释信息\n{}\n注释 1:\n  类型: highlight\n  页码: 1\n  颜色: yellow\n\n\
                 注释 2:\n  类型: note\n  页码: 2\n  文本: 备注\n  颜色: red\n\n",
                "=".repeat(50)
            )
        );
    }

    #[test]
    fn test_add_annotations_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_sample(dir.path(), "paper.pdf", 2);
        let output = dir.path().join("paper_with_annotations.pdf");
        let specs = vec![
            AnnotationSpec::new(AnnotationKind::FreeText, 1).with_text("Reviewed"),
            AnnotationSpec::new(AnnotationKind::StrikeOut, 2),
        ];

        let summary = add_annotations(&input, &output, &specs, None).unwrap();
        assert_eq!(summary, dir.path().join("paper_annotations.txt"));

        let found = list_annotations(&output, None).unwrap();
        let kinds: Vec<(usize, &str)> = found.iter().map(|a| (a.page, a.subtype.as_str())).collect();
        assert_eq!(kinds, vec![(1, "FreeText"), (2, "StrikeOut")]);
        assert!(list_annotations(&input, None).unwrap().is_empty());
    }
}
