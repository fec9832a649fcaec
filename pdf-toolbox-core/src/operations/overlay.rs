//! Page overlays: appending content streams and registering resources
//!
//! Stamping tools draw on top of existing pages. The original content is
//! wrapped in `q`/`Q` so its graphics state cannot leak into the overlay,
//! and resources are copied onto the page before being extended so pages
//! sharing an inherited resource dictionary are not affected.

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

use crate::color::Color;
use crate::document::{inherited_attribute, resolve};
use crate::error::{Result, ToolboxError};
use crate::fonts::StampFont;

/// Effective resource dictionary of a page, inherited and resolved
pub fn page_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    inherited_attribute(doc, page_id, b"Resources")
        .and_then(|obj| obj.as_dict().ok())
        .cloned()
        .unwrap_or_default()
}

/// Register `value` under a fresh name in the `category` sub-dictionary of
/// the page resources and return the name.
pub fn add_resource(
    doc: &mut Document,
    page_id: ObjectId,
    category: &str,
    prefix: &str,
    value: Object,
) -> Result<String> {
    let mut resources = page_resources(doc, page_id);
    let mut entries = resources
        .get(category.as_bytes())
        .map(|obj| resolve(doc, obj))
        .and_then(Object::as_dict)
        .cloned()
        .unwrap_or_default();

    let name = (1..)
        .map(|n| format!("{prefix}{n}"))
        .find(|candidate| !entries.has(candidate.as_bytes()))
        .unwrap_or_else(|| prefix.to_string());
    entries.set(name.clone(), value);
    resources.set(category, Object::Dictionary(entries));

    doc.get_dictionary_mut(page_id)?
        .set("Resources", Object::Dictionary(resources));
    Ok(name)
}

/// Helvetica registered on the page; `font_id` is shared across pages.
pub fn font_resource(doc: &mut Document, page_id: ObjectId, font_id: ObjectId) -> Result<String> {
    add_resource(doc, page_id, "Font", "TbF", Object::Reference(font_id))
}

/// An ExtGState setting fill and stroke alpha.
pub fn opacity_resource(doc: &mut Document, page_id: ObjectId, opacity: f64) -> Result<String> {
    let alpha = opacity.clamp(0.0, 1.0) as f32;
    let state = doc.add_object(dictionary! {
        "Type" => "ExtGState",
        "ca" => Object::Real(alpha),
        "CA" => Object::Real(alpha)
    });
    add_resource(doc, page_id, "ExtGState", "TbGs", Object::Reference(state))
}

pub fn xobject_resource(doc: &mut Document, page_id: ObjectId, xobject: ObjectId) -> Result<String> {
    add_resource(doc, page_id, "XObject", "TbIm", Object::Reference(xobject))
}

/// Append `content` to the page so it paints above everything else.
pub fn append_content(doc: &mut Document, page_id: ObjectId, content: Vec<u8>) -> Result<()> {
    let existing: Vec<Object> = {
        let page = doc.get_dictionary(page_id)?;
        match page.get(b"Contents") {
            Ok(Object::Reference(id)) => vec![Object::Reference(*id)],
            Ok(Object::Array(items)) => items.clone(),
            Ok(other) => {
                return Err(ToolboxError::InvalidStructure(format!(
                    "unexpected page Contents: {other:?}"
                )))
            }
            Err(_) => Vec::new(),
        }
    };

    let contents = if existing.is_empty() {
        vec![Object::Reference(doc.add_object(Stream::new(dictionary! {}, content)))]
    } else {
        let open = doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
        let mut closing = b"\nQ\n".to_vec();
        closing.extend_from_slice(&content);
        let close = doc.add_object(Stream::new(dictionary! {}, closing));

        let mut contents = Vec::with_capacity(existing.len() + 2);
        contents.push(Object::Reference(open));
        contents.extend(existing);
        contents.push(Object::Reference(close));
        contents
    };

    doc.get_dictionary_mut(page_id)?
        .set("Contents", Object::Array(contents));
    Ok(())
}

/// Add annotation `annot` to the page's `/Annots`, which may be missing,
/// inline or an indirect array.
pub fn push_annotation(doc: &mut Document, page_id: ObjectId, annot: ObjectId) -> Result<()> {
    let existing = doc.get_dictionary(page_id)?.get(b"Annots").ok().cloned();
    match existing {
        Some(Object::Reference(array_id)) => {
            if let Ok(Object::Array(items)) = doc.get_object_mut(array_id) {
                items.push(Object::Reference(annot));
                return Ok(());
            }
            doc.get_dictionary_mut(page_id)?
                .set("Annots", vec![Object::Reference(annot)]);
        }
        Some(Object::Array(mut items)) => {
            items.push(Object::Reference(annot));
            doc.get_dictionary_mut(page_id)?.set("Annots", items);
        }
        _ => {
            doc.get_dictionary_mut(page_id)?
                .set("Annots", vec![Object::Reference(annot)]);
        }
    }
    Ok(())
}

/// Annotation dictionaries of a page, resolved
pub fn page_annotations(doc: &Document, page_id: ObjectId) -> Vec<(Option<ObjectId>, &Dictionary)> {
    let Ok(page) = doc.get_dictionary(page_id) else {
        return Vec::new();
    };
    let Some(items) = page
        .get(b"Annots")
        .ok()
        .map(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_array().ok())
    else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let id = item.as_reference().ok();
            resolve(doc, item).as_dict().ok().map(|dict| (id, dict))
        })
        .collect()
}

/// One line of stamped text
#[derive(Debug, Clone)]
pub struct TextRun<'a> {
    pub text: &'a str,
    /// Resource name of the font
    pub font: &'a str,
    pub face: StampFont,
    pub size: f64,
    pub color: Color,
    pub x: f64,
    pub y: f64,
    /// Counter-clockwise, in degrees
    pub rotation: f64,
}

impl TextRun<'_> {
    /// Content stream operators drawing the run
    pub fn operators(&self) -> String {
        let (sin, cos) = self.rotation.to_radians().sin_cos();
        format!(
            "BT /{} {} Tf {} {} {} {} {} {} {} Tm {} Tj ET\n",
            self.font,
            fmt_num(self.size),
            self.color.fill_operator(),
            fmt_num(cos),
            fmt_num(sin),
            fmt_num(-sin),
            fmt_num(cos),
            fmt_num(self.x),
            fmt_num(self.y),
            self.face.encode(self.text)
        )
    }
}

/// Operators painting image XObject `name` into the given box
pub fn image_operators(name: &str, x: f64, y: f64, width: f64, height: f64) -> String {
    format!(
        "q {} 0 0 {} {} {} cm /{} Do Q\n",
        fmt_num(width),
        fmt_num(height),
        fmt_num(x),
        fmt_num(y),
        name
    )
}

/// Compact decimal formatting for content streams
pub fn fmt_num(value: f64) -> String {
    if value.fract().abs() < 1e-6 {
        format!("{}", value.round() as i64)
    } else {
        let text = format!("{value:.3}");
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// Ids of the pages `indices` selects, in document order.
pub fn selected_pages(doc: &Document, indices: &[usize]) -> Vec<(usize, ObjectId)> {
    let ids = crate::document::page_ids(doc);
    indices
        .iter()
        .filter_map(|&idx| ids.get(idx).map(|id| (idx, *id)))
        .collect()
}
