//! AcroForm fields: listing, filling and adding
//!
//! Field names are fully qualified (`parent.child`). Filled values are
//! written to `/V` and `NeedAppearances` is set so viewers regenerate the
//! widget appearances.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::{self, Write as _};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::overlay::{page_annotations, push_annotation};
use crate::document::{self, object_text, resolve, text_string};
use crate::error::{Result, ToolboxError};
use crate::files::stem_of;
use crate::geometry::Rectangle;

pub const DEFAULT_SUFFIX: &str = "_filled_form";

const RADIO_FLAG: i64 = 1 << 15;
const PUSHBUTTON_FLAG: i64 = 1 << 16;

/// Field types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    Text,
    Checkbox,
    Radio,
    Choice,
    Button,
    Signature,
}

impl FieldKind {
    fn from_pdf(field_type: &[u8], flags: i64) -> Option<Self> {
        match field_type {
            b"Tx" => Some(FieldKind::Text),
            b"Ch" => Some(FieldKind::Choice),
            b"Sig" => Some(FieldKind::Signature),
            b"Btn" if flags & PUSHBUTTON_FLAG != 0 => Some(FieldKind::Button),
            b"Btn" if flags & RADIO_FLAG != 0 => Some(FieldKind::Radio),
            b"Btn" => Some(FieldKind::Checkbox),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Checkbox => "checkbox",
            FieldKind::Radio => "radio",
            FieldKind::Choice => "choice",
            FieldKind::Button => "button",
            FieldKind::Signature => "signature",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for FieldKind {
    type Err = ToolboxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(FieldKind::Text),
            "checkbox" | "check" => Ok(FieldKind::Checkbox),
            "radio" => Ok(FieldKind::Radio),
            "choice" | "combo" | "list" => Ok(FieldKind::Choice),
            "button" => Ok(FieldKind::Button),
            "signature" => Ok(FieldKind::Signature),
            other => Err(ToolboxError::InvalidOption(format!("unknown field type: {other}"))),
        }
    }
}

/// A field found in a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormField {
    pub name: String,
    pub kind: FieldKind,
    pub value: Option<String>,
    /// 1-based page of the first widget
    pub page: Option<usize>,
}

/// A field to create
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub value: String,
    /// 1-based
    pub page: usize,
    pub rect: Rectangle,
}

impl FieldSpec {
    pub fn text(name: impl Into<String>, page: usize, rect: Rectangle) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Text,
            value: String::new(),
            page,
            rect,
        }
    }

    pub fn checkbox(name: impl Into<String>, page: usize, rect: Rectangle) -> Self {
        Self {
            kind: FieldKind::Checkbox,
            ..Self::text(name, page, rect)
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }
}

/// Outcome of filling a form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FillReport {
    pub filled: Vec<String>,
    /// Names that matched no field
    pub unknown: Vec<String>,
}

/// A terminal field with its widgets
#[derive(Debug, Clone)]
struct FieldNode {
    id: ObjectId,
    name: String,
    kind: FieldKind,
    widgets: Vec<ObjectId>,
}

fn acroform<'a>(doc: &'a Document) -> Option<&'a Dictionary> {
    let catalog = doc.get_dictionary(document::catalog_id(doc).ok()?).ok()?;
    let form = catalog.get(b"AcroForm").ok()?;
    resolve(doc, form).as_dict().ok()
}

fn collect_fields(doc: &Document) -> Vec<FieldNode> {
    let mut nodes = Vec::new();
    let Some(fields) = acroform(doc)
        .and_then(|form| form.get(b"Fields").ok())
        .and_then(|obj| resolve(doc, obj).as_array().ok())
    else {
        return nodes;
    };
    for field in fields {
        if let Ok(id) = field.as_reference() {
            walk_field(doc, id, "", None, 0, &mut nodes, 0);
        }
    }
    nodes
}

fn walk_field(
    doc: &Document,
    id: ObjectId,
    parent_name: &str,
    inherited_type: Option<&[u8]>,
    inherited_flags: i64,
    nodes: &mut Vec<FieldNode>,
    depth: usize,
) {
    let Ok(dict) = doc.get_dictionary(id) else {
        return;
    };
    if depth > 32 {
        warn!("Form field tree too deep at {:?}", id);
        return;
    }

    let partial = dict.get(b"T").ok().and_then(|t| object_text(doc, t));
    let name = match (&partial, parent_name.is_empty()) {
        (Some(p), true) => p.clone(),
        (Some(p), false) => format!("{parent_name}.{p}"),
        (None, _) => parent_name.to_string(),
    };
    let field_type = dict
        .get(b"FT")
        .ok()
        .and_then(|obj| obj.as_name().ok())
        .or(inherited_type);
    let flags = dict
        .get(b"Ff")
        .ok()
        .and_then(|obj| resolve(doc, obj).as_i64().ok())
        .unwrap_or(inherited_flags);

    let kids: Vec<ObjectId> = dict
        .get(b"Kids")
        .ok()
        .and_then(|obj| resolve(doc, obj).as_array().ok())
        .map(|items| items.iter().filter_map(|k| k.as_reference().ok()).collect())
        .unwrap_or_default();
    let child_fields: Vec<ObjectId> = kids
        .iter()
        .copied()
        .filter(|kid| {
            doc.get_dictionary(*kid)
                .map(|d| d.has(b"T"))
                .unwrap_or(false)
        })
        .collect();

    if !child_fields.is_empty() {
        for kid in child_fields {
            walk_field(doc, kid, &name, field_type, flags, nodes, depth + 1);
        }
        return;
    }

    let Some(kind) = field_type.and_then(|ft| FieldKind::from_pdf(ft, flags)) else {
        debug!("Skipping field {} without a known type", name);
        return;
    };
    let widgets = if kids.is_empty() { vec![id] } else { kids };
    nodes.push(FieldNode {
        id,
        name,
        kind,
        widgets,
    });
}

fn field_value(doc: &Document, id: ObjectId) -> Option<String> {
    let value = doc.get_dictionary(id).ok()?.get(b"V").ok()?;
    match resolve(doc, value) {
        Object::Array(items) => {
            let values: Vec<String> = items.iter().filter_map(|v| object_text(doc, v)).collect();
            Some(values.join(", "))
        }
        other => object_text(doc, other),
    }
}

/// Fields of `doc` in AcroForm order
pub fn read_fields(doc: &Document) -> Vec<FormField> {
    let mut widget_pages: HashMap<ObjectId, usize> = HashMap::new();
    for (idx, page_id) in document::page_ids(doc).into_iter().enumerate() {
        for (annot_id, _) in page_annotations(doc, page_id) {
            if let Some(annot_id) = annot_id {
                widget_pages.entry(annot_id).or_insert(idx + 1);
            }
        }
    }

    collect_fields(doc)
        .into_iter()
        .map(|node| FormField {
            value: field_value(doc, node.id),
            page: node.widgets.iter().find_map(|w| widget_pages.get(w).copied()),
            name: node.name,
            kind: node.kind,
        })
        .collect()
}

pub fn list_fields<P: AsRef<Path>>(path: P, password: Option<&str>) -> Result<Vec<FormField>> {
    let doc = document::load(path, password)?;
    Ok(read_fields(&doc))
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "yes" | "on" | "1" | "checked"
    )
}

/// Appearance states of a button widget other than `Off`
fn on_states(doc: &Document, widget: ObjectId) -> Vec<Vec<u8>> {
    doc.get_dictionary(widget)
        .ok()
        .and_then(|w| w.get(b"AP").ok())
        .and_then(|ap| resolve(doc, ap).as_dict().ok())
        .and_then(|ap| ap.get(b"N").ok())
        .and_then(|n| resolve(doc, n).as_dict().ok())
        .map(|normal| {
            normal
                .iter()
                .map(|(key, _)| key.clone())
                .filter(|key| key.as_slice() != b"Off")
                .collect()
        })
        .unwrap_or_default()
}

/// Id of the AcroForm dictionary, creating one when missing. An inline
/// AcroForm is moved into its own object.
fn acroform_id(doc: &mut Document) -> Result<ObjectId> {
    let catalog_id = document::catalog_id(doc)?;
    let current = doc.get_dictionary(catalog_id)?.get(b"AcroForm").ok().cloned();
    let id = match current {
        Some(Object::Reference(id)) => return Ok(id),
        Some(Object::Dictionary(dict)) => doc.add_object(dict),
        _ => doc.add_object(dictionary! { "Fields" => Vec::<Object>::new() }),
    };
    doc.get_dictionary_mut(catalog_id)?.set("AcroForm", id);
    Ok(id)
}

fn set_need_appearances(doc: &mut Document) -> Result<ObjectId> {
    let form_id = acroform_id(doc)?;
    doc.get_dictionary_mut(form_id)?
        .set("NeedAppearances", true);
    Ok(form_id)
}

fn fill_node(doc: &mut Document, node: &FieldNode, value: &str) -> Result<()> {
    match node.kind {
        FieldKind::Text | FieldKind::Choice => {
            doc.get_dictionary_mut(node.id)?.set("V", text_string(value));
            // stale appearances would hide the new value
            for widget in &node.widgets {
                doc.get_dictionary_mut(*widget)?.remove(b"AP");
            }
        }
        FieldKind::Checkbox => {
            let state = if is_truthy(value) {
                node.widgets
                    .iter()
                    .find_map(|w| on_states(doc, *w).into_iter().next())
                    .unwrap_or_else(|| b"Yes".to_vec())
            } else {
                b"Off".to_vec()
            };
            doc.get_dictionary_mut(node.id)?
                .set("V", Object::Name(state.clone()));
            for widget in &node.widgets {
                doc.get_dictionary_mut(*widget)?
                    .set("AS", Object::Name(state.clone()));
            }
        }
        FieldKind::Radio => {
            let choice = value.trim().as_bytes().to_vec();
            let mut matched = false;
            for widget in &node.widgets {
                let state = if on_states(doc, *widget).contains(&choice) {
                    matched = true;
                    choice.clone()
                } else {
                    b"Off".to_vec()
                };
                doc.get_dictionary_mut(*widget)?.set("AS", Object::Name(state));
            }
            let selected = if matched { choice } else { b"Off".to_vec() };
            doc.get_dictionary_mut(node.id)?.set("V", Object::Name(selected));
        }
        FieldKind::Button | FieldKind::Signature => {
            return Err(ToolboxError::InvalidOption(format!(
                "{} fields cannot be filled: {}",
                node.kind, node.name
            )));
        }
    }
    Ok(())
}

/// Set field values in `doc`. Unknown names are reported, not fatal,
/// unless no name matched at all.
pub fn fill_document(doc: &mut Document, values: &BTreeMap<String, String>) -> Result<FillReport> {
    let nodes = collect_fields(doc);
    let mut report = FillReport::default();
    for (name, value) in values {
        match nodes.iter().find(|node| &node.name == name) {
            Some(node) => {
                fill_node(doc, node, value)?;
                report.filled.push(name.clone());
            }
            None => {
                warn!("No form field named {}", name);
                report.unknown.push(name.clone());
            }
        }
    }
    if report.filled.is_empty() {
        if let Some(first) = report.unknown.first() {
            return Err(ToolboxError::FieldNotFound(first.clone()));
        }
    }
    set_need_appearances(doc)?;
    Ok(report)
}

fn checkbox_appearance(doc: &mut Document, rect: &Rectangle, checked: bool) -> ObjectId {
    let (w, h) = (rect.width(), rect.height());
    let mut content = format!("0 G 1 w 0.5 0.5 {} {} re S\n", w - 1.0, h - 1.0);
    if checked {
        content.push_str(&format!(
            "2 w 3 3 m {} {} l 3 {} m {} 3 l S\n",
            w - 3.0,
            h - 3.0,
            h - 3.0,
            w - 3.0
        ));
    }
    doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => vec![0.into(), 0.into(), Object::Real(w as f32), Object::Real(h as f32)]
        },
        content.into_bytes(),
    ))
}

/// Create the fields in `specs`. Names must be new and unique.
pub fn add_form_fields(doc: &mut Document, specs: &[FieldSpec]) -> Result<usize> {
    let mut taken: HashSet<String> = collect_fields(doc).into_iter().map(|n| n.name).collect();
    for spec in specs {
        if spec.name.trim().is_empty() {
            return Err(ToolboxError::InvalidOption("field name is empty".to_string()));
        }
        if !taken.insert(spec.name.clone()) {
            return Err(ToolboxError::InvalidOption(format!(
                "duplicate field name: {}",
                spec.name
            )));
        }
        if !matches!(spec.kind, FieldKind::Text | FieldKind::Checkbox) {
            return Err(ToolboxError::InvalidOption(format!(
                "only text and checkbox fields can be added, not {}",
                spec.kind
            )));
        }
    }

    let form_id = set_need_appearances(doc)?;
    let helv = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding"
    });

    let mut created = Vec::with_capacity(specs.len());
    for spec in specs {
        let page_id = document::page_id(doc, spec.page)?;
        let mut field = dictionary! {
            "Type" => "Annot",
            "Subtype" => "Widget",
            "T" => text_string(&spec.name),
            "Rect" => spec.rect.to_object(),
            "P" => page_id,
            "F" => 4
        };
        match spec.kind {
            FieldKind::Checkbox => {
                let checked = is_truthy(&spec.value);
                let on = checkbox_appearance(doc, &spec.rect, true);
                let off = checkbox_appearance(doc, &spec.rect, false);
                let state = if checked { "Yes" } else { "Off" };
                field.set("FT", "Btn");
                field.set("V", Object::Name(state.as_bytes().to_vec()));
                field.set("AS", Object::Name(state.as_bytes().to_vec()));
                field.set("AP", dictionary! { "N" => dictionary! { "Yes" => on, "Off" => off } });
            }
            _ => {
                field.set("FT", "Tx");
                field.set("DA", Object::string_literal("/Helv 12 Tf 0 g"));
                if !spec.value.is_empty() {
                    field.set("V", text_string(&spec.value));
                }
            }
        }
        let field_id = doc.add_object(field);
        push_annotation(doc, page_id, field_id)?;
        created.push(Object::Reference(field_id));
    }

    let form = doc.get_dictionary_mut(form_id)?;
    let mut fields = form
        .get(b"Fields")
        .ok()
        .and_then(|obj| obj.as_array().ok())
        .cloned()
        .unwrap_or_default();
    fields.extend(created);
    form.set("Fields", fields);
    if !form.has(b"DA") {
        form.set("DA", Object::string_literal("/Helv 12 Tf 0 g"));
    }
    if !form.has(b"DR") {
        form.set("DR", dictionary! { "Font" => dictionary! { "Helv" => helv } });
    }
    Ok(specs.len())
}

/// Plain text summary of `fields`
pub fn field_summary(fields: &[FormField]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "PDF表单字段信息");
    let _ = writeln!(out, "{}", "=".repeat(50));
    for (i, field) in fields.iter().enumerate() {
        let _ = writeln!(out, "字段 {}:", i + 1);
        let _ = writeln!(out, "  名称: {}", field.name);
        let _ = writeln!(out, "  类型: {}", field.kind);
        let _ = writeln!(out, "  值: {}", field.value.as_deref().unwrap_or(""));
        out.push('\n');
    }
    out
}

fn save_with_summary(doc: &mut Document, input: &Path, output: &Path) -> Result<PathBuf> {
    document::save(doc, output)?;
    let summary_path = output.with_file_name(format!("{}_form_fields.txt", stem_of(input)));
    fs::write(&summary_path, field_summary(&read_fields(doc)))?;
    Ok(summary_path)
}

/// Fill `input` with `values` into `output`, writing
/// `<stem>_form_fields.txt` beside the output.
pub fn fill_form<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    values: &BTreeMap<String, String>,
    password: Option<&str>,
) -> Result<FillReport> {
    let (input, output) = (input.as_ref(), output.as_ref());
    let mut doc = document::load(input, password)?;
    let report = fill_document(&mut doc, values)?;
    save_with_summary(&mut doc, input, output)?;
    info!(
        "Filled {} field(s) of {} ({} unknown)",
        report.filled.len(),
        input.display(),
        report.unknown.len()
    );
    Ok(report)
}

/// Add new fields to `input` and save to `output`
pub fn add_fields<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    specs: &[FieldSpec],
    password: Option<&str>,
) -> Result<usize> {
    let (input, output) = (input.as_ref(), output.as_ref());
    let mut doc = document::load(input, password)?;
    let added = add_form_fields(&mut doc, specs)?;
    save_with_summary(&mut doc, input, output)?;
    info!("Added {} field(s) to {}", added, output.display());
    Ok(added)
}
