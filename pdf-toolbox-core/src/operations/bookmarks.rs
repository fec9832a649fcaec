//! Document outline (bookmarks) reading and rebuilding

use std::collections::HashSet;
use std::path::Path;

use lopdf::{dictionary, Document, Object, ObjectId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::document::{self, catalog_id, object_text, resolve, text_string};
use crate::error::{Result, ToolboxError};

/// One outline entry as shown in the bookmark list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkEntry {
    pub title: String,
    /// 1-based page number; 0 when the destination cannot be resolved
    pub page: usize,
    /// Nesting depth, 0 for top level entries
    pub level: usize,
}

impl BookmarkEntry {
    pub fn new(title: impl Into<String>, page: usize) -> Self {
        Self {
            title: title.into(),
            page,
            level: 0,
        }
    }

    pub fn with_level(mut self, level: usize) -> Self {
        self.level = level;
        self
    }
}

/// In-memory list of bookmarks being edited
#[derive(Debug, Clone, Default)]
pub struct BookmarkEditor {
    entries: Vec<BookmarkEntry>,
}

impl BookmarkEditor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the outline already in `path`.
    pub fn load<P: AsRef<Path>>(path: P, password: Option<&str>) -> Result<Self> {
        Ok(Self {
            entries: list_bookmarks(path, password)?,
        })
    }

    pub fn add(&mut self, title: &str, page: usize) -> Result<()> {
        let entry = validated(title, page, 0)?;
        self.entries.push(entry);
        Ok(())
    }

    /// Replace title and page of the entry at `index`, keeping its level.
    pub fn edit(&mut self, index: usize, title: &str, page: usize) -> Result<()> {
        let level = self
            .entries
            .get(index)
            .map(|e| e.level)
            .ok_or_else(|| ToolboxError::InvalidOption(format!("no bookmark at index {index}")))?;
        self.entries[index] = validated(title, page, level)?;
        Ok(())
    }

    pub fn delete(&mut self, index: usize) -> Option<BookmarkEntry> {
        (index < self.entries.len()).then(|| self.entries.remove(index))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[BookmarkEntry] {
        &self.entries
    }

    /// Indented display lines, e.g. `  Intro (页 3)`
    pub fn display_lines(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| format!("{}{} (页 {})", "  ".repeat(e.level), e.title, e.page))
            .collect()
    }
}

fn validated(title: &str, page: usize, level: usize) -> Result<BookmarkEntry> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ToolboxError::InvalidOption(
            "bookmark title must not be empty".to_string(),
        ));
    }
    if page == 0 {
        return Err(ToolboxError::InvalidOption(
            "bookmark page numbers start at 1".to_string(),
        ));
    }
    Ok(BookmarkEntry::new(title, page).with_level(level))
}

/// Read the outline of `path` as a flat list in document order.
pub fn list_bookmarks<P: AsRef<Path>>(path: P, password: Option<&str>) -> Result<Vec<BookmarkEntry>> {
    let doc = document::load(path, password)?;
    Ok(read_outline(&doc))
}

pub fn read_outline(doc: &Document) -> Vec<BookmarkEntry> {
    let mut entries = Vec::new();
    let Some(first) = catalog_id(doc)
        .ok()
        .and_then(|id| doc.get_dictionary(id).ok())
        .and_then(|catalog| catalog.get(b"Outlines").ok())
        .and_then(|outlines| resolve(doc, outlines).as_dict().ok())
        .and_then(|outlines| outlines.get(b"First").and_then(Object::as_reference).ok())
    else {
        return entries;
    };

    let page_numbers: std::collections::HashMap<ObjectId, usize> = document::page_ids(doc)
        .into_iter()
        .enumerate()
        .map(|(idx, id)| (id, idx + 1))
        .collect();
    let mut visited = HashSet::new();
    walk_outline(doc, first, 0, &page_numbers, &mut visited, &mut entries);
    entries
}

fn walk_outline(
    doc: &Document,
    first: ObjectId,
    level: usize,
    pages: &std::collections::HashMap<ObjectId, usize>,
    visited: &mut HashSet<ObjectId>,
    out: &mut Vec<BookmarkEntry>,
) {
    let mut current = Some(first);
    while let Some(id) = current {
        if !visited.insert(id) {
            break;
        }
        let Ok(item) = doc.get_dictionary(id) else {
            break;
        };

        let title = item
            .get(b"Title")
            .ok()
            .and_then(|t| object_text(doc, t))
            .unwrap_or_default();
        let page = destination_page(doc, item, pages).unwrap_or(0);
        out.push(BookmarkEntry { title, page, level });

        if let Ok(child) = item.get(b"First").and_then(Object::as_reference) {
            walk_outline(doc, child, level + 1, pages, visited, out);
        }
        current = item.get(b"Next").and_then(Object::as_reference).ok();
    }
}

fn destination_page(
    doc: &Document,
    item: &lopdf::Dictionary,
    pages: &std::collections::HashMap<ObjectId, usize>,
) -> Option<usize> {
    let dest = match item.get(b"Dest") {
        Ok(dest) => resolve(doc, dest),
        Err(_) => {
            let action = resolve(doc, item.get(b"A").ok()?).as_dict().ok()?;
            resolve(doc, action.get(b"D").ok()?)
        }
    };

    let dest = match dest {
        Object::String(name, _) => named_destination(doc, name)?,
        Object::Name(name) => named_destination(doc, name)?,
        other => other,
    };
    let array = match dest {
        Object::Dictionary(dict) => resolve(doc, dict.get(b"D").ok()?).as_array().ok()?,
        other => other.as_array().ok()?,
    };
    match array.first()? {
        Object::Reference(page_id) => pages.get(page_id).copied(),
        Object::Integer(index) => usize::try_from(*index).ok().map(|i| i + 1),
        _ => None,
    }
}

/// Look `name` up in the catalog `/Dests` dictionary.
fn named_destination<'a>(doc: &'a Document, name: &[u8]) -> Option<&'a Object> {
    let catalog = doc.get_dictionary(catalog_id(doc).ok()?).ok()?;
    let dests = resolve(doc, catalog.get(b"Dests").ok()?).as_dict().ok()?;
    dests.get(name).ok().map(|d| resolve(doc, d))
}

/// Outline item pointing at a page of the document being built
#[derive(Debug, Clone)]
pub(crate) struct OutlineItem {
    pub title: String,
    pub page: ObjectId,
    pub level: usize,
}

/// Replace the document outline with `items`.
///
/// A level deeper than one below the previous item is clamped.
pub(crate) fn write_outline(doc: &mut Document, items: &[OutlineItem]) -> Result<()> {
    let catalog = catalog_id(doc)?;
    if items.is_empty() {
        doc.get_dictionary_mut(catalog)?.remove(b"Outlines");
        return Ok(());
    }

    let root_id = doc.new_object_id();
    let ids: Vec<ObjectId> = items.iter().map(|_| doc.new_object_id()).collect();

    // parent index of every item, None for top level
    let mut parents: Vec<Option<usize>> = Vec::with_capacity(items.len());
    let mut levels: Vec<usize> = Vec::with_capacity(items.len());
    let mut stack: Vec<(usize, usize)> = Vec::new();
    for (idx, item) in items.iter().enumerate() {
        let max_level = levels.last().map(|l| l + 1).unwrap_or(0);
        let level = item.level.min(max_level);
        while stack.last().is_some_and(|(l, _)| *l >= level) {
            stack.pop();
        }
        parents.push(stack.last().map(|(_, parent)| *parent));
        levels.push(level);
        stack.push((level, idx));
    }

    let children_of = |parent: Option<usize>| -> Vec<usize> {
        (0..items.len()).filter(|&i| parents[i] == parent).collect()
    };
    let descendants = |idx: usize| -> i64 {
        let mut count = 0;
        let mut j = idx + 1;
        while j < items.len() && levels[j] > levels[idx] {
            count += 1;
            j += 1;
        }
        count
    };

    for (idx, item) in items.iter().enumerate() {
        let siblings = children_of(parents[idx]);
        let position = siblings.iter().position(|&s| s == idx).unwrap_or(0);
        let parent_id = parents[idx].map(|p| ids[p]).unwrap_or(root_id);

        let mut node = dictionary! {
            "Title" => text_string(&item.title),
            "Parent" => parent_id,
            "Dest" => vec![
                Object::Reference(item.page),
                Object::Name(b"XYZ".to_vec()),
                Object::Null,
                Object::Null,
                Object::Null
            ]
        };
        if position > 0 {
            node.set("Prev", ids[siblings[position - 1]]);
        }
        if let Some(&next) = siblings.get(position + 1) {
            node.set("Next", ids[next]);
        }
        let children = children_of(Some(idx));
        if let (Some(&first), Some(&last)) = (children.first(), children.last()) {
            node.set("First", ids[first]);
            node.set("Last", ids[last]);
            node.set("Count", descendants(idx));
        }
        doc.objects.insert(ids[idx], Object::Dictionary(node));
    }

    let top = children_of(None);
    let mut root = dictionary! {
        "Type" => "Outlines",
        "Count" => items.len() as i64
    };
    if let (Some(&first), Some(&last)) = (top.first(), top.last()) {
        root.set("First", ids[first]);
        root.set("Last", ids[last]);
    }
    doc.objects.insert(root_id, Object::Dictionary(root));

    let catalog = doc.get_dictionary_mut(catalog)?;
    catalog.set("Outlines", root_id);
    catalog.set("PageMode", "UseOutlines");
    debug!("Wrote outline with {} item(s)", items.len());
    Ok(())
}

/// Replace the outline of `input` with `entries` and save to `output`.
pub fn apply_bookmarks<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    entries: &[BookmarkEntry],
    password: Option<&str>,
) -> Result<u64> {
    let mut doc = document::load(input.as_ref(), password)?;
    let pages = document::page_ids(&doc);

    let items = entries
        .iter()
        .map(|entry| {
            let page = entry
                .page
                .checked_sub(1)
                .and_then(|idx| pages.get(idx))
                .ok_or(ToolboxError::PageIndexOutOfBounds(
                    entry.page.saturating_sub(1),
                    pages.len(),
                ))?;
            Ok(OutlineItem {
                title: entry.title.clone(),
                page: *page,
                level: entry.level,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    write_outline(&mut doc, &items)?;
    let size = document::save(&mut doc, output.as_ref())?;
    info!(
        "Applied {} bookmark(s) to {}",
        entries.len(),
        output.as_ref().display()
    );
    Ok(size)
}
