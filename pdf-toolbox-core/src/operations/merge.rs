//! PDF merging functionality
//!
//! Pages of several documents are copied into one new document. Every
//! object a copied page reaches is imported under a fresh object number,
//! so inputs never collide; page tree attributes a page inherits are
//! written onto the page itself because the source page trees are dropped.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, info};

use super::bookmarks::{write_outline, OutlineItem};
use super::PageRange;
use crate::document::{self, has_type, inherited_attribute};
use crate::error::{Result, ToolboxError};
use crate::files::stem_of;

/// Page attributes that may be inherited from the page tree
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Options for PDF merging
#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// One outline entry per input, titled with the file name
    pub add_bookmarks: bool,
    /// Keep the Info dictionary of the first input
    pub preserve_metadata: bool,
    /// Password for encrypted inputs
    pub password: Option<String>,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            add_bookmarks: true,
            preserve_metadata: true,
            password: None,
        }
    }
}

/// Input specification for merging
#[derive(Debug, Clone)]
pub struct MergeInput {
    /// Path to the PDF file
    pub path: PathBuf,
    /// Optional page range to include
    pub pages: Option<PageRange>,
}

impl MergeInput {
    /// Create a new merge input that includes all pages
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            pages: None,
        }
    }

    /// Create a merge input with specific pages
    pub fn with_pages<P: Into<PathBuf>>(path: P, pages: PageRange) -> Self {
        Self {
            path: path.into(),
            pages: Some(pages),
        }
    }
}

/// PDF merger
pub struct PdfMerger {
    inputs: Vec<MergeInput>,
    options: MergeOptions,
}

impl PdfMerger {
    /// Create a new PDF merger
    pub fn new(options: MergeOptions) -> Self {
        Self {
            inputs: Vec::new(),
            options,
        }
    }

    /// Add an input file to merge
    pub fn add_input(&mut self, input: MergeInput) {
        self.inputs.push(input);
    }

    /// Add multiple input files
    pub fn add_inputs(&mut self, inputs: impl IntoIterator<Item = MergeInput>) {
        self.inputs.extend(inputs);
    }

    /// Merge all input files into a single document
    pub fn merge(&self) -> Result<Document> {
        if self.inputs.is_empty() {
            return Err(ToolboxError::NoInputFiles);
        }

        let mut assembler = PageAssembler::new();
        let mut outline = Vec::new();

        for (input_idx, input) in self.inputs.iter().enumerate() {
            let source = document::load(&input.path, self.options.password.as_deref())?;
            let total_pages = document::page_count(&source);
            let indices = input
                .pages
                .as_ref()
                .unwrap_or(&PageRange::All)
                .get_indices(total_pages)?;
            debug!(
                "Merging {} page(s) of {}",
                indices.len(),
                input.path.display()
            );

            let page_ids = assembler.import_pages(&source, &indices)?;
            if let Some(first) = page_ids.first() {
                if self.options.add_bookmarks {
                    outline.push(OutlineItem {
                        title: stem_of(&input.path),
                        page: *first,
                        level: 0,
                    });
                }
            }

            if input_idx == 0 && self.options.preserve_metadata {
                assembler.import_info(&source)?;
            }
        }

        if assembler.page_count() == 0 {
            return Err(ToolboxError::NoPagesToProcess);
        }

        let mut doc = assembler.finish()?;
        if !outline.is_empty() {
            write_outline(&mut doc, &outline)?;
        }
        Ok(doc)
    }

    /// Merge files and save to output path, returning the page count
    pub fn merge_to_file<P: AsRef<Path>>(&self, output_path: P) -> Result<usize> {
        let mut doc = self.merge()?;
        let pages = document::page_count(&doc);
        document::save(&mut doc, output_path.as_ref())?;
        info!(
            "Merged {} file(s), {} page(s) into {}",
            self.inputs.len(),
            pages,
            output_path.as_ref().display()
        );
        Ok(pages)
    }
}

/// Merge multiple PDF files into one
pub fn merge_pdf_files<P: AsRef<Path>>(
    inputs: Vec<MergeInput>,
    output_path: P,
    options: MergeOptions,
) -> Result<usize> {
    let mut merger = PdfMerger::new(options);
    merger.add_inputs(inputs);
    merger.merge_to_file(output_path)
}

/// Builds a fresh document out of pages copied from other documents.
pub(crate) struct PageAssembler {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<ObjectId>,
}

impl PageAssembler {
    pub(crate) fn new() -> Self {
        let (doc, pages_id) = document::new_document();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
        }
    }

    pub(crate) fn page_count(&self) -> usize {
        self.kids.len()
    }

    /// Copy the pages at `indices` of `source`, in that order. Returns the
    /// ids the pages received in the new document.
    pub(crate) fn import_pages(&mut self, source: &Document, indices: &[usize]) -> Result<Vec<ObjectId>> {
        let source_pages = document::page_ids(source);
        let selected = indices
            .iter()
            .map(|&idx| {
                source_pages
                    .get(idx)
                    .copied()
                    .ok_or(ToolboxError::PageIndexOutOfBounds(idx, source_pages.len()))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut importer = Importer {
            source,
            target: &mut self.doc,
            source_pages: source_pages.iter().copied().collect(),
            map: HashMap::new(),
            queue: VecDeque::new(),
        };

        let mut new_ids = Vec::with_capacity(selected.len());
        for &page_id in &selected {
            let new_id = importer.target.new_object_id();
            importer.map.insert(page_id, new_id);
            new_ids.push(new_id);
        }

        for (&page_id, &new_id) in selected.iter().zip(&new_ids) {
            let mut page = source.get_dictionary(page_id)?.clone();
            for key in INHERITABLE {
                if !page.has(key) {
                    if let Some(value) = inherited_attribute(source, page_id, key) {
                        page.set(key.to_vec(), value.clone());
                    }
                }
            }
            page.remove(b"Parent");
            let mut page = importer.remap_dict(&page);
            page.set("Parent", self.pages_id);
            importer.target.objects.insert(new_id, Object::Dictionary(page));
        }
        importer.drain()?;

        self.kids.extend(&new_ids);
        Ok(new_ids)
    }

    /// Copy the Info dictionary of `source`.
    pub(crate) fn import_info(&mut self, source: &Document) -> Result<()> {
        let Some(info) = document::info_dictionary(source) else {
            return Ok(());
        };
        let mut importer = Importer {
            source,
            target: &mut self.doc,
            source_pages: HashSet::new(),
            map: HashMap::new(),
            queue: VecDeque::new(),
        };
        let info = importer.remap_dict(info);
        importer.drain()?;
        let info_id = self.doc.add_object(info);
        self.doc.trailer.set("Info", info_id);
        Ok(())
    }

    pub(crate) fn finish(mut self) -> Result<Document> {
        let kids: Vec<Object> = self.kids.iter().map(|id| Object::Reference(*id)).collect();
        let pages = self.doc.get_dictionary_mut(self.pages_id)?;
        pages.set("Count", kids.len() as i64);
        pages.set("Kids", kids);
        Ok(self.doc)
    }
}

struct Importer<'a> {
    source: &'a Document,
    target: &'a mut Document,
    source_pages: HashSet<ObjectId>,
    map: HashMap<ObjectId, ObjectId>,
    queue: VecDeque<ObjectId>,
}

impl Importer<'_> {
    fn remap(&mut self, object: &Object) -> Object {
        match object {
            Object::Reference(id) => self.remap_reference(*id),
            Object::Array(items) => Object::Array(items.iter().map(|o| self.remap(o)).collect()),
            Object::Dictionary(dict) => Object::Dictionary(self.remap_dict(dict)),
            Object::Stream(stream) => {
                let mut copy = stream.clone();
                copy.dict = self.remap_dict(&stream.dict);
                Object::Stream(copy)
            }
            other => other.clone(),
        }
    }

    fn remap_dict(&mut self, dict: &Dictionary) -> Dictionary {
        let mut out = Dictionary::new();
        for (key, value) in dict.iter() {
            out.set(key.clone(), self.remap(value));
        }
        out
    }

    fn remap_reference(&mut self, id: ObjectId) -> Object {
        if let Some(new_id) = self.map.get(&id) {
            return Object::Reference(*new_id);
        }
        // links to pages or tree nodes that are not copied are dropped
        if self.source_pages.contains(&id) || self.is_tree_node(id) {
            return Object::Null;
        }
        let new_id = self.target.new_object_id();
        self.map.insert(id, new_id);
        self.queue.push_back(id);
        Object::Reference(new_id)
    }

    fn is_tree_node(&self, id: ObjectId) -> bool {
        match self.source.get_object(id) {
            Ok(Object::Dictionary(dict)) => {
                has_type(dict, b"Pages") || has_type(dict, b"Catalog") || has_type(dict, b"Page")
            }
            _ => false,
        }
    }

    fn drain(&mut self) -> Result<()> {
        while let Some(old_id) = self.queue.pop_front() {
            let new_id = self.map[&old_id];
            let copy = match self.source.get_object(old_id) {
                Ok(object) => self.remap(object),
                Err(_) => Object::Null,
            };
            self.target.objects.insert(new_id, copy);
        }
        Ok(())
    }
}

/// A document holding the given pages of `source`, metadata included.
pub(crate) fn extract_pages(source: &Document, indices: &[usize]) -> Result<Document> {
    let mut assembler = PageAssembler::new();
    assembler.import_pages(source, indices)?;
    assembler.import_info(source)?;
    let mut doc = assembler.finish()?;
    doc.version = source.version.clone();
    Ok(doc)
}
