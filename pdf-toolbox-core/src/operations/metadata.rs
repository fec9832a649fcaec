//! Document information dictionary: reading and replacing metadata

use std::fmt;
use std::path::Path;

use chrono::{DateTime, FixedOffset, Local};
use lopdf::{Dictionary, Document};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::document::{self, info_dictionary, object_text, parse_pdf_date, pdf_date, text_string};
use crate::error::Result;

/// Suffix of files written by [`write_metadata`] callers
pub const DEFAULT_SUFFIX: &str = "_metadata_edited";

/// Info dictionary keys in display order
pub const KEYS: [&str; 8] = [
    "Title",
    "Author",
    "Subject",
    "Keywords",
    "Creator",
    "Producer",
    "CreationDate",
    "ModDate",
];

/// Editable document metadata. Dates hold the raw PDF date strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub mod_date: Option<String>,
}

impl Metadata {
    /// Read the Info dictionary of a loaded document
    pub fn from_document(doc: &Document) -> Self {
        let Some(info) = info_dictionary(doc) else {
            return Self::default();
        };
        let field = |key: &str| {
            info.get(key.as_bytes())
                .ok()
                .and_then(|obj| object_text(doc, obj))
                .map(|s| s.trim_end_matches('\0').to_string())
                .filter(|s| !s.is_empty())
        };
        Self {
            title: field("Title"),
            author: field("Author"),
            subject: field("Subject"),
            keywords: field("Keywords"),
            creator: field("Creator"),
            producer: field("Producer"),
            creation_date: field("CreationDate"),
            mod_date: field("ModDate"),
        }
    }

    /// Value stored under an Info dictionary key
    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            "Title" => self.title.as_deref(),
            "Author" => self.author.as_deref(),
            "Subject" => self.subject.as_deref(),
            "Keywords" => self.keywords.as_deref(),
            "Creator" => self.creator.as_deref(),
            "Producer" => self.producer.as_deref(),
            "CreationDate" => self.creation_date.as_deref(),
            "ModDate" => self.mod_date.as_deref(),
            _ => None,
        }
    }

    /// Non-empty entries as (key, value) pairs in display order
    pub fn entries(&self) -> Vec<(&'static str, &str)> {
        KEYS.iter()
            .filter_map(|key| self.get(key).map(|value| (*key, value)))
            .filter(|(_, value)| !value.is_empty())
            .collect()
    }

    pub fn creation_date_parsed(&self) -> Option<DateTime<FixedOffset>> {
        self.creation_date.as_deref().and_then(parse_pdf_date)
    }

    pub fn mod_date_parsed(&self) -> Option<DateTime<FixedOffset>> {
        self.mod_date.as_deref().and_then(parse_pdf_date)
    }

    fn to_dictionary(&self) -> Dictionary {
        let mut info = Dictionary::new();
        for (key, value) in self.entries() {
            info.set(key, text_string(value));
        }
        info
    }
}

impl fmt::Display for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for key in KEYS {
            let value = self.get(key).unwrap_or("");
            let parsed = match key {
                "CreationDate" => self.creation_date_parsed(),
                "ModDate" => self.mod_date_parsed(),
                _ => None,
            };
            match parsed {
                Some(date) => writeln!(f, "{key:<13} {}", date.format("%Y-%m-%d %H:%M:%S %:z"))?,
                None => writeln!(f, "{key:<13} {value}")?,
            }
        }
        Ok(())
    }
}

/// Read metadata from a PDF file
pub fn read_metadata<P: AsRef<Path>>(path: P, password: Option<&str>) -> Result<Metadata> {
    let doc = document::load(path, password)?;
    Ok(Metadata::from_document(&doc))
}

/// Replace the Info dictionary with the non-empty fields of `metadata`.
/// `ModDate` is set to the current time unless given.
pub fn apply_metadata(doc: &mut Document, metadata: &Metadata) {
    let mut metadata = metadata.clone();
    if metadata.mod_date.as_deref().map_or(true, str::is_empty) {
        metadata.mod_date = Some(pdf_date(&Local::now()));
    }
    document::set_info_dictionary(doc, metadata.to_dictionary());
}

/// Write `metadata` into a copy of `input` saved at `output`
pub fn write_metadata<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    metadata: &Metadata,
    password: Option<&str>,
) -> Result<u64> {
    let mut doc = document::load(input.as_ref(), password)?;
    apply_metadata(&mut doc, metadata);
    let size = document::save(&mut doc, output.as_ref())?;
    info!(
        "Wrote metadata of {} to {}",
        input.as_ref().display(),
        output.as_ref().display()
    );
    Ok(size)
}
