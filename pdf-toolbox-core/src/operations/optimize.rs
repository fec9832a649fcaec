//! Structure optimization
//!
//! Unlike compression this never touches image quality: it removes what the
//! document does not use and stores the rest compactly.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use lopdf::{Document, Object, ObjectId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::compress::{compress_streams, remove_empty_content};
use crate::document::{self, catalog_id, page_ids};
use crate::error::{Result, ToolboxError};
use crate::files::{compression_ratio, file_size, format_file_size};

pub const DEFAULT_SUFFIX: &str = "_optimized";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizeLevel {
    /// Prune unused objects and renumber
    Low,
    /// Also compress streams and drop empty content
    #[default]
    Medium,
    /// Also merge duplicate streams and strip XMP metadata and thumbnails
    High,
}

impl FromStr for OptimizeLevel {
    type Err = ToolboxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(OptimizeLevel::Low),
            "medium" => Ok(OptimizeLevel::Medium),
            "high" => Ok(OptimizeLevel::High),
            other => Err(ToolboxError::InvalidOption(format!(
                "unknown optimization level: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OptimizeOptions {
    pub level: OptimizeLevel,
    pub password: Option<String>,
}

/// Result of optimizing one file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizeReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub original_size: u64,
    pub optimized_size: u64,
    pub objects_before: usize,
    pub objects_after: usize,
}

impl OptimizeReport {
    /// Percentage saved
    pub fn ratio(&self) -> f64 {
        compression_ratio(self.original_size, self.optimized_size)
    }

    /// Negative when the output grew
    pub fn bytes_saved(&self) -> i64 {
        self.original_size as i64 - self.optimized_size as i64
    }
}

impl fmt::Display for OptimizeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self
            .input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        writeln!(f, "正在优化: {name}")?;
        writeln!(f, "原始大小: {}", format_file_size(self.original_size))?;
        writeln!(f, "优化后大小: {}", format_file_size(self.optimized_size))?;
        writeln!(f, "压缩率: {:.2}%", self.ratio())?;
        let saved = self.bytes_saved();
        let sign = if saved < 0 { "-" } else { "" };
        writeln!(f, "已保存: {sign}{}", format_file_size(saved.unsigned_abs()))?;
        writeln!(f, "优化完成")
    }
}

fn replace_references(object: &mut Object, map: &HashMap<ObjectId, ObjectId>) {
    match object {
        Object::Reference(id) => {
            if let Some(target) = map.get(id) {
                *id = *target;
            }
        }
        Object::Array(items) => items.iter_mut().for_each(|item| replace_references(item, map)),
        Object::Dictionary(dict) => dict
            .iter_mut()
            .for_each(|(_, value)| replace_references(value, map)),
        Object::Stream(stream) => stream
            .dict
            .iter_mut()
            .for_each(|(_, value)| replace_references(value, map)),
        _ => {}
    }
}

/// Point every reference to a duplicate stream at one copy and remove
/// the others. Returns the number of streams removed.
pub(crate) fn deduplicate_streams(doc: &mut Document) -> usize {
    let mut seen: HashMap<(Vec<u8>, String), ObjectId> = HashMap::new();
    let mut duplicates: HashMap<ObjectId, ObjectId> = HashMap::new();

    for (id, object) in &doc.objects {
        let Object::Stream(stream) = object else {
            continue;
        };
        let digest = Sha256::digest(&stream.content).to_vec();
        let key = (digest, format!("{:?}", stream.dict));
        match seen.get(&key) {
            Some(original) => {
                duplicates.insert(*id, *original);
            }
            None => {
                seen.insert(key, *id);
            }
        }
    }
    if duplicates.is_empty() {
        return 0;
    }

    for object in doc.objects.values_mut() {
        replace_references(object, &duplicates);
    }
    for value in doc.trailer.iter_mut().map(|(_, v)| v) {
        replace_references(value, &duplicates);
    }
    for id in duplicates.keys() {
        doc.objects.remove(id);
    }
    duplicates.len()
}

fn strip_thumbnails_and_xmp(doc: &mut Document) -> Result<()> {
    let catalog = catalog_id(doc)?;
    doc.get_dictionary_mut(catalog)?.remove(b"Metadata");
    for page_id in page_ids(doc) {
        doc.get_dictionary_mut(page_id)?.remove(b"Thumb");
    }
    Ok(())
}

/// Optimize `doc` in memory
pub fn optimize_document(doc: &mut Document, level: OptimizeLevel) -> Result<()> {
    if level == OptimizeLevel::High {
        strip_thumbnails_and_xmp(doc)?;
        let merged = deduplicate_streams(doc);
        debug!("Merged {} duplicate stream(s)", merged);
    }
    if level != OptimizeLevel::Low {
        remove_empty_content(doc)?;
        compress_streams(doc)?;
    }
    let pruned = doc.prune_objects();
    debug!("Pruned {} unused object(s)", pruned.len());
    doc.renumber_objects();
    Ok(())
}

/// Optimize `input` into `output`
pub fn optimize_pdf<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    options: &OptimizeOptions,
) -> Result<OptimizeReport> {
    let (input, output) = (input.as_ref(), output.as_ref());
    let original_size = file_size(input);
    let mut doc = document::load(input, options.password.as_deref())?;
    let objects_before = doc.objects.len();

    optimize_document(&mut doc, options.level)?;
    let objects_after = doc.objects.len();
    let optimized_size = document::save(&mut doc, output)?;

    let report = OptimizeReport {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        original_size,
        optimized_size,
        objects_before,
        objects_after,
    };
    info!(
        "Optimized {}: {} -> {} objects, {:.2}% smaller",
        input.display(),
        objects_before,
        objects_after,
        report.ratio()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_doc, write_sample};
    use lopdf::{dictionary, Stream};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_low_prunes_and_renumbers() {
        let mut doc = sample_doc(2, "o");
        doc.add_object(dictionary! { "Unused" => 1 });
        doc.add_object(dictionary! { "Unused" => 2 });
        let before = doc.objects.len();

        optimize_document(&mut doc, OptimizeLevel::Low).unwrap();
        assert_eq!(doc.objects.len(), before - 2);
        let max_id = doc.objects.keys().map(|(n, _)| *n).max().unwrap();
        assert_eq!(max_id as usize, doc.objects.len());
        assert_eq!(page_ids(&doc).len(), 2);
    }

    #[test]
    fn test_high_merges_identical_streams() {
        let mut doc = sample_doc(2, "o");
        let pages = page_ids(&doc);
        let logo = b"q 1 0 0 1 0 0 cm 0 0 10 10 re f Q".repeat(20);
        for page in &pages {
            let id = doc.add_object(Stream::new(dictionary! {}, logo.clone()));
            let current = doc.get_dictionary(*page).unwrap().get(b"Contents").unwrap().clone();
            doc.get_dictionary_mut(*page)
                .unwrap()
                .set("Contents", vec![current, Object::Reference(id)]);
            doc.get_dictionary_mut(*page).unwrap().set("Thumb", id);
        }

        assert_eq!(deduplicate_streams(&mut doc.clone()), 1);
        optimize_document(&mut doc, OptimizeLevel::High).unwrap();

        let pages = page_ids(&doc);
        let last_ref = |page: ObjectId| {
            doc.get_dictionary(page)
                .unwrap()
                .get(b"Contents")
                .unwrap()
                .as_array()
                .unwrap()[1]
                .as_reference()
                .unwrap()
        };
        assert_eq!(last_ref(pages[0]), last_ref(pages[1]));
        assert!(!doc.get_dictionary(pages[0]).unwrap().has(b"Thumb"));
        for page in pages {
            let content = doc.get_page_content(page).unwrap();
            assert!(String::from_utf8_lossy(&content).contains("re f"));
        }
    }

    #[test]
    fn test_report_display() {
        let report = OptimizeReport {
            input: PathBuf::from("/tmp/a.pdf"),
            output: PathBuf::from("/tmp/a_optimized.pdf"),
            original_size: 2048,
            optimized_size: 1024,
            objects_before: 10,
            objects_after: 8,
        };
        assert_eq!(report.bytes_saved(), 1024);
        assert_eq!(
            report.to_string(),
            "正在优化: a.pdf\n原始大小: 2.00 KB\n优化后大小: 1.00 KB\n压缩率: 50.00%\n已保存: 1.00 KB\n优化完成\n"
        );
    }

    #[test]
    fn test_optimize_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_sample(dir.path(), "doc.pdf", 3);
        let output = dir.path().join("doc_optimized.pdf");
        let report = optimize_pdf(&input, &output, &OptimizeOptions::default()).unwrap();

        assert_eq!(report.optimized_size, file_size(&output));
        assert!(report.objects_after <= report.objects_before);
        let doc = document::load(&output, None).unwrap();
        assert_eq!(document::page_count(&doc), 3);
    }
}
