//! Side-by-side comparison of two documents

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use lopdf::Document;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::document::{self, info_dictionary, object_text};
use crate::error::Result;
use crate::text::TextExtractor;

/// What to compare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareOptions {
    pub compare_pages: bool,
    pub compare_metadata: bool,
    pub compare_text: bool,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            compare_pages: true,
            compare_metadata: true,
            compare_text: true,
        }
    }
}

/// One Info dictionary entry in both documents; empty when absent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataComparison {
    pub key: String,
    pub first: String,
    pub second: String,
}

impl MetadataComparison {
    pub fn is_equal(&self) -> bool {
        self.first == self.second
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonReport {
    pub first: PathBuf,
    pub second: PathBuf,
    pub options: CompareOptions,
    pub first_pages: usize,
    pub second_pages: usize,
    /// Sorted by key
    pub metadata: Vec<MetadataComparison>,
    /// 1-based pages whose text differs, among the pages both have
    pub text_differences: Vec<usize>,
}

impl ComparisonReport {
    pub fn same_page_count(&self) -> bool {
        self.first_pages == self.second_pages
    }

    /// Pages compared for text
    pub fn compared_pages(&self) -> usize {
        self.first_pages.min(self.second_pages)
    }

    /// Nothing that was compared differs
    pub fn identical(&self) -> bool {
        let pages_match = !(self.options.compare_pages || self.options.compare_text)
            || self.same_page_count();
        pages_match
            && self.metadata.iter().all(MetadataComparison::is_equal)
            && self.text_differences.is_empty()
    }
}

impl fmt::Display for ComparisonReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(50);
        writeln!(f, "PDF比较结果")?;
        writeln!(f, "{rule}\n")?;

        if self.options.compare_pages {
            let verdict = if self.same_page_count() { "页数相同" } else { "页数不同" };
            writeln!(
                f,
                "页数比较: {} 页 vs {} 页 → {verdict}",
                self.first_pages, self.second_pages
            )?;
        }

        if self.options.compare_metadata {
            writeln!(f, "\n元数据比较:")?;
            for entry in &self.metadata {
                let verdict = if entry.is_equal() { "相同" } else { "不同" };
                writeln!(f, "  {}: {} vs {} → {verdict}", entry.key, entry.first, entry.second)?;
            }
        }

        if self.options.compare_text {
            writeln!(f, "\n文本内容比较:")?;
            for page in &self.text_differences {
                writeln!(f, "  第 {page} 页: 文本内容不同")?;
            }
            if !self.same_page_count() {
                writeln!(
                    f,
                    "  注意: 由于页数不同，只比较了前 {} 页",
                    self.compared_pages()
                )?;
            }
        }

        writeln!(f, "\n{rule}")?;
        writeln!(f, "比较完成")
    }
}

fn metadata_entries(doc: &Document) -> BTreeMap<String, String> {
    info_dictionary(doc)
        .map(|info| {
            info.iter()
                .map(|(key, value)| {
                    (
                        format!("/{}", String::from_utf8_lossy(key)),
                        object_text(doc, value).unwrap_or_default(),
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Compare two loaded documents. The report's paths are left empty.
pub fn compare_documents(
    first: &Document,
    second: &Document,
    options: CompareOptions,
) -> Result<ComparisonReport> {
    let first_ids = document::page_ids(first);
    let second_ids = document::page_ids(second);

    let metadata = if options.compare_metadata {
        let left = metadata_entries(first);
        let right = metadata_entries(second);
        let keys: BTreeSet<&String> = left.keys().chain(right.keys()).collect();
        keys.into_iter()
            .map(|key| MetadataComparison {
                key: key.clone(),
                first: left.get(key).cloned().unwrap_or_default(),
                second: right.get(key).cloned().unwrap_or_default(),
            })
            .collect()
    } else {
        Vec::new()
    };

    let mut text_differences = Vec::new();
    if options.compare_text {
        let extractor = TextExtractor::new();
        for (idx, (a, b)) in first_ids.iter().zip(&second_ids).enumerate() {
            if extractor.extract_page(first, *a)? != extractor.extract_page(second, *b)? {
                text_differences.push(idx + 1);
            }
        }
    }

    Ok(ComparisonReport {
        first: PathBuf::new(),
        second: PathBuf::new(),
        options,
        first_pages: first_ids.len(),
        second_pages: second_ids.len(),
        metadata,
        text_differences,
    })
}

/// Compare the PDF files `first` and `second`
pub fn compare_pdfs<P: AsRef<Path>, Q: AsRef<Path>>(
    first: P,
    second: Q,
    options: CompareOptions,
    passwords: (Option<&str>, Option<&str>),
) -> Result<ComparisonReport> {
    let (first, second) = (first.as_ref(), second.as_ref());
    let left = document::load(first, passwords.0)?;
    let right = document::load(second, passwords.1)?;
    let report = ComparisonReport {
        first: first.to_path_buf(),
        second: second.to_path_buf(),
        ..compare_documents(&left, &right, options)?
    };
    info!(
        "Compared {} with {}: {}",
        first.display(),
        second.display(),
        if report.identical() { "identical" } else { "different" }
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::text_string;
    use crate::test_support::{sample_doc, write_sample};
    use lopdf::{dictionary, Object, Stream};
    use pretty_assertions::assert_eq;

    fn report(first: &Document, second: &Document) -> ComparisonReport {
        compare_documents(first, second, CompareOptions::default()).unwrap()
    }

    #[test]
    fn test_same_document_is_identical() {
        let doc = sample_doc(3, "same");
        let report = report(&doc, &doc);
        assert!(report.identical());
        assert_eq!(report.metadata.len(), 2);
        assert!(report.text_differences.is_empty());
    }

    #[test]
    fn test_text_and_page_count_differences() {
        let first = sample_doc(3, "doc");
        let mut second = sample_doc(2, "doc");
        let page = document::page_ids(&second)[1];
        let replacement = second.add_object(Stream::new(
            dictionary! {},
            b"BT /F1 24 Tf 72 700 Td (Changed) Tj ET".to_vec(),
        ));
        second
            .get_dictionary_mut(page)
            .unwrap()
            .set("Contents", Object::Reference(replacement));

        let report = report(&first, &second);
        assert!(!report.identical());
        assert_eq!(report.text_differences, vec![2]);
        assert_eq!(report.compared_pages(), 2);

        let text = report.to_string();
        assert!(text.contains("页数比较: 3 页 vs 2 页 → 页数不同\n"));
        assert!(text.contains("  第 2 页: 文本内容不同\n"));
        assert!(text.contains("注意: 由于页数不同，只比较了前 2 页"));
        assert!(text.ends_with("比较完成\n"));
    }

    #[test]
    fn test_metadata_union() {
        let first = sample_doc(1, "one");
        let mut second = sample_doc(1, "two");
        let info_id = second.trailer.get(b"Info").unwrap().as_reference().unwrap();
        second
            .get_dictionary_mut(info_id)
            .unwrap()
            .set("Author", text_string("Zhang San"));

        let report = report(&first, &second);
        assert_eq!(
            report.metadata,
            vec![
                MetadataComparison {
                    key: "/Author".to_string(),
                    first: String::new(),
                    second: "Zhang San".to_string(),
                },
                MetadataComparison {
                    key: "/Producer".to_string(),
                    first: "fixture".to_string(),
                    second: "fixture".to_string(),
                },
                MetadataComparison {
                    key: "/Title".to_string(),
                    first: "one".to_string(),
                    second: "two".to_string(),
                },
            ]
        );
        assert!(report.to_string().contains("  /Title: one vs two → 不同\n"));
        assert!(report.to_string().contains("  /Producer: fixture vs fixture → 相同\n"));
    }

    #[test]
    fn test_compare_files_serializes() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_sample(dir.path(), "a.pdf", 2);
        let b = write_sample(dir.path(), "b.pdf", 2);
        let options = CompareOptions {
            compare_metadata: false,
            ..Default::default()
        };
        let report = compare_pdfs(&a, &b, options, (None, None)).unwrap();
        assert!(report.identical());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["first_pages"], 2);
        assert_eq!(json["text_differences"].as_array().unwrap().len(), 0);
        assert_eq!(json["options"]["compare_metadata"], false);
    }
}
