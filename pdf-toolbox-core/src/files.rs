//! File list bookkeeping and output naming shared by every tool

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ToolboxError};

/// Extensions accepted by PDF tools
pub const PDF_EXTENSIONS: &[&str] = &["pdf"];

/// Extensions accepted by the image tools
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff", "gif"];

/// Extensions accepted by the Office converter
pub const OFFICE_EXTENSIONS: &[&str] = &[
    "doc", "docx", "xls", "xlsx", "ppt", "pptx", "odt", "ods", "odp",
];

/// Ordered list of input files. A path is held at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileList {
    files: Vec<PathBuf>,
}

impl FileList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `path` unless it is already listed. Returns whether it was added.
    pub fn add<P: Into<PathBuf>>(&mut self, path: P) -> bool {
        let path = path.into();
        if self.files.contains(&path) {
            return false;
        }
        self.files.push(path);
        true
    }

    /// Add several paths, returning how many were new.
    pub fn add_many<I, P>(&mut self, paths: I) -> usize
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        paths.into_iter().map(|p| self.add(p)).filter(|added| *added).count()
    }

    /// Add the files directly inside `dir` whose extension matches one of
    /// `extensions` (case-insensitive), in name order.
    pub fn add_folder<P: AsRef<Path>>(&mut self, dir: P, extensions: &[&str]) -> Result<usize> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(ToolboxError::FileNotFound(dir.to_path_buf()));
        }
        let mut found: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && has_extension(path, extensions))
            .collect();
        found.sort();
        Ok(self.add_many(found))
    }

    pub fn remove(&mut self, index: usize) -> Option<PathBuf> {
        (index < self.files.len()).then(|| self.files.remove(index))
    }

    pub fn remove_path<P: AsRef<Path>>(&mut self, path: P) -> bool {
        let before = self.files.len();
        self.files.retain(|p| p != path.as_ref());
        self.files.len() != before
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    /// Swap the entry with its predecessor. No-op for the first entry.
    pub fn move_up(&mut self, index: usize) -> bool {
        if index == 0 || index >= self.files.len() {
            return false;
        }
        self.files.swap(index - 1, index);
        true
    }

    /// Swap the entry with its successor. No-op for the last entry.
    pub fn move_down(&mut self, index: usize) -> bool {
        if index + 1 >= self.files.len() {
            return false;
        }
        self.files.swap(index, index + 1);
        true
    }

    /// Base names for display
    pub fn display_names(&self) -> Vec<String> {
        self.files
            .iter()
            .map(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| p.display().to_string())
            })
            .collect()
    }

    /// Paths that no longer exist on disk
    pub fn validate(&self) -> Vec<PathBuf> {
        self.files.iter().filter(|p| !p.exists()).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        self.files.iter()
    }

    pub fn as_slice(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn into_vec(self) -> Vec<PathBuf> {
        self.files
    }
}

impl<P: Into<PathBuf>> FromIterator<P> for FileList {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        let mut list = FileList::new();
        list.add_many(iter);
        list
    }
}

impl<'a> IntoIterator for &'a FileList {
    type Item = &'a PathBuf;
    type IntoIter = std::slice::Iter<'a, PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Where a tool writes the result for each input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputNaming {
    /// Appended to the input stem, e.g. `_compressed`
    pub suffix: String,
    /// Write over the input file instead of next to it
    pub overwrite_original: bool,
    /// Defaults to the directory of each input
    pub output_dir: Option<PathBuf>,
    /// Replaces the input extension when set, e.g. `docx`
    pub extension: Option<String>,
}

impl Default for OutputNaming {
    fn default() -> Self {
        Self::with_suffix("_processed")
    }
}

impl OutputNaming {
    pub fn with_suffix(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
            overwrite_original: false,
            output_dir: None,
            extension: None,
        }
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite_original = overwrite;
        self
    }

    pub fn in_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    /// Output path for `input`: `<dir>/<stem><suffix>.<ext>`
    pub fn output_for<P: AsRef<Path>>(&self, input: P) -> PathBuf {
        let input = input.as_ref();
        if self.overwrite_original && self.extension.is_none() {
            return input.to_path_buf();
        }

        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        let extension = self
            .extension
            .clone()
            .or_else(|| input.extension().map(|e| e.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "pdf".to_string());
        let suffix = if self.overwrite_original { "" } else { self.suffix.as_str() };
        let file_name = format!("{stem}{suffix}.{extension}");

        match &self.output_dir {
            Some(dir) => dir.join(file_name),
            None => input.with_file_name(file_name),
        }
    }
}

/// Human readable size: bytes below 1 KB, two decimals above
pub fn format_file_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let size = bytes as f64;
    if size < KB {
        format!("{bytes} B")
    } else if size < KB * KB {
        format!("{:.2} KB", size / KB)
    } else if size < KB * KB * KB {
        format!("{:.2} MB", size / (KB * KB))
    } else {
        format!("{:.2} GB", size / (KB * KB * KB))
    }
}

/// Percentage saved going from `original` to `new` bytes
pub fn compression_ratio(original: u64, new: u64) -> f64 {
    if original == 0 {
        return 0.0;
    }
    (1.0 - new as f64 / original as f64) * 100.0
}

pub fn file_size<P: AsRef<Path>>(path: P) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Stem of a path as an owned string
pub fn stem_of<P: AsRef<Path>>(path: P) -> String {
    path.as_ref()
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}
