//! Text recognition for scanned pages
//!
//! Pages that already carry a text layer are read directly. Otherwise each
//! embedded image of the page is handed to an [`OcrProvider`]; the default
//! provider runs the Tesseract command line tool.

use std::ffi::OsStr;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::convert::images::{decode_image, page_image_ids};
use crate::document;
use crate::error::{Result, ToolboxError};
use crate::external;
use crate::operations::overlay::selected_pages;
use crate::operations::PageRange;
use crate::text::TextExtractor;

/// Tesseract language code for simplified Chinese
pub const DEFAULT_LANGUAGE: &str = "chi_sim";

/// Languages offered by the OCR panel
pub const LANGUAGES: &[(&str, &str)] = &[
    ("chi_sim", "简体中文"),
    ("chi_tra", "繁体中文"),
    ("eng", "英文"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrOptions {
    /// Tesseract language, `+` joins several (`chi_sim+eng`)
    pub language: String,
    pub pages: PageRange,
    pub password: Option<String>,
}

impl Default for OcrOptions {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            pages: PageRange::All,
            password: None,
        }
    }
}

/// Text recognised in one image
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OcrPageText {
    pub text: String,
    /// Mean word confidence in percent, when the engine reports it
    pub confidence: Option<f64>,
}

pub trait OcrProvider: Send + Sync {
    /// Recognise the text of an encoded (PNG or JPEG) image
    fn process_image(&self, image: &[u8], options: &OcrOptions) -> Result<OcrPageText>;

    fn name(&self) -> &str;

    fn is_available(&self) -> bool {
        true
    }
}

/// Runs `tesseract <image> stdout -l <language>`
#[derive(Debug, Clone)]
pub struct TesseractProvider {
    program: PathBuf,
}

impl Default for TesseractProvider {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

static SCRATCH_COUNTER: AtomicUsize = AtomicUsize::new(0);

impl TesseractProvider {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn scratch_path(image: &[u8]) -> PathBuf {
        let ext = if image.starts_with(&[0xFF, 0xD8]) { "jpg" } else { "png" };
        let n = SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("pdftoolbox-ocr-{}-{n}.{ext}", std::process::id()))
    }
}

impl OcrProvider for TesseractProvider {
    fn process_image(&self, image: &[u8], options: &OcrOptions) -> Result<OcrPageText> {
        let scratch = Self::scratch_path(image);
        fs::write(&scratch, image)?;
        let result = external::run(
            &self.program,
            &[
                scratch.as_os_str(),
                OsStr::new("stdout"),
                OsStr::new("-l"),
                OsStr::new(&options.language),
            ],
        );
        if let Err(e) = fs::remove_file(&scratch) {
            debug!("Could not remove {}: {}", scratch.display(), e);
        }
        let output = result?;
        Ok(OcrPageText {
            text: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            confidence: None,
        })
    }

    fn name(&self) -> &str {
        "tesseract"
    }

    fn is_available(&self) -> bool {
        external::probe(&self.program, "--version")
    }
}

/// Returns the same text for every image and counts the calls
#[derive(Debug, Default)]
pub struct MockOcrProvider {
    text: String,
    calls: AtomicUsize,
}

impl MockOcrProvider {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl OcrProvider for MockOcrProvider {
    fn process_image(&self, image: &[u8], _options: &OcrOptions) -> Result<OcrPageText> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if image.is_empty() {
            return Err(ToolboxError::Ocr("empty image".to_string()));
        }
        Ok(OcrPageText {
            text: self.text.clone(),
            confidence: Some(100.0),
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSource {
    TextLayer,
    Ocr,
    /// Neither a text layer nor recognisable images
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrPage {
    /// 1-based
    pub number: usize,
    pub source: PageSource,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrReport {
    pub file: PathBuf,
    pub pages: Vec<OcrPage>,
    /// Set when the file could not be processed at all
    pub error: Option<String>,
}

impl OcrReport {
    pub fn failed<P: Into<PathBuf>>(file: P, error: &ToolboxError) -> Self {
        Self {
            file: file.into(),
            pages: Vec::new(),
            error: Some(error.to_string()),
        }
    }

    /// Text of all pages, separated by blank lines
    pub fn text(&self) -> String {
        self.pages
            .iter()
            .map(|p| p.text.as_str())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn pages_from(&self, source: PageSource) -> usize {
        self.pages.iter().filter(|p| p.source == source).count()
    }

    fn render_section(&self, out: &mut String) {
        let name = self
            .file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let _ = writeln!(out, "文件: {name}");
        let _ = writeln!(out, "{}", "-".repeat(30));
        if let Some(error) = &self.error {
            let _ = writeln!(out, "处理文件时出错: {error}\n");
            return;
        }
        for page in &self.pages {
            let _ = writeln!(out, "第 {} 页:", page.number);
            match page.source {
                PageSource::Empty => {
                    let _ = writeln!(out, "(无法提取文本，该页是没有图像的扫描页)\n");
                }
                _ => {
                    let _ = writeln!(out, "{}\n", page.text);
                }
            }
        }
    }

    /// Report text for this file
    pub fn render(&self) -> String {
        render_reports(std::slice::from_ref(self))
    }

    pub fn save_text<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        save_reports(std::slice::from_ref(self), path)
    }
}

/// Report text covering several files
pub fn render_reports(reports: &[OcrReport]) -> String {
    let rule = "=".repeat(50);
    let mut out = format!("OCR识别结果\n{rule}\n\n");
    for report in reports {
        report.render_section(&mut out);
    }
    let _ = writeln!(out, "{rule}");
    out.push_str("OCR识别完成\n");
    out
}

pub fn save_reports<P: AsRef<Path>>(reports: &[OcrReport], path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, render_reports(reports))?;
    Ok(())
}

fn recognise_images(
    doc: &lopdf::Document,
    page_id: lopdf::ObjectId,
    provider: &dyn OcrProvider,
    options: &OcrOptions,
) -> Vec<String> {
    let mut texts = Vec::new();
    for image_id in page_image_ids(doc, page_id) {
        let recognised = doc
            .get_object(image_id)
            .and_then(lopdf::Object::as_stream)
            .map_err(ToolboxError::from)
            .and_then(|stream| decode_image(doc, stream))
            .and_then(|image| image.to_png_or_jpeg())
            .and_then(|bytes| provider.process_image(&bytes, options));
        match recognised {
            Ok(result) if !result.text.trim().is_empty() => texts.push(result.text),
            Ok(_) => debug!("Image {:?} has no recognisable text", image_id),
            Err(e) => warn!("Skipping image {:?}: {}", image_id, e),
        }
    }
    texts
}

/// Recognise the text of every selected page of a loaded document
pub fn ocr_document(
    doc: &lopdf::Document,
    provider: &dyn OcrProvider,
    options: &OcrOptions,
) -> Result<Vec<OcrPage>> {
    let indices = options.pages.get_indices(document::page_count(doc))?;
    let extractor = TextExtractor::new();
    let mut pages = Vec::with_capacity(indices.len());

    for (idx, page_id) in selected_pages(doc, &indices) {
        let layer = extractor.extract_page(doc, page_id)?;
        let page = if !layer.trim().is_empty() {
            OcrPage {
                number: idx + 1,
                source: PageSource::TextLayer,
                text: layer.trim_end().to_string(),
            }
        } else {
            let texts = recognise_images(doc, page_id, provider, options);
            if texts.is_empty() {
                OcrPage {
                    number: idx + 1,
                    source: PageSource::Empty,
                    text: String::new(),
                }
            } else {
                OcrPage {
                    number: idx + 1,
                    source: PageSource::Ocr,
                    text: texts.join("\n"),
                }
            }
        };
        debug!("Page {}: {:?}", page.number, page.source);
        pages.push(page);
    }
    Ok(pages)
}

/// Recognise the text of a PDF file
pub fn ocr_pdf<P: AsRef<Path>>(
    path: P,
    provider: &dyn OcrProvider,
    options: &OcrOptions,
) -> Result<OcrReport> {
    let path = path.as_ref();
    let doc = document::load(path, options.password.as_deref())?;
    let pages = ocr_document(&doc, provider, options)?;
    let report = OcrReport {
        file: path.to_path_buf(),
        pages,
        error: None,
    };
    info!(
        "OCR {} with {}: {} text layer, {} recognised, {} empty",
        path.display(),
        provider.name(),
        report.pages_from(PageSource::TextLayer),
        report.pages_from(PageSource::Ocr),
        report.pages_from(PageSource::Empty)
    );
    Ok(report)
}
