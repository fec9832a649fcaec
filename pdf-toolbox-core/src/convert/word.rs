//! PDF → Word (.docx)
//!
//! The built-in engine writes the extracted text as plain paragraphs, one per
//! line, with a page break between PDF pages. Layout is not reconstructed;
//! for that the LibreOffice engine can be used instead.

use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::document::{self, info_dictionary, object_text};
use crate::error::{Result, ToolboxError};
use crate::external::{self, ExternalTools};
use crate::files::stem_of;
use crate::operations::overlay::selected_pages;
use crate::operations::PageRange;
use crate::text::TextExtractor;

pub const DEFAULT_SUFFIX: &str = "_converted";

const DOCUMENT_PART: &str = "word/document.xml";
const CORE_PART: &str = "docProps/core.xml";

const CONTENT_TYPES: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
    r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
    r#"<Default Extension="xml" ContentType="application/xml"/>"#,
    r#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#,
    r#"<Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/>"#,
    r#"</Types>"#
);

const PACKAGE_RELS: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>"#,
    r#"<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/>"#,
    r#"</Relationships>"#
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WordEngine {
    #[default]
    Native,
    LibreOffice,
}

impl FromStr for WordEngine {
    type Err = ToolboxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" | "builtin" => Ok(WordEngine::Native),
            "libreoffice" | "soffice" => Ok(WordEngine::LibreOffice),
            other => Err(ToolboxError::InvalidOption(format!("unknown conversion engine: {other}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PdfToWordOptions {
    pub engine: WordEngine,
    /// Only honoured by the built-in engine
    pub pages: PageRange,
    pub password: Option<String>,
    pub tools: ExternalTools,
}

impl Default for PdfToWordOptions {
    fn default() -> Self {
        Self {
            engine: WordEngine::Native,
            pages: PageRange::All,
            password: None,
            tools: ExternalTools::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WordConversion {
    pub output: PathBuf,
    pub pages: usize,
    /// Zero when LibreOffice did the conversion
    pub paragraphs: usize,
}

/// Escape text for XML character data and attribute values
pub(crate) fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c if (c as u32) < 0x20 && !matches!(c, '\t' | '\n' | '\r') => {}
            c => out.push(c),
        }
    }
    out
}

fn xml_unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn paragraph_xml(text: &str) -> String {
    format!(
        r#"<w:p><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#,
        xml_escape(text)
    )
}

fn document_xml(pages: &[Vec<String>]) -> String {
    let mut body = String::new();
    for (idx, lines) in pages.iter().enumerate() {
        if idx > 0 {
            body.push_str(r#"<w:p><w:r><w:br w:type="page"/></w:r></w:p>"#);
        }
        for line in lines {
            body.push_str(&paragraph_xml(line));
        }
    }
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">"#,
            r#"<w:body>{}<w:sectPr/></w:body></w:document>"#
        ),
        body
    )
}

fn core_xml(title: Option<&str>) -> String {
    let title = title
        .map(|t| format!("<dc:title>{}</dc:title>", xml_escape(t)))
        .unwrap_or_default();
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" "#,
            r#"xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" "#,
            r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">"#,
            r#"{}<dc:creator>pdf-toolbox</dc:creator>"#,
            r#"<dcterms:created xsi:type="dcterms:W3CDTF">{}</dcterms:created>"#,
            r#"</cp:coreProperties>"#
        ),
        title,
        Utc::now().format("%Y-%m-%dT%H:%M:%SZ")
    )
}

/// Package pages of text lines as a .docx file
pub fn build_docx(pages: &[Vec<String>], title: Option<&str>) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let parts = [
        ("[Content_Types].xml", CONTENT_TYPES.to_string()),
        ("_rels/.rels", PACKAGE_RELS.to_string()),
        (DOCUMENT_PART, document_xml(pages)),
        (CORE_PART, core_xml(title)),
    ];
    for (name, xml) in parts {
        zip.start_file(name, options)?;
        zip.write_all(xml.as_bytes())?;
    }
    Ok(zip.finish()?.into_inner())
}

fn read_part<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Option<String>> {
    match archive.by_name(name) {
        Ok(mut file) => {
            let mut xml = String::new();
            file.read_to_string(&mut xml)?;
            Ok(Some(xml))
        }
        Err(zip::result::ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn pattern(re: &str) -> Result<Regex> {
    Regex::new(re).map_err(|e| ToolboxError::InvalidStructure(e.to_string()))
}

/// Paragraph texts of a WordprocessingML body, in order. Paragraphs that
/// only carry a page break are skipped.
pub fn paragraphs_from_xml(xml: &str) -> Result<Vec<String>> {
    let paragraph = pattern(r"(?s)<w:p(?:\s[^>]*)?/>|<w:p(?:\s[^>]*[^/>])?>(.*?)</w:p>")?;
    let run = pattern(r#"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>|<w:tab/>|<w:br/>|<w:br w:type="page"/>"#)?;

    let mut out = Vec::new();
    for para in paragraph.captures_iter(xml) {
        let inner = para.get(1).map(|m| m.as_str()).unwrap_or("");
        let mut text = String::new();
        let mut page_break = false;
        for piece in run.captures_iter(inner) {
            match piece.get(1) {
                Some(t) => text.push_str(&xml_unescape(t.as_str())),
                None => match &piece[0] {
                    "<w:tab/>" => text.push('\t'),
                    "<w:br/>" => text.push('\n'),
                    _ => page_break = true,
                },
            }
        }
        if page_break && text.is_empty() {
            continue;
        }
        out.push(text);
    }
    Ok(out)
}

/// Paragraphs and `dc:title` of a .docx package
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocxText {
    pub title: Option<String>,
    pub paragraphs: Vec<String>,
}

pub fn read_docx_bytes(bytes: &[u8]) -> Result<DocxText> {
    read_docx_from(Cursor::new(bytes))
}

pub fn read_docx<P: AsRef<Path>>(path: P) -> Result<DocxText> {
    read_docx_from(File::open(path)?)
}

fn read_docx_from<R: Read + Seek>(reader: R) -> Result<DocxText> {
    let mut archive = ZipArchive::new(reader)?;
    let body = read_part(&mut archive, DOCUMENT_PART)?.ok_or_else(|| {
        ToolboxError::InvalidStructure(format!("{DOCUMENT_PART} missing from package"))
    })?;
    let title = match read_part(&mut archive, CORE_PART)? {
        Some(core) => pattern(r"(?s)<dc:title>(.*?)</dc:title>")?
            .captures(&core)
            .map(|c| xml_unescape(&c[1]))
            .filter(|t| !t.trim().is_empty()),
        None => None,
    };
    Ok(DocxText {
        title,
        paragraphs: paragraphs_from_xml(&body)?,
    })
}

fn pdf_title(doc: &lopdf::Document) -> Option<String> {
    info_dictionary(doc)
        .and_then(|info| info.get(b"Title").ok())
        .and_then(|title| object_text(doc, title))
        .filter(|t| !t.trim().is_empty())
}

fn convert_native(input: &Path, output: &Path, options: &PdfToWordOptions) -> Result<WordConversion> {
    let doc = document::load(input, options.password.as_deref())?;
    let total = document::page_count(&doc);
    let indices = options.pages.get_indices(total)?;
    if indices.is_empty() {
        return Err(ToolboxError::NoPagesToProcess);
    }

    let extractor = TextExtractor::new();
    let mut pages = Vec::with_capacity(indices.len());
    for (idx, page_id) in selected_pages(&doc, &indices) {
        let text = extractor.extract_page(&doc, page_id)?;
        let lines: Vec<String> = text
            .lines()
            .map(str::trim_end)
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect();
        debug!("Page {}: {} line(s)", idx + 1, lines.len());
        pages.push(lines);
    }

    let title = pdf_title(&doc).unwrap_or_else(|| stem_of(input));
    let bytes = build_docx(&pages, Some(&title))?;
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(output, bytes)?;

    Ok(WordConversion {
        output: output.to_path_buf(),
        pages: pages.len(),
        paragraphs: pages.iter().map(Vec::len).sum(),
    })
}

fn convert_libreoffice(input: &Path, output: &Path, options: &PdfToWordOptions) -> Result<WordConversion> {
    if options.pages != PageRange::All {
        warn!("LibreOffice converts every page; the page range is ignored");
    }
    let out_dir = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(out_dir)?;

    external::run(
        &options.tools.soffice,
        &[
            OsStr::new("--headless"),
            OsStr::new("--infilter=writer_pdf_import"),
            OsStr::new("--convert-to"),
            OsStr::new("docx"),
            OsStr::new("--outdir"),
            out_dir.as_os_str(),
            input.as_os_str(),
        ],
    )?;

    let produced = out_dir.join(format!("{}.docx", stem_of(input)));
    if produced != output {
        fs::rename(&produced, output)?;
    }
    let pages = document::load_raw(input).map(|d| document::page_count(&d)).unwrap_or(0);
    Ok(WordConversion {
        output: output.to_path_buf(),
        pages,
        paragraphs: 0,
    })
}

/// Convert `input` into a .docx at `output`
pub fn pdf_to_word<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    options: &PdfToWordOptions,
) -> Result<WordConversion> {
    let (input, output) = (input.as_ref(), output.as_ref());
    if !input.exists() {
        return Err(ToolboxError::FileNotFound(input.to_path_buf()));
    }
    let result = match options.engine {
        WordEngine::Native => convert_native(input, output, options)?,
        WordEngine::LibreOffice => convert_libreoffice(input, output, options)?,
    };
    info!(
        "Converted {} to {} ({} page(s))",
        input.display(),
        output.display(),
        result.pages
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_doc, write_sample};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_escape() {
        assert_eq!(xml_escape("a < b & \"c\""), "a &lt; b &amp; &quot;c&quot;");
        assert_eq!(xml_unescape(&xml_escape("x&y<'z'>")), "x&y<'z'>");
        assert_eq!(xml_escape("bell\u{7}"), "bell");
    }

    #[test]
    fn test_docx_package_reads_back() {
        let pages = vec![
            vec!["First line".to_string(), "R&D <notes>".to_string()],
            vec!["第二页".to_string()],
        ];
        let bytes = build_docx(&pages, Some("Report")).unwrap();
        let docx = read_docx_bytes(&bytes).unwrap();

        assert_eq!(docx.title.as_deref(), Some("Report"));
        assert_eq!(docx.paragraphs, vec!["First line", "R&D <notes>", "第二页"]);

        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let body = read_part(&mut archive, DOCUMENT_PART).unwrap().unwrap();
        assert_eq!(body.matches(r#"<w:br w:type="page"/>"#).count(), 1);
        assert!(read_part(&mut archive, "[Content_Types].xml").unwrap().is_some());
        assert!(read_part(&mut archive, "word/missing.xml").unwrap().is_none());
    }

    #[test]
    fn test_paragraph_parsing() {
        let xml = concat!(
            r#"<w:body><w:p><w:pPr><w:pStyle w:val="Title"/></w:pPr>"#,
            r#"<w:r><w:t>Hello</w:t></w:r><w:r><w:t xml:space="preserve"> world</w:t></w:r></w:p>"#,
            r#"<w:p/><w:p w:rsidR="00B2"/>"#,
            r#"<w:p w:rsidR="00A1"><w:r><w:t>a</w:t><w:tab/><w:t>b</w:t></w:r></w:p>"#,
            r#"</w:body>"#
        );
        assert_eq!(paragraphs_from_xml(xml).unwrap(), vec!["Hello world", "", "", "a\tb"]);
    }

    #[test]
    fn test_native_conversion() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_sample(dir.path(), "doc.pdf", 3);
        let output = dir.path().join("doc_converted.docx");
        let options = PdfToWordOptions {
            pages: PageRange::parse("2-3").unwrap(),
            ..Default::default()
        };

        let result = pdf_to_word(&input, &output, &options).unwrap();
        assert_eq!(result.pages, 2);
        assert_eq!(result.paragraphs, 2);

        let docx = read_docx(&output).unwrap();
        assert_eq!(docx.paragraphs, vec!["Page 2", "Page 3"]);
        assert_eq!(docx.title.as_deref(), Some("doc.pdf"));
    }

    #[test]
    fn test_out_of_range_pages() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_sample(dir.path(), "doc.pdf", 2);
        let options = PdfToWordOptions {
            pages: PageRange::parse("5").unwrap(),
            ..Default::default()
        };
        assert!(pdf_to_word(&input, dir.path().join("x.docx"), &options).is_err());
    }

    #[test]
    fn test_missing_libreoffice() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_sample(dir.path(), "doc.pdf", 1);
        let mut options = PdfToWordOptions {
            engine: WordEngine::LibreOffice,
            ..Default::default()
        };
        options.tools.soffice = PathBuf::from("no-such-soffice-9317");
        match pdf_to_word(&input, dir.path().join("doc.docx"), &options) {
            Err(ToolboxError::ExternalToolMissing(name)) => assert_eq!(name, "no-such-soffice-9317"),
            other => panic!("expected ExternalToolMissing, got {other:?}"),
        }
    }

    #[test]
    fn test_title_falls_back_to_metadata() {
        let doc = sample_doc(1, "Quarterly");
        assert_eq!(pdf_title(&doc).as_deref(), Some("Quarterly"));
    }
}
