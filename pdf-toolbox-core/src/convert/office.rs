//! Word, Excel and PowerPoint → PDF through LibreOffice
//!
//! Without LibreOffice only `.docx` can be converted: its paragraphs are
//! set as plain text pages.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::text_layout::TextLayout;
use super::word::read_docx;
use crate::document;
use crate::error::{Result, ToolboxError};
use crate::external::{self, ExternalTools};
use crate::files::{stem_of, OFFICE_EXTENSIONS};

#[derive(Debug, Clone)]
pub struct OfficeToPdfOptions {
    /// Export comments (LibreOffice `ExportNotes`)
    pub include_comments: bool,
    /// LibreOffice has no export switch for this; tracked changes are
    /// printed as the document itself is set to show them
    pub include_tracked_changes: bool,
    /// Next to each input when unset
    pub output_dir: Option<PathBuf>,
    pub tools: ExternalTools,
    /// Use the built-in text layout for `.docx` when LibreOffice is missing
    pub allow_fallback: bool,
}

impl Default for OfficeToPdfOptions {
    fn default() -> Self {
        Self {
            include_comments: false,
            include_tracked_changes: false,
            output_dir: None,
            tools: ExternalTools::default(),
            allow_fallback: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OfficeEngine {
    LibreOffice,
    BuiltIn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OfficeConversion {
    pub input: PathBuf,
    pub output: PathBuf,
    pub engine: OfficeEngine,
}

fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

fn export_filter(ext: &str) -> &'static str {
    match ext {
        "xls" | "xlsx" | "ods" => "calc_pdf_Export",
        "ppt" | "pptx" | "odp" => "impress_pdf_Export",
        _ => "writer_pdf_Export",
    }
}

/// Value of `--convert-to` for `ext`
pub fn convert_to_argument(ext: &str, options: &OfficeToPdfOptions) -> String {
    let mut settings = Vec::new();
    if options.include_comments {
        settings.push(r#""ExportNotes":{"type":"boolean","value":"true"}"#);
    }
    if settings.is_empty() {
        "pdf".to_string()
    } else {
        format!("pdf:{}:{{{}}}", export_filter(ext), settings.join(","))
    }
}

fn convert_builtin(input: &Path, output: &Path) -> Result<()> {
    let docx = read_docx(input)?;
    let title = docx.title.clone().unwrap_or_else(|| stem_of(input));
    let mut doc = TextLayout::default().layout(&docx.paragraphs, Some(&title))?;
    document::save(&mut doc, output)?;
    Ok(())
}

/// Convert one Office document to PDF, returning where it was written
pub fn office_to_pdf<P: AsRef<Path>>(input: P, options: &OfficeToPdfOptions) -> Result<OfficeConversion> {
    let input = input.as_ref();
    if !input.is_file() {
        return Err(ToolboxError::FileNotFound(input.to_path_buf()));
    }
    let ext = extension(input);
    if !OFFICE_EXTENSIONS.contains(&ext.as_str()) {
        return Err(ToolboxError::InvalidOption(format!(
            "unsupported document type: .{ext}"
        )));
    }

    let out_dir = options
        .output_dir
        .clone()
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&out_dir)?;
    let output = out_dir.join(format!("{}.pdf", stem_of(input)));

    let args: Vec<OsString> = vec![
        "--headless".into(),
        "--convert-to".into(),
        convert_to_argument(&ext, options).into(),
        "--outdir".into(),
        out_dir.clone().into_os_string(),
        input.as_os_str().to_os_string(),
    ];
    let args: Vec<&std::ffi::OsStr> = args.iter().map(OsString::as_os_str).collect();

    if options.include_tracked_changes {
        debug!("Tracked changes are exported as the document displays them");
    }
    let engine = match external::run(&options.tools.soffice, &args) {
        Ok(_) => OfficeEngine::LibreOffice,
        Err(ToolboxError::ExternalToolMissing(tool)) if options.allow_fallback && ext == "docx" => {
            warn!("{} not found, converting {} as plain text", tool, input.display());
            convert_builtin(input, &output)?;
            OfficeEngine::BuiltIn
        }
        Err(e) => return Err(e),
    };
    if !output.exists() {
        return Err(ToolboxError::ExternalToolFailed {
            tool: "soffice".to_string(),
            message: format!("no output produced for {}", input.display()),
        });
    }

    debug!("Engine: {:?}", engine);
    info!("Converted {} to {}", input.display(), output.display());
    Ok(OfficeConversion {
        input: input.to_path_buf(),
        output,
        engine,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::word::build_docx;
    use crate::text::extract_pages;
    use pretty_assertions::assert_eq;

    fn without_soffice() -> OfficeToPdfOptions {
        let mut options = OfficeToPdfOptions::default();
        options.tools.soffice = PathBuf::from("no-such-soffice-5521");
        options
    }

    #[test]
    fn test_convert_to_argument() {
        let mut options = OfficeToPdfOptions::default();
        assert_eq!(convert_to_argument("docx", &options), "pdf");

        options.include_comments = true;
        assert_eq!(
            convert_to_argument("xlsx", &options),
            r#"pdf:calc_pdf_Export:{"ExportNotes":{"type":"boolean","value":"true"}}"#
        );

        options.include_tracked_changes = true;
        assert!(convert_to_argument("docx", &options).starts_with("pdf:writer_pdf_Export:{"));
        assert!(convert_to_argument("pptx", &options).starts_with("pdf:impress_pdf_Export:{"));
    }

    #[test]
    fn test_docx_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("letter.docx");
        let pages = vec![vec!["Dear reader,".to_string(), "Thanks.".to_string()]];
        fs::write(&input, build_docx(&pages, Some("Letter")).unwrap()).unwrap();

        let options = OfficeToPdfOptions {
            output_dir: Some(dir.path().join("out")),
            ..without_soffice()
        };
        let result = office_to_pdf(&input, &options).unwrap();
        assert_eq!(result.engine, OfficeEngine::BuiltIn);
        assert_eq!(result.output, dir.path().join("out").join("letter.pdf"));

        let doc = document::load(&result.output, None).unwrap();
        let text = extract_pages(&doc).unwrap().join("\n");
        assert!(text.contains("Dear reader,"));
        assert!(text.contains("Thanks."));
    }

    #[test]
    fn test_other_formats_need_libreoffice() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("sheet.xlsx");
        fs::write(&input, b"not really a workbook").unwrap();
        assert!(matches!(
            office_to_pdf(&input, &without_soffice()),
            Err(ToolboxError::ExternalToolMissing(_))
        ));
    }

    #[test]
    fn test_fallback_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.docx");
        fs::write(&input, build_docx(&[vec!["x".to_string()]], None).unwrap()).unwrap();
        let options = OfficeToPdfOptions {
            allow_fallback: false,
            ..without_soffice()
        };
        assert!(matches!(
            office_to_pdf(&input, &options),
            Err(ToolboxError::ExternalToolMissing(_))
        ));
    }

    #[test]
    fn test_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("notes.txt");
        fs::write(&input, b"hi").unwrap();
        assert!(matches!(
            office_to_pdf(&input, &OfficeToPdfOptions::default()),
            Err(ToolboxError::InvalidOption(_))
        ));
    }
}
