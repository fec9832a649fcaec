//! Visual signatures
//!
//! A signature is a line of text or an image stamped onto one page. No
//! cryptographic signature is attached.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use lopdf::Document;
use tracing::info;

use super::overlay::{append_content, font_resource, image_operators, xobject_resource, TextRun};
use crate::color::Color;
use crate::convert::images::embed_image_file;
use crate::document;
use crate::error::{Result, ToolboxError};
use crate::files::stem_of;
use crate::fonts::StampFont;

pub const DEFAULT_SUFFIX: &str = "_signed";

/// What the signature looks like
#[derive(Debug, Clone, PartialEq)]
pub enum SignatureKind {
    Text { text: String, font_size: f64 },
    Image { path: PathBuf, width: f64 },
}

impl SignatureKind {
    fn label(&self) -> &'static str {
        match self {
            SignatureKind::Text { .. } => "text",
            SignatureKind::Image { .. } => "image",
        }
    }
}

impl Default for SignatureKind {
    fn default() -> Self {
        SignatureKind::Text {
            text: "签名".to_string(),
            font_size: 20.0,
        }
    }
}

/// Placement of the signature, in PDF points from the bottom-left corner
#[derive(Debug, Clone)]
pub struct SignatureOptions {
    pub kind: SignatureKind,
    /// 1-based
    pub page: usize,
    pub x: f64,
    pub y: f64,
    pub color: Color,
    pub password: Option<String>,
}

impl Default for SignatureOptions {
    fn default() -> Self {
        Self {
            kind: SignatureKind::default(),
            page: 1,
            x: 100.0,
            y: 100.0,
            color: Color::black(),
            password: None,
        }
    }
}

/// Stamp the signature onto `doc`
pub fn sign_document(doc: &mut Document, options: &SignatureOptions) -> Result<()> {
    let page_id = document::page_id(doc, options.page)?;
    let content = match &options.kind {
        SignatureKind::Text { text, font_size } => {
            if text.trim().is_empty() {
                return Err(ToolboxError::InvalidOption("signature text is empty".to_string()));
            }
            let face = StampFont::for_text([text.as_str()]);
            let font_id = face.add_to(doc);
            let font = font_resource(doc, page_id, font_id)?;
            let run = TextRun {
                text,
                font: &font,
                face,
                size: *font_size,
                color: options.color,
                x: options.x,
                y: options.y,
                rotation: 0.0,
            };
            format!("q\n{}Q\n", run.operators())
        }
        SignatureKind::Image { path, width } => {
            if *width <= 0.0 {
                return Err(ToolboxError::InvalidOption(format!(
                    "signature width must be positive, got {width}"
                )));
            }
            let image = embed_image_file(doc, path, None)?;
            let name = xobject_resource(doc, page_id, image.id)?;
            let height = width * f64::from(image.height) / f64::from(image.width.max(1));
            image_operators(&name, options.x, options.y, *width, height)
        }
    };
    append_content(doc, page_id, content.into_bytes())
}

/// Summary written next to the signed file
pub fn signature_info(input: &Path, output: &Path, options: &SignatureOptions) -> String {
    let file_name = |p: &Path| {
        p.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    };
    let mut info = String::new();
    let _ = writeln!(info, "PDF签名信息");
    let _ = writeln!(info, "{}", "=".repeat(50));
    let _ = writeln!(info, "源文件: {}", file_name(input));
    let _ = writeln!(info, "签名类型: {}", options.kind.label());
    match &options.kind {
        SignatureKind::Text { text, font_size } => {
            let _ = writeln!(info, "签名文本: {text}");
            let _ = writeln!(info, "字体大小: {font_size}");
        }
        SignatureKind::Image { path, .. } => {
            let _ = writeln!(info, "签名图片: {}", path.display());
        }
    }
    let _ = writeln!(
        info,
        "签名位置: 第 {} 页, X={}, Y={}",
        options.page, options.x, options.y
    );
    let _ = writeln!(info, "输出文件: {}", file_name(output));
    info
}

/// Sign `input` into `output` and write `<stem>_signature_info.txt` beside
/// the output. Returns the path of the summary file.
pub fn sign_pdf<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    options: &SignatureOptions,
) -> Result<PathBuf> {
    let (input, output) = (input.as_ref(), output.as_ref());
    let mut doc = document::load(input, options.password.as_deref())?;
    sign_document(&mut doc, options)?;
    document::save(&mut doc, output)?;

    let info_path = output.with_file_name(format!("{}_signature_info.txt", stem_of(input)));
    fs::write(&info_path, signature_info(input, output, options))?;
    info!(
        "Signed page {} of {} into {}",
        options.page,
        input.display(),
        output.display()
    );
    Ok(info_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::page_ids;
    use crate::test_support::{sample_doc, write_sample};
    use crate::text::extract_pages;
    use image::{Rgb, RgbImage};

    fn page_content(doc: &Document, idx: usize) -> String {
        let id = page_ids(doc)[idx];
        String::from_utf8_lossy(&doc.get_page_content(id).unwrap()).into_owned()
    }

    #[test]
    fn test_default_text_signature() {
        let mut doc = sample_doc(2, "s");
        sign_document(&mut doc, &SignatureOptions::default()).unwrap();

        let content = page_content(&doc, 0);
        assert!(content.contains("1 0 0 1 100 100 Tm <7B7E540D> Tj"));
        assert!(!page_content(&doc, 1).contains("Tm"));

        let text = extract_pages(&doc).unwrap();
        assert!(text[0].contains("签名"));
    }

    #[test]
    fn test_page_out_of_range() {
        let mut doc = sample_doc(2, "s");
        let options = SignatureOptions {
            page: 3,
            ..Default::default()
        };
        assert!(matches!(
            sign_document(&mut doc, &options),
            Err(ToolboxError::PageIndexOutOfBounds(2, 2))
        ));

        let options = SignatureOptions {
            page: 0,
            ..Default::default()
        };
        assert!(sign_document(&mut doc, &options).is_err());
    }

    #[test]
    fn test_image_signature_keeps_aspect_ratio() {
        let dir = tempfile::tempdir().unwrap();
        let stamp = dir.path().join("stamp.png");
        RgbImage::from_pixel(40, 20, Rgb([0, 0, 255])).save(&stamp).unwrap();

        let mut doc = sample_doc(1, "s");
        let options = SignatureOptions {
            kind: SignatureKind::Image {
                path: stamp,
                width: 120.0,
            },
            x: 300.0,
            y: 50.0,
            ..Default::default()
        };
        sign_document(&mut doc, &options).unwrap();
        assert!(page_content(&doc, 0).contains("q 120 0 0 60 300 50 cm /TbIm1 Do Q"));
    }

    #[test]
    fn test_sign_file_writes_summary() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_sample(dir.path(), "contract.pdf", 1);
        let output = dir.path().join("contract_signed.pdf");
        let options = SignatureOptions {
            kind: SignatureKind::Text {
                text: "J. Doe".to_string(),
                font_size: 18.0,
            },
            ..Default::default()
        };

        let info_path = sign_pdf(&input, &output, &options).unwrap();
        assert_eq!(info_path, dir.path().join("contract_signature_info.txt"));
        let summary = fs::read_to_string(info_path).unwrap();
        assert!(summary.starts_with("PDF签名信息\n"));
        assert!(summary.contains("源文件: contract.pdf\n"));
        assert!(summary.contains("签名文本: J. Doe\n"));
        assert!(summary.contains("签名位置: 第 1 页, X=100, Y=100\n"));
        assert!(summary.ends_with("输出文件: contract_signed.pdf\n"));

        let doc = document::load(&output, None).unwrap();
        assert!(extract_pages(&doc).unwrap()[0].contains("J. Doe"));
    }
}
