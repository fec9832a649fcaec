//! The tool menu: every panel with its category and titles

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{Result, ToolboxError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    Basic,
    Convert,
    Edit,
    Advanced,
}

impl ToolCategory {
    pub const ALL: [ToolCategory; 4] = [
        ToolCategory::Basic,
        ToolCategory::Convert,
        ToolCategory::Edit,
        ToolCategory::Advanced,
    ];

    pub fn title_zh(self) -> &'static str {
        match self {
            ToolCategory::Basic => "基础操作",
            ToolCategory::Convert => "转换功能",
            ToolCategory::Edit => "编辑功能",
            ToolCategory::Advanced => "高级功能",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            ToolCategory::Basic => "Basic",
            ToolCategory::Convert => "Convert",
            ToolCategory::Edit => "Edit",
            ToolCategory::Advanced => "Advanced",
        }
    }
}

/// One entry of the tool menu
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolId {
    Merge,
    Split,
    Compress,
    EncryptDecrypt,
    PdfToWord,
    PdfImages,
    PdfToText,
    WordToPdf,
    ExcelToPdf,
    PptToPdf,
    Watermark,
    Rotate,
    HeaderFooter,
    Bookmarks,
    Annotations,
    Forms,
    Compare,
    Ocr,
    Batch,
    Optimize,
    Signature,
    Metadata,
}

impl ToolId {
    /// Menu order
    pub const ALL: [ToolId; 22] = [
        ToolId::Merge,
        ToolId::Split,
        ToolId::Compress,
        ToolId::EncryptDecrypt,
        ToolId::PdfToWord,
        ToolId::PdfImages,
        ToolId::PdfToText,
        ToolId::WordToPdf,
        ToolId::ExcelToPdf,
        ToolId::PptToPdf,
        ToolId::Watermark,
        ToolId::Rotate,
        ToolId::HeaderFooter,
        ToolId::Bookmarks,
        ToolId::Annotations,
        ToolId::Forms,
        ToolId::Compare,
        ToolId::Ocr,
        ToolId::Batch,
        ToolId::Optimize,
        ToolId::Signature,
        ToolId::Metadata,
    ];

    pub fn category(self) -> ToolCategory {
        use ToolId::*;
        match self {
            Merge | Split | Compress | EncryptDecrypt => ToolCategory::Basic,
            PdfToWord | PdfImages | PdfToText | WordToPdf | ExcelToPdf | PptToPdf => {
                ToolCategory::Convert
            }
            Watermark | Rotate | HeaderFooter | Bookmarks | Annotations | Forms => {
                ToolCategory::Edit
            }
            Compare | Ocr | Batch | Optimize | Signature | Metadata => ToolCategory::Advanced,
        }
    }

    /// Label of the menu button
    pub fn title_zh(self) -> &'static str {
        use ToolId::*;
        match self {
            Merge => "PDF合并",
            Split => "PDF分割",
            Compress => "PDF压缩",
            EncryptDecrypt => "PDF加密/解密",
            PdfToWord => "PDF转Word",
            PdfImages => "PDF&图片互转",
            PdfToText => "PDF转文本",
            WordToPdf => "Word转PDF",
            ExcelToPdf => "Excel转PDF",
            PptToPdf => "PPT转PDF",
            Watermark => "PDF水印",
            Rotate => "PDF旋转",
            HeaderFooter => "PDF页眉页脚",
            Bookmarks => "PDF书签",
            Annotations => "PDF注释",
            Forms => "PDF表单",
            Compare => "PDF比较",
            Ocr => "OCR识别",
            Batch => "批量处理",
            Optimize => "PDF优化",
            Signature => "PDF签名",
            Metadata => "元数据编辑",
        }
    }

    pub fn title(self) -> &'static str {
        use ToolId::*;
        match self {
            Merge => "Merge",
            Split => "Split",
            Compress => "Compress",
            EncryptDecrypt => "Encrypt / Decrypt",
            PdfToWord => "PDF to Word",
            PdfImages => "PDF and images",
            PdfToText => "PDF to text",
            WordToPdf => "Word to PDF",
            ExcelToPdf => "Excel to PDF",
            PptToPdf => "PowerPoint to PDF",
            Watermark => "Watermark",
            Rotate => "Rotate",
            HeaderFooter => "Header and footer",
            Bookmarks => "Bookmarks",
            Annotations => "Annotations",
            Forms => "Forms",
            Compare => "Compare",
            Ocr => "OCR",
            Batch => "Batch processing",
            Optimize => "Optimize",
            Signature => "Signature",
            Metadata => "Metadata",
        }
    }

    pub fn description(self) -> &'static str {
        use ToolId::*;
        match self {
            Merge => "Combine several PDF files into one, with a bookmark per file",
            Split => "Split a PDF by page, by page ranges or into fixed-size chunks",
            Compress => "Reduce file size by recompressing streams and images",
            EncryptDecrypt => "Add or remove password protection",
            PdfToWord => "Convert PDF text into an editable Word document",
            PdfImages => "Render embedded page images to files, or combine images into a PDF",
            PdfToText => "Extract the text content of PDF files",
            WordToPdf => "Convert Word documents to PDF",
            ExcelToPdf => "Convert Excel workbooks to PDF",
            PptToPdf => "Convert PowerPoint presentations to PDF",
            Watermark => "Stamp text or image watermarks onto pages",
            Rotate => "Rotate pages by 90, 180 or 270 degrees",
            HeaderFooter => "Add headers, footers and page numbers",
            Bookmarks => "List, add or replace the document outline",
            Annotations => "Add notes, highlights and underlines",
            Forms => "List, fill or create form fields",
            Compare => "Compare the text and metadata of two PDF files",
            Ocr => "Recognise text on scanned pages",
            Batch => "Apply the same operations to many files",
            Optimize => "Clean up and shrink the document structure",
            Signature => "Place a visual signature on pages",
            Metadata => "View and edit document properties",
        }
    }

    /// Command line subcommand running this tool
    pub fn command(self) -> &'static str {
        use ToolId::*;
        match self {
            Merge => "merge",
            Split => "split",
            Compress => "compress",
            EncryptDecrypt => "encrypt",
            PdfToWord => "to-word",
            PdfImages => "to-images",
            PdfToText => "to-text",
            WordToPdf | ExcelToPdf | PptToPdf => "office-to-pdf",
            Watermark => "watermark",
            Rotate => "rotate",
            HeaderFooter => "header-footer",
            Bookmarks => "bookmarks",
            Annotations => "annotate",
            Forms => "form",
            Compare => "compare",
            Ocr => "ocr",
            Batch => "batch",
            Optimize => "optimize",
            Signature => "sign",
            Metadata => "metadata",
        }
    }

    pub fn in_category(category: ToolCategory) -> impl Iterator<Item = ToolId> {
        Self::ALL.into_iter().filter(move |t| t.category() == category)
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

impl FromStr for ToolId {
    type Err = ToolboxError;

    /// Accepts the kebab-case id or the menu label
    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        ToolId::ALL
            .into_iter()
            .find(|tool| {
                tool.id() == wanted.to_ascii_lowercase() || tool.title_zh() == wanted
            })
            .ok_or_else(|| ToolboxError::InvalidOption(format!("unknown tool: {wanted}")))
    }
}

impl ToolId {
    /// Stable kebab-case identifier
    pub fn id(self) -> &'static str {
        use ToolId::*;
        match self {
            Merge => "merge",
            Split => "split",
            Compress => "compress",
            EncryptDecrypt => "encrypt-decrypt",
            PdfToWord => "pdf-to-word",
            PdfImages => "pdf-images",
            PdfToText => "pdf-to-text",
            WordToPdf => "word-to-pdf",
            ExcelToPdf => "excel-to-pdf",
            PptToPdf => "ppt-to-pdf",
            Watermark => "watermark",
            Rotate => "rotate",
            HeaderFooter => "header-footer",
            Bookmarks => "bookmarks",
            Annotations => "annotations",
            Forms => "forms",
            Compare => "compare",
            Ocr => "ocr",
            Batch => "batch",
            Optimize => "optimize",
            Signature => "signature",
            Metadata => "metadata",
        }
    }
}

/// The menu as text, one block per category
pub fn render_menu() -> String {
    let mut text = String::from("PDF工具箱\n");
    for category in ToolCategory::ALL {
        text.push_str(&format!("\n{} ({})\n", category.title_zh(), category.title()));
        for tool in ToolId::in_category(category) {
            text.push_str(&format!(
                "  {:<14} {:<16} {}\n",
                tool.command(),
                tool.title_zh(),
                tool.description()
            ));
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    #[test]
    fn test_menu_groups() {
        let counts: Vec<usize> = ToolCategory::ALL
            .iter()
            .map(|c| ToolId::in_category(*c).count())
            .collect();
        assert_eq!(counts, vec![4, 6, 6, 6]);
    }

    #[test]
    fn test_ids_are_unique_and_parse_back() {
        let ids: HashSet<&str> = ToolId::ALL.iter().map(|t| t.id()).collect();
        assert_eq!(ids.len(), ToolId::ALL.len());
        for tool in ToolId::ALL {
            assert_eq!(tool.id().parse::<ToolId>().unwrap(), tool);
            assert_eq!(tool.title_zh().parse::<ToolId>().unwrap(), tool);
        }
        assert!("nope".parse::<ToolId>().is_err());
    }

    #[test]
    fn test_serializes_as_id() {
        for tool in ToolId::ALL {
            assert_eq!(
                serde_json::to_value(tool).unwrap(),
                serde_json::Value::String(tool.id().to_string())
            );
        }
    }

    #[test]
    fn test_render_menu() {
        let menu = render_menu();
        assert!(menu.starts_with("PDF工具箱\n\n基础操作 (Basic)\n"));
        assert!(menu.contains("OCR识别"));
        assert_eq!(menu.matches("office-to-pdf").count(), 3);
    }
}
