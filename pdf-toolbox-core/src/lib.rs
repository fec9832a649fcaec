//! # pdf-toolbox
//!
//! Everyday PDF tasks on top of [`lopdf`]: the engine behind the
//! `pdftoolbox` command line and the HTTP API.
//!
//! ## Features
//!
//! - **Organize**: merge with per-file bookmarks, split by page, range or chunk, rotate pages
//! - **Shrink**: native stream recompression and image downsampling, or Ghostscript presets
//! - **Protect**: RC4 and AES password encryption, decryption with user or owner password
//! - **Convert**: PDF to Word, images and text; images and Office files to PDF
//! - **Edit**: watermarks, headers and footers, bookmarks, annotations, form fields, visual signatures, metadata
//! - **Analyze**: document comparison, OCR through Tesseract, structure optimization
//! - **Batch**: the same pipeline over many files on a worker pool with progress and cancellation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_toolbox::operations::{merge_pdf_files, MergeInput, MergeOptions};
//! use pdf_toolbox::{PageRange, Result};
//!
//! # fn main() -> Result<()> {
//! let inputs = vec![
//!     MergeInput::new("chapter1.pdf"),
//!     MergeInput::with_pages("chapter2.pdf", PageRange::parse("1-3")?),
//! ];
//! merge_pdf_files(inputs, "book.pdf", MergeOptions::default())?;
//! # Ok(())
//! # }
//! ```
//!
//! ```rust,no_run
//! use pdf_toolbox::encryption::{encrypt_pdf, EncryptOptions, EncryptionAlgorithm};
//!
//! # fn main() -> pdf_toolbox::Result<()> {
//! let mut options = EncryptOptions::new("secret");
//! options.algorithm = EncryptionAlgorithm::Aes128;
//! options.permissions.allow_copying = false;
//! encrypt_pdf("report.pdf", "report_encrypted.pdf", &options)?;
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod color;
pub mod config;
pub mod convert;
pub mod document;
pub mod encryption;
pub mod error;
pub mod external;
pub mod files;
pub mod fonts;
pub mod geometry;
pub mod ocr;
pub mod operations;
pub mod text;
pub mod tools;

#[cfg(test)]
pub(crate) mod test_support;

pub use color::Color;
pub use config::ToolboxConfig;
pub use error::{Result, ToolboxError};
pub use files::{FileList, OutputNaming};
pub use geometry::{PageSize, Point, Rectangle};
pub use operations::{PageRange, PageSelection};
pub use tools::{ToolCategory, ToolId};

pub use lopdf;

/// Current version of pdf-toolbox
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
