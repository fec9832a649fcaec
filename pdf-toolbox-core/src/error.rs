use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolboxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("Invalid PDF structure: {0}")]
    InvalidStructure(String),

    #[error("Invalid page range: {0}")]
    InvalidPageRange(String),

    #[error("Page index {0} out of bounds (document has {1} pages)")]
    PageIndexOutOfBounds(usize, usize),

    #[error("Invalid rotation angle: {0} (must be multiple of 90)")]
    InvalidRotation(i32),

    #[error("No pages to process")]
    NoPagesToProcess,

    #[error("No input files")]
    NoInputFiles,

    #[error("Invalid option: {0}")]
    InvalidOption(String),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Output file already exists: {}", .0.display())]
    OutputExists(PathBuf),

    #[error("Document is encrypted, a password is required")]
    PasswordRequired,

    #[error("Wrong password or file not encrypted")]
    WrongPassword,

    #[error("Unsupported encryption: {0}")]
    UnsupportedEncryption(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("External tool not found: {0}")]
    ExternalToolMissing(String),

    #[error("External tool {tool} failed: {message}")]
    ExternalToolFailed { tool: String, message: String },

    #[error("Form field not found: {0}")]
    FieldNotFound(String),

    #[error("OCR error: {0}")]
    Ocr(String),

    #[error("Operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, ToolboxError>;

impl ToolboxError {
    /// Errors that concern the user's input rather than the environment.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            ToolboxError::InvalidPageRange(_)
                | ToolboxError::PageIndexOutOfBounds(..)
                | ToolboxError::InvalidRotation(_)
                | ToolboxError::NoPagesToProcess
                | ToolboxError::NoInputFiles
                | ToolboxError::InvalidOption(_)
                | ToolboxError::FileNotFound(_)
                | ToolboxError::OutputExists(_)
                | ToolboxError::PasswordRequired
                | ToolboxError::WrongPassword
                | ToolboxError::FieldNotFound(_)
        )
    }
}
