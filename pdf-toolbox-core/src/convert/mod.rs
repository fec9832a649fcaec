//! Conversions between PDF and other formats

pub mod images;
pub mod office;
pub mod text_layout;
pub mod word;

pub use images::{images_to_pdf, pdf_to_images, ImageFormat, ImagesToPdfOptions, PdfToImagesOptions};
pub use office::{office_to_pdf, OfficeConversion, OfficeEngine, OfficeToPdfOptions};
pub use text_layout::{text_to_pdf, TextLayout};
pub use word::{pdf_to_word, read_docx, PdfToWordOptions, WordConversion, WordEngine};
