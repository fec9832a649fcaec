//! PDF page rotation functionality
//!
//! This module provides functionality to rotate pages in PDF documents.
//! Rotation only touches the `/Rotate` entry of each page, so page content
//! and annotations are left as they are.

use std::path::Path;

use lopdf::Document;
use tracing::{info, warn};

use super::{is_lenient_syntax, PageSelection};
use crate::document::{self, page_rotation};
use crate::error::{Result, ToolboxError};

/// Suffix of rotated output files
pub const DEFAULT_SUFFIX: &str = "_rotated";

/// Rotation angle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationAngle {
    /// No rotation (0 degrees)
    None,
    /// 90 degrees clockwise
    Clockwise90,
    /// 180 degrees
    Rotate180,
    /// 270 degrees clockwise (90 degrees counter-clockwise)
    Clockwise270,
}

impl RotationAngle {
    /// Create from degrees
    pub fn from_degrees(degrees: i32) -> Result<Self> {
        match degrees.rem_euclid(360) {
            0 => Ok(RotationAngle::None),
            90 => Ok(RotationAngle::Clockwise90),
            180 => Ok(RotationAngle::Rotate180),
            270 => Ok(RotationAngle::Clockwise270),
            _ => Err(ToolboxError::InvalidRotation(degrees)),
        }
    }

    /// Convert to degrees
    pub fn to_degrees(self) -> i32 {
        match self {
            RotationAngle::None => 0,
            RotationAngle::Clockwise90 => 90,
            RotationAngle::Rotate180 => 180,
            RotationAngle::Clockwise270 => 270,
        }
    }

    /// Combine two rotations
    pub fn combine(self, other: RotationAngle) -> RotationAngle {
        match (self.to_degrees() + other.to_degrees()) % 360 {
            90 => RotationAngle::Clockwise90,
            180 => RotationAngle::Rotate180,
            270 => RotationAngle::Clockwise270,
            _ => RotationAngle::None,
        }
    }
}

/// Options for page rotation
#[derive(Debug, Clone)]
pub struct RotateOptions {
    /// Pages to rotate
    pub pages: PageSelection,
    /// Rotation angle
    pub angle: RotationAngle,
    /// Password for encrypted inputs
    pub password: Option<String>,
}

impl Default for RotateOptions {
    fn default() -> Self {
        Self {
            pages: PageSelection::All,
            angle: RotationAngle::Clockwise90,
            password: None,
        }
    }
}

impl RotateOptions {
    /// Select pages from `all`, `odd`, `even` or a custom range. Page 0,
    /// reversed and overlong spans are clamped to the document; a range
    /// that does not parse falls back to every page.
    pub fn with_pages(mut self, pages: &str) -> Self {
        self.pages = match PageSelection::parse(pages) {
            Ok(selection) => selection,
            Err(_) if is_lenient_syntax(pages) => PageSelection::Lenient(pages.trim().to_string()),
            Err(e) => {
                warn!("Page selection '{}' is invalid ({}), rotating all pages", pages, e);
                PageSelection::All
            }
        };
        self
    }
}

/// Add `angle` to the `/Rotate` of every selected page. Returns the number
/// of pages touched.
pub fn rotate_document(doc: &mut Document, angle: RotationAngle, pages: &PageSelection) -> Result<usize> {
    let page_ids = document::page_ids(doc);
    let total_pages = page_ids.len();
    if total_pages == 0 {
        return Err(ToolboxError::NoPagesToProcess);
    }

    let mut rotated = 0;
    for idx in pages.indices(total_pages) {
        let page_id = page_ids[idx];
        let current = page_rotation(doc, page_id);
        let new_rotation = (current + i64::from(angle.to_degrees())).rem_euclid(360);
        doc.get_dictionary_mut(page_id)?.set("Rotate", new_rotation);
        rotated += 1;
    }
    Ok(rotated)
}

/// Rotate pages in a PDF file
pub fn rotate_pdf_pages<P: AsRef<Path>, Q: AsRef<Path>>(
    input_path: P,
    output_path: Q,
    options: &RotateOptions,
) -> Result<usize> {
    let mut doc = document::load(input_path.as_ref(), options.password.as_deref())?;
    let rotated = rotate_document(&mut doc, options.angle, &options.pages)?;
    document::save(&mut doc, output_path.as_ref())?;
    info!(
        "Rotated {} page(s) of {} by {} degrees",
        rotated,
        input_path.as_ref().display(),
        options.angle.to_degrees()
    );
    Ok(rotated)
}
