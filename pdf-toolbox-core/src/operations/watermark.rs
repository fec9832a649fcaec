//! Text and image watermarks
//!
//! A watermark is painted as an overlay content stream on every selected
//! page, with an ExtGState carrying its opacity.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use lopdf::Document;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::overlay::{
    append_content, font_resource, image_operators, opacity_resource, xobject_resource, TextRun,
};
use super::PageSelection;
use crate::color::Color;
use crate::convert::images::embed_image_file;
use crate::document::{self, media_box};
use crate::error::{Result, ToolboxError};
use crate::fonts::StampFont;
use crate::geometry::Rectangle;

pub const DEFAULT_SUFFIX: &str = "_watermarked";

/// Distance kept from the page edge by corner positions
const MARGIN: f64 = 36.0;

/// Where the watermark goes on the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WatermarkPosition {
    #[default]
    Center,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    /// Repeated over the whole page
    Tile,
}

impl FromStr for WatermarkPosition {
    type Err = ToolboxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "center" | "centre" => Ok(WatermarkPosition::Center),
            "top-left" => Ok(WatermarkPosition::TopLeft),
            "top-right" => Ok(WatermarkPosition::TopRight),
            "bottom-left" => Ok(WatermarkPosition::BottomLeft),
            "bottom-right" => Ok(WatermarkPosition::BottomRight),
            "tile" | "tiled" => Ok(WatermarkPosition::Tile),
            other => Err(ToolboxError::InvalidOption(format!(
                "unknown watermark position: {other}"
            ))),
        }
    }
}

/// What is drawn
#[derive(Debug, Clone, PartialEq)]
pub enum WatermarkContent {
    Text {
        text: String,
        font_size: f64,
        color: Color,
        /// Counter-clockwise, in degrees
        rotation: f64,
    },
    Image {
        path: PathBuf,
        /// Image width as a fraction of the page width
        scale: f64,
    },
}

impl WatermarkContent {
    /// Text watermark with the default size, colour and angle
    pub fn text(text: impl Into<String>) -> Self {
        WatermarkContent::Text {
            text: text.into(),
            font_size: 36.0,
            color: Color::gray(0.5),
            rotation: 45.0,
        }
    }

    pub fn image<P: Into<PathBuf>>(path: P) -> Self {
        WatermarkContent::Image {
            path: path.into(),
            scale: 0.3,
        }
    }
}

/// Options for watermarking
#[derive(Debug, Clone)]
pub struct WatermarkOptions {
    pub content: WatermarkContent,
    /// Opacity in percent, 0 to 100
    pub opacity: u8,
    pub position: WatermarkPosition,
    pub pages: PageSelection,
    pub password: Option<String>,
}

impl Default for WatermarkOptions {
    fn default() -> Self {
        Self {
            content: WatermarkContent::text(" confidential "),
            opacity: 50,
            position: WatermarkPosition::Center,
            pages: PageSelection::All,
            password: None,
        }
    }
}

/// Anchor points for a box of `width` x `height` on `page`
fn anchors(position: WatermarkPosition, page: &Rectangle, width: f64, height: f64) -> Vec<(f64, f64)> {
    let (left, bottom) = (page.lower_left.x, page.lower_left.y);
    let (right, top) = (page.upper_right.x, page.upper_right.y);
    let center = page.center();
    match position {
        WatermarkPosition::Center => vec![(center.x, center.y)],
        WatermarkPosition::TopLeft => vec![(left + MARGIN + width / 2.0, top - MARGIN - height / 2.0)],
        WatermarkPosition::TopRight => vec![(right - MARGIN - width / 2.0, top - MARGIN - height / 2.0)],
        WatermarkPosition::BottomLeft => vec![(left + MARGIN + width / 2.0, bottom + MARGIN + height / 2.0)],
        WatermarkPosition::BottomRight => vec![(right - MARGIN - width / 2.0, bottom + MARGIN + height / 2.0)],
        WatermarkPosition::Tile => {
            let step_x = (width * 1.5).max(72.0);
            let step_y = (height * 3.0).max(72.0);
            let mut points = Vec::new();
            let mut y = bottom + step_y / 2.0;
            while y < top {
                let mut x = left + step_x / 2.0;
                while x < right {
                    points.push((x, y));
                    x += step_x;
                }
                y += step_y;
            }
            points
        }
    }
}

/// Stamp the watermark on the selected pages of `doc`. Returns the number
/// of pages stamped.
pub fn apply_watermark(doc: &mut Document, options: &WatermarkOptions) -> Result<usize> {
    let page_ids = document::page_ids(doc);
    if page_ids.is_empty() {
        return Err(ToolboxError::NoPagesToProcess);
    }
    let opacity = f64::from(options.opacity.min(100)) / 100.0;

    let mut stamped = 0;
    match &options.content {
        WatermarkContent::Text {
            text,
            font_size,
            color,
            rotation,
        } => {
            if text.trim().is_empty() {
                return Err(ToolboxError::InvalidOption("watermark text is empty".to_string()));
            }
            let face = StampFont::for_text([text.as_str()]);
            let font_id = face.add_to(doc);
            let width = face.text_width(text, *font_size);
            let (sin, cos) = rotation.to_radians().sin_cos();

            for idx in options.pages.indices(page_ids.len()) {
                let page_id = page_ids[idx];
                let font = font_resource(doc, page_id, font_id)?;
                let gs = opacity_resource(doc, page_id, opacity)?;
                let page_box = media_box(doc, page_id);

                let mut content = format!("q /{gs} gs\n");
                for (cx, cy) in anchors(options.position, &page_box, width, *font_size) {
                    // baseline start so the rotated text is centred on the anchor
                    let (dx, dy) = (width / 2.0, font_size / 3.0);
                    let run = TextRun {
                        text,
                        font: &font,
                        face,
                        size: *font_size,
                        color: *color,
                        x: cx - (cos * dx - sin * dy),
                        y: cy - (sin * dx + cos * dy),
                        rotation: *rotation,
                    };
                    content.push_str(&run.operators());
                }
                content.push_str("Q\n");
                append_content(doc, page_id, content.into_bytes())?;
                stamped += 1;
            }
        }
        WatermarkContent::Image { path, scale } => {
            let image = embed_image_file(doc, path, None)?;
            for idx in options.pages.indices(page_ids.len()) {
                let page_id = page_ids[idx];
                let name = xobject_resource(doc, page_id, image.id)?;
                let gs = opacity_resource(doc, page_id, opacity)?;
                let page_box = media_box(doc, page_id);

                let width = page_box.width() * scale.clamp(0.01, 1.0);
                let height = width * f64::from(image.height) / f64::from(image.width.max(1));
                let mut content = format!("q /{gs} gs\n");
                for (cx, cy) in anchors(options.position, &page_box, width, height) {
                    content.push_str(&image_operators(&name, cx - width / 2.0, cy - height / 2.0, width, height));
                }
                content.push_str("Q\n");
                append_content(doc, page_id, content.into_bytes())?;
                stamped += 1;
            }
        }
    }
    Ok(stamped)
}

/// Add a watermark to a PDF file
pub fn add_watermark<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    options: &WatermarkOptions,
) -> Result<usize> {
    let mut doc = document::load(input.as_ref(), options.password.as_deref())?;
    let stamped = apply_watermark(&mut doc, options)?;
    document::save(&mut doc, output.as_ref())?;
    info!(
        "Watermarked {} page(s) of {}",
        stamped,
        input.as_ref().display()
    );
    Ok(stamped)
}
