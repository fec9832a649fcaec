//! Basic geometric types for page placement

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ToolboxError;

/// A point in PDF user space (origin bottom-left, units of 1/72 inch)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A rectangle defined by two points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rectangle {
    /// Lower-left corner
    pub lower_left: Point,
    /// Upper-right corner
    pub upper_right: Point,
}

impl Rectangle {
    pub fn new(lower_left: Point, upper_right: Point) -> Self {
        Self {
            lower_left,
            upper_right,
        }
    }

    /// Create a rectangle from position and size
    pub fn from_position_and_size(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            lower_left: Point::new(x, y),
            upper_right: Point::new(x + width, y + height),
        }
    }

    /// Build from the four numbers of a PDF rectangle array, normalizing
    /// the corner order.
    pub fn from_array(values: [f64; 4]) -> Self {
        let [x0, y0, x1, y1] = values;
        Self {
            lower_left: Point::new(x0.min(x1), y0.min(y1)),
            upper_right: Point::new(x0.max(x1), y0.max(y1)),
        }
    }

    pub fn width(&self) -> f64 {
        self.upper_right.x - self.lower_left.x
    }

    pub fn height(&self) -> f64 {
        self.upper_right.y - self.lower_left.y
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.lower_left.x + self.upper_right.x) / 2.0,
            (self.lower_left.y + self.upper_right.y) / 2.0,
        )
    }

    /// `[llx lly urx ury]` as a PDF array
    pub fn to_object(&self) -> lopdf::Object {
        lopdf::Object::Array(vec![
            lopdf::Object::Real(self.lower_left.x as f32),
            lopdf::Object::Real(self.lower_left.y as f32),
            lopdf::Object::Real(self.upper_right.x as f32),
            lopdf::Object::Real(self.upper_right.y as f32),
        ])
    }
}

/// Standard paper sizes in points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageSize {
    #[default]
    A4,
    A3,
    Letter,
    Legal,
}

impl PageSize {
    /// Portrait width and height in points
    pub fn dimensions(&self) -> (f64, f64) {
        match self {
            PageSize::A4 => (595.276, 841.89),
            PageSize::A3 => (841.89, 1190.551),
            PageSize::Letter => (612.0, 792.0),
            PageSize::Legal => (612.0, 1008.0),
        }
    }

    pub fn with_orientation(&self, orientation: Orientation) -> (f64, f64) {
        let (w, h) = self.dimensions();
        match orientation {
            Orientation::Portrait => (w, h),
            Orientation::Landscape => (h, w),
        }
    }
}

impl FromStr for PageSize {
    type Err = ToolboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a4" => Ok(PageSize::A4),
            "a3" => Ok(PageSize::A3),
            "letter" => Ok(PageSize::Letter),
            "legal" => Ok(PageSize::Legal),
            other => Err(ToolboxError::InvalidOption(format!("unknown page size: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

impl FromStr for Orientation {
    type Err = ToolboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "portrait" => Ok(Orientation::Portrait),
            "landscape" => Ok(Orientation::Landscape),
            other => Err(ToolboxError::InvalidOption(format!(
                "unknown orientation: {other}"
            ))),
        }
    }
}

/// Scale `(width, height)` to fit inside `(max_w, max_h)` keeping the
/// aspect ratio.
pub fn fit_within(width: f64, height: f64, max_w: f64, max_h: f64) -> (f64, f64) {
    if width <= 0.0 || height <= 0.0 {
        return (0.0, 0.0);
    }
    let scale = (max_w / width).min(max_h / height);
    (width * scale, height * scale)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rectangle() {
        let rect = Rectangle::from_position_and_size(10.0, 20.0, 100.0, 50.0);
        assert_eq!(rect.width(), 100.0);
        assert_eq!(rect.height(), 50.0);
        assert_eq!(rect.center(), Point::new(60.0, 45.0));
    }

    #[test]
    fn test_rectangle_from_unordered_array() {
        let rect = Rectangle::from_array([612.0, 792.0, 0.0, 0.0]);
        assert_eq!(rect.lower_left, Point::new(0.0, 0.0));
        assert_eq!(rect.width(), 612.0);
    }

    #[test]
    fn test_page_sizes() {
        assert_eq!(PageSize::Letter.dimensions(), (612.0, 792.0));
        assert_eq!(
            PageSize::Legal.with_orientation(Orientation::Landscape),
            (1008.0, 612.0)
        );
        assert_eq!("A3".parse::<PageSize>().unwrap(), PageSize::A3);
        assert!("b5".parse::<PageSize>().is_err());
    }

    #[test]
    fn test_fit_within() {
        let (w, h) = fit_within(200.0, 100.0, 100.0, 100.0);
        assert_eq!((w, h), (100.0, 50.0));

        let (w, h) = fit_within(50.0, 200.0, 100.0, 100.0);
        assert_eq!((w, h), (25.0, 100.0));

        assert_eq!(fit_within(0.0, 10.0, 100.0, 100.0), (0.0, 0.0));
    }
}
