use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ToolboxError;

/// Represents a color used for stamped text, annotations and shapes.
///
/// Supports RGB and Grayscale color spaces.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Color {
    /// RGB color (red, green, blue) with values from 0.0 to 1.0
    Rgb(f64, f64, f64),
    /// Grayscale color with value from 0.0 (black) to 1.0 (white)
    Gray(f64),
}

impl Color {
    /// Creates an RGB color with values clamped to 0.0-1.0.
    pub fn rgb(r: f64, g: f64, b: f64) -> Self {
        Color::Rgb(r.clamp(0.0, 1.0), g.clamp(0.0, 1.0), b.clamp(0.0, 1.0))
    }

    /// Creates a grayscale color with value clamped to 0.0-1.0.
    pub fn gray(value: f64) -> Self {
        Color::Gray(value.clamp(0.0, 1.0))
    }

    pub fn black() -> Self {
        Color::Gray(0.0)
    }

    pub fn red() -> Self {
        Color::Rgb(1.0, 0.0, 0.0)
    }

    pub fn green() -> Self {
        Color::Rgb(0.0, 1.0, 0.0)
    }

    pub fn blue() -> Self {
        Color::Rgb(0.0, 0.0, 1.0)
    }

    pub fn yellow() -> Self {
        Color::Rgb(1.0, 1.0, 0.0)
    }

    /// RGB components, grayscale expanded to three equal channels.
    pub fn components(&self) -> [f64; 3] {
        match *self {
            Color::Rgb(r, g, b) => [r, g, b],
            Color::Gray(v) => [v, v, v],
        }
    }

    /// Content stream operator setting the non-stroking (fill) color.
    pub fn fill_operator(&self) -> String {
        match *self {
            Color::Rgb(r, g, b) => format!("{} {} {} rg", fmt(r), fmt(g), fmt(b)),
            Color::Gray(v) => format!("{} g", fmt(v)),
        }
    }

    /// Content stream operator setting the stroking color.
    pub fn stroke_operator(&self) -> String {
        match *self {
            Color::Rgb(r, g, b) => format!("{} {} {} RG", fmt(r), fmt(g), fmt(b)),
            Color::Gray(v) => format!("{} G", fmt(v)),
        }
    }

    /// `/C` array for annotation dictionaries
    pub fn to_object(&self) -> lopdf::Object {
        let [r, g, b] = self.components();
        lopdf::Object::Array(vec![
            lopdf::Object::Real(r as f32),
            lopdf::Object::Real(g as f32),
            lopdf::Object::Real(b as f32),
        ])
    }
}

fn fmt(value: f64) -> String {
    let s = format!("{value:.3}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() || s == "-" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

impl FromStr for Color {
    type Err = ToolboxError;

    /// Named colors (`yellow`, `red`, `gray`, ...) or `#rrggbb`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        if let Some(hex) = name.strip_prefix('#') {
            if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(ToolboxError::InvalidOption(format!("invalid color: {s}")));
            }
            let channel = |i: usize| -> Result<f64, ToolboxError> {
                u8::from_str_radix(&hex[i..i + 2], 16)
                    .map(|v| f64::from(v) / 255.0)
                    .map_err(|_| ToolboxError::InvalidOption(format!("invalid color: {s}")))
            };
            return Ok(Color::rgb(channel(0)?, channel(2)?, channel(4)?));
        }

        Ok(match name.as_str() {
            "black" => Color::black(),
            "white" => Color::Gray(1.0),
            "gray" | "grey" => Color::Gray(0.5),
            "red" => Color::red(),
            "green" => Color::green(),
            "blue" => Color::blue(),
            "yellow" => Color::yellow(),
            "orange" => Color::Rgb(1.0, 0.647, 0.0),
            "purple" => Color::Rgb(0.5, 0.0, 0.5),
            "pink" => Color::Rgb(1.0, 0.753, 0.796),
            "cyan" => Color::Rgb(0.0, 1.0, 1.0),
            _ => return Err(ToolboxError::InvalidOption(format!("unknown color: {s}"))),
        })
    }
}
