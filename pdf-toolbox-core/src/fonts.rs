//! Standard Helvetica metrics and text encoding for stamped text
//!
//! Every text overlay (watermarks, headers, footers, signatures, generated
//! text pages) is set in the non-embedded Helvetica font with WinAnsi
//! encoding, so widths come from the standard AFM tables.

use lopdf::{dictionary, Document, Object, ObjectId};

/// Resource name the stamped font is registered under
pub const FONT_NAME: &str = "Helvetica";

/// Glyph widths of Helvetica for ASCII 32..=126, in 1/1000 text space units
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 0..?
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // @..O
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // P.._
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // `..o
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // p..~
];

const DEFAULT_WIDTH: u16 = 556;

pub fn char_width(ch: char) -> u16 {
    let code = ch as u32;
    if (32..=126).contains(&code) {
        HELVETICA_WIDTHS[(code - 32) as usize]
    } else {
        DEFAULT_WIDTH
    }
}

/// Width of `text` in points at `font_size`
pub fn text_width(text: &str, font_size: f64) -> f64 {
    let units: u32 = text.chars().map(|c| u32::from(char_width(c))).sum();
    f64::from(units) * font_size / 1000.0
}

/// Encode for a WinAnsi simple font. Characters outside Latin-1 have no
/// glyph in the standard fonts and become `?`.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            0x20..=0x7E | 0xA0..=0xFF => c as u8,
            0x09 => b' ',
            _ => b'?',
        })
        .collect()
}

/// A PDF literal string (parentheses included) for content streams
pub fn literal_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('(');
    for byte in encode_win_ansi(text) {
        match byte {
            b'(' | b')' | b'\\' => {
                out.push('\\');
                out.push(byte as char);
            }
            0x20..=0x7E => out.push(byte as char),
            other => out.push_str(&format!("\\{other:03o}")),
        }
    }
    out.push(')');
    out
}

/// Add a Helvetica font dictionary to `doc`.
pub fn add_helvetica(doc: &mut Document) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding"
    })
}

/// Font used for stamped text. Text with characters outside Latin-1 is set
/// in the Adobe CJK font STSong-Light, which viewers supply themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StampFont {
    #[default]
    Helvetica,
    Cjk,
}

impl StampFont {
    /// The font able to show every character of `texts`
    pub fn for_text<'a>(texts: impl IntoIterator<Item = &'a str>) -> Self {
        if texts.into_iter().flat_map(str::chars).any(|c| c as u32 > 0xFF) {
            StampFont::Cjk
        } else {
            StampFont::Helvetica
        }
    }

    pub fn add_to(&self, doc: &mut Document) -> ObjectId {
        match self {
            StampFont::Helvetica => add_helvetica(doc),
            StampFont::Cjk => add_cjk_font(doc),
        }
    }

    /// String operand for `Tj`
    pub fn encode(&self, text: &str) -> String {
        match self {
            StampFont::Helvetica => literal_string(text),
            StampFont::Cjk => {
                let hex: String = text
                    .encode_utf16()
                    .map(|unit| format!("{unit:04X}"))
                    .collect();
                format!("<{hex}>")
            }
        }
    }

    /// Like [`wrap_text`], measured with this font's widths
    pub fn wrap(&self, text: &str, font_size: f64, max_width: f64) -> Vec<String> {
        wrap_measured(text, font_size, max_width, |t, size| self.text_width(t, size))
    }

    pub fn text_width(&self, text: &str, font_size: f64) -> f64 {
        match self {
            StampFont::Helvetica => text_width(text, font_size),
            StampFont::Cjk => {
                let units: u32 = text
                    .chars()
                    .map(|c| if c.is_ascii() { u32::from(char_width(c)) } else { 1000 })
                    .sum();
                f64::from(units) * font_size / 1000.0
            }
        }
    }
}

/// Non-embedded simplified Chinese font with UCS-2 encoding
pub fn add_cjk_font(doc: &mut Document) -> ObjectId {
    let descriptor = doc.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => "STSong-Light",
        "Flags" => 6,
        "FontBBox" => vec![(-25).into(), (-254).into(), 1000.into(), 880.into()],
        "ItalicAngle" => 0,
        "Ascent" => 880,
        "Descent" => -120,
        "CapHeight" => 880,
        "StemV" => 93
    });
    let descendant = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "CIDFontType0",
        "BaseFont" => "STSong-Light",
        "CIDSystemInfo" => dictionary! {
            "Registry" => Object::string_literal("Adobe"),
            "Ordering" => Object::string_literal("GB1"),
            "Supplement" => 2
        },
        "FontDescriptor" => descriptor,
        "DW" => 1000
    });
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => "STSong-Light-UniGB-UCS2-H",
        "Encoding" => "UniGB-UCS2-H",
        "DescendantFonts" => vec![Object::Reference(descendant)]
    })
}

/// Split `text` into lines no wider than `max_width`, breaking on spaces
/// and falling back to character breaks for long words.
pub fn wrap_text(text: &str, font_size: f64, max_width: f64) -> Vec<String> {
    wrap_measured(text, font_size, max_width, text_width)
}

fn wrap_measured<F>(text: &str, font_size: f64, max_width: f64, width: F) -> Vec<String>
where
    F: Fn(&str, f64) -> f64,
{
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if line.is_empty() {
                word.to_string()
            } else {
                format!("{line} {word}")
            };
            if width(&candidate, font_size) <= max_width {
                line = candidate;
                continue;
            }
            if !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            if width(word, font_size) <= max_width {
                line = word.to_string();
            } else {
                for ch in word.chars() {
                    let mut next = line.clone();
                    next.push(ch);
                    if width(&next, font_size) > max_width && !line.is_empty() {
                        lines.push(std::mem::take(&mut line));
                        line.push(ch);
                    } else {
                        line = next;
                    }
                }
            }
        }
        lines.push(line);
    }
    lines
}
