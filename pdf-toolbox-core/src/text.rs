//! Text extraction from page content streams
//!
//! Text operators are interpreted with enough of the text state to decide
//! where line breaks and word gaps go. Strings are decoded through the
//! font's `ToUnicode` CMap when it has one, otherwise as WinAnsi.

use std::collections::HashMap;

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::document::{decode_text_string, inherited_attribute, resolve, stream_data};
use crate::error::Result;
use crate::fonts;

/// Form XObjects nested deeper than this are not followed
const MAX_FORM_DEPTH: usize = 8;

/// Text extraction options
#[derive(Debug, Clone)]
pub struct ExtractionOptions {
    /// Gap, as a fraction of the font size, that becomes a space
    pub space_threshold: f64,
    /// Vertical move, in points, that starts a new line
    pub newline_threshold: f64,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            space_threshold: 0.2,
            newline_threshold: 2.0,
        }
    }
}

/// Text extractor for pages of a loaded document
#[derive(Debug, Default)]
pub struct TextExtractor {
    options: ExtractionOptions,
}

impl TextExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ExtractionOptions) -> Self {
        Self { options }
    }

    /// Text of one page, lines separated by `\n`
    pub fn extract_page(&self, doc: &Document, page_id: ObjectId) -> Result<String> {
        let content = doc.get_page_content(page_id)?;
        let resources = inherited_attribute(doc, page_id, b"Resources").and_then(|o| o.as_dict().ok());

        let mut sink = TextSink::new(&self.options);
        self.run(doc, &content, resources, &mut sink, 0)?;
        Ok(sink.finish())
    }

    /// Text of every page in order
    pub fn extract_document(&self, doc: &Document) -> Result<Vec<String>> {
        crate::document::page_ids(doc)
            .into_iter()
            .map(|id| self.extract_page(doc, id))
            .collect()
    }

    fn run(
        &self,
        doc: &Document,
        content: &[u8],
        resources: Option<&Dictionary>,
        sink: &mut TextSink,
        depth: usize,
    ) -> Result<()> {
        let content = Content::decode(content)?;
        let fonts = FontTable::new(doc, resources);
        let mut state = TextState::default();

        for op in &content.operations {
            let operands = &op.operands;
            match op.operator.as_str() {
                "BT" => {
                    state.matrix = IDENTITY;
                    state.line_matrix = IDENTITY;
                }
                "Tf" => {
                    if let Some(Object::Name(name)) = operands.first() {
                        state.font = Some(name.clone());
                    }
                    state.font_size = number(operands.get(1)).unwrap_or(state.font_size);
                }
                "TL" => state.leading = number(operands.first()).unwrap_or(0.0),
                "Tc" => state.char_space = number(operands.first()).unwrap_or(0.0),
                "Tw" => state.word_space = number(operands.first()).unwrap_or(0.0),
                "Tz" => state.horizontal_scale = number(operands.first()).unwrap_or(100.0),
                "Td" | "TD" => {
                    let tx = number(operands.first()).unwrap_or(0.0);
                    let ty = number(operands.get(1)).unwrap_or(0.0);
                    if op.operator == "TD" {
                        state.leading = -ty;
                    }
                    state.move_line(tx, ty);
                }
                "Tm" => {
                    let values: Vec<f64> = operands.iter().filter_map(|o| number(Some(o))).collect();
                    if let [a, b, c, d, e, f] = values[..] {
                        state.matrix = [a, b, c, d, e, f];
                        state.line_matrix = state.matrix;
                    }
                }
                "T*" => state.next_line(),
                "Tj" => {
                    if let Some(Object::String(bytes, _)) = operands.first() {
                        self.show(&fonts, &mut state, bytes, sink);
                    }
                }
                "'" => {
                    state.next_line();
                    if let Some(Object::String(bytes, _)) = operands.first() {
                        self.show(&fonts, &mut state, bytes, sink);
                    }
                }
                "\"" => {
                    state.word_space = number(operands.first()).unwrap_or(state.word_space);
                    state.char_space = number(operands.get(1)).unwrap_or(state.char_space);
                    state.next_line();
                    if let Some(Object::String(bytes, _)) = operands.get(2) {
                        self.show(&fonts, &mut state, bytes, sink);
                    }
                }
                "TJ" => {
                    let Some(Object::Array(items)) = operands.first() else {
                        continue;
                    };
                    for item in items {
                        match item {
                            Object::String(bytes, _) => self.show(&fonts, &mut state, bytes, sink),
                            other => {
                                if let Some(adjust) = number(Some(other)) {
                                    let tx = -adjust / 1000.0 * state.font_size * state.horizontal_scale / 100.0;
                                    state.advance(tx);
                                }
                            }
                        }
                    }
                }
                "Do" if depth < MAX_FORM_DEPTH => {
                    if let Some(Object::Name(name)) = operands.first() {
                        self.run_form(doc, resources, name, sink, depth)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn run_form(
        &self,
        doc: &Document,
        resources: Option<&Dictionary>,
        name: &[u8],
        sink: &mut TextSink,
        depth: usize,
    ) -> Result<()> {
        let Some(xobject) = resources
            .and_then(|r| r.get(b"XObject").ok())
            .and_then(|x| resolve(doc, x).as_dict().ok())
            .and_then(|x| x.get(name).ok())
            .and_then(|x| resolve(doc, x).as_stream().ok())
        else {
            return Ok(());
        };
        if xobject.dict.get(b"Subtype").and_then(Object::as_name).ok() != Some(&b"Form"[..]) {
            return Ok(());
        }
        let content = stream_data(xobject).unwrap_or_else(|_| xobject.content.clone());
        let form_resources = xobject
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|r| resolve(doc, r).as_dict().ok())
            .or(resources);
        self.run(doc, &content, form_resources, sink, depth + 1)
    }

    fn show(&self, fonts: &FontTable, state: &mut TextState, bytes: &[u8], sink: &mut TextSink) {
        let text = fonts.decode(state.font.as_deref(), bytes);
        let (x, y) = state.position();
        sink.push(&text, x, y, state.font_size);

        let glyphs = text.chars().count() as f64;
        let spaces = text.chars().filter(|c| *c == ' ').count() as f64;
        let width = fonts::text_width(&text, state.font_size)
            + glyphs * state.char_space
            + spaces * state.word_space;
        state.advance(width * state.horizontal_scale / 100.0);
        sink.end_run(state.position().0);
    }
}

/// Extract the text of every page of `doc`
pub fn extract_pages(doc: &Document) -> Result<Vec<String>> {
    TextExtractor::new().extract_document(doc)
}

const IDENTITY: [f64; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

struct TextState {
    matrix: [f64; 6],
    line_matrix: [f64; 6],
    leading: f64,
    char_space: f64,
    word_space: f64,
    horizontal_scale: f64,
    font_size: f64,
    font: Option<Vec<u8>>,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            matrix: IDENTITY,
            line_matrix: IDENTITY,
            leading: 0.0,
            char_space: 0.0,
            word_space: 0.0,
            horizontal_scale: 100.0,
            font_size: 12.0,
            font: None,
        }
    }
}

impl TextState {
    fn move_line(&mut self, tx: f64, ty: f64) {
        self.line_matrix = multiply(&[1.0, 0.0, 0.0, 1.0, tx, ty], &self.line_matrix);
        self.matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.leading);
    }

    fn advance(&mut self, tx: f64) {
        self.matrix = multiply(&[1.0, 0.0, 0.0, 1.0, tx, 0.0], &self.matrix);
    }

    fn position(&self) -> (f64, f64) {
        (self.matrix[4], self.matrix[5])
    }
}

fn multiply(a: &[f64; 6], b: &[f64; 6]) -> [f64; 6] {
    [
        a[0] * b[0] + a[1] * b[2],
        a[0] * b[1] + a[1] * b[3],
        a[2] * b[0] + a[3] * b[2],
        a[2] * b[1] + a[3] * b[3],
        a[4] * b[0] + a[5] * b[2] + b[4],
        a[4] * b[1] + a[5] * b[3] + b[5],
    ]
}

fn number(obj: Option<&Object>) -> Option<f64> {
    match obj? {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

/// Collects decoded runs into lines
struct TextSink {
    space_threshold: f64,
    newline_threshold: f64,
    text: String,
    last: Option<(f64, f64)>,
}

impl TextSink {
    fn new(options: &ExtractionOptions) -> Self {
        Self {
            space_threshold: options.space_threshold,
            newline_threshold: options.newline_threshold,
            text: String::new(),
            last: None,
        }
    }

    fn push(&mut self, text: &str, x: f64, y: f64, font_size: f64) {
        if text.is_empty() {
            return;
        }
        if let Some((last_x, last_y)) = self.last {
            if (y - last_y).abs() > self.newline_threshold {
                self.text.push('\n');
            } else if x - last_x > self.space_threshold * font_size
                && !self.text.ends_with(' ')
                && !text.starts_with(' ')
            {
                self.text.push(' ');
            }
        }
        self.text.push_str(text);
        self.last = Some((x, y));
    }

    fn end_run(&mut self, x: f64) {
        if let Some((_, y)) = self.last {
            self.last = Some((x, y));
        }
    }

    fn finish(self) -> String {
        self.text
            .lines()
            .map(str::trim_end)
            .collect::<Vec<_>>()
            .join("\n")
            .trim_matches('\n')
            .to_string()
    }
}

/// Decoders for the fonts of one resource dictionary
struct FontTable {
    decoders: HashMap<Vec<u8>, FontDecoder>,
}

impl FontTable {
    fn new(doc: &Document, resources: Option<&Dictionary>) -> Self {
        let mut decoders = HashMap::new();
        let fonts = resources
            .and_then(|r| r.get(b"Font").ok())
            .and_then(|f| resolve(doc, f).as_dict().ok());
        if let Some(fonts) = fonts {
            for (name, font) in fonts.iter() {
                if let Ok(font) = resolve(doc, font).as_dict() {
                    decoders.insert(name.clone(), FontDecoder::new(doc, font));
                }
            }
        }
        Self { decoders }
    }

    fn decode(&self, font: Option<&[u8]>, bytes: &[u8]) -> String {
        match font.and_then(|name| self.decoders.get(name)) {
            Some(decoder) => decoder.decode(bytes),
            None => decode_simple(bytes),
        }
    }
}

struct FontDecoder {
    to_unicode: Option<ToUnicodeMap>,
    composite: bool,
}

impl FontDecoder {
    fn new(doc: &Document, font: &Dictionary) -> Self {
        let composite = font.get(b"Subtype").and_then(Object::as_name).ok() == Some(&b"Type0"[..]);
        let to_unicode = font
            .get(b"ToUnicode")
            .ok()
            .and_then(|obj| resolve(doc, obj).as_stream().ok())
            .and_then(|stream| stream_data(stream).ok())
            .map(|data| ToUnicodeMap::parse(&data));
        Self {
            to_unicode,
            composite,
        }
    }

    fn decode(&self, bytes: &[u8]) -> String {
        match &self.to_unicode {
            Some(map) => map.decode(bytes, if self.composite { 2 } else { 1 }),
            None if self.composite => bytes
                .chunks(2)
                .filter_map(|pair| {
                    let code = pair.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b));
                    char::from_u32(code)
                })
                .collect(),
            None => decode_simple(bytes),
        }
    }
}

/// Strings drawn with simple fonts: WinAnsi, unless marked as UTF-16
fn decode_simple(bytes: &[u8]) -> String {
    if bytes.starts_with(&[0xFE, 0xFF]) {
        return decode_text_string(bytes);
    }
    bytes.iter().map(|&b| win_ansi_char(b)).collect()
}

fn win_ansi_char(byte: u8) -> char {
    const HIGH: [char; 32] = [
        '€', '\u{fffd}', '‚', 'ƒ', '„', '…', '†', '‡', 'ˆ', '‰', 'Š', '‹', 'Œ', '\u{fffd}', 'Ž',
        '\u{fffd}', '\u{fffd}', '‘', '’', '“', '”', '•', '–', '—', '˜', '™', 'š', '›', 'œ',
        '\u{fffd}', 'ž', 'Ÿ',
    ];
    match byte {
        0x80..=0x9F => HIGH[usize::from(byte - 0x80)],
        _ => char::from(byte),
    }
}

/// Code to Unicode mapping read from a `ToUnicode` CMap
#[derive(Debug, Default)]
pub(crate) struct ToUnicodeMap {
    code_len: Option<usize>,
    singles: HashMap<u32, String>,
    ranges: Vec<(u32, u32, u32)>,
}

impl ToUnicodeMap {
    pub(crate) fn parse(data: &[u8]) -> Self {
        let text = String::from_utf8_lossy(data);
        let mut map = ToUnicodeMap::default();
        let mut section = "";

        for line in text.lines() {
            let line = line.trim();
            if line.ends_with("begincodespacerange") {
                section = "codespace";
                continue;
            } else if line.ends_with("beginbfchar") {
                section = "bfchar";
                continue;
            } else if line.ends_with("beginbfrange") {
                section = "bfrange";
                continue;
            } else if line.starts_with("end") {
                section = "";
                continue;
            }

            let tokens = hex_tokens(line);
            match (section, tokens.as_slice()) {
                ("codespace", [start, _end, ..]) => {
                    map.code_len.get_or_insert(start.len());
                }
                ("bfchar", [src, dst, ..]) => {
                    map.singles.insert(code_value(src), utf16_text(dst));
                }
                ("bfrange", [start, end, dst, ..]) if !line.contains('[') => {
                    map.ranges.push((code_value(start), code_value(end), code_value(dst)));
                }
                ("bfrange", [start, _end, rest @ ..]) => {
                    let first = code_value(start);
                    for (offset, dst) in rest.iter().enumerate() {
                        map.singles.insert(first + offset as u32, utf16_text(dst));
                    }
                }
                _ => {}
            }
        }
        map
    }

    fn lookup(&self, code: u32) -> Option<String> {
        if let Some(text) = self.singles.get(&code) {
            return Some(text.clone());
        }
        self.ranges
            .iter()
            .find(|(start, end, _)| (*start..=*end).contains(&code))
            .and_then(|(start, _, dst)| char::from_u32(dst + (code - start)))
            .map(String::from)
    }

    pub(crate) fn decode(&self, bytes: &[u8], default_len: usize) -> String {
        let len = self.code_len.unwrap_or(default_len).clamp(1, 4);
        bytes
            .chunks(len)
            .map(|chunk| {
                let code = chunk.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b));
                self.lookup(code).unwrap_or_default()
            })
            .collect()
    }
}

fn hex_tokens(line: &str) -> Vec<Vec<u8>> {
    let mut tokens = Vec::new();
    let mut rest = line;
    while let Some(start) = rest.find('<') {
        let Some(len) = rest[start + 1..].find('>') else {
            break;
        };
        let hex: String = rest[start + 1..start + 1 + len]
            .chars()
            .filter(|c| c.is_ascii_hexdigit())
            .collect();
        let bytes = (0..hex.len() / 2)
            .filter_map(|i| u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok())
            .collect();
        tokens.push(bytes);
        rest = &rest[start + len + 2..];
    }
    tokens
}

fn code_value(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b))
}

fn utf16_text(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]),
            [single] => u16::from(*single),
            _ => 0,
        })
        .collect();
    String::from_utf16_lossy(&units)
}
