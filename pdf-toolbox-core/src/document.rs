//! Loading, saving and inspecting documents
//!
//! Thin helpers over [`lopdf::Document`] shared by every tool: password
//! aware loading, atomic saving, page lookup with inherited attributes,
//! text string and date encoding.

use std::fs;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use flate2::read::ZlibDecoder;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use tracing::debug;

use crate::encryption::{self, HIDDEN_ENCRYPT_KEY};
use crate::error::{Result, ToolboxError};
use crate::geometry::Rectangle;

const ENCRYPT_KEY: &[u8] = b"/Encrypt";

/// Load a document, decrypting it when it is password protected.
///
/// Without a password the empty user password is tried, which opens files
/// that only restrict permissions.
pub fn load<P: AsRef<Path>>(path: P, password: Option<&str>) -> Result<Document> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ToolboxError::FileNotFound(path.to_path_buf()));
    }
    let bytes = fs::read(path)?;
    debug!("Loading {} ({} bytes)", path.display(), bytes.len());
    load_bytes(bytes, password)
}

/// Same as [`load`] for an in-memory file.
pub fn load_bytes(bytes: Vec<u8>, password: Option<&str>) -> Result<Document> {
    let (mut doc, encrypted) = parse_hiding_encryption(bytes)?;
    if encrypted {
        match encryption::decrypt_document(&mut doc, password.unwrap_or("")) {
            Ok(()) => {}
            Err(ToolboxError::WrongPassword) if password.is_none() => {
                return Err(ToolboxError::PasswordRequired)
            }
            Err(e) => return Err(e),
        }
    }
    Ok(doc)
}

/// Load without decrypting. Encrypted files keep their encryption
/// dictionary reference under a private trailer key.
pub fn load_raw<P: AsRef<Path>>(path: P) -> Result<Document> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ToolboxError::FileNotFound(path.to_path_buf()));
    }
    let (doc, _) = parse_hiding_encryption(fs::read(path)?)?;
    Ok(doc)
}

fn parse_hiding_encryption(mut bytes: Vec<u8>) -> Result<(Document, bool)> {
    let positions: Vec<usize> = find_encrypt_entries(&bytes).collect();
    for pos in &positions {
        bytes[pos + 1..pos + ENCRYPT_KEY.len()].copy_from_slice(HIDDEN_ENCRYPT_KEY);
    }
    let doc = Document::load_mem(&bytes).map_err(|e| match e {
        lopdf::Error::Decryption(_) => ToolboxError::PasswordRequired,
        other => ToolboxError::Pdf(other),
    })?;
    let encrypted = doc.trailer.has(HIDDEN_ENCRYPT_KEY);
    Ok((doc, encrypted))
}

/// Offsets of `/Encrypt` trailer keys (followed by a reference or an
/// inline dictionary).
///
/// Only keys of a `trailer` dictionary or of a cross-reference stream
/// dictionary count; stream data is skipped. Literal strings outside streams
/// are not tokenized, so a string holding `/Encrypt 1` inside a trailer
/// would still match.
pub(crate) fn find_encrypt_entries(bytes: &[u8]) -> impl Iterator<Item = usize> + '_ {
    let streams = stream_bodies(bytes);
    bytes
        .windows(ENCRYPT_KEY.len())
        .enumerate()
        .filter(|(_, window)| *window == ENCRYPT_KEY)
        .map(|(pos, _)| pos)
        .filter(move |pos| {
            let rest = &bytes[pos + ENCRYPT_KEY.len()..];
            let next = rest
                .iter()
                .find(|b| !matches!(b, b' ' | b'\r' | b'\n' | b'\t'))
                .copied();
            matches!(next, Some(b'0'..=b'9') | Some(b'<'))
        })
        .filter(move |pos| !streams.iter().any(|(start, end)| (*start..*end).contains(pos)))
        .filter(move |pos| in_trailer_dictionary(bytes, *pos))
}

/// Byte ranges between `stream` and `endstream` keywords
fn stream_bodies(bytes: &[u8]) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut pos = 0;
    while let Some(found) = find(&bytes[pos..], b"stream") {
        let start = pos + found;
        let after = start + b"stream".len();
        let is_keyword = !bytes[..start].ends_with(b"end")
            && matches!(bytes.get(after), Some(b'\r') | Some(b'\n'));
        if !is_keyword {
            pos = after;
            continue;
        }
        match find(&bytes[after..], b"endstream") {
            Some(len) => {
                ranges.push((after, after + len));
                pos = after + len + b"endstream".len();
            }
            None => {
                ranges.push((after, bytes.len()));
                break;
            }
        }
    }
    ranges
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Whether the dictionary enclosing `pos` follows a `trailer` keyword or
/// has `/Type /XRef`.
fn in_trailer_dictionary(bytes: &[u8], pos: usize) -> bool {
    let mut depth = 0usize;
    let mut start = None;
    let mut i = pos;
    while i >= 2 {
        match &bytes[i - 2..i] {
            b"<<" if depth == 0 => {
                start = Some(i - 2);
                break;
            }
            b"<<" => {
                depth -= 1;
                i -= 2;
            }
            b">>" => {
                depth += 1;
                i -= 2;
            }
            _ => i -= 1,
        }
    }
    let Some(start) = start else {
        return false;
    };

    let before = bytes[..start].trim_ascii_end();
    if before.ends_with(b"trailer") {
        return true;
    }

    let mut depth = 0usize;
    let mut end = bytes.len();
    let mut j = start + 2;
    while j + 2 <= bytes.len() {
        match &bytes[j..j + 2] {
            b"<<" => {
                depth += 1;
                j += 2;
            }
            b">>" if depth == 0 => {
                end = j;
                break;
            }
            b">>" => {
                depth -= 1;
                j += 2;
            }
            _ => j += 1,
        }
    }
    find(&bytes[start..end], b"/XRef").is_some()
}

/// Save to `path` through a temporary sibling file so that overwriting the
/// input in place never leaves a truncated file behind. Returns the size
/// written.
pub fn save<P: AsRef<Path>>(doc: &mut Document, path: P) -> Result<u64> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let bytes = to_bytes(doc)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output.pdf".to_string());
    let temp = path.with_file_name(format!(".{file_name}.tmp"));
    fs::write(&temp, &bytes)?;
    if let Err(e) = fs::rename(&temp, path) {
        let _ = fs::remove_file(&temp);
        return Err(e.into());
    }
    debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(bytes.len() as u64)
}

pub fn to_bytes(doc: &mut Document) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)?;
    Ok(buffer)
}

/// Whether `dict` declares `/Type /<name>`
pub fn has_type(dict: &Dictionary, name: &[u8]) -> bool {
    dict.get(b"Type")
        .and_then(Object::as_name)
        .map(|n| n == name)
        .unwrap_or(false)
}

/// Page object ids in document order
pub fn page_ids(doc: &Document) -> Vec<ObjectId> {
    doc.get_pages().into_values().collect()
}

pub fn page_count(doc: &Document) -> usize {
    doc.get_pages().len()
}

/// Id of the 1-based page `number`
pub fn page_id(doc: &Document, number: usize) -> Result<ObjectId> {
    let pages = page_ids(doc);
    number
        .checked_sub(1)
        .and_then(|idx| pages.get(idx).copied())
        .ok_or(ToolboxError::PageIndexOutOfBounds(number.saturating_sub(1), pages.len()))
}

/// Follow references until a direct object is reached.
pub fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    let mut current = object;
    // bounded to survive reference cycles
    for _ in 0..32 {
        match current {
            Object::Reference(id) => match doc.get_object(*id) {
                Ok(next) => current = next,
                Err(_) => return current,
            },
            _ => return current,
        }
    }
    current
}

/// Filter names of a stream, in decoding order.
pub fn stream_filters(stream: &Stream) -> Vec<Vec<u8>> {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|o| o.as_name().ok().map(<[u8]>::to_vec))
            .collect(),
        _ => Vec::new(),
    }
}

/// Decoded stream data.
///
/// Works on any stream, images included, and returns the raw bytes when
/// no filter is set. Flate with PNG or TIFF predictors is supported.
pub fn stream_data(stream: &Stream) -> Result<Vec<u8>> {
    let mut data = stream.content.clone();
    for (index, filter) in stream_filters(stream).iter().enumerate() {
        data = match filter.as_slice() {
            b"FlateDecode" | b"Fl" => {
                let mut out = Vec::new();
                ZlibDecoder::new(&data[..]).read_to_end(&mut out)?;
                match decode_parms(stream, index) {
                    Some(parms) => unpredict(out, parms)?,
                    None => out,
                }
            }
            other => {
                return Err(ToolboxError::InvalidStructure(format!(
                    "unsupported stream filter {}",
                    String::from_utf8_lossy(other)
                )))
            }
        };
    }
    Ok(data)
}

fn decode_parms(stream: &Stream, index: usize) -> Option<&Dictionary> {
    match stream.dict.get(b"DecodeParms").ok()? {
        Object::Dictionary(parms) if index == 0 => Some(parms),
        Object::Array(items) => items.get(index).and_then(|o| o.as_dict().ok()),
        _ => None,
    }
}

fn unpredict(data: Vec<u8>, parms: &Dictionary) -> Result<Vec<u8>> {
    let int = |key: &[u8], default: i64| parms.get(key).and_then(Object::as_i64).unwrap_or(default);
    let predictor = int(b"Predictor", 1);
    if predictor == 1 {
        return Ok(data);
    }
    let colors = int(b"Colors", 1).max(1) as usize;
    let bits = int(b"BitsPerComponent", 8).max(1) as usize;
    let columns = int(b"Columns", 1).max(1) as usize;
    let bpp = (colors * bits).div_ceil(8);
    let row_len = (colors * bits * columns).div_ceil(8);

    if predictor == 2 {
        if bits != 8 {
            return Err(ToolboxError::InvalidStructure(format!(
                "TIFF predictor with {bits}-bit components"
            )));
        }
        let mut data = data;
        for row in data.chunks_mut(row_len) {
            for i in bpp..row.len() {
                row[i] = row[i].wrapping_add(row[i - bpp]);
            }
        }
        return Ok(data);
    }

    // PNG predictors: every row starts with its own filter type byte
    let mut out = Vec::with_capacity(data.len());
    let mut prev = vec![0u8; row_len];
    for chunk in data.chunks(row_len + 1) {
        let (kind, encoded) = match chunk.split_first() {
            Some((kind, encoded)) => (*kind, encoded),
            None => break,
        };
        let mut row = encoded.to_vec();
        for i in 0..row.len() {
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            let up = prev.get(i).copied().unwrap_or(0);
            let up_left = if i >= bpp { prev.get(i - bpp).copied().unwrap_or(0) } else { 0 };
            let delta = match kind {
                0 => 0,
                1 => left,
                2 => up,
                3 => ((u16::from(left) + u16::from(up)) / 2) as u8,
                4 => paeth(left, up, up_left),
                other => {
                    return Err(ToolboxError::InvalidStructure(format!(
                        "unknown PNG row filter {other}"
                    )))
                }
            };
            row[i] = row[i].wrapping_add(delta);
        }
        out.extend_from_slice(&row);
        prev = row;
        prev.resize(row_len, 0);
    }
    Ok(out)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = i16::from(a) + i16::from(b) - i16::from(c);
    let (pa, pb, pc) = ((p - i16::from(a)).abs(), (p - i16::from(b)).abs(), (p - i16::from(c)).abs());
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

/// Look up a page attribute, walking up the page tree for inheritable keys.
pub fn inherited_attribute<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..64 {
        if let Ok(value) = current.get(key) {
            return Some(resolve(doc, value));
        }
        let parent = current.get(b"Parent").and_then(Object::as_reference).ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

/// Effective MediaBox of a page (US Letter when missing)
pub fn media_box(doc: &Document, page_id: ObjectId) -> Rectangle {
    inherited_attribute(doc, page_id, b"MediaBox")
        .and_then(|obj| rect_from_object(doc, obj))
        .unwrap_or_else(|| Rectangle::from_array([0.0, 0.0, 612.0, 792.0]))
}

pub fn rect_from_object(doc: &Document, obj: &Object) -> Option<Rectangle> {
    let array = resolve(doc, obj).as_array().ok()?;
    if array.len() != 4 {
        return None;
    }
    let mut values = [0.0f64; 4];
    for (slot, item) in values.iter_mut().zip(array) {
        *slot = f64::from(resolve(doc, item).as_float().ok()?);
    }
    Some(Rectangle::from_array(values))
}

/// Effective `/Rotate` of a page, normalized to 0, 90, 180 or 270
pub fn page_rotation(doc: &Document, page_id: ObjectId) -> i64 {
    inherited_attribute(doc, page_id, b"Rotate")
        .and_then(|obj| obj.as_i64().ok())
        .map(|r| r.rem_euclid(360))
        .unwrap_or(0)
}

/// Encode a text string: literal for printable ASCII, UTF-16BE with BOM
/// otherwise.
pub fn text_string(text: &str) -> Object {
    if text.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return Object::String(text.as_bytes().to_vec(), StringFormat::Literal);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

/// Decode a text string (UTF-16BE/LE with BOM, UTF-8 with BOM, otherwise
/// PDFDocEncoding treated as Latin-1).
pub fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFF, 0xFE]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(rest).into_owned();
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

/// Text of a string object, if it is one.
pub fn object_text(doc: &Document, obj: &Object) -> Option<String> {
    match resolve(doc, obj) {
        Object::String(bytes, _) => Some(decode_text_string(bytes)),
        Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
        _ => None,
    }
}

/// Format a date as a PDF date string, e.g. `D:20240131120000+08'00'`
pub fn pdf_date<Tz: TimeZone>(date: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let fixed = date.fixed_offset();
    let offset = fixed.offset().local_minus_utc();
    let sign = if offset < 0 { '-' } else { '+' };
    let offset = offset.abs();
    format!(
        "D:{}{}{:02}'{:02}'",
        fixed.format("%Y%m%d%H%M%S"),
        sign,
        offset / 3600,
        (offset % 3600) / 60
    )
}

/// Parse a PDF date string. Missing trailing fields default to their
/// minimum; a missing offset means UTC.
pub fn parse_pdf_date(text: &str) -> Option<DateTime<FixedOffset>> {
    let text = text.trim();
    let text = text.strip_prefix("D:").unwrap_or(text);
    let digits: String = text.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.len() < 4 {
        return None;
    }

    let field = |start: usize, len: usize, default: u32| -> u32 {
        digits
            .get(start..start + len)
            .and_then(|s| s.parse().ok())
            .unwrap_or(default)
    };
    let year = digits.get(0..4)?.parse::<i32>().ok()?;
    let date = NaiveDate::from_ymd_opt(year, field(4, 2, 1), field(6, 2, 1))?;
    let naive = date.and_hms_opt(field(8, 2, 0), field(10, 2, 0), field(12, 2, 0))?;

    let rest = &text[digits.len()..];
    let offset_seconds = match rest.chars().next() {
        Some(sign @ ('+' | '-')) => {
            let tz: String = rest[1..].chars().filter(|c| c.is_ascii_digit()).collect();
            let hours: i32 = tz.get(0..2).and_then(|s| s.parse().ok()).unwrap_or(0);
            let minutes: i32 = tz.get(2..4).and_then(|s| s.parse().ok()).unwrap_or(0);
            let total = hours * 3600 + minutes * 60;
            if sign == '-' {
                -total
            } else {
                total
            }
        }
        _ => 0,
    };
    let offset = FixedOffset::east_opt(offset_seconds)?;
    offset.from_local_datetime(&naive).single()
}

/// The Info dictionary, if the trailer references one
pub fn info_dictionary(doc: &Document) -> Option<&Dictionary> {
    match doc.trailer.get(b"Info").ok()? {
        Object::Reference(id) => doc.get_dictionary(*id).ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

/// Replace the Info dictionary with `info`.
pub fn set_info_dictionary(doc: &mut Document, info: Dictionary) {
    match doc.trailer.get(b"Info").and_then(Object::as_reference) {
        Ok(id) if doc.objects.contains_key(&id) => {
            doc.objects.insert(id, Object::Dictionary(info));
        }
        _ => {
            let id = doc.add_object(info);
            doc.trailer.set("Info", Object::Reference(id));
        }
    }
}

/// New empty document with a catalog and an empty page tree.
///
/// Returns the document and the id of its `Pages` node.
pub fn new_document() -> (Document, ObjectId) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => Vec::<Object>::new(),
            "Count" => 0
        }),
    );
    doc.trailer.set("Root", catalog_id);
    (doc, pages_id)
}

/// Append a page dictionary under `pages_id`, keeping `Kids` and `Count`
/// in sync. Returns the new page id.
pub fn append_page(doc: &mut Document, pages_id: ObjectId, mut page: Dictionary) -> Result<ObjectId> {
    page.set("Type", "Page");
    page.set("Parent", pages_id);
    let page_id = doc.add_object(page);

    let pages = doc.get_dictionary_mut(pages_id)?;
    let mut kids = pages
        .get(b"Kids")
        .and_then(Object::as_array)
        .cloned()
        .unwrap_or_default();
    kids.push(Object::Reference(page_id));
    let count = kids.len() as i64;
    pages.set("Kids", kids);
    pages.set("Count", count);
    Ok(page_id)
}

/// The document catalog
pub fn catalog_id(doc: &Document) -> Result<ObjectId> {
    doc.trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|_| ToolboxError::InvalidStructure("missing document catalog".to_string()))
}

/// Summary shown by the `info` command and the file info view
#[derive(Debug, Clone, serde::Serialize)]
pub struct DocumentInfo {
    pub path: String,
    pub file_size: u64,
    pub pages: usize,
    pub version: String,
    pub encrypted: bool,
    pub title: Option<String>,
    pub author: Option<String>,
}

pub fn document_info<P: AsRef<Path>>(path: P, password: Option<&str>) -> Result<DocumentInfo> {
    let path = path.as_ref();
    let file_size = fs::metadata(path)
        .map_err(|_| ToolboxError::FileNotFound(path.to_path_buf()))?
        .len();
    let encrypted = encryption::is_encrypted(path)?;
    let doc = load(path, password)?;
    let info = info_dictionary(&doc);
    let field = |key: &[u8]| {
        info.and_then(|dict| dict.get(key).ok())
            .and_then(|obj| object_text(&doc, obj))
            .filter(|s| !s.is_empty())
    };

    Ok(DocumentInfo {
        path: path.display().to_string(),
        file_size,
        pages: page_count(&doc),
        version: doc.version.clone(),
        encrypted,
        title: field(b"Title"),
        author: field(b"Author"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_pdf;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_text_string_ascii_and_unicode() {
        match text_string("Report") {
            Object::String(bytes, StringFormat::Literal) => assert_eq!(bytes, b"Report"),
            other => panic!("unexpected {other:?}"),
        }
        match text_string("报告") {
            Object::String(bytes, StringFormat::Hexadecimal) => {
                assert_eq!(&bytes[..2], &[0xFE, 0xFF]);
                assert_eq!(decode_text_string(&bytes), "报告");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_decode_latin1_fallback() {
        assert_eq!(decode_text_string(&[0x43, 0x61, 0x66, 0xE9]), "Café");
        assert_eq!(decode_text_string(b"plain"), "plain");
    }

    #[test]
    fn test_pdf_date_round_trip() {
        let offset = FixedOffset::east_opt(8 * 3600).unwrap();
        let date = offset.with_ymd_and_hms(2024, 1, 31, 12, 30, 5).unwrap();
        let text = pdf_date(&date);
        assert_eq!(text, "D:20240131123005+08'00'");
        assert_eq!(parse_pdf_date(&text).unwrap(), date);
    }

    #[test]
    fn test_parse_partial_dates() {
        let date = parse_pdf_date("D:2023").unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (2023, 1, 1));

        let date = parse_pdf_date("D:20230615093000Z").unwrap();
        assert_eq!(date.hour(), 9);
        assert_eq!(date.offset().local_minus_utc(), 0);

        let date = parse_pdf_date("D:20230615093000-05'30'").unwrap();
        assert_eq!(date.offset().local_minus_utc(), -(5 * 3600 + 30 * 60));

        assert!(parse_pdf_date("yesterday").is_none());
        assert!(parse_pdf_date("D:20231340").is_none());
    }

    #[test]
    fn test_find_encrypt_entries() {
        let trailer = b"trailer << /Size 5 /Encrypt 4 0 R /Root 1 0 R >>";
        assert_eq!(find_encrypt_entries(trailer).count(), 1);

        let dict = b"<< /EncryptMetadata false >>";
        assert_eq!(find_encrypt_entries(dict).count(), 0);

        let inline = b"trailer\n<< /Encrypt <</Filter /Standard>> /Root 1 0 R >>";
        assert_eq!(find_encrypt_entries(inline).count(), 1);

        let xref_stream = b"7 0 obj\n<< /Type /XRef /Size 8 /Encrypt 6 0 R >>\nstream\nxx\nendstream";
        assert_eq!(find_encrypt_entries(xref_stream).count(), 1);
    }

    #[test]
    fn test_encrypt_key_outside_trailer_is_ignored() {
        let content = b"4 0 obj\n<< /Length 20 >>\nstream\n/Encrypt 3 0 R << >>\nendstream\nendobj";
        assert_eq!(find_encrypt_entries(content).count(), 0);

        let page = b"3 0 obj\n<< /Type /Page /Encrypt 9 0 R >>\nendobj";
        assert_eq!(find_encrypt_entries(page).count(), 0);

        let mut doc = crate::test_support::sample_doc(1, "Plain");
        let page_id = page_ids(&doc)[0];
        let content_id = doc.add_object(lopdf::Stream::new(
            dictionary! {},
            b"% /Encrypt 1 0 R\nBT /F1 12 Tf (x) Tj ET".to_vec(),
        ));
        if let Ok(page) = doc.get_dictionary_mut(page_id) {
            page.set("Contents", content_id);
        }
        let bytes = to_bytes(&mut doc).unwrap();
        let loaded = load_bytes(bytes, None).unwrap();
        assert_eq!(page_count(&loaded), 1);
    }

    fn zlib(data: &[u8]) -> Vec<u8> {
        use std::io::Write;
        let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_stream_data_applies_png_predictor() {
        // row 0 uses Sub, row 1 uses Up
        let encoded = zlib(&[1, 10, 5, 2, 5, 5]);
        let stream = Stream::new(
            dictionary! {
                "Subtype" => "Image",
                "Filter" => "FlateDecode",
                "DecodeParms" => dictionary! { "Predictor" => 12, "Colors" => 1, "Columns" => 2 }
            },
            encoded,
        );
        assert_eq!(stream_data(&stream).unwrap(), vec![10, 15, 15, 20]);
    }

    #[test]
    fn test_stream_data_without_filter_is_raw() {
        let stream = Stream::new(dictionary! { "Subtype" => "Image" }, vec![1, 2, 3]);
        assert_eq!(stream_data(&stream).unwrap(), vec![1, 2, 3]);

        let hex = Stream::new(dictionary! { "Filter" => "ASCIIHexDecode" }, b"0102>".to_vec());
        assert!(matches!(stream_data(&hex), Err(ToolboxError::InvalidStructure(_))));
    }

    #[test]
    fn test_new_document_pages() {
        let (mut doc, pages_id) = new_document();
        for _ in 0..3 {
            append_page(
                &mut doc,
                pages_id,
                dictionary! { "MediaBox" => vec![0.into(), 0.into(), 200.into(), 100.into()] },
            )
            .unwrap();
        }
        assert_eq!(page_count(&doc), 3);
        let first = page_ids(&doc)[0];
        assert_eq!(media_box(&doc, first).width(), 200.0);
    }

    #[test]
    fn test_media_box_is_inherited() {
        let bytes = sample_pdf(2, "Inherited");
        let doc = load_bytes(bytes, None).unwrap();
        let first = page_ids(&doc)[0];
        let rect = media_box(&doc, first);
        assert_eq!(rect.width(), 612.0);
        assert_eq!(rect.height(), 792.0);
        assert_eq!(page_rotation(&doc, first), 0);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("copy.pdf");
        let mut doc = load_bytes(sample_pdf(3, "Copy"), None).unwrap();
        let size = save(&mut doc, &path).unwrap();
        assert!(size > 0);
        assert_eq!(page_count(&load(&path, None).unwrap()), 3);

        let info = document_info(&path, None).unwrap();
        assert_eq!(info.pages, 3);
        assert!(!info.encrypted);
        assert_eq!(info.title.as_deref(), Some("Copy"));
    }

    #[test]
    fn test_missing_file() {
        match load("/definitely/not/here.pdf", None) {
            Err(ToolboxError::FileNotFound(_)) => {}
            other => panic!("expected FileNotFound, got {other:?}"),
        }
    }
}
