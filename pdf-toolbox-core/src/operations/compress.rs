//! PDF compression
//!
//! Two engines: a native one working on the object graph and Ghostscript's
//! `pdfwrite` device with a quality preset.

use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use lopdf::{Document, Object, ObjectId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::convert::images::{decode_image, zlib, RasterImage};
use crate::document::{self, catalog_id, page_ids};
use crate::error::{Result, ToolboxError};
use crate::external::{self, ExternalTools};
use crate::files::{compression_ratio, file_size};

pub const DEFAULT_SUFFIX: &str = "_compressed";

/// How hard to compress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl CompressionLevel {
    /// JPEG quality used when images are re-encoded
    pub fn jpeg_quality(&self) -> u8 {
        match self {
            CompressionLevel::Low => 85,
            CompressionLevel::Medium => 70,
            CompressionLevel::High => 50,
        }
    }

    /// Ghostscript `-dPDFSETTINGS` preset
    pub fn ghostscript_preset(&self) -> &'static str {
        match self {
            CompressionLevel::Low => "/printer",
            CompressionLevel::Medium => "/ebook",
            CompressionLevel::High => "/screen",
        }
    }
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompressionLevel::Low => "low",
            CompressionLevel::Medium => "medium",
            CompressionLevel::High => "high",
        })
    }
}

impl FromStr for CompressionLevel {
    type Err = ToolboxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(CompressionLevel::Low),
            "medium" => Ok(CompressionLevel::Medium),
            "high" => Ok(CompressionLevel::High),
            other => Err(ToolboxError::InvalidOption(format!(
                "unknown compression level: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionEngine {
    #[default]
    Native,
    Ghostscript,
}

impl FromStr for CompressionEngine {
    type Err = ToolboxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" | "builtin" => Ok(CompressionEngine::Native),
            "ghostscript" | "gs" => Ok(CompressionEngine::Ghostscript),
            other => Err(ToolboxError::InvalidOption(format!(
                "unknown compression engine: {other}"
            ))),
        }
    }
}

/// Options for compression
#[derive(Debug, Clone, Default)]
pub struct CompressOptions {
    pub level: CompressionLevel,
    pub engine: CompressionEngine,
    /// Overrides the level's JPEG quality for re-encoded images
    pub image_quality: Option<u8>,
    pub tools: ExternalTools,
    pub password: Option<String>,
}

/// Sizes before and after compressing one file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressionResult {
    pub input: PathBuf,
    pub output: PathBuf,
    pub original_size: u64,
    pub compressed_size: u64,
}

impl CompressionResult {
    /// Percentage saved
    pub fn ratio(&self) -> f64 {
        compression_ratio(self.original_size, self.compressed_size)
    }
}

/// What the native engine changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompressStats {
    pub streams_compressed: usize,
    pub objects_removed: usize,
    pub images_recompressed: usize,
}

/// Whether `engine` can run on this machine
pub fn check_dependencies(engine: CompressionEngine, tools: &ExternalTools) -> bool {
    match engine {
        CompressionEngine::Native => true,
        CompressionEngine::Ghostscript => tools.has_ghostscript(),
    }
}

/// Flate-compress every stream stored without a filter, when it helps
pub(crate) fn compress_streams(doc: &mut Document) -> Result<usize> {
    let mut count = 0;
    for object in doc.objects.values_mut() {
        let Object::Stream(stream) = object else {
            continue;
        };
        if stream.dict.has(b"Filter") || stream.content.is_empty() {
            continue;
        }
        let packed = zlib(&stream.content)?;
        if packed.len() < stream.content.len() {
            stream.dict.set("Filter", "FlateDecode");
            stream.set_content(packed);
            count += 1;
        }
    }
    Ok(count)
}

/// Drop empty streams from page content arrays
pub(crate) fn remove_empty_content(doc: &mut Document) -> Result<usize> {
    let is_empty = |doc: &Document, id: ObjectId| {
        doc.get_object(id)
            .and_then(Object::as_stream)
            .map(|s| s.content.is_empty())
            .unwrap_or(false)
    };

    let mut removed = 0;
    for page_id in page_ids(doc) {
        let Ok(Object::Array(items)) = doc.get_dictionary(page_id)?.get(b"Contents").cloned() else {
            continue;
        };
        let kept: Vec<Object> = items
            .iter()
            .filter(|item| !item.as_reference().map(|id| is_empty(doc, id)).unwrap_or(false))
            .cloned()
            .collect();
        if kept.len() != items.len() {
            removed += items.len() - kept.len();
            doc.get_dictionary_mut(page_id)?.set("Contents", kept);
        }
    }
    Ok(removed)
}

/// Remove the XMP metadata stream and page-piece data
pub(crate) fn strip_metadata_streams(doc: &mut Document) -> Result<()> {
    let catalog = catalog_id(doc)?;
    let catalog = doc.get_dictionary_mut(catalog)?;
    catalog.remove(b"Metadata");
    catalog.remove(b"PieceInfo");
    for page_id in page_ids(doc) {
        doc.get_dictionary_mut(page_id)?.remove(b"PieceInfo");
    }
    Ok(())
}

/// Re-encode 8-bit RGB and Gray images as JPEG where that is smaller
fn recompress_images(doc: &mut Document, quality: u8) -> Result<usize> {
    let candidates: Vec<ObjectId> = doc
        .objects
        .iter()
        .filter_map(|(id, obj)| obj.as_stream().ok().map(|s| (*id, s)))
        .filter(|(_, s)| {
            s.dict.get(b"Subtype").and_then(Object::as_name).ok() == Some(&b"Image"[..])
                && !s.dict.has(b"ImageMask")
                && !s.dict.has(b"Decode")
                && !s.dict.has(b"Mask")
        })
        .map(|(id, _)| id)
        .collect();

    let mut count = 0;
    for id in candidates {
        let stream = doc.get_object(id)?.as_stream()?;
        let image = match decode_image(doc, stream) {
            Ok(RasterImage::Decoded(img)) => img,
            Ok(RasterImage::Jpeg(bytes)) => match image::load_from_memory(&bytes) {
                Ok(img) if !matches!(img, DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_)) => continue,
                Ok(img) => img,
                Err(_) => continue,
            },
            Err(e) => {
                debug!("Leaving image {:?} as is: {}", id, e);
                continue;
            }
        };

        let gray = !image.color().has_color();
        let flattened = if gray {
            DynamicImage::ImageLuma8(image.to_luma8())
        } else {
            DynamicImage::ImageRgb8(image.to_rgb8())
        };
        let mut encoded = Vec::new();
        flattened.write_with_encoder(JpegEncoder::new_with_quality(&mut encoded, quality.clamp(1, 100)))?;

        let stream = doc.get_object_mut(id)?.as_stream_mut()?;
        if encoded.len() >= stream.content.len() {
            continue;
        }
        stream.dict.set("Filter", "DCTDecode");
        stream.dict.remove(b"DecodeParms");
        stream.dict.set("ColorSpace", if gray { "DeviceGray" } else { "DeviceRGB" });
        stream.dict.set("BitsPerComponent", 8);
        stream.set_content(encoded);
        count += 1;
    }
    Ok(count)
}

/// Compress `doc` in memory with the native engine
pub fn compress_document(
    doc: &mut Document,
    level: CompressionLevel,
    image_quality: Option<u8>,
) -> Result<CompressStats> {
    let mut stats = CompressStats::default();
    if level == CompressionLevel::High {
        strip_metadata_streams(doc)?;
        stats.images_recompressed =
            recompress_images(doc, image_quality.unwrap_or_else(|| level.jpeg_quality()))?;
    }
    if level != CompressionLevel::Low {
        remove_empty_content(doc)?;
        stats.objects_removed = doc.prune_objects().len();
    }
    stats.streams_compressed = compress_streams(doc)?;
    debug!("Native compression ({}): {:?}", level, stats);
    Ok(stats)
}

fn compress_with_ghostscript(input: &Path, output: &Path, options: &CompressOptions) -> Result<()> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let preset = format!("-dPDFSETTINGS={}", options.level.ghostscript_preset());
    let out = format!("-sOutputFile={}", output.display());
    let args: Vec<&OsStr> = vec![
        OsStr::new("-sDEVICE=pdfwrite"),
        OsStr::new("-dCompatibilityLevel=1.4"),
        OsStr::new(&preset),
        OsStr::new("-dNOPAUSE"),
        OsStr::new("-dQUIET"),
        OsStr::new("-dBATCH"),
        OsStr::new(&out),
        input.as_os_str(),
    ];
    external::run(&options.tools.ghostscript, &args)?;
    Ok(())
}

/// Compress `input` into `output`
pub fn compress_pdf<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    options: &CompressOptions,
) -> Result<CompressionResult> {
    let (input, output) = (input.as_ref(), output.as_ref());
    if !input.exists() {
        return Err(ToolboxError::FileNotFound(input.to_path_buf()));
    }
    let original_size = file_size(input);

    let compressed_size = match options.engine {
        CompressionEngine::Native => {
            let mut doc = document::load(input, options.password.as_deref())?;
            compress_document(&mut doc, options.level, options.image_quality)?;
            document::save(&mut doc, output)?
        }
        CompressionEngine::Ghostscript => {
            if output == input {
                // gs cannot write over the file it reads
                let staging = output.with_extension("gs.tmp.pdf");
                compress_with_ghostscript(input, &staging, options)?;
                std::fs::rename(&staging, output)?;
            } else {
                compress_with_ghostscript(input, output, options)?;
            }
            file_size(output)
        }
    };

    let result = CompressionResult {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        original_size,
        compressed_size,
    };
    info!(
        "Compressed {} ({} -> {} bytes, {:.1}% saved)",
        input.display(),
        original_size,
        compressed_size,
        result.ratio()
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::images::embed_dynamic_image;
    use crate::test_support::{sample_doc, write_sample};
    use image::{Rgb, RgbImage};
    use lopdf::{dictionary, Stream};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_level_parsing_and_presets() {
        assert_eq!("HIGH".parse::<CompressionLevel>().unwrap(), CompressionLevel::High);
        assert!("extreme".parse::<CompressionLevel>().is_err());
        assert_eq!(CompressionLevel::default(), CompressionLevel::Medium);
        assert_eq!(CompressionLevel::Low.ghostscript_preset(), "/printer");
        assert_eq!(CompressionLevel::Medium.ghostscript_preset(), "/ebook");
        assert_eq!(CompressionLevel::High.ghostscript_preset(), "/screen");
        assert_eq!(
            [CompressionLevel::Low, CompressionLevel::Medium, CompressionLevel::High]
                .map(|l| l.jpeg_quality()),
            [85, 70, 50]
        );
        assert_eq!("gs".parse::<CompressionEngine>().unwrap(), CompressionEngine::Ghostscript);
    }

    #[test]
    fn test_low_flates_plain_streams() {
        let mut doc = sample_doc(2, "c");
        let long = doc.add_object(Stream::new(dictionary! {}, b"0 0 m 10 10 l S\n".repeat(100)));
        let stats = compress_document(&mut doc, CompressionLevel::Low, None).unwrap();
        assert_eq!(stats.objects_removed, 0);
        assert_eq!(stats.streams_compressed, 1);

        let stream = doc.get_object(long).unwrap().as_stream().unwrap();
        assert_eq!(stream.dict.get(b"Filter").unwrap().as_name().unwrap(), b"FlateDecode");
        assert_eq!(stream.decompressed_content().unwrap().len(), 1600);
        // too short to gain anything
        for page in page_ids(&doc) {
            let content = doc.get_page_content(page).unwrap();
            assert!(String::from_utf8_lossy(&content).contains("Tj"));
        }
    }

    #[test]
    fn test_medium_prunes_orphans_and_empty_content() {
        let mut doc = sample_doc(1, "c");
        doc.add_object(dictionary! { "Orphan" => true });
        let page = page_ids(&doc)[0];
        let current = doc.get_dictionary(page).unwrap().get(b"Contents").unwrap().clone();
        let empty = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
        doc.get_dictionary_mut(page)
            .unwrap()
            .set("Contents", vec![current, Object::Reference(empty)]);

        let stats = compress_document(&mut doc, CompressionLevel::Medium, None).unwrap();
        assert_eq!(stats.objects_removed, 2);
        let contents = doc.get_dictionary(page).unwrap().get(b"Contents").unwrap();
        assert_eq!(contents.as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_high_recompresses_images_and_strips_xmp() {
        let mut doc = sample_doc(1, "c");
        let noisy = RgbImage::from_fn(64, 64, |x, y| Rgb([(x * 4) as u8, (y * 4) as u8, ((x + y) * 2) as u8]));
        let image = embed_dynamic_image(&mut doc, &DynamicImage::ImageRgb8(noisy), None).unwrap();
        let page = page_ids(&doc)[0];
        crate::operations::overlay::xobject_resource(&mut doc, page, image.id).unwrap();

        let xmp = doc.add_object(Stream::new(dictionary! { "Type" => "Metadata" }, b"<x:xmpmeta/>".to_vec()));
        let catalog = catalog_id(&doc).unwrap();
        doc.get_dictionary_mut(catalog).unwrap().set("Metadata", xmp);

        let stats = compress_document(&mut doc, CompressionLevel::High, None).unwrap();
        assert_eq!(stats.images_recompressed, 1);
        let stream = doc.get_object(image.id).unwrap().as_stream().unwrap();
        assert_eq!(stream.dict.get(b"Filter").unwrap().as_name().unwrap(), b"DCTDecode");
        assert!(!doc.get_dictionary(catalog).unwrap().has(b"Metadata"));
        assert!(doc.get_object(xmp).is_err());
    }

    #[test]
    fn test_compress_file_reports_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_sample(dir.path(), "big.pdf", 3);
        let output = dir.path().join("big_compressed.pdf");
        let result = compress_pdf(&input, &output, &CompressOptions::default()).unwrap();

        assert_eq!(result.original_size, file_size(&input));
        assert_eq!(result.compressed_size, file_size(&output));
        assert_eq!(document::page_count(&document::load(&output, None).unwrap()), 3);
    }

    #[test]
    fn test_missing_ghostscript() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_sample(dir.path(), "a.pdf", 1);
        let options = CompressOptions {
            engine: CompressionEngine::Ghostscript,
            tools: ExternalTools {
                ghostscript: PathBuf::from("no-such-gs-binary"),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(!check_dependencies(options.engine, &options.tools));
        assert!(check_dependencies(CompressionEngine::Native, &options.tools));
        assert!(matches!(
            compress_pdf(&input, dir.path().join("out.pdf"), &options),
            Err(ToolboxError::ExternalToolMissing(_))
        ));
    }
}
