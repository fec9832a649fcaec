//! PDF ↔ images
//!
//! Embedded raster images are pulled out of PDF pages (there is no page
//! renderer, so vector content is not rasterised), and image files are laid
//! out one per page into a new PDF.

use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GrayImage, RgbImage};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::document::{self, resolve};
use crate::error::{Result, ToolboxError};
use crate::files::stem_of;
use crate::geometry::{fit_within, Orientation, PageSize};
use crate::operations::overlay::{fmt_num, image_operators, page_resources};
use crate::operations::PageRange;

/// Output format for extracted images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpg,
    Bmp,
    Tiff,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpg => "jpg",
            ImageFormat::Bmp => "bmp",
            ImageFormat::Tiff => "tiff",
        }
    }

    fn codec(&self) -> image::ImageFormat {
        match self {
            ImageFormat::Png => image::ImageFormat::Png,
            ImageFormat::Jpg => image::ImageFormat::Jpeg,
            ImageFormat::Bmp => image::ImageFormat::Bmp,
            ImageFormat::Tiff => image::ImageFormat::Tiff,
        }
    }
}

impl FromStr for ImageFormat {
    type Err = ToolboxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(ImageFormat::Png),
            "jpg" | "jpeg" => Ok(ImageFormat::Jpg),
            "bmp" => Ok(ImageFormat::Bmp),
            "tif" | "tiff" => Ok(ImageFormat::Tiff),
            other => Err(ToolboxError::InvalidOption(format!("unknown image format: {other}"))),
        }
    }
}

/// A raster image read from a PDF image XObject
#[derive(Debug, Clone)]
pub enum RasterImage {
    /// Baseline or progressive JPEG data, as stored in the file
    Jpeg(Vec<u8>),
    Decoded(DynamicImage),
}

impl RasterImage {
    /// Encoded bytes suitable for an OCR engine or an image file
    pub fn to_png_or_jpeg(&self) -> Result<Vec<u8>> {
        match self {
            RasterImage::Jpeg(bytes) => Ok(bytes.clone()),
            RasterImage::Decoded(img) => {
                let mut out = Cursor::new(Vec::new());
                img.write_to(&mut out, image::ImageFormat::Png)?;
                Ok(out.into_inner())
            }
        }
    }
}

/// Ids of the image XObjects a page draws from its resources
pub fn page_image_ids(doc: &Document, page_id: ObjectId) -> Vec<ObjectId> {
    let resources = page_resources(doc, page_id);
    let Some(xobjects) = resources
        .get(b"XObject")
        .ok()
        .and_then(|x| resolve(doc, x).as_dict().ok())
    else {
        return Vec::new();
    };

    let mut names: Vec<_> = xobjects.iter().collect();
    names.sort_by(|a, b| a.0.cmp(b.0));
    names
        .into_iter()
        .filter_map(|(_, obj)| obj.as_reference().ok())
        .filter(|id| {
            doc.get_object(*id)
                .and_then(Object::as_stream)
                .map(is_image)
                .unwrap_or(false)
        })
        .collect()
}

fn is_image(stream: &Stream) -> bool {
    stream.dict.get(b"Subtype").and_then(Object::as_name).ok() == Some(&b"Image"[..])
}

/// Decode an image XObject. DCT data is returned untouched; 8-bit
/// Gray, RGB and CMYK samples are decoded into an image.
pub fn decode_image(doc: &Document, stream: &Stream) -> Result<RasterImage> {
    let filters = document::stream_filters(stream);
    if filters.len() == 1 && filters[0] == b"DCTDecode" {
        return Ok(RasterImage::Jpeg(stream.content.clone()));
    }

    let dict = &stream.dict;
    let width = dict.get(b"Width").and_then(Object::as_i64)? as u32;
    let height = dict.get(b"Height").and_then(Object::as_i64)? as u32;
    let bits = dict.get(b"BitsPerComponent").and_then(Object::as_i64).unwrap_or(8);
    if bits != 8 {
        return Err(ToolboxError::InvalidOption(format!(
            "{bits}-bit images are not supported"
        )));
    }
    let components = color_components(doc, dict.get(b"ColorSpace").ok())?;

    let data = document::stream_data(stream)?;
    let pixels = (width as usize) * (height as usize);
    if data.len() < pixels * components {
        return Err(ToolboxError::InvalidStructure(format!(
            "image data is {} bytes, expected {}",
            data.len(),
            pixels * components
        )));
    }

    let image = match components {
        1 => GrayImage::from_raw(width, height, data[..pixels].to_vec()).map(DynamicImage::ImageLuma8),
        3 => RgbImage::from_raw(width, height, data[..pixels * 3].to_vec()).map(DynamicImage::ImageRgb8),
        _ => RgbImage::from_raw(width, height, cmyk_to_rgb(&data[..pixels * 4])).map(DynamicImage::ImageRgb8),
    };
    image
        .map(RasterImage::Decoded)
        .ok_or_else(|| ToolboxError::InvalidStructure("image dimensions do not match data".to_string()))
}

fn color_components(doc: &Document, color_space: Option<&Object>) -> Result<usize> {
    let unsupported = |what: &str| ToolboxError::InvalidOption(format!("unsupported color space {what}"));
    match color_space.map(|cs| resolve(doc, cs)) {
        None => Ok(3),
        Some(Object::Name(name)) => match name.as_slice() {
            b"DeviceGray" | b"CalGray" => Ok(1),
            b"DeviceRGB" | b"CalRGB" => Ok(3),
            b"DeviceCMYK" => Ok(4),
            other => Err(unsupported(&String::from_utf8_lossy(other))),
        },
        Some(Object::Array(items)) => {
            let family = items.first().and_then(|o| o.as_name().ok()).unwrap_or_default();
            match family {
                b"ICCBased" => {
                    let n = items
                        .get(1)
                        .map(|o| resolve(doc, o))
                        .and_then(|o| o.as_stream().ok())
                        .and_then(|s| s.dict.get(b"N").and_then(Object::as_i64).ok())
                        .unwrap_or(3);
                    match n {
                        1 | 3 | 4 => Ok(n as usize),
                        _ => Err(unsupported("ICCBased")),
                    }
                }
                b"CalGray" => Ok(1),
                b"CalRGB" => Ok(3),
                other => Err(unsupported(&String::from_utf8_lossy(other))),
            }
        }
        Some(_) => Err(unsupported("object")),
    }
}

fn cmyk_to_rgb(data: &[u8]) -> Vec<u8> {
    data.chunks_exact(4)
        .flat_map(|px| {
            let k = 255 - u16::from(px[3]);
            [0usize, 1, 2].map(|i| ((255 - u16::from(px[i])) * k / 255) as u8)
        })
        .collect()
}

/// Options for PDF to images
#[derive(Debug, Clone)]
pub struct PdfToImagesOptions {
    pub format: ImageFormat,
    /// File name prefix, images are named `<prefix><page:04>_<k>.<ext>`
    pub prefix: String,
    /// Pages to export; every page when unset
    pub pages: Option<PageRange>,
    /// Put the images of all PDFs in one folder, prefixed with the PDF stem
    pub single_folder: bool,
    pub password: Option<String>,
}

impl Default for PdfToImagesOptions {
    fn default() -> Self {
        Self {
            format: ImageFormat::Png,
            prefix: "page_".to_string(),
            pages: None,
            single_folder: false,
            password: None,
        }
    }
}

/// Export the embedded images of `input` below `output_dir`. Images that
/// cannot be decoded are skipped with a warning.
pub fn pdf_to_images<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output_dir: Q,
    options: &PdfToImagesOptions,
) -> Result<Vec<PathBuf>> {
    let input = input.as_ref();
    let doc = document::load(input, options.password.as_deref())?;
    let stem = stem_of(input);
    let (dir, prefix) = if options.single_folder {
        (output_dir.as_ref().to_path_buf(), format!("{stem}_{}", options.prefix))
    } else {
        (output_dir.as_ref().join(&stem), options.prefix.clone())
    };
    fs::create_dir_all(&dir)?;

    let page_ids = document::page_ids(&doc);
    let indices = options
        .pages
        .as_ref()
        .unwrap_or(&PageRange::All)
        .get_indices(page_ids.len())?;

    let mut written = Vec::new();
    for idx in indices {
        for (k, image_id) in page_image_ids(&doc, page_ids[idx]).into_iter().enumerate() {
            let stream = doc.get_object(image_id).and_then(Object::as_stream)?;
            let base = format!("{prefix}{:04}_{}", idx + 1, k + 1);
            match decode_image(&doc, stream) {
                Ok(RasterImage::Jpeg(bytes)) => {
                    let path = dir.join(format!("{base}.jpg"));
                    fs::write(&path, bytes)?;
                    written.push(path);
                }
                Ok(RasterImage::Decoded(img)) => {
                    let path = dir.join(format!("{base}.{}", options.format.extension()));
                    let img = match options.format {
                        ImageFormat::Jpg => DynamicImage::ImageRgb8(img.to_rgb8()),
                        _ => img,
                    };
                    img.save_with_format(&path, options.format.codec())?;
                    written.push(path);
                }
                Err(e) => warn!("Skipping image {} on page {}: {}", k + 1, idx + 1, e),
            }
        }
    }
    info!("Exported {} image(s) from {}", written.len(), input.display());
    Ok(written)
}

/// An image XObject added to a document
#[derive(Debug, Clone, Copy)]
pub struct EmbeddedImage {
    pub id: ObjectId,
    pub width: u32,
    pub height: u32,
}

/// Embed an image file. JPEG files are stored as they are; other formats
/// are decoded and stored losslessly, or as JPEG when `jpeg_quality` is
/// below 100.
pub fn embed_image_file<P: AsRef<Path>>(
    doc: &mut Document,
    path: P,
    jpeg_quality: Option<u8>,
) -> Result<EmbeddedImage> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ToolboxError::FileNotFound(path.to_path_buf()));
    }
    embed_image_bytes(doc, fs::read(path)?, jpeg_quality)
}

pub fn embed_image_bytes(doc: &mut Document, bytes: Vec<u8>, jpeg_quality: Option<u8>) -> Result<EmbeddedImage> {
    if let Some((width, height, components)) = jpeg_info(&bytes) {
        let color_space = match components {
            1 => "DeviceGray",
            4 => "DeviceCMYK",
            _ => "DeviceRGB",
        };
        let dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => i64::from(width),
            "Height" => i64::from(height),
            "ColorSpace" => color_space,
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode"
        };
        let id = doc.add_object(Stream::new(dict, bytes).with_compression(false));
        return Ok(EmbeddedImage { id, width, height });
    }

    let img = image::load_from_memory(&bytes)?;
    embed_dynamic_image(doc, &img, jpeg_quality)
}

/// Embed a decoded image, keeping its alpha channel as a soft mask
pub fn embed_dynamic_image(doc: &mut Document, img: &DynamicImage, jpeg_quality: Option<u8>) -> Result<EmbeddedImage> {
    let (width, height) = (img.width(), img.height());
    let soft_mask = if img.color().has_alpha() {
        let alpha: Vec<u8> = img.to_rgba8().pixels().map(|p| p.0[3]).collect();
        Some(doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => i64::from(width),
                "Height" => i64::from(height),
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode"
            },
            zlib(&alpha)?,
        ).with_compression(false)))
    } else {
        None
    };

    let gray = !img.color().has_color();
    let (samples, color_space) = if gray {
        (img.to_luma8().into_raw(), "DeviceGray")
    } else {
        (img.to_rgb8().into_raw(), "DeviceRGB")
    };

    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => i64::from(width),
        "Height" => i64::from(height),
        "ColorSpace" => color_space,
        "BitsPerComponent" => 8
    };
    let data = match jpeg_quality.filter(|q| *q < 100) {
        Some(quality) => {
            let mut out = Vec::new();
            let flattened = if gray {
                DynamicImage::ImageLuma8(img.to_luma8())
            } else {
                DynamicImage::ImageRgb8(img.to_rgb8())
            };
            flattened.write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality.max(1)))?;
            dict.set("Filter", "DCTDecode");
            out
        }
        None => {
            dict.set("Filter", "FlateDecode");
            zlib(&samples)?
        }
    };
    if let Some(mask) = soft_mask {
        dict.set("SMask", mask);
    }

    let id = doc.add_object(Stream::new(dict, data).with_compression(false));
    debug!("Embedded {}x{} image as {:?}", width, height, id);
    Ok(EmbeddedImage { id, width, height })
}

pub(crate) fn zlib(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Width, height and component count from a JPEG's frame header
pub(crate) fn jpeg_info(bytes: &[u8]) -> Option<(u32, u32, u8)> {
    if !bytes.starts_with(&[0xFF, 0xD8]) {
        return None;
    }
    let mut pos = 2;
    while pos + 4 <= bytes.len() {
        if bytes[pos] != 0xFF {
            return None;
        }
        let marker = bytes[pos + 1];
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        let len = usize::from(u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]));
        let is_frame = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_frame {
            let header = bytes.get(pos + 4..pos + 10)?;
            let height = u32::from(u16::from_be_bytes([header[1], header[2]]));
            let width = u32::from(u16::from_be_bytes([header[3], header[4]]));
            return Some((width, height, header[5]));
        }
        pos += 2 + len;
    }
    None
}

/// Options for images to PDF
#[derive(Debug, Clone)]
pub struct ImagesToPdfOptions {
    pub page_size: PageSize,
    pub orientation: Orientation,
    /// JPEG quality for re-encoded images; 100 keeps them lossless
    pub image_quality: u8,
}

impl Default for ImagesToPdfOptions {
    fn default() -> Self {
        Self {
            page_size: PageSize::A4,
            orientation: Orientation::Portrait,
            image_quality: 90,
        }
    }
}

/// Result of an images to PDF run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImagesToPdfReport {
    pub pages: usize,
    /// Images that could not be added, with the reason
    pub failures: Vec<(PathBuf, String)>,
}

/// Place each image on its own page, scaled to 90 % of the page and centred
pub fn images_to_pdf<P: AsRef<Path>>(
    images: &[PathBuf],
    output: P,
    options: &ImagesToPdfOptions,
) -> Result<ImagesToPdfReport> {
    if images.is_empty() {
        return Err(ToolboxError::NoInputFiles);
    }
    let (mut doc, pages_id) = document::new_document();
    let (page_w, page_h) = options.page_size.with_orientation(options.orientation);
    let mut report = ImagesToPdfReport::default();

    for path in images {
        let embedded = match embed_image_file(&mut doc, path, Some(options.image_quality)) {
            Ok(embedded) => embedded,
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                report.failures.push((path.clone(), e.to_string()));
                continue;
            }
        };

        let (w, h) = fit_within(
            f64::from(embedded.width),
            f64::from(embedded.height),
            page_w * 0.9,
            page_h * 0.9,
        );
        let content = image_operators("Im0", (page_w - w) / 2.0, (page_h - h) / 2.0, w, h);
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        document::append_page(
            &mut doc,
            pages_id,
            dictionary! {
                "MediaBox" => vec![
                    0.into(),
                    0.into(),
                    Object::Real(page_w as f32),
                    Object::Real(page_h as f32)
                ],
                "Contents" => content_id,
                "Resources" => dictionary! {
                    "XObject" => dictionary! { "Im0" => embedded.id }
                }
            },
        )?;
        report.pages += 1;
        debug!("Added {} ({} x {} pt)", path.display(), fmt_num(w), fmt_num(h));
    }

    if report.pages == 0 {
        return Err(ToolboxError::NoPagesToProcess);
    }
    document::save(&mut doc, output.as_ref())?;
    info!("Wrote {} page(s) to {}", report.pages, output.as_ref().display());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::media_box;
    use image::{Rgb, Rgba, RgbaImage};
    use pretty_assertions::assert_eq;

    fn write_png(path: &Path, w: u32, h: u32) {
        RgbImage::from_pixel(w, h, Rgb([200, 10, 10])).save(path).unwrap();
    }

    fn jpeg_bytes(w: u32, h: u32) -> Vec<u8> {
        let mut out = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([0, 120, 255])))
            .write_with_encoder(JpegEncoder::new_with_quality(&mut out, 80))
            .unwrap();
        out
    }

    #[test]
    fn test_image_format_parse() {
        assert_eq!("JPEG".parse::<ImageFormat>().unwrap(), ImageFormat::Jpg);
        assert_eq!("tif".parse::<ImageFormat>().unwrap(), ImageFormat::Tiff);
        assert!("gif".parse::<ImageFormat>().is_err());
    }

    #[test]
    fn test_jpeg_info() {
        assert_eq!(jpeg_info(&jpeg_bytes(33, 17)), Some((33, 17, 3)));
        assert_eq!(jpeg_info(b"\x89PNG"), None);
    }

    #[test]
    fn test_jpeg_embedded_unchanged() {
        let mut doc = Document::with_version("1.5");
        let bytes = jpeg_bytes(20, 10);
        let embedded = embed_image_bytes(&mut doc, bytes.clone(), Some(50)).unwrap();
        let stream = doc.get_object(embedded.id).unwrap().as_stream().unwrap();
        assert_eq!(stream.content, bytes);
        assert_eq!(stream.dict.get(b"Filter").unwrap().as_name().unwrap(), b"DCTDecode");
        assert!(matches!(decode_image(&doc, stream).unwrap(), RasterImage::Jpeg(_)));
    }

    #[test]
    fn test_alpha_becomes_soft_mask() {
        let mut doc = Document::with_version("1.5");
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 128])));
        let embedded = embed_dynamic_image(&mut doc, &img, None).unwrap();
        let stream = doc.get_object(embedded.id).unwrap().as_stream().unwrap();
        assert!(stream.dict.has(b"SMask"));

        match decode_image(&doc, stream).unwrap() {
            RasterImage::Decoded(decoded) => assert_eq!((decoded.width(), decoded.height()), (4, 4)),
            other => panic!("expected decoded image, got {other:?}"),
        }
    }

    #[test]
    fn test_flate_rgb_image_decodes() {
        let mut doc = Document::with_version("1.5");
        let mut img = RgbImage::from_pixel(4, 3, Rgb([10, 200, 30]));
        img.put_pixel(1, 2, Rgb([255, 0, 0]));
        let embedded = embed_dynamic_image(&mut doc, &DynamicImage::ImageRgb8(img.clone()), None).unwrap();
        let stream = doc.get_object(embedded.id).unwrap().as_stream().unwrap();
        assert_eq!(stream.dict.get(b"Filter").unwrap().as_name().unwrap(), b"FlateDecode");

        match decode_image(&doc, stream).unwrap() {
            RasterImage::Decoded(decoded) => assert_eq!(decoded.to_rgb8(), img),
            other => panic!("expected decoded image, got {other:?}"),
        }
    }

    #[test]
    fn test_cmyk_conversion() {
        assert_eq!(cmyk_to_rgb(&[0, 0, 0, 0, 255, 0, 0, 0]), vec![255, 255, 255, 0, 255, 255]);
    }

    #[test]
    fn test_images_round_trip_through_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let wide = dir.path().join("wide.png");
        let photo = dir.path().join("photo.jpg");
        write_png(&wide, 400, 100);
        fs::write(&photo, jpeg_bytes(30, 60)).unwrap();
        let broken = dir.path().join("broken.png");
        fs::write(&broken, b"not an image").unwrap();

        let output = dir.path().join("images.pdf");
        let options = ImagesToPdfOptions {
            page_size: PageSize::Letter,
            orientation: Orientation::Landscape,
            image_quality: 100,
        };
        let report = images_to_pdf(&[wide, broken.clone(), photo], &output, &options).unwrap();
        assert_eq!(report.pages, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, broken);

        let doc = document::load(&output, None).unwrap();
        let first = document::page_ids(&doc)[0];
        assert_eq!(media_box(&doc, first).width(), 792.0);

        let out_dir = dir.path().join("out");
        let files = pdf_to_images(&output, &out_dir, &PdfToImagesOptions::default()).unwrap();
        assert_eq!(
            files,
            vec![
                out_dir.join("images").join("page_0001_1.png"),
                out_dir.join("images").join("page_0002_1.jpg"),
            ]
        );
        let restored = image::open(&files[0]).unwrap();
        assert_eq!((restored.width(), restored.height()), (400, 100));
    }

    #[test]
    fn test_single_folder_prefixes_stem() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("a.png");
        write_png(&png, 8, 8);
        let pdf = dir.path().join("scan.pdf");
        let lossless = ImagesToPdfOptions {
            image_quality: 100,
            ..Default::default()
        };
        images_to_pdf(&[png], &pdf, &lossless).unwrap();

        let options = PdfToImagesOptions {
            format: ImageFormat::Bmp,
            single_folder: true,
            ..Default::default()
        };
        let files = pdf_to_images(&pdf, dir.path(), &options).unwrap();
        assert_eq!(files, vec![dir.path().join("scan_page_0001_1.bmp")]);
    }

    #[test]
    fn test_no_images_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = images_to_pdf(&[dir.path().join("missing.png")], dir.path().join("o.pdf"), &ImagesToPdfOptions::default());
        assert!(matches!(result, Err(ToolboxError::NoPagesToProcess)));
    }
}
