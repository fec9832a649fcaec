//! Fixture documents for unit tests

use lopdf::{dictionary, Document, Object, Stream};

use crate::document::text_string;

/// A `pages` page document, each page drawing "Page N" in Helvetica.
/// Pages inherit a Letter MediaBox from the page tree root.
pub fn sample_doc(pages: usize, title: &str) -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica"
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id }
    });

    let mut kids = Vec::new();
    for n in 1..=pages {
        let content = format!("BT /F1 24 Tf 72 700 Td (Page {n}) Tj ET");
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id
        });
        kids.push(Object::Reference(page_id));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()]
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => text_string(title),
        "Producer" => text_string("fixture")
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);
    doc
}

pub fn sample_pdf(pages: usize, title: &str) -> Vec<u8> {
    let mut doc = sample_doc(pages, title);
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("fixture serializes");
    bytes
}

/// Write a sample document into `dir` and return its path.
pub fn write_sample(dir: &std::path::Path, name: &str, pages: usize) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, sample_pdf(pages, name)).expect("fixture written");
    path
}
