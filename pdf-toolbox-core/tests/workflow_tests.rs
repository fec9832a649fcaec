//! End-to-end workflows across several tools

use std::path::{Path, PathBuf};

use pdf_toolbox::batch::{run_files, summarize_outcomes, CancelToken, FileOutcome};
use pdf_toolbox::document;
use pdf_toolbox::encryption::{decrypt_pdf, encrypt_pdf, is_encrypted, EncryptOptions};
use pdf_toolbox::lopdf::{dictionary, Object, Stream};
use pdf_toolbox::operations::{
    add_watermark, compare_pdfs, compress_pdf, extract_text, merge_pdf_files, read_metadata,
    rotate_pdf_pages, split_pdf, write_metadata, CompareOptions, CompressOptions,
    ExtractTextOptions, MergeInput, MergeOptions, Metadata, RotateOptions, RotationAngle,
    SplitMode, SplitOptions, WatermarkOptions,
};
use pdf_toolbox::{PageRange, ToolboxError};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

/// Write a PDF whose pages read "<label> page N"
fn create_test_pdf(path: &Path, label: &str, num_pages: usize) -> PathBuf {
    let (mut doc, pages_id) = document::new_document();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica"
    });
    for n in 1..=num_pages {
        let content = format!("BT /F1 18 Tf 72 700 Td ({label} page {n}) Tj ET");
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        document::append_page(
            &mut doc,
            pages_id,
            dictionary! {
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
                "Contents" => content_id,
                "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } }
            },
        )
        .unwrap();
    }
    let info_id = doc.add_object(dictionary! {
        "Title" => document::text_string(label)
    });
    doc.trailer.set("Info", Object::Reference(info_id));
    document::save(&mut doc, path).unwrap();
    path.to_path_buf()
}

fn page_text(path: &Path) -> String {
    let out = path.with_extension("txt");
    extract_text(path, Some(&out), &ExtractTextOptions::default()).unwrap();
    std::fs::read_to_string(out).unwrap()
}

#[test]
fn test_merge_then_split_by_ranges() {
    let dir = TempDir::new().unwrap();
    let a = create_test_pdf(&dir.path().join("a.pdf"), "Alpha", 2);
    let b = create_test_pdf(&dir.path().join("b.pdf"), "Beta", 3);
    let merged = dir.path().join("merged.pdf");

    let pages = merge_pdf_files(
        vec![MergeInput::new(&a), MergeInput::with_pages(&b, PageRange::parse("2-3").unwrap())],
        &merged,
        MergeOptions::default(),
    )
    .unwrap();
    assert_eq!(pages, 4);

    let parts = split_pdf(
        &merged,
        SplitOptions {
            mode: SplitMode::Ranges(PageRange::parse("1-2,3-4").unwrap()),
            output_dir: Some(dir.path().join("parts")),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(parts.len(), 2);

    let second = page_text(&parts[1]);
    assert!(second.contains("Beta page 2"));
    assert!(second.contains("Beta page 3"));
    assert!(!second.contains("Alpha"));
}

#[test]
fn test_protect_edit_and_unprotect() {
    let dir = TempDir::new().unwrap();
    let input = create_test_pdf(&dir.path().join("contract.pdf"), "Contract", 2);
    let stamped = dir.path().join("stamped.pdf");
    let locked = dir.path().join("locked.pdf");
    let unlocked = dir.path().join("unlocked.pdf");

    add_watermark(&input, &stamped, &WatermarkOptions::default()).unwrap();
    encrypt_pdf(&stamped, &locked, &EncryptOptions::new("s3cret")).unwrap();
    assert!(is_encrypted(&locked).unwrap());

    assert!(matches!(
        decrypt_pdf(&locked, &unlocked, "wrong"),
        Err(ToolboxError::WrongPassword)
    ));
    decrypt_pdf(&locked, &unlocked, "s3cret").unwrap();
    assert!(!is_encrypted(&unlocked).unwrap());

    let text = page_text(&unlocked);
    assert!(text.contains("Contract page 1"));
    assert!(text.contains("confidential"));
}

#[test]
fn test_rotate_compress_and_compare() {
    let dir = TempDir::new().unwrap();
    let input = create_test_pdf(&dir.path().join("scan.pdf"), "Scan", 3);
    let rotated = dir.path().join("rotated.pdf");
    let compressed = dir.path().join("compressed.pdf");

    let options = RotateOptions {
        angle: RotationAngle::Clockwise90,
        ..Default::default()
    }
    .with_pages("odd");
    assert_eq!(rotate_pdf_pages(&input, &rotated, &options).unwrap(), 2);

    let result = compress_pdf(&rotated, &compressed, &CompressOptions::default()).unwrap();
    assert_eq!(result.original_size, std::fs::metadata(&rotated).unwrap().len());

    let report = compare_pdfs(&input, &compressed, CompareOptions::default(), (None, None)).unwrap();
    assert!(report.same_page_count());
    assert!(report.text_differences.is_empty());

    let doc = document::load(&compressed, None).unwrap();
    let rotations: Vec<i64> = document::page_ids(&doc)
        .into_iter()
        .map(|id| document::page_rotation(&doc, id))
        .collect();
    assert_eq!(rotations, vec![90, 0, 90]);
}

#[test]
fn test_metadata_round_trip_through_file() {
    let dir = TempDir::new().unwrap();
    let input = create_test_pdf(&dir.path().join("doc.pdf"), "Draft", 1);
    let output = dir.path().join("doc_metadata_edited.pdf");

    let mut metadata = read_metadata(&input, None).unwrap();
    assert_eq!(metadata.title.as_deref(), Some("Draft"));
    metadata = Metadata {
        title: Some("季度报告".to_string()),
        author: Some("Finance".to_string()),
        ..metadata
    };
    write_metadata(&input, &output, &metadata, None).unwrap();

    let reread = read_metadata(&output, None).unwrap();
    assert_eq!(reread.title.as_deref(), Some("季度报告"));
    assert_eq!(reread.author.as_deref(), Some("Finance"));
}

#[test]
fn test_file_loop_collects_failures() {
    let dir = TempDir::new().unwrap();
    let files = vec![
        create_test_pdf(&dir.path().join("one.pdf"), "One", 1),
        dir.path().join("absent.pdf"),
        create_test_pdf(&dir.path().join("two.pdf"), "Two", 2),
    ];

    let mut percents = Vec::new();
    let outcomes = run_files(
        &files,
        &CancelToken::new(),
        |p| percents.push(p.percent.round() as u32),
        |input| {
            let output = dir.path().join("out").join(input.file_name().unwrap_or_default());
            let result = compress_pdf(input, &output, &CompressOptions::default())?;
            Ok(FileOutcome::success(input, &output)
                .with_sizes(result.original_size, result.compressed_size))
        },
    );

    assert_eq!(percents, vec![0, 33, 67, 100]);
    assert_eq!(
        outcomes.iter().map(|o| o.success).collect::<Vec<_>>(),
        vec![true, false, true]
    );
    assert!(summarize_outcomes(&outcomes).starts_with("处理完成: 成功 2 个, 失败 1 个"));
    assert!(dir.path().join("out").join("two.pdf").exists());
}
