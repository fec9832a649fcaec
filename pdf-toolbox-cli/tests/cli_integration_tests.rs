//! Integration tests for the pdftoolbox CLI
//!
//! Each test runs the built binary against PDFs written with lopdf into a
//! temporary directory.

use anyhow::Result;
use lopdf::{dictionary, Document, Object, Stream};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::{tempdir, TempDir};

/// Test helper to get the CLI binary path
fn get_cli_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_pdftoolbox"))
}

fn setup_temp_dir() -> TempDir {
    tempdir().expect("Failed to create temp directory")
}

/// Run the CLI with logging silenced and no configuration file
fn run_cli_command(args: &[&str]) -> Result<Output> {
    let output = Command::new(get_cli_path())
        .args(args)
        .env_remove("PDFTOOLBOX_CONFIG")
        .env_remove("PDFTOOLBOX_OUTPUT_DIR")
        .env("RUST_LOG", "off")
        .output()?;
    Ok(output)
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("temp paths are UTF-8")
}

fn assert_pdf_exists_and_valid(path: &Path) {
    assert!(path.exists(), "PDF file should exist: {}", path.display());
    let content = fs::read(path).expect("Failed to read PDF file");
    assert!(content.len() > 100, "PDF file should have content (> 100 bytes)");
    assert!(content.starts_with(b"%PDF-"), "File should start with PDF header");
}

/// Write a PDF whose pages read "<label> page N"
fn create_test_pdf(dir: &Path, name: &str, label: &str, num_pages: usize) -> PathBuf {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids = Vec::new();
    for n in 1..=num_pages {
        let content = format!("BT /F1 18 Tf 72 700 Td ({label} page {n}) Tj ET");
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            "Contents" => content_id,
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
        });
        kids.push(Object::Reference(page_id));
    }
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => num_pages as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal(label),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);

    let path = dir.join(name);
    doc.save(&path).expect("Failed to write test PDF");
    path
}

fn page_count(path: &Path) -> usize {
    Document::load(path).expect("Output should parse").get_pages().len()
}

fn page_rotations(path: &Path) -> Vec<i64> {
    let doc = Document::load(path).expect("Output should parse");
    doc.get_pages()
        .values()
        .map(|id| {
            doc.get_dictionary(*id)
                .ok()
                .and_then(|page| page.get(b"Rotate").ok())
                .and_then(|rotate| rotate.as_i64().ok())
                .unwrap_or(0)
        })
        .collect()
}

#[test]
fn test_cli_help_command() {
    let output = run_cli_command(&["--help"]).expect("CLI command should succeed");
    assert!(output.status.success());
    let stdout = stdout_of(&output);
    for command in ["merge", "split", "compress", "office-to-pdf", "header-footer", "metadata"] {
        assert!(stdout.contains(command), "help should list {command}");
    }
}

#[test]
fn test_cli_invalid_command() {
    let output = run_cli_command(&["frobnicate"]).expect("CLI should run");
    assert!(!output.status.success(), "Unknown commands should fail");
}

#[test]
fn test_cli_create_command() {
    let temp_dir = setup_temp_dir();
    let output_path = temp_dir.path().join("test_create.pdf");

    let output = run_cli_command(&["create", "-o", path_str(&output_path), "-t", "Hello, World!"])
        .expect("CLI command should succeed");

    assert!(output.status.success(), "Command should succeed");
    assert_pdf_exists_and_valid(&output_path);
    assert!(stdout_of(&output).contains("PDF created successfully"));
}

#[test]
fn test_cli_tools_lists_every_category() {
    let output = run_cli_command(&["tools"]).expect("CLI command should succeed");
    assert!(output.status.success());
    let stdout = stdout_of(&output);
    assert!(stdout.starts_with("PDF工具箱"));
    for category in ["基础操作", "转换功能", "编辑功能", "高级功能"] {
        assert!(stdout.contains(category), "menu should contain {category}");
    }
}

#[test]
fn test_cli_info_json() {
    let temp_dir = setup_temp_dir();
    let input = create_test_pdf(temp_dir.path(), "info.pdf", "Report", 3);

    let output = run_cli_command(&["info", path_str(&input), "--json"]).expect("CLI should run");
    assert!(output.status.success());

    let info: serde_json::Value = serde_json::from_slice(&output.stdout).expect("JSON output");
    assert_eq!(info["pages"], 3);
    assert_eq!(info["encrypted"], false);
    assert_eq!(info["title"], "Report");
}

#[test]
fn test_cli_info_missing_file() {
    let output = run_cli_command(&["info", "/nonexistent/file.pdf"]).expect("CLI should run");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to read"));
}

#[test]
fn test_cli_merge_with_page_ranges() {
    let temp_dir = setup_temp_dir();
    let a = create_test_pdf(temp_dir.path(), "a.pdf", "Alpha", 2);
    let b = create_test_pdf(temp_dir.path(), "b.pdf", "Beta", 3);
    let merged = temp_dir.path().join("merged.pdf");

    let output = run_cli_command(&[
        "merge",
        path_str(&a),
        path_str(&b),
        "-o",
        path_str(&merged),
        "-p",
        "all",
        "-p",
        "2-3",
    ])
    .expect("CLI should run");

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_pdf_exists_and_valid(&merged);
    assert_eq!(page_count(&merged), 4);
}

#[test]
fn test_cli_split_every_page() {
    let temp_dir = setup_temp_dir();
    let input = create_test_pdf(temp_dir.path(), "doc.pdf", "Doc", 3);
    let parts = temp_dir.path().join("parts");

    let output = run_cli_command(&["split", path_str(&input), "-o", path_str(&parts)])
        .expect("CLI should run");

    assert!(output.status.success());
    for n in 1..=3 {
        let part = parts.join(format!("split_{n}.pdf"));
        assert_pdf_exists_and_valid(&part);
        assert_eq!(page_count(&part), 1);
    }
}

#[test]
fn test_cli_split_rejects_out_of_bounds_ranges() {
    let temp_dir = setup_temp_dir();
    let input = create_test_pdf(temp_dir.path(), "doc.pdf", "Doc", 2);

    let output = run_cli_command(&[
        "split",
        path_str(&input),
        "-m",
        "ranges",
        "-r",
        "1-5",
        "-o",
        path_str(temp_dir.path()),
    ])
    .expect("CLI should run");
    assert!(!output.status.success());
}

#[test]
fn test_cli_rotate_odd_pages() {
    let temp_dir = setup_temp_dir();
    let input = create_test_pdf(temp_dir.path(), "scan.pdf", "Scan", 3);

    let output = run_cli_command(&["rotate", path_str(&input), "-a", "90", "-p", "odd"])
        .expect("CLI should run");

    assert!(output.status.success());
    let rotated = temp_dir.path().join("scan_rotated.pdf");
    assert_pdf_exists_and_valid(&rotated);
    assert_eq!(page_rotations(&rotated), vec![90, 0, 90]);
    assert!(stdout_of(&output).contains("处理完成: 成功 1 个, 失败 0 个"));
}

#[test]
fn test_cli_rotate_rejects_odd_angles() {
    let temp_dir = setup_temp_dir();
    let input = create_test_pdf(temp_dir.path(), "scan.pdf", "Scan", 1);

    let output = run_cli_command(&["rotate", path_str(&input), "-a", "45"]).expect("CLI should run");
    assert!(!output.status.success());
    assert!(!temp_dir.path().join("scan_rotated.pdf").exists());
}

#[test]
fn test_cli_compress_reports_failed_files() {
    let temp_dir = setup_temp_dir();
    let input = create_test_pdf(temp_dir.path(), "big.pdf", "Big", 2);
    let missing = temp_dir.path().join("missing.pdf");
    let out_dir = temp_dir.path().join("out");

    let output = run_cli_command(&[
        "compress",
        path_str(&input),
        path_str(&missing),
        "--output-dir",
        path_str(&out_dir),
    ])
    .expect("CLI should run");

    assert!(!output.status.success(), "A failed file makes the run fail");
    assert_pdf_exists_and_valid(&out_dir.join("big_compressed.pdf"));
    let stdout = stdout_of(&output);
    assert!(stdout.contains("处理完成: 成功 1 个, 失败 1 个"));
    assert!(stdout.contains("✗ missing.pdf"));
}

#[test]
fn test_cli_encrypt_then_decrypt() {
    let temp_dir = setup_temp_dir();
    let input = create_test_pdf(temp_dir.path(), "secret.pdf", "Secret", 1);

    let output = run_cli_command(&["encrypt", path_str(&input), "-p", "pw123"]).expect("CLI should run");
    assert!(output.status.success());
    let locked = temp_dir.path().join("secret_encrypted.pdf");
    assert_pdf_exists_and_valid(&locked);

    let info = run_cli_command(&["info", path_str(&locked), "--password", "pw123", "--json"])
        .expect("CLI should run");
    let info: serde_json::Value = serde_json::from_slice(&info.stdout).expect("JSON output");
    assert_eq!(info["encrypted"], true);

    let wrong = run_cli_command(&["decrypt", path_str(&locked), "-p", "nope"]).expect("CLI should run");
    assert!(!wrong.status.success());
    assert!(stdout_of(&wrong).contains("Wrong password"));

    let output = run_cli_command(&["decrypt", path_str(&locked), "-p", "pw123"]).expect("CLI should run");
    assert!(output.status.success());
    let unlocked = temp_dir.path().join("secret_encrypted_decrypted.pdf");
    assert_eq!(page_count(&unlocked), 1);
}

#[test]
fn test_cli_encrypt_rejects_empty_password() {
    let temp_dir = setup_temp_dir();
    let input = create_test_pdf(temp_dir.path(), "doc.pdf", "Doc", 1);

    let output = run_cli_command(&["encrypt", path_str(&input), "-p", ""]).expect("CLI should run");
    assert!(!output.status.success());
    assert!(!temp_dir.path().join("doc_encrypted.pdf").exists());
}

#[test]
fn test_cli_watermark_and_extract_text() {
    let temp_dir = setup_temp_dir();
    let input = create_test_pdf(temp_dir.path(), "memo.pdf", "Memo", 2);

    let output = run_cli_command(&["watermark", path_str(&input), "-t", "DRAFT", "--opacity", "30"])
        .expect("CLI should run");
    assert!(output.status.success());
    let stamped = temp_dir.path().join("memo_watermarked.pdf");
    assert_pdf_exists_and_valid(&stamped);

    let output = run_cli_command(&["to-text", path_str(&stamped)]).expect("CLI should run");
    assert!(output.status.success());
    let text = fs::read_to_string(temp_dir.path().join("memo_watermarked.txt")).expect("text output");
    assert!(text.contains("--- Page 1 ---"));
    assert!(text.contains("Memo page 2"));
    assert!(text.contains("DRAFT"));
}

#[test]
fn test_cli_header_footer() {
    let temp_dir = setup_temp_dir();
    let input = create_test_pdf(temp_dir.path(), "book.pdf", "Book", 2);

    let output = run_cli_command(&[
        "header-footer",
        path_str(&input),
        "--header",
        "Annual report",
        "--page-format",
        "{page}/{total}",
    ])
    .expect("CLI should run");
    assert!(output.status.success());

    let result = temp_dir.path().join("book_header_footer.pdf");
    assert_pdf_exists_and_valid(&result);
    run_cli_command(&["to-text", path_str(&result)]).expect("CLI should run");
    let text = fs::read_to_string(temp_dir.path().join("book_header_footer.txt")).expect("text output");
    assert!(text.contains("Annual report"));
    assert!(text.contains("2/2"));
}

#[test]
fn test_cli_metadata_set_and_show() {
    let temp_dir = setup_temp_dir();
    let input = create_test_pdf(temp_dir.path(), "paper.pdf", "Paper", 1);

    let output = run_cli_command(&[
        "metadata",
        "set",
        path_str(&input),
        "--title",
        "季度报告",
        "--author",
        "Finance",
    ])
    .expect("CLI should run");
    assert!(output.status.success());

    let edited = temp_dir.path().join("paper_metadata_edited.pdf");
    let output = run_cli_command(&["metadata", "show", path_str(&edited), "--json"]).expect("CLI should run");
    let metadata: serde_json::Value = serde_json::from_slice(&output.stdout).expect("JSON output");
    assert_eq!(metadata["title"], "季度报告");
    assert_eq!(metadata["author"], "Finance");
    assert!(metadata["mod_date"].is_string());
}

#[test]
fn test_cli_bookmarks_apply_and_list() {
    let temp_dir = setup_temp_dir();
    let input = create_test_pdf(temp_dir.path(), "guide.pdf", "Guide", 3);
    let output_path = temp_dir.path().join("guide_marked.pdf");

    let output = run_cli_command(&[
        "bookmarks",
        "apply",
        path_str(&input),
        "-o",
        path_str(&output_path),
        "-a",
        "1=Introduction",
        "-a",
        "3=Appendix",
    ])
    .expect("CLI should run");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let output = run_cli_command(&["bookmarks", "list", path_str(&output_path), "--json"])
        .expect("CLI should run");
    let entries: serde_json::Value = serde_json::from_slice(&output.stdout).expect("JSON output");
    assert_eq!(entries[0]["title"], "Introduction");
    assert_eq!(entries[1]["title"], "Appendix");
    assert_eq!(entries[1]["page"], 3);
}

#[test]
fn test_cli_bookmark_beyond_last_page_fails() {
    let temp_dir = setup_temp_dir();
    let input = create_test_pdf(temp_dir.path(), "short.pdf", "Short", 1);

    let output = run_cli_command(&["bookmarks", "apply", path_str(&input), "-a", "9=Nowhere"])
        .expect("CLI should run");
    assert!(!output.status.success());
}

#[test]
fn test_cli_annotate_add_and_list() {
    let temp_dir = setup_temp_dir();
    let input = create_test_pdf(temp_dir.path(), "notes.pdf", "Notes", 2);

    let output = run_cli_command(&[
        "annotate",
        "add",
        path_str(&input),
        "-k",
        "note",
        "-p",
        "2",
        "-t",
        "Check this",
        "-c",
        "#ff0000",
    ])
    .expect("CLI should run");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(temp_dir.path().join("notes_annotations.txt").exists());

    let annotated = temp_dir.path().join("notes_with_annotations.pdf");
    let output = run_cli_command(&["annotate", "list", path_str(&annotated), "--json"])
        .expect("CLI should run");
    let annotations: serde_json::Value = serde_json::from_slice(&output.stdout).expect("JSON output");
    assert_eq!(annotations[0]["page"], 2);
    assert_eq!(annotations[0]["subtype"], "Text");
    assert_eq!(annotations[0]["contents"], "Check this");
}

#[test]
fn test_cli_form_add_fill_and_list() {
    let temp_dir = setup_temp_dir();
    let input = create_test_pdf(temp_dir.path(), "form.pdf", "Form", 1);
    let with_field = temp_dir.path().join("form_with_field.pdf");
    let filled = temp_dir.path().join("form_done.pdf");

    let output = run_cli_command(&[
        "form",
        "add",
        path_str(&input),
        "-o",
        path_str(&with_field),
        "-n",
        "name",
        "-r",
        "100,700,300,720",
    ])
    .expect("CLI should run");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let output = run_cli_command(&[
        "form",
        "fill",
        path_str(&with_field),
        "-o",
        path_str(&filled),
        "-s",
        "name=张三",
        "-s",
        "unknown=1",
    ])
    .expect("CLI should run");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("no field named 'unknown'"));

    let output = run_cli_command(&["form", "list", path_str(&filled), "--json"]).expect("CLI should run");
    let fields: serde_json::Value = serde_json::from_slice(&output.stdout).expect("JSON output");
    assert_eq!(fields[0]["name"], "name");
    assert_eq!(fields[0]["value"], "张三");
}

#[test]
fn test_cli_compare_detects_page_difference() {
    let temp_dir = setup_temp_dir();
    let a = create_test_pdf(temp_dir.path(), "a.pdf", "Same", 2);
    let b = create_test_pdf(temp_dir.path(), "b.pdf", "Same", 3);

    let output = run_cli_command(&["compare", path_str(&a), path_str(&b), "--json"]).expect("CLI should run");
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("JSON output");
    assert_eq!(report["first_pages"], 2);
    assert_eq!(report["second_pages"], 3);
    assert_eq!(report["text_differences"], serde_json::json!([]));

    let output = run_cli_command(&["compare", path_str(&a), path_str(&b)]).expect("CLI should run");
    assert!(stdout_of(&output).contains("页数不同"));
}

#[test]
fn test_cli_sign_with_text() {
    let temp_dir = setup_temp_dir();
    let input = create_test_pdf(temp_dir.path(), "deal.pdf", "Deal", 1);

    let output = run_cli_command(&["sign", path_str(&input), "-t", "Approved", "-x", "300", "-y", "80"])
        .expect("CLI should run");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_pdf_exists_and_valid(&temp_dir.path().join("deal_signed.pdf"));
    assert!(temp_dir.path().join("deal_signature_info.txt").exists());
}

#[test]
fn test_cli_sign_requires_text_or_image() {
    let temp_dir = setup_temp_dir();
    let input = create_test_pdf(temp_dir.path(), "deal.pdf", "Deal", 1);

    let output = run_cli_command(&["sign", path_str(&input)]).expect("CLI should run");
    assert!(!output.status.success());
}

#[test]
fn test_cli_optimize() {
    let temp_dir = setup_temp_dir();
    let input = create_test_pdf(temp_dir.path(), "fat.pdf", "Fat", 2);

    let output = run_cli_command(&["optimize", path_str(&input), "-l", "high"]).expect("CLI should run");
    assert!(output.status.success());
    let optimized = temp_dir.path().join("fat_optimized.pdf");
    assert_eq!(page_count(&optimized), 2);
}

#[test]
fn test_cli_batch_pipeline() {
    let temp_dir = setup_temp_dir();
    let a = create_test_pdf(temp_dir.path(), "a.pdf", "Alpha", 1);
    let b = create_test_pdf(temp_dir.path(), "b.pdf", "Beta", 2);
    let out_dir = temp_dir.path().join("processed");

    let output = run_cli_command(&[
        "batch",
        path_str(&a),
        path_str(&b),
        "--rotate",
        "180",
        "--compress",
        "low",
        "-o",
        path_str(&out_dir),
        "-j",
        "2",
    ])
    .expect("CLI should run");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let processed = out_dir.join("b_processed.pdf");
    assert_pdf_exists_and_valid(&out_dir.join("a_processed.pdf"));
    assert_eq!(page_rotations(&processed), vec![180, 180]);
}

#[test]
fn test_cli_batch_without_steps_fails() {
    let temp_dir = setup_temp_dir();
    let a = create_test_pdf(temp_dir.path(), "a.pdf", "Alpha", 1);

    let output = run_cli_command(&["batch", path_str(&a)]).expect("CLI should run");
    assert!(!output.status.success());
}

#[test]
fn test_cli_from_images_without_images_fails() {
    let temp_dir = setup_temp_dir();
    let missing = temp_dir.path().join("missing.png");
    let output_path = temp_dir.path().join("album.pdf");

    let output = run_cli_command(&["from-images", path_str(&missing), "-o", path_str(&output_path)])
        .expect("CLI should run");
    assert!(!output.status.success());
}
