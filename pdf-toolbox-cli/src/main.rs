use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pdf_toolbox::batch::{
    run_files, summarize_outcomes, BatchJob, BatchOptions, BatchProcessor, CancelToken,
    FileOutcome, Pipeline, PipelineStep, Progress, ProgressInfo,
};
use pdf_toolbox::convert::{
    images_to_pdf, office_to_pdf, pdf_to_images, pdf_to_word, text_to_pdf, ImagesToPdfOptions,
    OfficeToPdfOptions, PdfToImagesOptions, PdfToWordOptions, TextLayout,
};
use pdf_toolbox::encryption::{decrypt_pdf, encrypt_pdf, EncryptOptions};
use pdf_toolbox::files::{file_size, stem_of};
use pdf_toolbox::ocr::{ocr_pdf, render_reports, save_reports, OcrOptions, OcrReport, TesseractProvider};
use pdf_toolbox::operations::{
    add_annotations, add_fields, add_watermark, apply_bookmarks, apply_header_footer,
    compare_pdfs, compress_pdf, extract_text, fill_form, list_annotations, list_bookmarks,
    list_fields, merge_pdf_files, optimize_pdf, read_metadata, rotate_pdf_pages, sign_pdf,
    split_pdf, write_metadata, AnnotationKind, AnnotationSpec, BookmarkEditor, CompareOptions,
    CompressOptions, ExtractTextOptions, FieldKind, FieldSpec, HeaderFooterOptions, MergeInput,
    MergeOptions, Metadata, OptimizeOptions, RotateOptions, RotationAngle, SignatureKind,
    SignatureOptions, SplitMode, SplitOptions, WatermarkContent, WatermarkOptions,
};
use pdf_toolbox::{document, tools, OutputNaming, PageRange, PageSelection, Rectangle, ToolboxConfig};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "pdftoolbox",
    about = "PDF工具箱: merge, split, convert and edit PDF files",
    version,
    author
)]
struct Cli {
    /// Show debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to $PDFTOOLBOX_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Where multi-file commands write their results
#[derive(Args, Clone, Debug)]
struct OutputArgs {
    /// Directory for the results (default: next to each input)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Text appended to the file name of each result
    #[arg(long)]
    suffix: Option<String>,

    /// Write over the input files
    #[arg(long)]
    overwrite: bool,
}

impl OutputArgs {
    fn naming(&self, default_suffix: &str, config: &ToolboxConfig) -> OutputNaming {
        let suffix = self.suffix.clone().unwrap_or_else(|| default_suffix.to_string());
        let naming = OutputNaming::with_suffix(suffix).overwrite(self.overwrite || config.overwrite);
        match self.output_dir.as_ref().or(config.output_dir.as_ref()) {
            Some(dir) => naming.in_dir(dir),
            None => naming,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Merge multiple PDFs into one
    Merge {
        /// Input PDF files, in order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output file path
        #[arg(short, long, default_value = "merged.pdf")]
        output: PathBuf,

        /// Page ranges for each file (e.g., "1-5,all,2,4-6"); one range applies to every file
        #[arg(short, long)]
        pages: Option<Vec<String>>,

        /// Do not add a bookmark per input file
        #[arg(long)]
        no_bookmarks: bool,

        /// Do not copy the properties of the first file
        #[arg(long)]
        no_metadata: bool,

        /// Password of the input files
        #[arg(long)]
        password: Option<String>,
    },

    /// Split a PDF into multiple files
    Split {
        /// Input PDF file
        input: PathBuf,

        /// every-page, ranges or fixed
        #[arg(short, long, default_value = "every-page")]
        mode: String,

        /// Ranges ("1-3,5,7-9") or pages per file, depending on the mode
        #[arg(short, long)]
        ranges: Option<String>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// File name prefix of the parts
        #[arg(long, default_value = "split_")]
        prefix: String,

        #[arg(long)]
        password: Option<String>,
    },

    /// Reduce the size of PDF files
    Compress {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// low, medium or high (default from the configuration)
        #[arg(short, long)]
        level: Option<String>,

        /// native or ghostscript
        #[arg(short, long, default_value = "native")]
        engine: String,

        /// JPEG quality for recompressed images (1-100)
        #[arg(short, long)]
        quality: Option<u8>,

        #[command(flatten)]
        output: OutputArgs,

        #[arg(long)]
        password: Option<String>,
    },

    /// Password protect PDF files
    Encrypt {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Password required to open the files
        #[arg(short, long)]
        password: String,

        /// Password for changing permissions (defaults to the user password)
        #[arg(long)]
        owner_password: Option<String>,

        /// rc4-40, rc4-128, aes-128 or aes-256
        #[arg(short, long, default_value = "aes-256")]
        algorithm: String,

        /// Forbid printing
        #[arg(long)]
        no_print: bool,

        /// Forbid copying text and graphics
        #[arg(long)]
        no_copy: bool,

        /// Allow modifying the content
        #[arg(long)]
        allow_modify: bool,

        /// Forbid adding annotations
        #[arg(long)]
        no_annotate: bool,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Remove password protection
    Decrypt {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[arg(short, long)]
        password: String,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Convert PDF files to Word documents
    ToWord {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// native or libreoffice
        #[arg(short, long, default_value = "native")]
        engine: String,

        /// Page range, e.g. "1-3"
        #[arg(short, long, default_value = "all")]
        pages: String,

        #[command(flatten)]
        output: OutputArgs,

        #[arg(long)]
        password: Option<String>,
    },

    /// Export the images embedded in PDF pages
    ToImages {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long, default_value = "images")]
        output_dir: PathBuf,

        /// png, jpg, bmp or tiff
        #[arg(short, long, default_value = "png")]
        format: String,

        #[arg(long, default_value = "page_")]
        prefix: String,

        /// Page range, e.g. "1-3" (default: all)
        #[arg(short, long)]
        pages: Option<String>,

        /// Put the images of every PDF in one folder
        #[arg(long)]
        single_folder: bool,

        #[arg(long)]
        password: Option<String>,
    },

    /// Combine images into one PDF, one image per page
    FromImages {
        #[arg(required = true)]
        images: Vec<PathBuf>,

        #[arg(short, long, default_value = "images.pdf")]
        output: PathBuf,

        /// a4, a3, letter or legal
        #[arg(long, default_value = "a4")]
        page_size: String,

        /// portrait or landscape
        #[arg(long, default_value = "portrait")]
        orientation: String,

        /// JPEG quality; 100 keeps images lossless
        #[arg(short, long, default_value_t = 90)]
        quality: u8,
    },

    /// Extract the text of PDF files
    ToText {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Page range, e.g. "1-3,5"
        #[arg(short, long, default_value = "all")]
        pages: String,

        /// Keep whitespace as extracted
        #[arg(long)]
        preserve_layout: bool,

        /// Output directory (default: next to each input)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        #[arg(long)]
        password: Option<String>,
    },

    /// Convert Word, Excel and PowerPoint files to PDF
    OfficeToPdf {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output directory (default: next to each input)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Export comments
        #[arg(long)]
        include_comments: bool,

        /// Keep tracked changes
        #[arg(long)]
        include_tracked_changes: bool,

        /// Fail instead of using the built-in .docx converter
        #[arg(long)]
        no_fallback: bool,
    },

    /// Add a text or image watermark
    Watermark {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Watermark text
        #[arg(short, long, conflicts_with = "image")]
        text: Option<String>,

        /// Watermark image
        #[arg(short, long)]
        image: Option<PathBuf>,

        #[arg(long, default_value_t = 36.0)]
        font_size: f64,

        /// Named colour or #rrggbb
        #[arg(long, default_value = "gray")]
        color: String,

        /// Counter-clockwise, in degrees
        #[arg(long, default_value_t = 45.0, allow_hyphen_values = true)]
        rotation: f64,

        /// Image width as a fraction of the page width
        #[arg(long, default_value_t = 0.3)]
        scale: f64,

        /// Opacity in percent
        #[arg(long, default_value_t = 50)]
        opacity: u8,

        /// center, top-left, top-right, bottom-left, bottom-right or tile
        #[arg(long, default_value = "center")]
        position: String,

        /// all, odd, even or a page range
        #[arg(short, long, default_value = "all")]
        pages: String,

        #[command(flatten)]
        output: OutputArgs,

        #[arg(long)]
        password: Option<String>,
    },

    /// Rotate pages in a PDF
    Rotate {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Rotation angle (90, 180, 270, or -90)
        #[arg(short, long, default_value_t = 90, allow_hyphen_values = true)]
        angle: i32,

        /// all, odd, even or a page range
        #[arg(short, long, default_value = "all")]
        pages: String,

        #[command(flatten)]
        output: OutputArgs,

        #[arg(long)]
        password: Option<String>,
    },

    /// Add headers, footers and page numbers
    HeaderFooter {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Header text; {page} and {total} are expanded
        #[arg(long, default_value = "")]
        header: String,

        /// Footer text; {page} and {total} are expanded
        #[arg(long, default_value = "")]
        footer: String,

        /// Page number format, empty for none
        #[arg(long, default_value = "{page}")]
        page_format: String,

        #[arg(long, default_value_t = 10.0)]
        font_size: f64,

        /// left, center or right
        #[arg(long, default_value = "center")]
        header_align: String,

        /// left, center or right
        #[arg(long, default_value = "center")]
        footer_align: String,

        /// all, odd, even, first, except-first or a page range
        #[arg(short, long, default_value = "all")]
        pages: String,

        /// Distance from the page edge in points
        #[arg(long, default_value_t = 36.0)]
        margin: f64,

        #[command(flatten)]
        output: OutputArgs,

        #[arg(long)]
        password: Option<String>,
    },

    /// List or rewrite the document outline
    Bookmarks {
        #[command(subcommand)]
        action: BookmarkCommands,
    },

    /// List or add annotations
    Annotate {
        #[command(subcommand)]
        action: AnnotateCommands,
    },

    /// List, fill or create form fields
    Form {
        #[command(subcommand)]
        action: FormCommands,
    },

    /// Compare two PDF files
    Compare {
        first: PathBuf,
        second: PathBuf,

        /// Skip the page count
        #[arg(long)]
        no_pages: bool,

        /// Skip the document properties
        #[arg(long)]
        no_metadata: bool,

        /// Skip the page text
        #[arg(long)]
        no_text: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        #[arg(long)]
        first_password: Option<String>,

        #[arg(long)]
        second_password: Option<String>,
    },

    /// Recognise the text of scanned PDF files
    Ocr {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Tesseract language, e.g. chi_sim, chi_tra or eng
        #[arg(short, long)]
        language: Option<String>,

        /// Page range, e.g. "1-3"
        #[arg(short, long, default_value = "all")]
        pages: String,

        /// Save the recognised text to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long)]
        password: Option<String>,
    },

    /// Apply several operations to many files
    Batch {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Compress with this level
        #[arg(long)]
        compress: Option<String>,

        /// Encrypt with this password
        #[arg(long)]
        encrypt: Option<String>,

        /// Owner password used with --encrypt
        #[arg(long)]
        owner_password: Option<String>,

        /// Decrypt with this password
        #[arg(long)]
        decrypt: Option<String>,

        /// Rotate every page by this angle
        #[arg(long, allow_hyphen_values = true)]
        rotate: Option<i32>,

        /// Add a text watermark
        #[arg(long, num_args = 0..=1, default_missing_value = "")]
        watermark: Option<String>,

        /// Header text
        #[arg(long)]
        header: Option<String>,

        /// Footer text
        #[arg(long)]
        footer: Option<String>,

        /// Output directory
        #[arg(short, long, default_value = "processed")]
        output_dir: PathBuf,

        /// Worker threads (default from the configuration)
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Cancel the remaining files after the first failure
        #[arg(long)]
        stop_on_error: bool,
    },

    /// Clean up and shrink the document structure
    Optimize {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// low, medium or high
        #[arg(short, long, default_value = "medium")]
        level: String,

        #[command(flatten)]
        output: OutputArgs,

        #[arg(long)]
        password: Option<String>,
    },

    /// Place a visual signature on a page
    Sign {
        input: PathBuf,

        /// Output file (default: <stem>_signed.pdf)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Signature text
        #[arg(short, long, conflicts_with = "image")]
        text: Option<String>,

        /// Signature image
        #[arg(short, long)]
        image: Option<PathBuf>,

        #[arg(long, default_value_t = 20.0)]
        font_size: f64,

        /// Image width in points
        #[arg(long, default_value_t = 150.0)]
        width: f64,

        #[arg(short, long, default_value_t = 1)]
        page: usize,

        #[arg(short, long, default_value_t = 100.0)]
        x: f64,

        #[arg(short, long, default_value_t = 100.0)]
        y: f64,

        #[arg(long, default_value = "black")]
        color: String,

        #[arg(long)]
        password: Option<String>,
    },

    /// Show or edit document properties
    Metadata {
        #[command(subcommand)]
        action: MetadataCommands,
    },

    /// List the available tools
    Tools,

    /// Show information about a PDF file
    Info {
        input: PathBuf,

        #[arg(long)]
        json: bool,

        #[arg(long)]
        password: Option<String>,
    },

    /// Create a simple PDF with text
    Create {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Text to include in the PDF
        #[arg(short, long)]
        text: String,

        /// Document title
        #[arg(long)]
        title: Option<String>,
    },
}

#[derive(Subcommand)]
enum BookmarkCommands {
    /// Print the outline
    List {
        input: PathBuf,

        #[arg(long)]
        json: bool,

        #[arg(long)]
        password: Option<String>,
    },

    /// Replace the outline
    Apply {
        input: PathBuf,

        /// Output file (default: <stem>_with_bookmarks.pdf)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Bookmark as PAGE=TITLE, repeatable
        #[arg(short, long = "add")]
        add: Vec<String>,

        /// Remove the existing bookmark at this 0-based index, repeatable
        #[arg(long)]
        remove: Vec<usize>,

        /// Start from the existing outline instead of an empty one
        #[arg(short, long)]
        keep: bool,

        #[arg(long)]
        password: Option<String>,
    },
}

#[derive(Subcommand)]
enum AnnotateCommands {
    /// Print the existing annotations
    List {
        input: PathBuf,

        #[arg(long)]
        json: bool,

        #[arg(long)]
        password: Option<String>,
    },

    /// Add an annotation
    Add {
        input: PathBuf,

        /// Output file (default: <stem>_with_annotations.pdf)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// highlight, underline, strikeout, note, freetext or square
        #[arg(short, long, default_value = "highlight")]
        kind: String,

        #[arg(short, long, default_value_t = 1)]
        page: usize,

        /// Annotation text
        #[arg(short, long, default_value = "")]
        text: String,

        /// Named colour or #rrggbb
        #[arg(short, long, default_value = "yellow")]
        color: String,

        /// Rectangle as x1,y1,x2,y2 (default: a band near the top of the page)
        #[arg(short, long)]
        rect: Option<String>,

        /// JSON file with a list of annotations, used instead of the flags
        #[arg(long)]
        from: Option<PathBuf>,

        #[arg(long)]
        password: Option<String>,
    },
}

#[derive(Subcommand)]
enum FormCommands {
    /// Print the form fields
    List {
        input: PathBuf,

        #[arg(long)]
        json: bool,

        #[arg(long)]
        password: Option<String>,
    },

    /// Set field values
    Fill {
        input: PathBuf,

        /// Output file (default: <stem>_filled_form.pdf)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Value as NAME=VALUE, repeatable
        #[arg(short, long = "set", required = true)]
        set: Vec<String>,

        #[arg(long)]
        password: Option<String>,
    },

    /// Create a new field
    Add {
        input: PathBuf,

        /// Output file (default: <stem>_filled_form.pdf)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Field name
        #[arg(short, long)]
        name: String,

        /// text or checkbox
        #[arg(short, long, default_value = "text")]
        kind: String,

        #[arg(short, long, default_value_t = 1)]
        page: usize,

        /// Rectangle as x1,y1,x2,y2
        #[arg(short, long)]
        rect: String,

        /// Initial value
        #[arg(long, default_value = "")]
        value: String,

        #[arg(long)]
        password: Option<String>,
    },
}

#[derive(Subcommand)]
enum MetadataCommands {
    /// Print the document properties
    Show {
        input: PathBuf,

        #[arg(long)]
        json: bool,

        #[arg(long)]
        password: Option<String>,
    },

    /// Change document properties
    Set {
        input: PathBuf,

        /// Output file (default: <stem>_metadata_edited.pdf)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        author: Option<String>,

        #[arg(long)]
        subject: Option<String>,

        #[arg(long)]
        keywords: Option<String>,

        #[arg(long)]
        creator: Option<String>,

        #[arg(long)]
        producer: Option<String>,

        /// Drop the properties not given on the command line
        #[arg(long)]
        clear: bool,

        #[arg(long)]
        password: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = ToolboxConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    debug!("Configuration: {:?}", config);

    match cli.command {
        Commands::Merge {
            files,
            output,
            pages,
            no_bookmarks,
            no_metadata,
            password,
        } => {
            let ranges = pages.unwrap_or_default();
            let inputs = files
                .iter()
                .enumerate()
                .map(|(idx, file)| -> Result<MergeInput> {
                    let spec = if ranges.len() == 1 { ranges.first() } else { ranges.get(idx) };
                    match spec {
                        Some(spec) => Ok(MergeInput::with_pages(
                            file,
                            PageRange::parse(spec).with_context(|| format!("Invalid page range '{spec}'"))?,
                        )),
                        None => Ok(MergeInput::new(file)),
                    }
                })
                .collect::<Result<Vec<_>>>()?;

            let options = MergeOptions {
                add_bookmarks: !no_bookmarks,
                preserve_metadata: !no_metadata,
                password,
            };
            let pages = merge_pdf_files(inputs, &output, options).context("Failed to merge PDFs")?;
            println!("✓ Merged {} files ({} pages) into {}", files.len(), pages, output.display());
        }

        Commands::Split {
            input,
            mode,
            ranges,
            output_dir,
            prefix,
            password,
        } => {
            let options = SplitOptions {
                mode: SplitMode::parse(&mode, ranges.as_deref())?,
                output_dir: Some(output_dir),
                prefix,
                password,
            };
            let parts = split_pdf(&input, options)
                .with_context(|| format!("Failed to split {}", input.display()))?;
            for part in &parts {
                println!("  {}", part.display());
            }
            println!("✓ Split {} into {} files", input.display(), parts.len());
        }

        Commands::Compress {
            files,
            level,
            engine,
            quality,
            output,
            password,
        } => {
            let options = CompressOptions {
                level: match level {
                    Some(level) => level.parse()?,
                    None => config.compression_level,
                },
                engine: engine.parse()?,
                image_quality: quality,
                tools: config.external_tools(),
                password,
            };
            let naming = output.naming(pdf_toolbox::operations::compress::DEFAULT_SUFFIX, &config);
            process_files(&files, |input| {
                let target = naming.output_for(input);
                let result = compress_pdf(input, &target, &options)?;
                Ok(FileOutcome::success(input, &target)
                    .with_sizes(result.original_size, result.compressed_size))
            })?;
        }

        Commands::Encrypt {
            files,
            password,
            owner_password,
            algorithm,
            no_print,
            no_copy,
            allow_modify,
            no_annotate,
            output,
        } => {
            let mut options = EncryptOptions::new(password);
            options.owner_password = owner_password.unwrap_or_default();
            options.algorithm = algorithm.parse()?;
            options.permissions.allow_printing = !no_print;
            options.permissions.allow_copying = !no_copy;
            options.permissions.allow_modification = allow_modify;
            options.permissions.allow_annotations = !no_annotate;
            options.validate()?;

            let naming = output.naming("_encrypted", &config);
            process_files(&files, |input| {
                let target = naming.output_for(input);
                encrypt_pdf(input, &target, &options)?;
                Ok(FileOutcome::success(input, &target))
            })?;
        }

        Commands::Decrypt {
            files,
            password,
            output,
        } => {
            if password.is_empty() {
                bail!("Password must not be empty");
            }
            let naming = output.naming("_decrypted", &config);
            process_files(&files, |input| {
                let target = naming.output_for(input);
                decrypt_pdf(input, &target, &password)?;
                Ok(FileOutcome::success(input, &target))
            })?;
        }

        Commands::ToWord {
            files,
            engine,
            pages,
            output,
            password,
        } => {
            let options = PdfToWordOptions {
                engine: engine.parse()?,
                pages: PageRange::parse(&pages)?,
                password,
                tools: config.external_tools(),
            };
            let naming = output
                .naming(pdf_toolbox::convert::word::DEFAULT_SUFFIX, &config)
                .with_extension("docx");
            process_files(&files, |input| {
                let target = naming.output_for(input);
                let converted = pdf_to_word(input, &target, &options)?;
                Ok(FileOutcome::success(input, &converted.output).with_message(format!(
                    "({} pages, {} paragraphs)",
                    converted.pages, converted.paragraphs
                )))
            })?;
        }

        Commands::ToImages {
            files,
            output_dir,
            format,
            prefix,
            pages,
            single_folder,
            password,
        } => {
            let options = PdfToImagesOptions {
                format: format.parse()?,
                prefix,
                pages: pages.as_deref().map(PageRange::parse).transpose()?,
                single_folder,
                password,
            };
            process_files(&files, |input| {
                let written = pdf_to_images(input, &output_dir, &options)?;
                let folder = written
                    .first()
                    .and_then(|p| p.parent())
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| output_dir.clone());
                Ok(FileOutcome::success(input, folder)
                    .with_message(format!("({} images)", written.len())))
            })?;
        }

        Commands::FromImages {
            images,
            output,
            page_size,
            orientation,
            quality,
        } => {
            let options = ImagesToPdfOptions {
                page_size: page_size.parse()?,
                orientation: orientation.parse()?,
                image_quality: quality,
            };
            let report = images_to_pdf(&images, &output, &options).context("Failed to create PDF from images")?;
            for (path, error) in &report.failures {
                eprintln!("✗ {}: {}", path.display(), error);
            }
            println!("✓ Created {} with {} pages", output.display(), report.pages);
        }

        Commands::ToText {
            files,
            pages,
            preserve_layout,
            output_dir,
            password,
        } => {
            let options = ExtractTextOptions {
                pages,
                preserve_layout,
                password,
            };
            let output_dir = output_dir.or_else(|| config.output_dir.clone());
            process_files(&files, |input| {
                let target = output_dir
                    .as_ref()
                    .map(|dir| dir.join(format!("{}.txt", stem_of(input))));
                let written = extract_text(input, target.as_deref(), &options)?;
                Ok(FileOutcome::success(input, written))
            })?;
        }

        Commands::OfficeToPdf {
            files,
            output_dir,
            include_comments,
            include_tracked_changes,
            no_fallback,
        } => {
            let options = OfficeToPdfOptions {
                include_comments,
                include_tracked_changes,
                output_dir: output_dir.or_else(|| config.output_dir.clone()),
                tools: config.external_tools(),
                allow_fallback: !no_fallback,
            };
            process_files(&files, |input| {
                let converted = office_to_pdf(input, &options)?;
                Ok(FileOutcome::success(input, &converted.output)
                    .with_message(format!("({:?})", converted.engine)))
            })?;
        }

        Commands::Watermark {
            files,
            text,
            image,
            font_size,
            color,
            rotation,
            scale,
            opacity,
            position,
            pages,
            output,
            password,
        } => {
            let content = match image {
                Some(path) => WatermarkContent::Image { path, scale },
                None => WatermarkContent::Text {
                    text: text.unwrap_or_else(|| " confidential ".to_string()),
                    font_size,
                    color: color.parse()?,
                    rotation,
                },
            };
            let options = WatermarkOptions {
                content,
                opacity: opacity.min(100),
                position: position.parse()?,
                pages: PageSelection::parse(&pages)?,
                password,
            };
            let naming = output.naming(pdf_toolbox::operations::watermark::DEFAULT_SUFFIX, &config);
            process_files(&files, |input| {
                let target = naming.output_for(input);
                let stamped = add_watermark(input, &target, &options)?;
                Ok(FileOutcome::success(input, &target).with_message(format!("({stamped} pages)")))
            })?;
        }

        Commands::Rotate {
            files,
            angle,
            pages,
            output,
            password,
        } => {
            let options = RotateOptions {
                angle: RotationAngle::from_degrees(angle)?,
                password,
                ..Default::default()
            }
            .with_pages(&pages);
            let naming = output.naming(pdf_toolbox::operations::rotate::DEFAULT_SUFFIX, &config);
            process_files(&files, |input| {
                let target = naming.output_for(input);
                let rotated = rotate_pdf_pages(input, &target, &options)?;
                Ok(FileOutcome::success(input, &target).with_message(format!("({rotated} pages)")))
            })?;
        }

        Commands::HeaderFooter {
            files,
            header,
            footer,
            page_format,
            font_size,
            header_align,
            footer_align,
            pages,
            margin,
            output,
            password,
        } => {
            let options = HeaderFooterOptions {
                header,
                footer,
                header_size: font_size,
                footer_size: font_size,
                header_alignment: header_align.parse()?,
                footer_alignment: footer_align.parse()?,
                page_number_format: page_format,
                pages: PageSelection::parse(&pages)?,
                margin,
                password,
                ..Default::default()
            };
            let naming =
                output.naming(pdf_toolbox::operations::header_footer::DEFAULT_SUFFIX, &config);
            process_files(&files, |input| {
                let target = naming.output_for(input);
                apply_header_footer(input, &target, &options)?;
                Ok(FileOutcome::success(input, &target))
            })?;
        }

        Commands::Bookmarks { action } => match action {
            BookmarkCommands::List {
                input,
                json,
                password,
            } => {
                let entries = list_bookmarks(&input, password.as_deref())
                    .with_context(|| format!("Failed to read bookmarks of {}", input.display()))?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&entries)?);
                } else if entries.is_empty() {
                    println!("No bookmarks");
                } else {
                    for entry in &entries {
                        println!("{}{} (页 {})", "  ".repeat(entry.level), entry.title, entry.page);
                    }
                }
            }
            BookmarkCommands::Apply {
                input,
                output,
                add,
                remove,
                keep,
                password,
            } => {
                let mut editor = if keep {
                    BookmarkEditor::load(&input, password.as_deref())?
                } else {
                    BookmarkEditor::new()
                };
                let mut indices = remove;
                indices.sort_unstable();
                for index in indices.into_iter().rev() {
                    if editor.delete(index).is_none() {
                        bail!("No bookmark at index {index}");
                    }
                }
                for spec in &add {
                    let (page, title) = spec
                        .split_once('=')
                        .with_context(|| format!("Bookmark '{spec}' is not PAGE=TITLE"))?;
                    let page: usize = page
                        .trim()
                        .parse()
                        .with_context(|| format!("Invalid page number in '{spec}'"))?;
                    editor.add(title, page)?;
                }

                let output = output.unwrap_or_else(|| sibling(&input, "_with_bookmarks"));
                apply_bookmarks(&input, &output, editor.entries(), password.as_deref())
                    .with_context(|| format!("Failed to write bookmarks to {}", output.display()))?;
                for line in editor.display_lines() {
                    println!("  {line}");
                }
                println!("✓ Saved {} bookmarks to {}", editor.entries().len(), output.display());
            }
        },

        Commands::Annotate { action } => match action {
            AnnotateCommands::List {
                input,
                json,
                password,
            } => {
                let annotations = list_annotations(&input, password.as_deref())
                    .with_context(|| format!("Failed to read annotations of {}", input.display()))?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&annotations)?);
                } else if annotations.is_empty() {
                    println!("No annotations");
                } else {
                    for annotation in &annotations {
                        println!(
                            "Page {}: {} {}",
                            annotation.page,
                            annotation.subtype,
                            annotation.contents.as_deref().unwrap_or("")
                        );
                    }
                }
            }
            AnnotateCommands::Add {
                input,
                output,
                kind,
                page,
                text,
                color,
                rect,
                from,
                password,
            } => {
                let specs: Vec<AnnotationSpec> = match from {
                    Some(path) => {
                        let json = std::fs::read_to_string(&path)
                            .with_context(|| format!("Failed to read {}", path.display()))?;
                        serde_json::from_str(&json)
                            .with_context(|| format!("Invalid annotation list in {}", path.display()))?
                    }
                    None => {
                        let kind: AnnotationKind = kind.parse()?;
                        let mut spec = AnnotationSpec::new(kind, page).with_text(text).with_color(color);
                        if let Some(rect) = rect {
                            spec = spec.with_rect(parse_rect(&rect)?);
                        }
                        vec![spec]
                    }
                };

                let output = output.unwrap_or_else(|| {
                    sibling(&input, pdf_toolbox::operations::annotations::DEFAULT_SUFFIX)
                });
                let summary = add_annotations(&input, &output, &specs, password.as_deref())
                    .with_context(|| format!("Failed to annotate {}", input.display()))?;
                println!("✓ Added {} annotations to {}", specs.len(), output.display());
                println!("  Summary: {}", summary.display());
            }
        },

        Commands::Form { action } => match action {
            FormCommands::List {
                input,
                json,
                password,
            } => {
                let fields = list_fields(&input, password.as_deref())
                    .with_context(|| format!("Failed to read form fields of {}", input.display()))?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&fields)?);
                } else {
                    print!("{}", pdf_toolbox::operations::forms::field_summary(&fields));
                }
            }
            FormCommands::Fill {
                input,
                output,
                set,
                password,
            } => {
                let values = set
                    .iter()
                    .map(|pair| {
                        pair.split_once('=')
                            .map(|(name, value)| (name.trim().to_string(), value.to_string()))
                            .with_context(|| format!("Field value '{pair}' is not NAME=VALUE"))
                    })
                    .collect::<Result<BTreeMap<_, _>>>()?;

                let output = output
                    .unwrap_or_else(|| sibling(&input, pdf_toolbox::operations::forms::DEFAULT_SUFFIX));
                let report = fill_form(&input, &output, &values, password.as_deref())
                    .with_context(|| format!("Failed to fill {}", input.display()))?;
                for name in &report.unknown {
                    eprintln!("Warning: no field named '{name}'");
                }
                println!("✓ Filled {} fields into {}", report.filled.len(), output.display());
            }
            FormCommands::Add {
                input,
                output,
                name,
                kind,
                page,
                rect,
                value,
                password,
            } => {
                let rect = parse_rect(&rect)?;
                let spec = match kind.parse::<FieldKind>()? {
                    FieldKind::Text => FieldSpec::text(&name, page, rect),
                    FieldKind::Checkbox => FieldSpec::checkbox(&name, page, rect),
                    other => bail!("Cannot create {other} fields, use text or checkbox"),
                }
                .with_value(value);

                let output = output
                    .unwrap_or_else(|| sibling(&input, pdf_toolbox::operations::forms::DEFAULT_SUFFIX));
                add_fields(&input, &output, &[spec], password.as_deref())
                    .with_context(|| format!("Failed to add field '{name}'"))?;
                println!("✓ Added field '{}' to {}", name, output.display());
            }
        },

        Commands::Compare {
            first,
            second,
            no_pages,
            no_metadata,
            no_text,
            json,
            first_password,
            second_password,
        } => {
            let options = CompareOptions {
                compare_pages: !no_pages,
                compare_metadata: !no_metadata,
                compare_text: !no_text,
            };
            let report = compare_pdfs(
                &first,
                &second,
                options,
                (first_password.as_deref(), second_password.as_deref()),
            )
            .context("Failed to compare PDFs")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{report}");
            }
        }

        Commands::Ocr {
            files,
            language,
            pages,
            output,
            password,
        } => {
            let provider = TesseractProvider::new(config.external_tools().tesseract);
            let options = OcrOptions {
                language: language.unwrap_or_else(|| config.ocr_language.clone()),
                pages: PageRange::parse(&pages)?,
                password,
            };

            let bar = progress_bar(files.len());
            let mut reports = Vec::with_capacity(files.len());
            for file in &files {
                bar.set_message(display_name(file));
                let report = ocr_pdf(file, &provider, &options)
                    .unwrap_or_else(|e| OcrReport::failed(file, &e));
                reports.push(report);
                bar.inc(1);
            }
            bar.finish_and_clear();

            match output {
                Some(path) => {
                    save_reports(&reports, &path)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("✓ Saved OCR text to {}", path.display());
                }
                None => print!("{}", render_reports(&reports)),
            }
            let failed = reports.iter().filter(|r| r.error.is_some()).count();
            if failed > 0 {
                bail!("{failed} of {} files failed", reports.len());
            }
        }

        Commands::Batch {
            files,
            compress,
            encrypt,
            owner_password,
            decrypt,
            rotate,
            watermark,
            header,
            footer,
            output_dir,
            jobs,
            stop_on_error,
        } => {
            let mut steps = Vec::new();
            if let Some(password) = decrypt {
                steps.push(PipelineStep::Decrypt { password });
            }
            if let Some(angle) = rotate {
                steps.push(PipelineStep::Rotate(RotationAngle::from_degrees(angle)?));
            }
            if let Some(text) = watermark {
                steps.push(PipelineStep::Watermark(text));
            }
            if header.is_some() || footer.is_some() {
                steps.push(PipelineStep::HeaderFooter {
                    header: header.unwrap_or_default(),
                    footer: footer.unwrap_or_default(),
                });
            }
            if let Some(level) = compress {
                steps.push(PipelineStep::Compress(level.parse()?));
            }
            if let Some(user_password) = encrypt {
                steps.push(PipelineStep::Encrypt {
                    owner_password: owner_password.unwrap_or_default(),
                    user_password,
                });
            }

            let pipeline = Pipeline::new(steps, &output_dir)?;
            let plan: Vec<String> = pipeline.steps().iter().map(ToString::to_string).collect();
            println!("Steps: {}", plan.join(" → "));

            let bar = progress_bar(files.len());
            let progress = bar.clone();
            let options = BatchOptions::default()
                .with_parallelism(jobs.unwrap_or(config.parallelism))
                .stop_on_error(stop_on_error)
                .with_progress_callback(move |info: &ProgressInfo| {
                    progress.set_position(info.processed() as u64);
                    progress.set_message(info.format_progress());
                });

            let pipeline = std::sync::Arc::new(pipeline);
            let mut processor = BatchProcessor::new(options);
            processor.add_jobs(files.iter().map(|file| BatchJob::Pipeline {
                input: file.clone(),
                pipeline: std::sync::Arc::clone(&pipeline),
            }));
            let summary = processor.execute()?;
            bar.finish_and_clear();

            println!("{}", summary.format_report());
            if summary.failed > 0 {
                bail!("{} of {} files failed", summary.failed, summary.total_jobs);
            }
        }

        Commands::Optimize {
            files,
            level,
            output,
            password,
        } => {
            let options = OptimizeOptions {
                level: level.parse()?,
                password,
            };
            let naming = output.naming(pdf_toolbox::operations::optimize::DEFAULT_SUFFIX, &config);
            process_files(&files, |input| {
                let target = naming.output_for(input);
                let report = optimize_pdf(input, &target, &options)?;
                debug!("{}", report);
                Ok(FileOutcome::success(input, &target)
                    .with_sizes(report.original_size, report.optimized_size))
            })?;
        }

        Commands::Sign {
            input,
            output,
            text,
            image,
            font_size,
            width,
            page,
            x,
            y,
            color,
            password,
        } => {
            let kind = match (image, text) {
                (Some(path), _) => SignatureKind::Image { path, width },
                (None, Some(text)) => SignatureKind::Text { text, font_size },
                (None, None) => bail!("Give the signature --text or --image"),
            };
            let options = SignatureOptions {
                kind,
                page,
                x,
                y,
                color: color.parse()?,
                password,
            };
            let output = output
                .unwrap_or_else(|| sibling(&input, pdf_toolbox::operations::signature::DEFAULT_SUFFIX));
            let info = sign_pdf(&input, &output, &options)
                .with_context(|| format!("Failed to sign {}", input.display()))?;
            println!("✓ Signed page {} of {} into {}", page, input.display(), output.display());
            println!("  Details: {}", info.display());
        }

        Commands::Metadata { action } => match action {
            MetadataCommands::Show {
                input,
                json,
                password,
            } => {
                let metadata = read_metadata(&input, password.as_deref())
                    .with_context(|| format!("Failed to read metadata of {}", input.display()))?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&metadata)?);
                } else {
                    print!("{metadata}");
                }
            }
            MetadataCommands::Set {
                input,
                output,
                title,
                author,
                subject,
                keywords,
                creator,
                producer,
                clear,
                password,
            } => {
                let current = if clear {
                    Metadata::default()
                } else {
                    read_metadata(&input, password.as_deref())?
                };
                let metadata = Metadata {
                    title: title.or(current.title),
                    author: author.or(current.author),
                    subject: subject.or(current.subject),
                    keywords: keywords.or(current.keywords),
                    creator: creator.or(current.creator),
                    producer: producer.or(current.producer),
                    creation_date: current.creation_date,
                    mod_date: None,
                };
                let output = output
                    .unwrap_or_else(|| sibling(&input, pdf_toolbox::operations::metadata::DEFAULT_SUFFIX));
                write_metadata(&input, &output, &metadata, password.as_deref())
                    .with_context(|| format!("Failed to write metadata to {}", output.display()))?;
                println!("✓ Saved metadata to {}", output.display());
            }
        },

        Commands::Tools => {
            print!("{}", tools::render_menu());
        }

        Commands::Info {
            input,
            json,
            password,
        } => {
            let info = document::document_info(&input, password.as_deref())
                .with_context(|| format!("Failed to read {}", input.display()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("PDF Information for: {}", input.display());
                println!("==========================================");
                println!("File size: {}", pdf_toolbox::files::format_file_size(info.file_size));
                println!("Pages: {}", info.pages);
                println!("PDF Version: {}", info.version);
                println!("Encrypted: {}", if info.encrypted { "yes" } else { "no" });
                if let Some(title) = &info.title {
                    println!("Title: {title}");
                }
                if let Some(author) = &info.author {
                    println!("Author: {author}");
                }
            }
        }

        Commands::Create {
            output,
            text,
            title,
        } => {
            text_to_pdf(&text, &output, &TextLayout::default(), title.as_deref())
                .with_context(|| format!("Failed to create {}", output.display()))?;
            println!("PDF created successfully!");
            println!("Output: {} ({} bytes)", output.display(), file_size(&output));
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn progress_bar(len: usize) -> ProgressBar {
    let bar = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}") {
        bar.set_style(style.progress_chars("=> "));
    }
    bar
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// `<dir>/<stem><suffix>.pdf` next to `input`
fn sibling(input: &Path, suffix: &str) -> PathBuf {
    OutputNaming::with_suffix(suffix)
        .with_extension("pdf")
        .output_for(input)
}

fn parse_rect(spec: &str) -> Result<Rectangle> {
    let values = spec
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("Invalid rectangle '{spec}'"))?;
    match <[f64; 4]>::try_from(values) {
        Ok(values) => Ok(Rectangle::from_array(values)),
        Err(_) => bail!("Rectangle '{spec}' needs four numbers: x1,y1,x2,y2"),
    }
}

/// Run `f` over `files` with a progress bar and print the outcome of each.
/// Fails when any file failed.
fn process_files<F>(files: &[PathBuf], f: F) -> Result<()>
where
    F: FnMut(&PathBuf) -> pdf_toolbox::Result<FileOutcome>,
{
    let bar = progress_bar(files.len());
    let outcomes = run_files(
        files,
        &CancelToken::new(),
        |progress: &Progress| {
            bar.set_position(progress.current as u64);
            if let Some(file) = &progress.file {
                bar.set_message(display_name(file));
            }
        },
        f,
    );
    bar.finish_and_clear();

    for outcome in outcomes.iter().filter(|o| o.success) {
        println!("{outcome}");
    }
    println!("{}", summarize_outcomes(&outcomes));

    let failed = outcomes.iter().filter(|o| !o.success).count();
    if failed > 0 {
        bail!("{failed} of {} files failed", outcomes.len());
    }
    Ok(())
}
