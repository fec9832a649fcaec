use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use pdf_toolbox::document;
use pdf_toolbox::encryption::{decrypt_pdf, encrypt_pdf, EncryptOptions};
use pdf_toolbox::files::stem_of;
use pdf_toolbox::operations::{
    compare_pdfs, compress_pdf, merge_pdf_files, read_metadata, rotate_pdf_pages, split_pdf,
    write_metadata, CompareOptions, ComparisonReport, CompressOptions, ExtractTextOptions,
    MergeInput, MergeOptions, Metadata, RotateOptions, RotationAngle, SplitMode, SplitOptions,
};
use pdf_toolbox::{PageRange, ToolCategory, ToolId, ToolboxConfig};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::AppError;

/// Largest accepted request body
pub const MAX_UPLOAD_SIZE: usize = 100 * 1024 * 1024;

type AppState = Arc<ToolboxConfig>;

/// Build the application router with the configuration from the environment
pub fn app() -> Router {
    let config = ToolboxConfig::load(None).unwrap_or_else(|e| {
        warn!("Ignoring configuration: {}", e);
        ToolboxConfig::default()
    });
    app_with_config(config)
}

/// Build the application router with all routes configured
pub fn app_with_config(config: ToolboxConfig) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/tools", get(list_tools))
        .route("/api/merge", post(merge_handler))
        .route("/api/split", post(split_handler))
        .route("/api/compress", post(compress_handler))
        .route("/api/encrypt", post(encrypt_handler))
        .route("/api/decrypt", post(decrypt_handler))
        .route("/api/rotate", post(rotate_handler))
        .route("/api/extract-text", post(extract_text_handler))
        .route("/api/metadata", post(metadata_handler))
        .route("/api/compare", post(compare_handler))
        .with_state(Arc::new(config))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// One uploaded file
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// File name without directories
    pub name: String,
    pub data: Bytes,
}

/// Files and options of a multipart request
///
/// Files come in `file` or `files` fields, options as JSON in `options`.
#[derive(Debug, Default)]
pub struct Upload {
    pub files: Vec<UploadedFile>,
    pub options: Option<String>,
}

impl Upload {
    pub async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut upload = Upload::default();

        while let Some(field) = multipart.next_field().await? {
            let field_name = field.name().unwrap_or("").to_string();
            match field_name.as_str() {
                "file" | "files" | "files[]" => {
                    let name = field
                        .file_name()
                        .and_then(safe_file_name)
                        .unwrap_or_else(|| format!("upload{}.pdf", upload.files.len() + 1));
                    let data = field.bytes().await?;
                    upload.files.push(UploadedFile { name, data });
                }
                "options" => upload.options = Some(field.text().await?),
                other => debug!("Ignoring multipart field '{}'", other),
            }
        }

        Ok(upload)
    }

    /// Parse the `options` field; defaults when it is absent or blank
    pub fn options<T: DeserializeOwned + Default>(&self) -> Result<T, AppError> {
        match self.options.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(json) => Ok(serde_json::from_str(json)?),
            None => Ok(T::default()),
        }
    }

    fn require_files(&self, count: usize, what: &str) -> Result<(), AppError> {
        match self.files.len() {
            0 => Err(AppError::BadRequest("No file provided in upload".to_string())),
            n if n < count => Err(AppError::BadRequest(format!(
                "At least {count} PDF files are required for {what}"
            ))),
            _ => Ok(()),
        }
    }
}

/// Last path component of an uploaded file name, if it has one
fn safe_file_name(name: &str) -> Option<String> {
    Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().replace('"', "_"))
        .filter(|n| !n.is_empty())
}

/// Temporary directory holding the uploaded files and the results
struct Workspace {
    dir: TempDir,
    inputs: Vec<PathBuf>,
}

impl Workspace {
    fn new(files: Vec<UploadedFile>) -> Result<Self, AppError> {
        let dir = TempDir::new()?;
        let mut inputs = Vec::with_capacity(files.len());
        for (idx, file) in files.into_iter().enumerate() {
            // one folder per file keeps duplicate names apart
            let slot = dir.path().join("in").join(idx.to_string());
            fs::create_dir_all(&slot)?;
            let path = slot.join(&file.name);
            fs::write(&path, &file.data)?;
            inputs.push(path);
        }
        fs::create_dir_all(dir.path().join("out"))?;
        Ok(Self { dir, inputs })
    }

    fn input(&self) -> &Path {
        &self.inputs[0]
    }

    fn output(&self, name: &str) -> PathBuf {
        self.dir.path().join("out").join(name)
    }
}

/// Run blocking toolbox work off the async executor
async fn run_blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(format!("Worker task failed: {e}")))?
}

/// A downloadable file
fn attachment(bytes: Vec<u8>, content_type: &'static str, filename: &str) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response()
}

/// Attach `info` as a JSON header, e.g. `x-merge-info`
fn with_info<T: Serialize>(mut response: Response, name: &'static str, info: &T) -> Response {
    match serde_json::to_string(info).map(HeaderValue::try_from) {
        Ok(Ok(value)) => {
            response
                .headers_mut()
                .insert(HeaderName::from_static(name), value);
        }
        _ => warn!("Could not encode {} header", name),
    }
    response
}

/// Health check endpoint for monitoring and load balancing
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "PDF Toolbox API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Menu entry as served by `/api/tools`
#[derive(Debug, Serialize, Deserialize)]
pub struct ToolInfo {
    pub id: String,
    pub category: String,
    pub title_zh: String,
    pub title: String,
    pub description: String,
    /// Command line subcommand running the tool
    pub command: String,
}

impl From<ToolId> for ToolInfo {
    fn from(tool: ToolId) -> Self {
        Self {
            id: tool.id().to_string(),
            category: tool.category().title().to_ascii_lowercase(),
            title_zh: tool.title_zh().to_string(),
            title: tool.title().to_string(),
            description: tool.description().to_string(),
            command: tool.command().to_string(),
        }
    }
}

/// Every tool, grouped by category in menu order
pub async fn list_tools() -> Json<Vec<ToolInfo>> {
    let tools = ToolCategory::ALL
        .into_iter()
        .flat_map(ToolId::in_category)
        .map(ToolInfo::from)
        .collect();
    Json(tools)
}

/// Options for `/api/merge`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MergeRequest {
    /// Page range applied to every file
    pub pages: Option<String>,
    pub add_bookmarks: Option<bool>,
    pub preserve_metadata: Option<bool>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MergeInfo {
    pub files_merged: usize,
    pub pages: usize,
    pub output_size: usize,
}

/// Merge multiple PDF files into a single PDF
pub async fn merge_handler(multipart: Multipart) -> Result<Response, AppError> {
    let upload = Upload::read(multipart).await?;
    upload.require_files(2, "merging")?;
    let request: MergeRequest = upload.options()?;

    let (bytes, info) = run_blocking(move || {
        let workspace = Workspace::new(upload.files)?;
        let range = request.pages.as_deref().map(PageRange::parse).transpose()?;
        let inputs = workspace
            .inputs
            .iter()
            .map(|path| match &range {
                Some(range) => MergeInput::with_pages(path, range.clone()),
                None => MergeInput::new(path),
            })
            .collect();
        let options = MergeOptions {
            add_bookmarks: request.add_bookmarks.unwrap_or(true),
            preserve_metadata: request.preserve_metadata.unwrap_or(true),
            password: request.password,
        };

        let output = workspace.output("merged.pdf");
        let pages = merge_pdf_files(inputs, &output, options)?;
        let bytes = fs::read(&output)?;
        let info = MergeInfo {
            files_merged: workspace.inputs.len(),
            pages,
            output_size: bytes.len(),
        };
        Ok((bytes, info))
    })
    .await?;

    info!("Merged {} files into {} pages", info.files_merged, info.pages);
    Ok(with_info(
        attachment(bytes, "application/pdf", "merged.pdf"),
        "x-merge-info",
        &info,
    ))
}

/// Options for `/api/split`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SplitRequest {
    /// `every-page`, `ranges` or `fixed`
    pub mode: Option<String>,
    /// Ranges or pages per file, depending on the mode
    pub ranges: Option<String>,
    pub prefix: Option<String>,
    pub password: Option<String>,
}

/// Split a PDF and return the parts as a zip archive
pub async fn split_handler(multipart: Multipart) -> Result<Response, AppError> {
    let upload = Upload::read(multipart).await?;
    upload.require_files(1, "splitting")?;
    let request: SplitRequest = upload.options()?;

    let (bytes, filename, parts) = run_blocking(move || {
        let mode = SplitMode::parse(
            request.mode.as_deref().unwrap_or("every-page"),
            request.ranges.as_deref(),
        )?;
        let workspace = Workspace::new(upload.files)?;
        let options = SplitOptions {
            mode,
            output_dir: Some(workspace.output("parts")),
            prefix: request.prefix.unwrap_or_else(|| SplitOptions::default().prefix),
            password: request.password,
        };

        let parts = split_pdf(workspace.input(), options)?;
        let archive = zip_files(&parts)?;
        let filename = format!("{}_split.zip", stem_of(workspace.input()));
        Ok((archive, filename, parts.len()))
    })
    .await?;

    Ok(with_info(
        attachment(bytes, "application/zip", &filename),
        "x-split-info",
        &serde_json::json!({ "parts": parts }),
    ))
}

fn zip_files(paths: &[PathBuf]) -> Result<Vec<u8>, AppError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for path in paths {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        writer.start_file(name, options)?;
        writer.write_all(&fs::read(path)?)?;
    }
    Ok(writer.finish()?.into_inner())
}

/// Options for `/api/compress`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CompressRequest {
    /// `low`, `medium` or `high`; the configured level when absent
    pub level: Option<String>,
    /// `native` or `ghostscript`
    pub engine: Option<String>,
    pub image_quality: Option<u8>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CompressionInfo {
    pub original_size: u64,
    pub compressed_size: u64,
    /// Percentage saved
    pub ratio: f64,
}

/// Compress an uploaded PDF
pub async fn compress_handler(
    State(config): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let upload = Upload::read(multipart).await?;
    upload.require_files(1, "compression")?;
    let request: CompressRequest = upload.options()?;

    let options = CompressOptions {
        level: match request.level {
            Some(level) => level.parse()?,
            None => config.compression_level,
        },
        engine: match request.engine {
            Some(engine) => engine.parse()?,
            None => Default::default(),
        },
        image_quality: request.image_quality,
        tools: config.external_tools(),
        password: request.password,
    };

    let (bytes, filename, info) = run_blocking(move || {
        let workspace = Workspace::new(upload.files)?;
        let filename = format!(
            "{}{}.pdf",
            stem_of(workspace.input()),
            pdf_toolbox::operations::compress::DEFAULT_SUFFIX
        );
        let output = workspace.output(&filename);
        let result = compress_pdf(workspace.input(), &output, &options)?;
        let info = CompressionInfo {
            original_size: result.original_size,
            compressed_size: result.compressed_size,
            ratio: result.ratio(),
        };
        Ok((fs::read(&output)?, filename, info))
    })
    .await?;

    Ok(with_info(
        attachment(bytes, "application/pdf", &filename),
        "x-compression-info",
        &info,
    ))
}

/// Password protect an uploaded PDF; options are [`EncryptOptions`]
pub async fn encrypt_handler(multipart: Multipart) -> Result<Response, AppError> {
    let upload = Upload::read(multipart).await?;
    upload.require_files(1, "encryption")?;
    let options: EncryptOptions = upload.options()?;
    options.validate()?;

    let (bytes, filename) = run_blocking(move || {
        let workspace = Workspace::new(upload.files)?;
        let filename = format!("{}_encrypted.pdf", stem_of(workspace.input()));
        let output = workspace.output(&filename);
        encrypt_pdf(workspace.input(), &output, &options)?;
        Ok((fs::read(&output)?, filename))
    })
    .await?;

    Ok(attachment(bytes, "application/pdf", &filename))
}

/// Options for `/api/decrypt`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DecryptRequest {
    pub password: String,
}

/// Remove the password of an uploaded PDF
pub async fn decrypt_handler(multipart: Multipart) -> Result<Response, AppError> {
    let upload = Upload::read(multipart).await?;
    upload.require_files(1, "decryption")?;
    let request: DecryptRequest = upload.options()?;
    if request.password.is_empty() {
        return Err(AppError::BadRequest("Password must not be empty".to_string()));
    }

    let (bytes, filename) = run_blocking(move || {
        let workspace = Workspace::new(upload.files)?;
        let filename = format!("{}_decrypted.pdf", stem_of(workspace.input()));
        let output = workspace.output(&filename);
        decrypt_pdf(workspace.input(), &output, &request.password)?;
        Ok((fs::read(&output)?, filename))
    })
    .await?;

    Ok(attachment(bytes, "application/pdf", &filename))
}

/// Options for `/api/rotate`
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RotateRequest {
    /// Any multiple of 90
    pub angle: i32,
    /// `all`, `odd`, `even` or a page range
    pub pages: String,
    pub password: Option<String>,
}

impl Default for RotateRequest {
    fn default() -> Self {
        Self {
            angle: 90,
            pages: "all".to_string(),
            password: None,
        }
    }
}

/// Rotate pages of an uploaded PDF
pub async fn rotate_handler(multipart: Multipart) -> Result<Response, AppError> {
    let upload = Upload::read(multipart).await?;
    upload.require_files(1, "rotation")?;
    let request: RotateRequest = upload.options()?;
    let options = RotateOptions {
        angle: RotationAngle::from_degrees(request.angle)?,
        password: request.password,
        ..Default::default()
    }
    .with_pages(&request.pages);

    let (bytes, filename, rotated) = run_blocking(move || {
        let workspace = Workspace::new(upload.files)?;
        let filename = format!(
            "{}{}.pdf",
            stem_of(workspace.input()),
            pdf_toolbox::operations::rotate::DEFAULT_SUFFIX
        );
        let output = workspace.output(&filename);
        let rotated = rotate_pdf_pages(workspace.input(), &output, &options)?;
        Ok((fs::read(&output)?, filename, rotated))
    })
    .await?;

    Ok(with_info(
        attachment(bytes, "application/pdf", &filename),
        "x-rotate-info",
        &serde_json::json!({ "pages_rotated": rotated }),
    ))
}

/// Options for `/api/extract-text`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ExtractTextRequest {
    /// Page range, parsed leniently; every page when empty
    pub pages: String,
    pub preserve_layout: bool,
    pub password: Option<String>,
}

/// Response for text extraction endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ExtractTextResponse {
    /// Extracted text, one `--- Page N ---` section per page
    pub text: String,
    /// Number of pages in the document
    pub pages: usize,
}

/// Extract text from an uploaded PDF file
pub async fn extract_text_handler(multipart: Multipart) -> Result<Json<ExtractTextResponse>, AppError> {
    let upload = Upload::read(multipart).await?;
    upload.require_files(1, "text extraction")?;
    let request: ExtractTextRequest = upload.options()?;

    let response = run_blocking(move || {
        let bytes = upload.files[0].data.to_vec();
        let doc = document::load_bytes(bytes, request.password.as_deref())?;
        let options = ExtractTextOptions {
            pages: request.pages,
            preserve_layout: request.preserve_layout,
            password: None,
        };
        let text = pdf_toolbox::operations::extract_text::document_text(&doc, &options)?;
        Ok(ExtractTextResponse {
            text,
            pages: document::page_count(&doc),
        })
    })
    .await?;

    Ok(Json(response))
}

/// Options for `/api/metadata`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MetadataRequest {
    /// New document properties; the current ones are returned when absent
    pub set: Option<Metadata>,
    pub password: Option<String>,
}

/// Read the properties of an uploaded PDF as JSON, or replace them and
/// return the edited PDF
pub async fn metadata_handler(multipart: Multipart) -> Result<Response, AppError> {
    let upload = Upload::read(multipart).await?;
    upload.require_files(1, "metadata")?;
    let request: MetadataRequest = upload.options()?;

    run_blocking(move || {
        let workspace = Workspace::new(upload.files)?;
        let password = request.password.as_deref();
        match request.set {
            None => {
                let metadata = read_metadata(workspace.input(), password)?;
                Ok(Json(metadata).into_response())
            }
            Some(metadata) => {
                let filename = format!(
                    "{}{}.pdf",
                    stem_of(workspace.input()),
                    pdf_toolbox::operations::metadata::DEFAULT_SUFFIX
                );
                let output = workspace.output(&filename);
                write_metadata(workspace.input(), &output, &metadata, password)?;
                Ok(attachment(fs::read(&output)?, "application/pdf", &filename))
            }
        }
    })
    .await
}

/// Options for `/api/compare`
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CompareRequest {
    pub compare_pages: bool,
    pub compare_metadata: bool,
    pub compare_text: bool,
    pub first_password: Option<String>,
    pub second_password: Option<String>,
}

impl Default for CompareRequest {
    fn default() -> Self {
        Self {
            compare_pages: true,
            compare_metadata: true,
            compare_text: true,
            first_password: None,
            second_password: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CompareResponse {
    pub identical: bool,
    #[serde(flatten)]
    pub report: ComparisonReport,
    /// The report as text
    pub summary: String,
}

/// Compare two uploaded PDF files
pub async fn compare_handler(multipart: Multipart) -> Result<Json<CompareResponse>, AppError> {
    let upload = Upload::read(multipart).await?;
    upload.require_files(2, "comparison")?;
    let request: CompareRequest = upload.options()?;

    let response = run_blocking(move || {
        let names: Vec<String> = upload.files.iter().map(|f| f.name.clone()).collect();
        let workspace = Workspace::new(upload.files)?;
        let options = CompareOptions {
            compare_pages: request.compare_pages,
            compare_metadata: request.compare_metadata,
            compare_text: request.compare_text,
        };
        let mut report = compare_pdfs(
            &workspace.inputs[0],
            &workspace.inputs[1],
            options,
            (
                request.first_password.as_deref(),
                request.second_password.as_deref(),
            ),
        )?;
        report.first = PathBuf::from(&names[0]);
        report.second = PathBuf::from(&names[1]);

        Ok(CompareResponse {
            identical: report.identical(),
            summary: report.to_string(),
            report,
        })
    })
    .await?;

    Ok(Json(response))
}
