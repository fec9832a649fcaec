//! # pdf-toolbox-api
//!
//! HTTP front end for the PDF toolbox. Every endpoint takes a multipart
//! upload with the PDF files and an optional JSON `options` field.
//!
//! | Route | Result |
//! |-------|--------|
//! | `GET /api/health` | service status |
//! | `GET /api/tools` | the tool menu |
//! | `POST /api/merge` | merged PDF, `x-merge-info` header |
//! | `POST /api/split` | zip of the parts |
//! | `POST /api/compress` | compressed PDF, `x-compression-info` header |
//! | `POST /api/encrypt`, `/api/decrypt` | protected or unlocked PDF |
//! | `POST /api/rotate` | rotated PDF |
//! | `POST /api/extract-text` | JSON text |
//! | `POST /api/metadata` | JSON properties, or the edited PDF |
//! | `POST /api/compare` | JSON comparison report |

mod api;
mod error;

pub use api::{
    app, app_with_config, health_check, list_tools, CompareRequest, CompressRequest,
    CompressionInfo, DecryptRequest, ExtractTextRequest, ExtractTextResponse, MergeInfo,
    MergeRequest, MetadataRequest, RotateRequest, SplitRequest, ToolInfo, MAX_UPLOAD_SIZE,
};
pub use error::{AppError, ErrorResponse};
