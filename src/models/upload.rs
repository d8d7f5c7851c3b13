//! Uploaded file types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Kind of file attached to a book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Cover,
    Pdf,
}

impl FileKind {
    /// Sub-directory of the upload root
    pub fn dir_name(self) -> &'static str {
        match self {
            FileKind::Cover => "covers",
            FileKind::Pdf => "pdfs",
        }
    }

    /// Multipart field carrying the file
    pub fn field_name(self) -> &'static str {
        match self {
            FileKind::Cover => "coverImage",
            FileKind::Pdf => "pdfFile",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FileKind::Cover => "Cover image",
            FileKind::Pdf => "PDF file",
        }
    }

    pub fn accepts(self, mimetype: &str) -> bool {
        match self {
            FileKind::Cover => matches!(
                mimetype,
                "image/jpeg" | "image/jpg" | "image/png" | "image/gif" | "image/webp"
            ),
            FileKind::Pdf => mimetype == "application/pdf",
        }
    }
}

/// `?type=cover|pdf`
#[derive(Debug, Clone, Copy, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FileKindQuery {
    #[serde(rename = "type")]
    pub kind: FileKind,
}

/// Multipart body of `POST /upload/cover`
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CoverUploadForm {
    #[schema(value_type = String, format = Binary)]
    pub cover_image: Vec<u8>,
}

/// Multipart body of `POST /upload/pdf`
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PdfUploadForm {
    #[schema(value_type = String, format = Binary)]
    pub pdf_file: Vec<u8>,
}

/// A file just written to the upload area
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub original_name: String,
    pub filename: String,
    pub size: u64,
    pub mimetype: String,
    pub url: String,
}

/// Upload response payload
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UploadResult {
    #[serde(rename = "type")]
    pub kind: FileKind,
    pub file: UploadedFile,
}

/// Stored file metadata
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub filename: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub kind: FileKind,
    pub url: String,
    pub uploaded_at: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Listing of one upload directory
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FileList {
    pub files: Vec<FileInfo>,
    pub count: usize,
}
