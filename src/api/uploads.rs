//! Cover image and PDF upload endpoints

use axum::{
    extract::State,
    http::StatusCode,
};
use axum_extra::extract::{multipart::MultipartError, Multipart};

use super::{ApiPath, ApiQuery, ApiResponse};
use crate::{
    error::{AppError, AppResult},
    models::upload::{
        CoverUploadForm, FileInfo, FileKind, FileKindQuery, FileList, PdfUploadForm, UploadResult,
    },
    services::uploads::UploadService,
    AppState,
};

fn multipart_error(error: MultipartError) -> AppError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::Validation("File too large".to_string())
    } else {
        AppError::BadRequest(error.body_text())
    }
}

/// Store the first field named after `kind`
async fn receive(uploads: &UploadService, kind: FileKind, mut multipart: Multipart) -> AppResult<UploadResult> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(kind.field_name()) {
            continue;
        }
        let original_name = field.file_name().unwrap_or("upload").to_string();
        let mimetype = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;

        let file = uploads.store(kind, &original_name, &mimetype, &bytes).await?;
        return Ok(UploadResult { kind, file });
    }

    Err(AppError::BadRequest(format!(
        "No file uploaded (expected field \"{}\")",
        kind.field_name()
    )))
}

/// Upload a cover image (multipart field `coverImage`)
#[utoipa::path(
    post,
    path = "/upload/cover",
    tag = "uploads",
    request_body(
        content = CoverUploadForm,
        content_type = "multipart/form-data",
        description = "Field `coverImage`: JPEG, PNG, GIF or WebP"
    ),
    responses(
        (status = 201, description = "Image stored", body = UploadResult),
        (status = 400, description = "Missing, oversized or wrong type of file", body = crate::error::ErrorResponse)
    )
)]
pub async fn upload_cover(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<(StatusCode, ApiResponse<UploadResult>)> {
    let result = receive(&state.services.uploads, FileKind::Cover, multipart).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(result, "Cover image uploaded successfully")))
}

/// Upload a PDF (multipart field `pdfFile`)
#[utoipa::path(
    post,
    path = "/upload/pdf",
    tag = "uploads",
    request_body(
        content = PdfUploadForm,
        content_type = "multipart/form-data",
        description = "Field `pdfFile`: application/pdf"
    ),
    responses(
        (status = 201, description = "PDF stored", body = UploadResult),
        (status = 400, description = "Missing, oversized or wrong type of file", body = crate::error::ErrorResponse)
    )
)]
pub async fn upload_pdf(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<(StatusCode, ApiResponse<UploadResult>)> {
    let result = receive(&state.services.uploads, FileKind::Pdf, multipart).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(result, "PDF file uploaded successfully")))
}

/// Delete a stored file
#[utoipa::path(
    delete,
    path = "/upload/{filename}",
    tag = "uploads",
    params(
        ("filename" = String, Path, description = "Stored file name"),
        FileKindQuery
    ),
    responses(
        (status = 200, description = "File deleted"),
        (status = 400, description = "Invalid file name or type", body = crate::error::ErrorResponse),
        (status = 404, description = "File not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_file(
    State(state): State<AppState>,
    ApiPath(filename): ApiPath<String>,
    ApiQuery(query): ApiQuery<FileKindQuery>,
) -> AppResult<ApiResponse<()>> {
    state.services.uploads.delete(query.kind, &filename).await?;
    Ok(ApiResponse::message("File deleted successfully"))
}

/// Size and dates of a stored file
#[utoipa::path(
    get,
    path = "/upload/info/{filename}",
    tag = "uploads",
    params(
        ("filename" = String, Path, description = "Stored file name"),
        FileKindQuery
    ),
    responses(
        (status = 200, description = "File metadata", body = FileInfo),
        (status = 404, description = "File not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn file_info(
    State(state): State<AppState>,
    ApiPath(filename): ApiPath<String>,
    ApiQuery(query): ApiQuery<FileKindQuery>,
) -> AppResult<ApiResponse<FileInfo>> {
    let info = state.services.uploads.info(query.kind, &filename).await?;
    Ok(ApiResponse::ok(info, "File information retrieved successfully"))
}

/// Stored files of one type
#[utoipa::path(
    get,
    path = "/upload/list/{kind}",
    tag = "uploads",
    params(
        ("kind" = FileKind, Path, description = "cover or pdf")
    ),
    responses(
        (status = 200, description = "Files sorted by name", body = FileList),
        (status = 400, description = "Unknown type", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_files(
    State(state): State<AppState>,
    ApiPath(kind): ApiPath<FileKind>,
) -> AppResult<ApiResponse<FileList>> {
    let list = state.services.uploads.list(kind).await?;
    let message = format!("Found {} {} files", list.count, kind.dir_name().trim_end_matches('s'));
    Ok(ApiResponse::ok(list, message))
}
