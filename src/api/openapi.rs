//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{books, categories, health, lending, uploads};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Bookshelf API",
        version = "0.1.0",
        description = "Personal book collection and lending REST API. Every response is wrapped in \
                       `{success, data?, message?, error?, pagination?}`; the schemas below describe `data`.",
        license(name = "MIT")
    ),
    servers(
        (url = "/api", description = "API")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        health::api_index,
        // Books
        books::list_books,
        books::search_books,
        books::book_stats,
        books::books_by_status,
        books::books_by_category,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        // Lending
        lending::lend_book,
        lending::return_book,
        lending::return_lending,
        lending::extend_lending,
        lending::update_lending,
        lending::current_lendings,
        lending::overdue_lendings,
        lending::lending_history,
        lending::lending_stats,
        // Categories
        categories::list_categories,
        categories::create_category,
        // Uploads
        uploads::upload_cover,
        uploads::upload_pdf,
        uploads::delete_file,
        uploads::file_info,
        uploads::list_files,
    ),
    components(
        schemas(
            // Books
            crate::models::Book,
            crate::models::BookStatus,
            crate::models::BookWithLending,
            crate::models::BookDetails,
            crate::models::book::CreateBook,
            crate::models::book::UpdateBook,
            crate::models::book::BookSortField,
            crate::models::book::BookStats,
            crate::models::SortOrder,
            crate::models::Pagination,
            // Lending
            crate::models::LendingRecord,
            crate::models::LendingDetails,
            crate::models::LendingStats,
            crate::models::lending::LendBook,
            crate::models::lending::ExtendLending,
            crate::models::lending::UpdateLending,
            crate::models::lending::LendingSortField,
            // Categories
            crate::models::Category,
            crate::models::CategoryWithCount,
            crate::models::category::CreateCategory,
            // Uploads
            crate::models::upload::FileKind,
            crate::models::upload::CoverUploadForm,
            crate::models::upload::PdfUploadForm,
            crate::models::upload::UploadedFile,
            crate::models::upload::UploadResult,
            crate::models::upload::FileInfo,
            crate::models::upload::FileList,
            // Health
            health::HealthResponse,
            health::ApiIndex,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "books", description = "Book catalog"),
        (name = "lending", description = "Lending workflow"),
        (name = "categories", description = "Book categories"),
        (name = "uploads", description = "Cover image and PDF files")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
