//! API handlers for Bookshelf REST endpoints

pub mod books;
pub mod categories;
pub mod health;
pub mod lending;
pub mod openapi;
pub mod rate_limit;
pub mod uploads;

use axum::{
    async_trait,
    extract::{DefaultBodyLimit, FromRequest, FromRequestParts, Path, Query, Request},
    http::{header, request::Parts, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{de::DeserializeOwned, Serialize};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::{
    error::{AppError, ErrorCode, ErrorResponse},
    models::Pagination,
    AppState,
};

/// Response envelope shared by every endpoint
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
            pagination: None,
        }
    }

    pub fn paginated(data: T, pagination: Pagination, message: impl Into<String>) -> Self {
        Self {
            pagination: Some(pagination),
            ..Self::ok(data, message)
        }
    }
}

impl ApiResponse<()> {
    /// Envelope with a message and no data
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
            pagination: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// JSON body whose rejections use the error envelope
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// Query string whose rejections use the error envelope
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

/// Path parameters whose rejections use the error envelope
pub struct ApiPath<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            success: false,
            error: "Route not found".to_string(),
            code: ErrorCode::NotFound.as_str().to_string(),
        }),
    )
}

fn cors_layer(allowed_origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    match allowed_origin {
        "*" => cors.allow_origin(Any),
        origin => match origin.parse::<HeaderValue>() {
            Ok(origin) => cors.allow_origin(origin).allow_credentials(true),
            Err(_) => {
                tracing::warn!("Invalid CORS origin {:?}, allowing any", origin);
                cors.allow_origin(Any)
            }
        },
    }
}

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    let config = state.config.clone();
    let limits = &config.rate_limit;

    let book_routes = Router::new()
        .route("/books", get(books::list_books).post(books::create_book))
        .route("/books/stats", get(books::book_stats))
        .route("/books/status/:status", get(books::books_by_status))
        .route("/books/category/:category_id", get(books::books_by_category))
        .route(
            "/books/:id",
            get(books::get_book).put(books::update_book).delete(books::delete_book),
        )
        .route("/books/:id/lend", post(lending::lend_book))
        .route("/books/:id/return", put(lending::return_book));

    let search_routes = rate_limit::limit(
        Router::new().route("/books/search", get(books::search_books)),
        limits.enabled.then_some(limits.search),
    );

    let lending_routes = Router::new()
        .route("/lending/current", get(lending::current_lendings))
        .route("/lending/overdue", get(lending::overdue_lendings))
        .route("/lending/stats", get(lending::lending_stats))
        .route("/lending/history", get(lending::lending_history))
        .route("/lending/:id", put(lending::update_lending))
        .route("/lending/:id/extend", put(lending::extend_lending))
        .route("/lending/:id/return", put(lending::return_lending));

    let category_routes = Router::new().route(
        "/categories",
        get(categories::list_categories).post(categories::create_category),
    );

    let max_upload = config.uploads.max_image_size.max(config.uploads.max_pdf_size);
    let upload_routes = rate_limit::limit(
        Router::new()
            .route("/upload/cover", post(uploads::upload_cover))
            .route("/upload/pdf", post(uploads::upload_pdf))
            // multipart framing on top of the file itself
            .layer(DefaultBodyLimit::max(max_upload + 64 * 1024)),
        limits.enabled.then_some(limits.upload),
    );

    let file_routes = Router::new()
        .route("/upload/:filename", axum::routing::delete(uploads::delete_file))
        .route("/upload/info/:filename", get(uploads::file_info))
        .route("/upload/list/:kind", get(uploads::list_files));

    let api = rate_limit::limit(
        Router::new()
            .route("/", get(health::api_index))
            .route("/health", get(health::health_check))
            .route("/ready", get(health::readiness_check))
            .merge(book_routes)
            .merge(search_routes)
            .merge(lending_routes)
            .merge(category_routes)
            .merge(upload_routes)
            .merge(file_routes),
        limits.enabled.then_some(limits.general),
    );

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api", api)
        .nest_service("/uploads", ServeDir::new(state.services.uploads.root()))
        .merge(openapi::create_openapi_router())
        .fallback(not_found)
        .with_state(state)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.cors.allowed_origin))
}
