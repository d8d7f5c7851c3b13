//! Book catalog endpoints

use axum::{extract::State, http::StatusCode};
use uuid::Uuid;

use super::{ApiJson, ApiPath, ApiQuery, ApiResponse};
use crate::{
    error::AppResult,
    models::{
        book::{BookQuery, BookSearchQuery, BookStats, CreateBook, UpdateBook},
        Book, BookDetails, BookWithLending,
    },
    AppState,
};

/// List books with filters and pagination
#[utoipa::path(
    get,
    path = "/books",
    tag = "books",
    params(BookQuery),
    responses(
        (status = 200, description = "Page of books with category and active lending", body = Vec<BookWithLending>),
        (status = 400, description = "Invalid query", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_books(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<BookQuery>,
) -> AppResult<ApiResponse<Vec<BookWithLending>>> {
    let (books, pagination) = state.services.catalog.list_books(&query).await?;
    let message = format!("Found {} books", books.len());
    Ok(ApiResponse::paginated(books, pagination, message))
}

/// Quick search over title, author, description and genre
#[utoipa::path(
    get,
    path = "/books/search",
    tag = "books",
    params(BookSearchQuery),
    responses(
        (status = 200, description = "Matching books", body = Vec<BookWithLending>),
        (status = 400, description = "Missing or invalid search term", body = crate::error::ErrorResponse)
    )
)]
pub async fn search_books(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<BookSearchQuery>,
) -> AppResult<ApiResponse<Vec<BookWithLending>>> {
    let books = state.services.catalog.search_books(&query).await?;
    let message = format!("Found {} books matching \"{}\"", books.len(), query.q.trim());
    Ok(ApiResponse::ok(books, message))
}

/// Collection counters
#[utoipa::path(
    get,
    path = "/books/stats",
    tag = "books",
    responses(
        (status = 200, description = "Book statistics", body = BookStats)
    )
)]
pub async fn book_stats(State(state): State<AppState>) -> AppResult<ApiResponse<BookStats>> {
    let stats = state.services.catalog.book_stats().await?;
    Ok(ApiResponse::ok(stats, "Book statistics retrieved successfully"))
}

/// Books with a given status
#[utoipa::path(
    get,
    path = "/books/status/{status}",
    tag = "books",
    params(
        ("status" = String, Path, description = "OWNED, LENT, WISHLIST or LOST (any case)")
    ),
    responses(
        (status = 200, description = "Books, most recently updated first", body = Vec<BookWithLending>),
        (status = 400, description = "Unknown status", body = crate::error::ErrorResponse)
    )
)]
pub async fn books_by_status(
    State(state): State<AppState>,
    ApiPath(status): ApiPath<String>,
) -> AppResult<ApiResponse<Vec<BookWithLending>>> {
    let books = state.services.catalog.books_by_status(&status).await?;
    let message = format!("Found {} books with status \"{}\"", books.len(), status.to_uppercase());
    Ok(ApiResponse::ok(books, message))
}

/// Books filed under a category
#[utoipa::path(
    get,
    path = "/books/category/{category_id}",
    tag = "books",
    params(
        ("category_id" = Uuid, Path, description = "Category ID")
    ),
    responses(
        (status = 200, description = "Books by title", body = Vec<BookWithLending>),
        (status = 404, description = "Category not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn books_by_category(
    State(state): State<AppState>,
    ApiPath(category_id): ApiPath<Uuid>,
) -> AppResult<ApiResponse<Vec<BookWithLending>>> {
    let books = state.services.catalog.books_by_category(category_id).await?;
    let message = format!("Found {} books in category", books.len());
    Ok(ApiResponse::ok(books, message))
}

/// Get a book with its lending history
#[utoipa::path(
    get,
    path = "/books/{id}",
    tag = "books",
    params(
        ("id" = Uuid, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book details", body = BookDetails),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_book(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<ApiResponse<BookDetails>> {
    let book = state.services.catalog.get_book(id).await?;
    Ok(ApiResponse::ok(book, "Book retrieved successfully"))
}

/// Add a book to the collection
#[utoipa::path(
    post,
    path = "/books",
    tag = "books",
    request_body = CreateBook,
    responses(
        (status = 201, description = "Book created", body = Book),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 409, description = "ISBN already in use", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_book(
    State(state): State<AppState>,
    ApiJson(data): ApiJson<CreateBook>,
) -> AppResult<(StatusCode, ApiResponse<Book>)> {
    let book = state.services.catalog.create_book(data).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(book, "Book created successfully")))
}

/// Update a book
#[utoipa::path(
    put,
    path = "/books/{id}",
    tag = "books",
    params(
        ("id" = Uuid, Path, description = "Book ID")
    ),
    request_body = UpdateBook,
    responses(
        (status = 200, description = "Book updated", body = Book),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse),
        (status = 409, description = "ISBN in use or status owned by the lending workflow", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_book(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(data): ApiJson<UpdateBook>,
) -> AppResult<ApiResponse<Book>> {
    let book = state.services.catalog.update_book(id, data).await?;
    Ok(ApiResponse::ok(book, "Book updated successfully"))
}

/// Delete a book and its past lending records
#[utoipa::path(
    delete,
    path = "/books/{id}",
    tag = "books",
    params(
        ("id" = Uuid, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book deleted"),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Book is currently lent out", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_book(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<ApiResponse<()>> {
    state.services.catalog.delete_book(id).await?;
    Ok(ApiResponse::message("Book deleted successfully"))
}
