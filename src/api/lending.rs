//! Lending workflow endpoints

use axum::{extract::State, http::StatusCode};
use uuid::Uuid;

use super::{ApiJson, ApiPath, ApiQuery, ApiResponse};
use crate::{
    error::AppResult,
    models::{
        lending::{ExtendLending, LendBook, LendingQuery, UpdateLending},
        LendingDetails, LendingStats,
    },
    AppState,
};

/// Lend a book
#[utoipa::path(
    post,
    path = "/books/{id}/lend",
    tag = "lending",
    params(
        ("id" = Uuid, Path, description = "Book ID")
    ),
    request_body = LendBook,
    responses(
        (status = 201, description = "Book lent", body = LendingDetails),
        (status = 400, description = "Invalid input or past return date", body = crate::error::ErrorResponse),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Book already lent out or not available", body = crate::error::ErrorResponse)
    )
)]
pub async fn lend_book(
    State(state): State<AppState>,
    ApiPath(book_id): ApiPath<Uuid>,
    ApiJson(data): ApiJson<LendBook>,
) -> AppResult<(StatusCode, ApiResponse<LendingDetails>)> {
    let lending = state.services.lending.lend(book_id, data).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(lending, "Book lent successfully")))
}

/// Return a book by its ID
#[utoipa::path(
    put,
    path = "/books/{id}/return",
    tag = "lending",
    params(
        ("id" = Uuid, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book returned", body = LendingDetails),
        (status = 404, description = "Book not found or not lent", body = crate::error::ErrorResponse)
    )
)]
pub async fn return_book(
    State(state): State<AppState>,
    ApiPath(book_id): ApiPath<Uuid>,
) -> AppResult<ApiResponse<LendingDetails>> {
    let lending = state.services.lending.return_book(book_id).await?;
    Ok(ApiResponse::ok(lending, "Book returned successfully"))
}

/// Return a book by its lending record
#[utoipa::path(
    put,
    path = "/lending/{id}/return",
    tag = "lending",
    params(
        ("id" = Uuid, Path, description = "Lending record ID")
    ),
    responses(
        (status = 200, description = "Book returned", body = LendingDetails),
        (status = 404, description = "Lending record not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Already returned", body = crate::error::ErrorResponse)
    )
)]
pub async fn return_lending(
    State(state): State<AppState>,
    ApiPath(lending_id): ApiPath<Uuid>,
) -> AppResult<ApiResponse<LendingDetails>> {
    let lending = state.services.lending.return_lending(lending_id).await?;
    Ok(ApiResponse::ok(lending, "Book returned successfully"))
}

/// Move the expected return date of an active lending
#[utoipa::path(
    put,
    path = "/lending/{id}/extend",
    tag = "lending",
    params(
        ("id" = Uuid, Path, description = "Lending record ID")
    ),
    request_body = ExtendLending,
    responses(
        (status = 200, description = "Lending extended", body = LendingDetails),
        (status = 400, description = "Date not in the future", body = crate::error::ErrorResponse),
        (status = 404, description = "Lending record not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Lending already returned", body = crate::error::ErrorResponse)
    )
)]
pub async fn extend_lending(
    State(state): State<AppState>,
    ApiPath(lending_id): ApiPath<Uuid>,
    ApiJson(data): ApiJson<ExtendLending>,
) -> AppResult<ApiResponse<LendingDetails>> {
    let lending = state.services.lending.extend(lending_id, data).await?;
    Ok(ApiResponse::ok(lending, "Lending period extended successfully"))
}

/// Edit borrower name, contact or notes
#[utoipa::path(
    put,
    path = "/lending/{id}",
    tag = "lending",
    params(
        ("id" = Uuid, Path, description = "Lending record ID")
    ),
    request_body = UpdateLending,
    responses(
        (status = 200, description = "Lending updated", body = LendingDetails),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 404, description = "Lending record not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_lending(
    State(state): State<AppState>,
    ApiPath(lending_id): ApiPath<Uuid>,
    ApiJson(data): ApiJson<UpdateLending>,
) -> AppResult<ApiResponse<LendingDetails>> {
    let lending = state.services.lending.update(lending_id, data).await?;
    Ok(ApiResponse::ok(lending, "Lending information updated successfully"))
}

/// Books currently out
#[utoipa::path(
    get,
    path = "/lending/current",
    tag = "lending",
    responses(
        (status = 200, description = "Active lendings, newest first", body = Vec<LendingDetails>)
    )
)]
pub async fn current_lendings(State(state): State<AppState>) -> AppResult<ApiResponse<Vec<LendingDetails>>> {
    let lendings = state.services.lending.current().await?;
    let message = format!("Found {} currently lent books", lendings.len());
    Ok(ApiResponse::ok(lendings, message))
}

/// Books past their expected return date
#[utoipa::path(
    get,
    path = "/lending/overdue",
    tag = "lending",
    responses(
        (status = 200, description = "Overdue lendings, most overdue first", body = Vec<LendingDetails>)
    )
)]
pub async fn overdue_lendings(State(state): State<AppState>) -> AppResult<ApiResponse<Vec<LendingDetails>>> {
    let lendings = state.services.lending.overdue().await?;
    let message = format!("Found {} overdue books", lendings.len());
    Ok(ApiResponse::ok(lendings, message))
}

/// Filtered lending history
#[utoipa::path(
    get,
    path = "/lending/history",
    tag = "lending",
    params(LendingQuery),
    responses(
        (status = 200, description = "Page of lending records with their books", body = Vec<LendingDetails>),
        (status = 400, description = "Invalid query", body = crate::error::ErrorResponse)
    )
)]
pub async fn lending_history(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<LendingQuery>,
) -> AppResult<ApiResponse<Vec<LendingDetails>>> {
    let (lendings, pagination) = state.services.lending.history(&query).await?;
    let message = format!("Found {} lending records", lendings.len());
    Ok(ApiResponse::paginated(lendings, pagination, message))
}

/// Lending counters
#[utoipa::path(
    get,
    path = "/lending/stats",
    tag = "lending",
    responses(
        (status = 200, description = "Lending statistics", body = LendingStats)
    )
)]
pub async fn lending_stats(State(state): State<AppState>) -> AppResult<ApiResponse<LendingStats>> {
    let stats = state.services.lending.stats().await?;
    Ok(ApiResponse::ok(stats, "Lending statistics retrieved successfully"))
}
