//! Category endpoints

use axum::{extract::State, http::StatusCode};

use super::{ApiJson, ApiResponse};
use crate::{
    error::AppResult,
    models::{category::CreateCategory, Category, CategoryWithCount},
    AppState,
};

/// List categories with book counts
#[utoipa::path(
    get,
    path = "/categories",
    tag = "categories",
    responses(
        (status = 200, description = "Categories by name", body = Vec<CategoryWithCount>)
    )
)]
pub async fn list_categories(State(state): State<AppState>) -> AppResult<ApiResponse<Vec<CategoryWithCount>>> {
    let categories = state.services.catalog.list_categories().await?;
    let message = format!("Found {} categories", categories.len());
    Ok(ApiResponse::ok(categories, message))
}

/// Create a category
#[utoipa::path(
    post,
    path = "/categories",
    tag = "categories",
    request_body = CreateCategory,
    responses(
        (status = 201, description = "Category created", body = Category),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 409, description = "Name already in use", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_category(
    State(state): State<AppState>,
    ApiJson(data): ApiJson<CreateCategory>,
) -> AppResult<(StatusCode, ApiResponse<Category>)> {
    let category = state.services.catalog.create_category(data).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(category, "Category created successfully")))
}
