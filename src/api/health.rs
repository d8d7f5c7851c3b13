//! Health check endpoints

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::AppState;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// Current status of the service
    pub status: String,
    /// Version of the service
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

impl HealthResponse {
    fn new(status: &str) -> Self {
        Self {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse::new("healthy"))
}

/// Readiness check endpoint (checks database connectivity)
#[utoipa::path(
    get,
    path = "/ready",
    tag = "health",
    responses(
        (status = 200, description = "Service is ready", body = HealthResponse),
        (status = 503, description = "Store unreachable", body = HealthResponse)
    )
)]
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    if state.services.ready().await {
        (StatusCode::OK, Json(HealthResponse::new("ready")))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(HealthResponse::new("unavailable")))
    }
}

#[derive(Serialize, ToSchema)]
pub struct ApiIndex {
    pub name: String,
    pub version: String,
    pub endpoints: Vec<String>,
    pub documentation: String,
}

/// List of endpoint groups
#[utoipa::path(
    get,
    path = "/",
    tag = "health",
    responses(
        (status = 200, description = "API index", body = ApiIndex)
    )
)]
pub async fn api_index() -> Json<ApiIndex> {
    Json(ApiIndex {
        name: "Bookshelf API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints: ["/api/books", "/api/lending", "/api/categories", "/api/upload", "/api/health"]
            .into_iter()
            .map(str::to_string)
            .collect(),
        documentation: "/swagger-ui".to_string(),
    })
}
