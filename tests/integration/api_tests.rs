//! API integration tests
//!
//! Requests go through the full router in process, backed by the in-memory store.

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use bookshelf_server::{api, repository::Repository, AppConfig, AppState};

fn app() -> Router {
    let uploads = std::env::temp_dir().join(format!("bookshelf-api-{}", Uuid::new_v4()));
    let state = AppState::new(AppConfig::in_memory(uploads), Repository::in_memory());
    api::create_router(state)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create_book(app: &Router, body: Value) -> Value {
    let (status, body) = send(app, Method::POST, "/api/books", Some(body)).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["data"].clone()
}

fn in_days(days: i64) -> String {
    (Utc::now() + Duration::days(days)).to_rfc3339()
}

#[tokio::test]
async fn test_health_check() {
    let app = app();

    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = send(&app, Method::GET, "/api/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_unknown_route_uses_error_envelope() {
    let app = app();

    let (status, body) = send(&app, Method::GET, "/api/shelves", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "NOT_FOUND");
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_invalid_id_is_bad_request() {
    let app = app();

    let (status, body) = send(&app, Method::GET, "/api/books/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "BAD_VALUE");

    let (status, body) = send(&app, Method::GET, &format!("/api/books/{}", Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Book not found");
}

#[tokio::test]
async fn test_create_book_validation() {
    let app = app();

    let (status, body) = send(&app, Method::POST, "/api/books", Some(json!({ "title": "", "author": "" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = send(&app, Method::POST, "/api/books", Some(json!({ "author": "No title" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = send(&app, Method::GET, "/api/books", None).await;
    assert_eq!(body["pagination"]["total"], 0);
}

#[tokio::test]
async fn test_duplicate_isbn() {
    let app = app();

    let first = create_book(
        &app,
        json!({ "title": "Dune", "author": "Frank Herbert", "isbn": "9780441013593" }),
    )
    .await;
    assert_eq!(first["status"], "OWNED");
    assert_eq!(first["isbn"], "9780441013593");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/books",
        Some(json!({ "title": "Dune (reprint)", "author": "Frank Herbert", "isbn": "9780441013593" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "DUPLICATE");

    let second = create_book(&app, json!({ "title": "Children of Dune", "author": "Frank Herbert" })).await;
    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/api/books/{}", second["id"].as_str().unwrap()),
        Some(json!({ "isbn": "9780441013593" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_lending_workflow() {
    let app = app();
    let book = create_book(&app, json!({ "title": "Neuromancer", "author": "William Gibson" })).await;
    let book_id = book["id"].as_str().unwrap().to_string();

    let lend = json!({
        "borrowerName": "Alice",
        "borrowerContact": "alice@example.com",
        "expectedReturn": in_days(14),
    });
    let (status, body) = send(&app, Method::POST, &format!("/api/books/{}/lend", book_id), Some(lend.clone())).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["data"]["book"]["status"], "LENT");
    assert_eq!(body["data"]["isReturned"], false);
    let lending_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, Method::POST, &format!("/api/books/{}/lend", book_id), Some(lend)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "DUPLICATE");

    let (_, body) = send(&app, Method::GET, &format!("/api/books/{}", book_id), None).await;
    assert_eq!(body["data"]["status"], "LENT");
    assert_eq!(body["data"]["lendingHistory"][0]["id"], lending_id.as_str());
    assert_eq!(body["data"]["lendingHistory"][0]["isReturned"], false);

    let (status, _) = send(&app, Method::DELETE, &format!("/api/books/{}", book_id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = send(&app, Method::GET, "/api/lending/current", None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/api/lending/{}/extend", lending_id),
        Some(json!({ "newExpectedReturn": in_days(30) })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let (status, body) = send(&app, Method::PUT, &format!("/api/lending/{}/return", lending_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["isReturned"], true);
    assert!(body["data"]["actualReturn"].is_string());
    assert_eq!(body["data"]["book"]["status"], "OWNED");

    let (status, body) = send(&app, Method::PUT, &format!("/api/lending/{}/return", lending_id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INVALID_STATE");

    let (status, _) = send(&app, Method::PUT, &format!("/api/books/{}/return", book_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(&app, Method::GET, "/api/lending/stats", None).await;
    assert_eq!(body["data"]["totalLendings"], 1);
    assert_eq!(body["data"]["activeLendings"], 0);
    assert_eq!(body["data"]["returnedBooks"], 1);
}

#[tokio::test]
async fn test_lend_rejects_wishlist_and_past_dates() {
    let app = app();
    let wishlist = create_book(&app, json!({ "title": "Snow Crash", "author": "Neal Stephenson", "status": "WISHLIST" })).await;
    let owned = create_book(&app, json!({ "title": "Anathem", "author": "Neal Stephenson" })).await;

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/books/{}/lend", wishlist["id"].as_str().unwrap()),
        Some(json!({ "borrowerName": "Bob", "borrowerContact": "bob", "expectedReturn": in_days(7) })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INVALID_STATE");

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/books/{}/lend", owned["id"].as_str().unwrap()),
        Some(json!({ "borrowerName": "Bob", "borrowerContact": "bob", "expectedReturn": in_days(-1) })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_VALUE");

    let (_, body) = send(&app, Method::GET, "/api/lending/history", None).await;
    assert_eq!(body["pagination"]["total"], 0);
}

#[tokio::test]
async fn test_history_pagination() {
    let app = app();
    let book = create_book(&app, json!({ "title": "Hyperion", "author": "Dan Simmons" })).await;
    let book_id = book["id"].as_str().unwrap().to_string();

    for borrower in ["Ann", "Ben", "Cat"] {
        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/api/books/{}/lend", book_id),
            Some(json!({ "borrowerName": borrower, "borrowerContact": "n/a", "expectedReturn": in_days(3) })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        let (status, _) = send(&app, Method::PUT, &format!("/api/books/{}/return", book_id), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(&app, Method::GET, "/api/lending/history?page=2&limit=2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["pagination"]["page"], 2);
    assert_eq!(body["pagination"]["total"], 3);
    assert_eq!(body["pagination"]["totalPages"], 2);

    let (_, body) = send(&app, Method::GET, "/api/lending/history?borrowerName=ben", None).await;
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["data"][0]["borrowerName"], "Ben");

    let (_, body) = send(&app, Method::GET, &format!("/api/books/{}", book_id), None).await;
    assert_eq!(body["data"]["lendingHistory"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_categories_and_filters() {
    let app = app();

    let (status, body) = send(&app, Method::POST, "/api/categories", Some(json!({ "name": "Science Fiction" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let category_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = send(&app, Method::POST, "/api/categories", Some(json!({ "name": "Science Fiction" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    create_book(&app, json!({ "title": "Foundation", "author": "Isaac Asimov", "categoryId": category_id })).await;
    create_book(&app, json!({ "title": "Emma", "author": "Jane Austen" })).await;

    let (_, body) = send(&app, Method::GET, "/api/categories", None).await;
    assert_eq!(body["data"][0]["bookCount"], 1);

    let (_, body) = send(&app, Method::GET, &format!("/api/books/category/{}", category_id), None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["category"]["name"], "Science Fiction");

    let (_, body) = send(&app, Method::GET, "/api/books/search?q=austen", None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["title"], "Emma");

    let (status, _) = send(&app, Method::GET, "/api/books/status/BORROWED", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = send(&app, Method::GET, "/api/books/stats", None).await;
    assert_eq!(body["data"]["totalBooks"], 2);
    assert_eq!(body["data"]["ownedBooks"], 2);
}

#[tokio::test]
async fn test_cover_upload_round_trip() {
    let app = app();
    let boundary = "bookshelf-test-boundary";
    let content = b"\x89PNG\r\n\x1a\nnot really an image";

    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"coverImage\"; filename=\"front cover.png\"\r\nContent-Type: image/png\r\n\r\n",
            b = boundary
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/upload/cover")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", boundary))
        .body(Body::from(body))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let uploaded: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(uploaded["data"]["type"], "cover");
    assert_eq!(uploaded["data"]["file"]["originalName"], "front cover.png");
    let filename = uploaded["data"]["file"]["filename"].as_str().unwrap().to_string();
    assert!(filename.starts_with("front_cover-"));

    let request = Request::builder()
        .uri(format!("/uploads/covers/{}", filename))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let served = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&served[..], &content[..]);

    let (_, body) = send(&app, Method::GET, "/api/upload/list/cover", None).await;
    assert_eq!(body["data"]["count"], 1);

    let (status, _) = send(&app, Method::DELETE, &format!("/api/upload/{}?type=cover", filename), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, Method::GET, &format!("/api/upload/info/{}?type=cover", filename), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_without_file_field() {
    let app = app();
    let boundary = "bookshelf-test-boundary";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n--{b}--\r\n",
        b = boundary
    );

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/upload/pdf")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", boundary))
        .body(Body::from(body))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_blank_fields_huge_pages_and_unknown_categories() {
    let app = app();

    let (status, body) = send(&app, Method::POST, "/api/books", Some(json!({ "title": "   ", "author": " " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_VALUE");

    let (status, _) = send(&app, Method::POST, "/api/categories", Some(json!({ "name": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::GET, "/api/lending/history?page=9223372036854775807", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::GET, "/api/books?page=9223372036854775807", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, Method::GET, &format!("/api/books/category/{}", Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Category not found");
}
