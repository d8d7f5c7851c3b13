//! PostgreSQL store tests
//!
//! These run against a live database whose URL is read from `DATABASE_URL`;
//! migrations are applied on connect. Every test works on its own books.

use chrono::{Duration, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use bookshelf_server::{
    models::{
        book::{CreateBook, UpdateBook},
        lending::LendBook,
        BookStatus,
    },
    repository::Repository,
    services::{catalog::CatalogService, lending::LendingService},
    AppError,
};

async fn pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must point at a test database");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .expect("Failed to connect to database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

async fn services() -> (PgPool, CatalogService, LendingService) {
    let pool = pool().await;
    let repository = Repository::new(pool.clone());
    (
        pool,
        CatalogService::new(repository.clone()),
        LendingService::new(repository),
    )
}

/// 13 digits that no other test run will pick
fn fresh_isbn() -> String {
    format!("{:013}", Uuid::new_v4().as_u128() % 10_000_000_000_000)
}

fn new_book(title: &str) -> CreateBook {
    CreateBook {
        title: title.to_string(),
        author: "Marcus Reed".to_string(),
        ..Default::default()
    }
}

fn lend_to(name: &str) -> LendBook {
    LendBook {
        borrower_name: name.to_string(),
        borrower_contact: format!("{}@example.org", name.to_lowercase()),
        expected_return: Utc::now() + Duration::days(7),
        notes: None,
    }
}

/// (stored status, number of open records) read straight from the tables
async fn stored_state(pool: &PgPool, book_id: Uuid) -> (BookStatus, i64) {
    let status: BookStatus = sqlx::query_scalar("SELECT status FROM books WHERE id = $1")
        .bind(book_id)
        .fetch_one(pool)
        .await
        .unwrap();
    let active: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM lendings WHERE book_id = $1 AND NOT is_returned")
            .bind(book_id)
            .fetch_one(pool)
            .await
            .unwrap();
    (status, active)
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_lend_and_return_keep_status_and_record_in_step() {
    let (pool, catalog, lending) = services().await;
    let book = catalog.create_book(new_book("Neuromancer")).await.unwrap();
    assert_eq!(stored_state(&pool, book.id).await, (BookStatus::Owned, 0));

    let lent = lending.lend(book.id, lend_to("Alice")).await.unwrap();
    assert_eq!(lent.book.status, BookStatus::Lent);
    assert_eq!(stored_state(&pool, book.id).await, (BookStatus::Lent, 1));

    let again = lending.lend(book.id, lend_to("Bob")).await;
    assert!(matches!(again, Err(AppError::Conflict(_))));
    assert_eq!(stored_state(&pool, book.id).await, (BookStatus::Lent, 1));

    let returned = lending.return_lending(lent.lending.id).await.unwrap();
    assert!(returned.lending.is_returned);
    assert!(returned.lending.actual_return.is_some());
    assert_eq!(stored_state(&pool, book.id).await, (BookStatus::Owned, 0));

    let twice = lending.return_lending(lent.lending.id).await;
    assert!(matches!(twice, Err(AppError::InvalidState(_))));
    assert_eq!(stored_state(&pool, book.id).await, (BookStatus::Owned, 0));
}

#[tokio::test]
#[ignore]
async fn test_concurrent_lends_let_exactly_one_through() {
    let (pool, catalog, lending) = services().await;
    let book_id = catalog.create_book(new_book("Hyperion")).await.unwrap().id;

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let lending = lending.clone();
            tokio::spawn(async move { lending.lend(book_id, lend_to(&format!("Borrower{}", i))).await })
        })
        .collect();

    let mut lent = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => lent += 1,
            Err(AppError::Conflict(_)) => {}
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }
    assert_eq!(lent, 1);
    assert_eq!(stored_state(&pool, book_id).await, (BookStatus::Lent, 1));
}

#[tokio::test]
#[ignore]
async fn test_open_record_wins_over_drifted_status() {
    let (pool, catalog, lending) = services().await;
    let book_id = catalog.create_book(new_book("Anathem")).await.unwrap().id;
    lending.lend(book_id, lend_to("Alice")).await.unwrap();

    sqlx::query("UPDATE books SET status = 'OWNED' WHERE id = $1")
        .bind(book_id)
        .execute(&pool)
        .await
        .unwrap();

    let again = lending.lend(book_id, lend_to("Bob")).await;
    assert!(matches!(again, Err(AppError::Conflict(_))));
    assert_eq!(stored_state(&pool, book_id).await.1, 1);
}

#[tokio::test]
#[ignore]
async fn test_second_open_record_is_refused_by_the_schema() {
    let (pool, catalog, lending) = services().await;
    let book_id = catalog.create_book(new_book("Snow Crash")).await.unwrap().id;
    lending.lend(book_id, lend_to("Alice")).await.unwrap();

    let error = sqlx::query(
        r#"
        INSERT INTO lendings (
            id, book_id, borrower_name, borrower_contact, date_lent, expected_return,
            is_returned, created_at, updated_at
        )
        VALUES ($1, $2, 'Bob', 'bob', NOW(), NOW() + INTERVAL '7 days', FALSE, NOW(), NOW())
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(book_id)
    .execute(&pool)
    .await
    .unwrap_err();

    assert!(matches!(
        AppError::from_db(error, "Book is already lent out"),
        AppError::Conflict(_)
    ));
}

#[tokio::test]
#[ignore]
async fn test_lent_book_cannot_be_deleted() {
    let (pool, catalog, lending) = services().await;
    let book_id = catalog.create_book(new_book("Foundation")).await.unwrap().id;
    let lent = lending.lend(book_id, lend_to("Alice")).await.unwrap();

    let refused = catalog.delete_book(book_id).await;
    assert!(matches!(refused, Err(AppError::InvalidState(_))));
    assert_eq!(stored_state(&pool, book_id).await, (BookStatus::Lent, 1));

    lending.return_lending(lent.lending.id).await.unwrap();
    catalog.delete_book(book_id).await.unwrap();

    let history: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lendings WHERE book_id = $1")
        .bind(book_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(history, 0);
    assert!(matches!(catalog.get_book(book_id).await, Err(AppError::NotFound(_))));
}

#[tokio::test]
#[ignore]
async fn test_isbn_conflicts_on_create_and_update() {
    let (_pool, catalog, _lending) = services().await;
    let taken = fresh_isbn();

    let mut first = new_book("Dune");
    first.isbn = Some(taken.clone());
    let first = catalog.create_book(first).await.unwrap();

    let mut duplicate = new_book("Dune (reprint)");
    duplicate.isbn = Some(taken.clone());
    assert!(matches!(catalog.create_book(duplicate).await, Err(AppError::Conflict(_))));

    let second = catalog.create_book(new_book("Children of Dune")).await.unwrap();
    let clash = UpdateBook {
        isbn: Some(taken.clone()),
        ..Default::default()
    };
    assert!(matches!(
        catalog.update_book(second.id, clash).await,
        Err(AppError::Conflict(_))
    ));

    let keep = UpdateBook {
        isbn: Some(taken.clone()),
        ..Default::default()
    };
    let kept = catalog.update_book(first.id, keep).await.unwrap();
    assert_eq!(kept.isbn, Some(taken));
}
