//! Repository layer: storage traits and their backends
//!
//! Every operation that touches more than one row runs atomically inside
//! its backend (a transaction for PostgreSQL, the write lock for the
//! in-memory store), and calls the rule functions on the models inside
//! that atomic section.

pub mod books;
pub mod categories;
pub mod lendings;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        book::{BookQuery, UpdateBook},
        lending::{LendBook, LendingCounts, LendingQuery, UpdateLending},
        Book, BookDetails, BookStatus, BookWithLending, Category, CategoryWithCount,
        LendingDetails, LendingRecord,
    },
};

/// Book storage
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BookStore: Send + Sync {
    /// Filtered page of books and the total matching count
    async fn list(&self, query: &BookQuery) -> AppResult<(Vec<BookWithLending>, i64)>;
    /// Substring search over title, author, description and genre
    async fn search(&self, term: &str, limit: i64) -> AppResult<Vec<BookWithLending>>;
    async fn by_status(&self, status: BookStatus) -> AppResult<Vec<BookWithLending>>;
    async fn by_category(&self, category_id: Uuid) -> AppResult<Vec<BookWithLending>>;
    async fn get(&self, id: Uuid) -> AppResult<Book>;
    async fn details(&self, id: Uuid) -> AppResult<BookDetails>;
    /// Insert; ISBN collisions give Conflict, unknown categories Validation
    async fn create(&self, book: &Book) -> AppResult<Book>;
    /// Apply an update under the book's lock, enforcing status and ISBN rules
    async fn update(&self, id: Uuid, data: &UpdateBook, now: DateTime<Utc>) -> AppResult<Book>;
    /// Remove a book and its closed lending records; refused while lent
    async fn delete(&self, id: Uuid) -> AppResult<()>;
    async fn count_by_status(&self) -> AppResult<Vec<(BookStatus, i64)>>;
}

/// Lending records and the lending workflow writes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LendingStore: Send + Sync {
    /// Open a record and mark the book LENT, atomically
    async fn lend(&self, book_id: Uuid, data: &LendBook, now: DateTime<Utc>) -> AppResult<LendingRecord>;
    /// Close a record and mark its book OWNED, atomically
    async fn return_lending(&self, lending_id: Uuid, now: DateTime<Utc>) -> AppResult<LendingRecord>;
    /// Close the active record of a book
    async fn return_for_book(&self, book_id: Uuid, now: DateTime<Utc>) -> AppResult<LendingRecord>;
    async fn extend(
        &self,
        lending_id: Uuid,
        new_expected_return: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<LendingRecord>;
    async fn update(&self, lending_id: Uuid, data: &UpdateLending, now: DateTime<Utc>) -> AppResult<LendingRecord>;
    /// Active records, newest first
    async fn current(&self, now: DateTime<Utc>) -> AppResult<Vec<LendingDetails>>;
    /// Active records past due, most overdue first
    async fn overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<LendingDetails>>;
    async fn history(&self, query: &LendingQuery, now: DateTime<Utc>) -> AppResult<(Vec<LendingDetails>, i64)>;
    async fn counts(&self, now: DateTime<Utc>) -> AppResult<LendingCounts>;
}

/// Category storage
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CategoryStore: Send + Sync {
    /// All categories by name, with their book counts
    async fn list_with_counts(&self) -> AppResult<Vec<CategoryWithCount>>;
    async fn get(&self, id: Uuid) -> AppResult<Category>;
    /// Insert; duplicate names give Conflict
    async fn create(&self, category: &Category) -> AppResult<Category>;
}

/// Main repository struct holding the stores
#[derive(Clone)]
pub struct Repository {
    pub books: Arc<dyn BookStore>,
    pub lendings: Arc<dyn LendingStore>,
    pub categories: Arc<dyn CategoryStore>,
    pool: Option<Pool<Postgres>>,
}

impl Repository {
    /// Create a repository backed by the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            books: Arc::new(books::BooksRepository::new(pool.clone())),
            lendings: Arc::new(lendings::LendingsRepository::new(pool.clone())),
            categories: Arc::new(categories::CategoriesRepository::new(pool.clone())),
            pool: Some(pool),
        }
    }

    /// Create a repository that keeps everything in process memory
    pub fn in_memory() -> Self {
        let store = Arc::new(memory::MemoryStore::default());
        Self {
            books: store.clone(),
            lendings: store.clone(),
            categories: store,
            pool: None,
        }
    }

    /// Assemble a repository from arbitrary stores
    pub fn from_stores(
        books: Arc<dyn BookStore>,
        lendings: Arc<dyn LendingStore>,
        categories: Arc<dyn CategoryStore>,
    ) -> Self {
        Self {
            books,
            lendings,
            categories,
            pool: None,
        }
    }

    /// Check that the backing store answers
    pub async fn ping(&self) -> AppResult<()> {
        if let Some(ref pool) = self.pool {
            sqlx::query("SELECT 1").execute(pool).await?;
        }
        Ok(())
    }
}

/// `%term%` for ILIKE, with LIKE metacharacters escaped
pub(crate) fn contains_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_metacharacters_are_escaped() {
        assert_eq!(contains_pattern("abc"), "%abc%");
        assert_eq!(contains_pattern("50%_off"), "%50\\%\\_off%");
    }
}
