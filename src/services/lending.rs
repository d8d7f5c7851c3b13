//! Lending workflow service
//!
//! The rules themselves live on the models and are applied by the stores
//! inside their atomic sections; this layer validates input, stamps the
//! current time and logs the transitions.

use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppResult,
    models::{
        lending::{ExtendLending, LendBook, LendingQuery, UpdateLending},
        LendingDetails, LendingRecord, LendingStats, Pagination,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct LendingService {
    repository: Repository,
}

impl LendingService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Lend a book; the returned record carries the book in its new state
    pub async fn lend(&self, book_id: Uuid, data: LendBook) -> AppResult<LendingDetails> {
        data.validate()?;
        let now = Utc::now();

        let record = self.repository.lendings.lend(book_id, &data, now).await?;
        tracing::info!(book_id = %book_id, lending_id = %record.id, "Book lent");

        self.with_book(record).await
    }

    /// Close a lending record and give the book back
    pub async fn return_lending(&self, lending_id: Uuid) -> AppResult<LendingDetails> {
        let record = self.repository.lendings.return_lending(lending_id, Utc::now()).await?;
        tracing::info!(book_id = %record.book_id, lending_id = %lending_id, "Book returned");

        self.with_book(record).await
    }

    /// Close whatever record currently holds `book_id`
    pub async fn return_book(&self, book_id: Uuid) -> AppResult<LendingDetails> {
        let record = self.repository.lendings.return_for_book(book_id, Utc::now()).await?;
        tracing::info!(book_id = %book_id, lending_id = %record.id, "Book returned");

        self.with_book(record).await
    }

    pub async fn extend(&self, lending_id: Uuid, data: ExtendLending) -> AppResult<LendingDetails> {
        let record = self
            .repository
            .lendings
            .extend(lending_id, data.new_expected_return, Utc::now())
            .await?;
        tracing::info!(
            lending_id = %lending_id,
            expected_return = %record.expected_return,
            "Lending extended"
        );

        self.with_book(record).await
    }

    /// Edit borrower details
    pub async fn update(&self, lending_id: Uuid, data: UpdateLending) -> AppResult<LendingDetails> {
        data.validate()?;
        let record = self.repository.lendings.update(lending_id, &data, Utc::now()).await?;
        tracing::info!(lending_id = %lending_id, "Lending updated");

        self.with_book(record).await
    }

    pub async fn current(&self) -> AppResult<Vec<LendingDetails>> {
        self.repository.lendings.current(Utc::now()).await
    }

    pub async fn overdue(&self) -> AppResult<Vec<LendingDetails>> {
        self.repository.lendings.overdue(Utc::now()).await
    }

    pub async fn history(&self, query: &LendingQuery) -> AppResult<(Vec<LendingDetails>, Pagination)> {
        query.validate()?;
        let (records, total) = self.repository.lendings.history(query, Utc::now()).await?;
        Ok((records, Pagination::new(query.page(), query.limit(), total)))
    }

    pub async fn stats(&self) -> AppResult<LendingStats> {
        let counts = self.repository.lendings.counts(Utc::now()).await?;
        Ok(counts.into())
    }

    async fn with_book(&self, record: LendingRecord) -> AppResult<LendingDetails> {
        let book = self.repository.books.get(record.book_id).await?;
        Ok(LendingDetails::new(record, book, Utc::now()))
    }
}
