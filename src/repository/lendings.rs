//! Lendings repository for database operations
//!
//! Workflow writes lock the book row before the lending row, so a lend and
//! a return on the same book serialize on the book.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, QueryBuilder, Row, Transaction};
use uuid::Uuid;

use super::{contains_pattern, LendingStore};
use crate::{
    error::{AppError, AppResult},
    models::{
        lending::{LendBook, LendingCounts, LendingQuery, UpdateLending},
        Book, BookStatus, LendingDetails, LendingRecord, Pagination,
    },
};

const ALREADY_LENT: &str = "Book is already lent out";

#[derive(Clone)]
pub struct LendingsRepository {
    pool: Pool<Postgres>,
}

impl LendingsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Join each record with its book, preserving order
    async fn with_books(&self, records: Vec<LendingRecord>, now: DateTime<Utc>) -> AppResult<Vec<LendingDetails>> {
        let book_ids: Vec<Uuid> = records.iter().map(|r| r.book_id).collect();
        let books: HashMap<Uuid, Book> = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = ANY($1)")
            .bind(&book_ids)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|b| (b.id, b))
            .collect();

        records
            .into_iter()
            .map(|record| -> AppResult<LendingDetails> {
                let book = books.get(&record.book_id).cloned().ok_or_else(|| {
                    AppError::Internal(format!("Lending {} has no book", record.id))
                })?;
                Ok(LendingDetails::new(record, book, now))
            })
            .collect()
    }

    /// Close `record` and give its book back, inside `tx`
    async fn close(
        tx: &mut Transaction<'_, Postgres>,
        record: LendingRecord,
        now: DateTime<Utc>,
    ) -> AppResult<LendingRecord> {
        record.check_returnable()?;

        let returned = sqlx::query_as::<_, LendingRecord>(
            r#"
            UPDATE lendings SET is_returned = TRUE, actual_return = $2, updated_at = $2
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(record.id)
        .bind(now)
        .fetch_one(&mut **tx)
        .await?;

        sqlx::query("UPDATE books SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(record.book_id)
            .bind(BookStatus::Owned)
            .bind(now)
            .execute(&mut **tx)
            .await?;

        Ok(returned)
    }
}

async fn lock_book(tx: &mut Transaction<'_, Postgres>, book_id: Uuid) -> AppResult<Book> {
    sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1 FOR UPDATE")
        .bind(book_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Book not found".to_string()))
}

async fn lock_lending(tx: &mut Transaction<'_, Postgres>, lending_id: Uuid) -> AppResult<LendingRecord> {
    sqlx::query_as::<_, LendingRecord>("SELECT * FROM lendings WHERE id = $1 FOR UPDATE")
        .bind(lending_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Lending record not found".to_string()))
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &LendingQuery, now: DateTime<Utc>) {
    builder.push(" WHERE TRUE");

    if let Some(is_returned) = query.is_returned {
        builder.push(" AND is_returned = ").push_bind(is_returned);
    }
    match query.overdue {
        Some(true) => {
            builder.push(" AND NOT is_returned AND expected_return < ").push_bind(now);
        }
        Some(false) => {
            builder.push(" AND (is_returned OR expected_return >= ").push_bind(now).push(")");
        }
        None => {}
    }
    if let Some(ref name) = query.borrower_name {
        builder.push(" AND borrower_name ILIKE ").push_bind(contains_pattern(name));
    }
    if let Some(start) = query.start_date {
        builder.push(" AND date_lent >= ").push_bind(start);
    }
    if let Some(end) = query.end_date {
        builder.push(" AND date_lent <= ").push_bind(end);
    }
}

#[async_trait]
impl LendingStore for LendingsRepository {
    async fn lend(&self, book_id: Uuid, data: &LendBook, now: DateTime<Utc>) -> AppResult<LendingRecord> {
        let mut tx = self.pool.begin().await?;

        let book = lock_book(&mut tx, book_id).await?;
        let has_active: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM lendings WHERE book_id = $1 AND NOT is_returned)",
        )
        .bind(book_id)
        .fetch_one(&mut *tx)
        .await?;
        book.check_lendable(has_active, data.expected_return, now)?;

        let record = LendingRecord::new(book_id, data, now);
        let record = sqlx::query_as::<_, LendingRecord>(
            r#"
            INSERT INTO lendings (
                id, book_id, borrower_name, borrower_contact, date_lent, expected_return,
                actual_return, is_returned, notes, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, NULL, FALSE, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(record.id)
        .bind(record.book_id)
        .bind(&record.borrower_name)
        .bind(&record.borrower_contact)
        .bind(record.date_lent)
        .bind(record.expected_return)
        .bind(&record.notes)
        .bind(record.created_at)
        .bind(record.updated_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::from_db(e, ALREADY_LENT))?;

        sqlx::query("UPDATE books SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(book_id)
            .bind(BookStatus::Lent)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(record)
    }

    async fn return_lending(&self, lending_id: Uuid, now: DateTime<Utc>) -> AppResult<LendingRecord> {
        let book_id: Uuid = sqlx::query_scalar("SELECT book_id FROM lendings WHERE id = $1")
            .bind(lending_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Lending record not found".to_string()))?;

        let mut tx = self.pool.begin().await?;
        lock_book(&mut tx, book_id).await?;
        let record = lock_lending(&mut tx, lending_id).await?;
        let returned = Self::close(&mut tx, record, now).await?;
        tx.commit().await?;

        Ok(returned)
    }

    async fn return_for_book(&self, book_id: Uuid, now: DateTime<Utc>) -> AppResult<LendingRecord> {
        let mut tx = self.pool.begin().await?;
        lock_book(&mut tx, book_id).await?;

        let record = sqlx::query_as::<_, LendingRecord>(
            "SELECT * FROM lendings WHERE book_id = $1 AND NOT is_returned FOR UPDATE",
        )
        .bind(book_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("No active lending found for this book".to_string()))?;

        let returned = Self::close(&mut tx, record, now).await?;
        tx.commit().await?;

        Ok(returned)
    }

    async fn extend(
        &self,
        lending_id: Uuid,
        new_expected_return: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<LendingRecord> {
        let mut tx = self.pool.begin().await?;

        let record = lock_lending(&mut tx, lending_id).await?;
        record.check_extension(new_expected_return, now)?;

        let extended = sqlx::query_as::<_, LendingRecord>(
            "UPDATE lendings SET expected_return = $2, updated_at = $3 WHERE id = $1 RETURNING *",
        )
        .bind(lending_id)
        .bind(new_expected_return)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(extended)
    }

    async fn update(&self, lending_id: Uuid, data: &UpdateLending, now: DateTime<Utc>) -> AppResult<LendingRecord> {
        let mut tx = self.pool.begin().await?;

        let mut record = lock_lending(&mut tx, lending_id).await?;
        record.apply_update(data, now);

        let updated = sqlx::query_as::<_, LendingRecord>(
            r#"
            UPDATE lendings SET borrower_name = $2, borrower_contact = $3, notes = $4, updated_at = $5
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(lending_id)
        .bind(&record.borrower_name)
        .bind(&record.borrower_contact)
        .bind(&record.notes)
        .bind(record.updated_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn current(&self, now: DateTime<Utc>) -> AppResult<Vec<LendingDetails>> {
        let records = sqlx::query_as::<_, LendingRecord>(
            "SELECT * FROM lendings WHERE NOT is_returned ORDER BY date_lent DESC, id",
        )
        .fetch_all(&self.pool)
        .await?;

        self.with_books(records, now).await
    }

    async fn overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<LendingDetails>> {
        let records = sqlx::query_as::<_, LendingRecord>(
            r#"
            SELECT * FROM lendings
            WHERE NOT is_returned AND expected_return < $1
            ORDER BY expected_return ASC, id
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        self.with_books(records, now).await
    }

    async fn history(&self, query: &LendingQuery, now: DateTime<Utc>) -> AppResult<(Vec<LendingDetails>, i64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM lendings");
        push_filters(&mut count, query, now);
        let total: i64 = count.build().fetch_one(&self.pool).await?.get(0);

        let sort = query.sort_by.unwrap_or_default();
        let order = query.sort_order.unwrap_or_default();
        let mut select = QueryBuilder::<Postgres>::new("SELECT * FROM lendings");
        push_filters(&mut select, query, now);
        select
            .push(format!(" ORDER BY {} {} NULLS LAST, id", sort.column(), order.as_sql()))
            .push(" LIMIT ")
            .push_bind(query.limit())
            .push(" OFFSET ")
            .push_bind(Pagination::offset(query.page(), query.limit()));

        let records = select.build_query_as::<LendingRecord>().fetch_all(&self.pool).await?;
        Ok((self.with_books(records, now).await?, total))
    }

    async fn counts(&self, now: DateTime<Utc>) -> AppResult<LendingCounts> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE NOT is_returned) AS active,
                COUNT(*) FILTER (WHERE NOT is_returned AND expected_return < $1) AS overdue,
                COUNT(*) FILTER (WHERE is_returned) AS returned
            FROM lendings
            "#,
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        let returned_periods = sqlx::query(
            "SELECT date_lent, actual_return FROM lendings WHERE is_returned AND actual_return IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|r| (r.get::<DateTime<Utc>, _>("date_lent"), r.get::<DateTime<Utc>, _>("actual_return")))
        .collect();

        Ok(LendingCounts {
            total: row.get("total"),
            active: row.get("active"),
            overdue: row.get("overdue"),
            returned: row.get("returned"),
            returned_periods,
        })
    }
}
