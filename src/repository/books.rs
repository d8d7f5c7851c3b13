//! Books repository for database operations

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use super::{contains_pattern, BookStore};
use crate::{
    error::{AppError, AppResult},
    models::{
        book::{BookQuery, UpdateBook},
        Book, BookDetails, BookStatus, BookWithLending, Category, LendingRecord, Pagination,
    },
};

const ISBN_TAKEN: &str = "A book with this ISBN already exists";

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Attach category and active lending to each book, preserving order
    async fn with_relations(&self, books: Vec<Book>) -> AppResult<Vec<BookWithLending>> {
        if books.is_empty() {
            return Ok(Vec::new());
        }

        let book_ids: Vec<Uuid> = books.iter().map(|b| b.id).collect();
        let category_ids: Vec<Uuid> = books.iter().filter_map(|b| b.category_id).collect();

        let categories: HashMap<Uuid, Category> =
            sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = ANY($1)")
                .bind(&category_ids)
                .fetch_all(&self.pool)
                .await?
                .into_iter()
                .map(|c| (c.id, c))
                .collect();

        let mut active: HashMap<Uuid, LendingRecord> = sqlx::query_as::<_, LendingRecord>(
            "SELECT * FROM lendings WHERE book_id = ANY($1) AND NOT is_returned",
        )
        .bind(&book_ids)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|l| (l.book_id, l))
        .collect();

        Ok(books
            .into_iter()
            .map(|book| BookWithLending {
                category: book.category_id.and_then(|id| categories.get(&id).cloned()),
                active_lending: active.remove(&book.id),
                book,
            })
            .collect())
    }

    async fn ensure_category(&self, category_id: Option<Uuid>) -> AppResult<()> {
        let Some(category_id) = category_id else {
            return Ok(());
        };
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM categories WHERE id = $1)")
            .bind(category_id)
            .fetch_one(&self.pool)
            .await?;
        if !exists {
            return Err(AppError::Validation("Category not found".to_string()));
        }
        Ok(())
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &BookQuery) {
    builder.push(" WHERE TRUE");

    if let Some(ref term) = query.query {
        let pattern = contains_pattern(term);
        builder
            .push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR author ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(status);
    }
    if let Some(ref genre) = query.genre {
        builder.push(" AND genre = ").push_bind(genre.clone());
    }
    if let Some(category_id) = query.category_id {
        builder.push(" AND category_id = ").push_bind(category_id);
    }
    if let Some(ref author) = query.author {
        builder.push(" AND author ILIKE ").push_bind(contains_pattern(author));
    }
}

#[async_trait]
impl BookStore for BooksRepository {
    async fn list(&self, query: &BookQuery) -> AppResult<(Vec<BookWithLending>, i64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM books");
        push_filters(&mut count, query);
        let total: i64 = count.build().fetch_one(&self.pool).await?.get(0);

        let sort = query.sort_by.unwrap_or_default();
        let order = query.sort_order.unwrap_or_default();
        let mut select = QueryBuilder::<Postgres>::new("SELECT * FROM books");
        push_filters(&mut select, query);
        select
            .push(format!(" ORDER BY {} {}, id", sort.column(), order.as_sql()))
            .push(" LIMIT ")
            .push_bind(query.limit())
            .push(" OFFSET ")
            .push_bind(Pagination::offset(query.page(), query.limit()));

        let books = select.build_query_as::<Book>().fetch_all(&self.pool).await?;
        Ok((self.with_relations(books).await?, total))
    }

    async fn search(&self, term: &str, limit: i64) -> AppResult<Vec<BookWithLending>> {
        let books = sqlx::query_as::<_, Book>(
            r#"
            SELECT * FROM books
            WHERE title ILIKE $1 OR author ILIKE $1 OR description ILIKE $1 OR genre ILIKE $1
            ORDER BY title ASC, id
            LIMIT $2
            "#,
        )
        .bind(contains_pattern(term))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        self.with_relations(books).await
    }

    async fn by_status(&self, status: BookStatus) -> AppResult<Vec<BookWithLending>> {
        let books = sqlx::query_as::<_, Book>(
            "SELECT * FROM books WHERE status = $1 ORDER BY updated_at DESC, id",
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        self.with_relations(books).await
    }

    async fn by_category(&self, category_id: Uuid) -> AppResult<Vec<BookWithLending>> {
        let books = sqlx::query_as::<_, Book>(
            "SELECT * FROM books WHERE category_id = $1 ORDER BY title ASC, id",
        )
        .bind(category_id)
        .fetch_all(&self.pool)
        .await?;

        self.with_relations(books).await
    }

    async fn get(&self, id: Uuid) -> AppResult<Book> {
        sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Book not found".to_string()))
    }

    async fn details(&self, id: Uuid) -> AppResult<BookDetails> {
        let book = self.get(id).await?;

        let category = match book.category_id {
            Some(category_id) => {
                sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = $1")
                    .bind(category_id)
                    .fetch_optional(&self.pool)
                    .await?
            }
            None => None,
        };

        let lending_history = sqlx::query_as::<_, LendingRecord>(
            "SELECT * FROM lendings WHERE book_id = $1 ORDER BY date_lent DESC, id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(BookDetails {
            book,
            category,
            lending_history,
        })
    }

    async fn create(&self, book: &Book) -> AppResult<Book> {
        if let Some(ref isbn) = book.isbn {
            let taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM books WHERE isbn = $1)")
                .bind(isbn)
                .fetch_one(&self.pool)
                .await?;
            if taken {
                return Err(AppError::Conflict(ISBN_TAKEN.to_string()));
            }
        }
        self.ensure_category(book.category_id).await?;

        sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (
                id, title, author, isbn, genre, description, cover_image_url,
                pdf_file_url, status, category_id, date_added, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(book.id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(&book.genre)
        .bind(&book.description)
        .bind(&book.cover_image_url)
        .bind(&book.pdf_file_url)
        .bind(book.status)
        .bind(book.category_id)
        .bind(book.date_added)
        .bind(book.created_at)
        .bind(book.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::from_db(e, ISBN_TAKEN))
    }

    async fn update(&self, id: Uuid, data: &UpdateBook, now: DateTime<Utc>) -> AppResult<Book> {
        let mut tx = self.pool.begin().await?;

        let mut book = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Book not found".to_string()))?;

        let has_active: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM lendings WHERE book_id = $1 AND NOT is_returned)",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        book.check_status_change(data.status, has_active)?;

        if let Some(isbn) = data.new_isbn() {
            let taken: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM books WHERE isbn = $1 AND id <> $2)",
            )
            .bind(&isbn)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
            if taken {
                return Err(AppError::Conflict(ISBN_TAKEN.to_string()));
            }
        }
        if let Some(category_id) = data.new_category() {
            let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM categories WHERE id = $1)")
                .bind(category_id)
                .fetch_one(&mut *tx)
                .await?;
            if !exists {
                return Err(AppError::Validation("Category not found".to_string()));
            }
        }

        book.apply_update(data, now);

        let updated = sqlx::query_as::<_, Book>(
            r#"
            UPDATE books SET
                title = $2, author = $3, isbn = $4, genre = $5, description = $6,
                cover_image_url = $7, pdf_file_url = $8, status = $9, category_id = $10,
                updated_at = $11
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(&book.genre)
        .bind(&book.description)
        .bind(&book.cover_image_url)
        .bind(&book.pdf_file_url)
        .bind(book.status)
        .bind(book.category_id)
        .bind(book.updated_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::from_db(e, ISBN_TAKEN))?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT id FROM books WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Book not found".to_string()))?;

        let has_active: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM lendings WHERE book_id = $1 AND NOT is_returned)",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if has_active {
            return Err(AppError::InvalidState(
                "Cannot delete a book that is currently lent out".to_string(),
            ));
        }

        // Closed records go with the book (ON DELETE CASCADE)
        sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn count_by_status(&self) -> AppResult<Vec<(BookStatus, i64)>> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM books GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get::<BookStatus, _>("status"), row.get::<i64, _>("count")))
            .collect())
    }
}
