//! Catalog service: books and categories

use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppResult,
    models::{
        book::{BookQuery, BookSearchQuery, BookStats, CreateBook, UpdateBook},
        category::CreateCategory,
        Book, BookDetails, BookStatus, BookWithLending, Category, CategoryWithCount, Pagination,
        DEFAULT_PAGE_SIZE,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
}

impl CatalogService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Filtered, paginated book listing
    pub async fn list_books(&self, query: &BookQuery) -> AppResult<(Vec<BookWithLending>, Pagination)> {
        query.validate()?;
        let (books, total) = self.repository.books.list(query).await?;
        Ok((books, Pagination::new(query.page(), query.limit(), total)))
    }

    pub async fn search_books(&self, query: &BookSearchQuery) -> AppResult<Vec<BookWithLending>> {
        query.validate()?;
        self.repository
            .books
            .search(query.q.trim(), query.limit.unwrap_or(DEFAULT_PAGE_SIZE))
            .await
    }

    pub async fn books_by_status(&self, status: &str) -> AppResult<Vec<BookWithLending>> {
        let status: BookStatus = status.parse()?;
        self.repository.books.by_status(status).await
    }

    /// Books filed under a category; unknown categories are NotFound
    pub async fn books_by_category(&self, category_id: Uuid) -> AppResult<Vec<BookWithLending>> {
        let category = self.repository.categories.get(category_id).await?;
        self.repository.books.by_category(category.id).await
    }

    /// Book with category and full lending history
    pub async fn get_book(&self, id: Uuid) -> AppResult<BookDetails> {
        self.repository.books.details(id).await
    }

    pub async fn create_book(&self, data: CreateBook) -> AppResult<Book> {
        data.validate()?;
        let status = data.initial_status()?;

        let book = self
            .repository
            .books
            .create(&Book::new(&data, status, Utc::now()))
            .await?;

        tracing::info!(book_id = %book.id, "Book created");
        Ok(book)
    }

    pub async fn update_book(&self, id: Uuid, data: UpdateBook) -> AppResult<Book> {
        data.validate()?;
        let book = self.repository.books.update(id, &data, Utc::now()).await?;

        tracing::info!(book_id = %id, "Book updated");
        Ok(book)
    }

    pub async fn delete_book(&self, id: Uuid) -> AppResult<()> {
        self.repository.books.delete(id).await?;

        tracing::info!(book_id = %id, "Book deleted");
        Ok(())
    }

    pub async fn book_stats(&self) -> AppResult<BookStats> {
        let mut stats = BookStats {
            categories_with_counts: self.repository.categories.list_with_counts().await?,
            ..Default::default()
        };
        for (status, count) in self.repository.books.count_by_status().await? {
            stats.total_books += count;
            match status {
                BookStatus::Owned => stats.owned_books += count,
                BookStatus::Lent => stats.lent_books += count,
                BookStatus::Wishlist => stats.wishlist_books += count,
                BookStatus::Lost => stats.lost_books += count,
            }
        }
        Ok(stats)
    }

    pub async fn list_categories(&self) -> AppResult<Vec<CategoryWithCount>> {
        self.repository.categories.list_with_counts().await
    }

    pub async fn create_category(&self, data: CreateCategory) -> AppResult<Category> {
        data.validate()?;
        let category = self
            .repository
            .categories
            .create(&Category::new(&data, Utc::now()))
            .await?;

        tracing::info!(category_id = %category.id, "Category created");
        Ok(category)
    }
}
