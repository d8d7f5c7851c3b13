//! In-process store used by the test-suite and for database-less runs
//!
//! Each operation holds the write lock across its checks and writes, which
//! gives the same all-or-nothing behaviour as a database transaction.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{BookStore, CategoryStore, LendingStore};
use crate::{
    error::{AppError, AppResult},
    models::{
        book::{BookQuery, BookSortField, UpdateBook},
        lending::{LendBook, LendingCounts, LendingQuery, LendingSortField, UpdateLending},
        Book, BookDetails, BookStatus, BookWithLending, Category, CategoryWithCount,
        LendingDetails, LendingRecord, Pagination, SortOrder,
    },
};

#[derive(Debug, Default)]
struct State {
    books: HashMap<Uuid, Book>,
    lendings: HashMap<Uuid, LendingRecord>,
    categories: HashMap<Uuid, Category>,
}

impl State {
    fn book(&self, id: Uuid) -> AppResult<&Book> {
        self.books
            .get(&id)
            .ok_or_else(|| AppError::NotFound("Book not found".to_string()))
    }

    fn lending(&self, id: Uuid) -> AppResult<&LendingRecord> {
        self.lendings
            .get(&id)
            .ok_or_else(|| AppError::NotFound("Lending record not found".to_string()))
    }

    fn active_for(&self, book_id: Uuid) -> Option<&LendingRecord> {
        self.lendings
            .values()
            .find(|l| l.book_id == book_id && !l.is_returned)
    }

    fn isbn_taken(&self, isbn: &str, except: Option<Uuid>) -> bool {
        self.books
            .values()
            .any(|b| b.isbn.as_deref() == Some(isbn) && Some(b.id) != except)
    }

    fn ensure_category(&self, category_id: Option<Uuid>) -> AppResult<()> {
        match category_id {
            Some(id) if !self.categories.contains_key(&id) => {
                Err(AppError::Validation("Category not found".to_string()))
            }
            _ => Ok(()),
        }
    }

    fn with_relations(&self, book: &Book) -> BookWithLending {
        BookWithLending {
            category: book.category_id.and_then(|id| self.categories.get(&id).cloned()),
            active_lending: self.active_for(book.id).cloned(),
            book: book.clone(),
        }
    }

    fn details(&self, record: &LendingRecord, now: DateTime<Utc>) -> AppResult<LendingDetails> {
        let book = self.book(record.book_id)?.clone();
        Ok(LendingDetails::new(record.clone(), book, now))
    }

    /// Close `lending_id` and give its book back
    fn close(&mut self, lending_id: Uuid, now: DateTime<Utc>) -> AppResult<LendingRecord> {
        let record = self.lending(lending_id)?;
        record.check_returnable()?;
        let book_id = record.book_id;

        let record = self
            .lendings
            .get_mut(&lending_id)
            .ok_or_else(|| AppError::NotFound("Lending record not found".to_string()))?;
        record.mark_returned(now);
        let record = record.clone();

        if let Some(book) = self.books.get_mut(&book_id) {
            book.status = BookStatus::Owned;
            book.updated_at = now;
        }
        Ok(record)
    }
}

fn order(ordering: Ordering, order: SortOrder) -> Ordering {
    match order {
        SortOrder::Asc => ordering,
        SortOrder::Desc => ordering.reverse(),
    }
}

fn compare_books(a: &Book, b: &Book, field: BookSortField, direction: SortOrder) -> Ordering {
    let ordering = match field {
        BookSortField::Title => a.title.cmp(&b.title),
        BookSortField::Author => a.author.cmp(&b.author),
        BookSortField::DateAdded => a.date_added.cmp(&b.date_added),
        BookSortField::CreatedAt => a.created_at.cmp(&b.created_at),
        BookSortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
    };
    order(ordering, direction).then_with(|| a.id.cmp(&b.id))
}

fn compare_lendings(a: &LendingRecord, b: &LendingRecord, field: LendingSortField, direction: SortOrder) -> Ordering {
    let ordering = match field {
        LendingSortField::DateLent => a.date_lent.cmp(&b.date_lent),
        LendingSortField::ExpectedReturn => a.expected_return.cmp(&b.expected_return),
        LendingSortField::BorrowerName => a.borrower_name.cmp(&b.borrower_name),
        // open records sort last either way
        LendingSortField::ActualReturn => match (a.actual_return, b.actual_return) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => return Ordering::Less,
            (None, Some(_)) => return Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
    };
    order(ordering, direction).then_with(|| a.id.cmp(&b.id))
}

fn contains(haystack: Option<&str>, needle: &str) -> bool {
    haystack.is_some_and(|h| h.to_lowercase().contains(needle))
}

fn matches_book(book: &Book, query: &BookQuery) -> bool {
    if let Some(ref term) = query.query {
        let term = term.to_lowercase();
        if !(contains(Some(book.title.as_str()), &term)
            || contains(Some(book.author.as_str()), &term)
            || contains(book.description.as_deref(), &term))
        {
            return false;
        }
    }
    if query.status.is_some_and(|s| s != book.status) {
        return false;
    }
    if let Some(ref genre) = query.genre {
        if book.genre.as_ref() != Some(genre) {
            return false;
        }
    }
    if query.category_id.is_some() && query.category_id != book.category_id {
        return false;
    }
    if let Some(ref author) = query.author {
        if !contains(Some(book.author.as_str()), &author.to_lowercase()) {
            return false;
        }
    }
    true
}

fn page<T>(items: Vec<T>, page: i64, limit: i64) -> Vec<T> {
    let offset = Pagination::offset(page, limit).max(0) as usize;
    items.into_iter().skip(offset).take(limit.max(0) as usize).collect()
}

/// Books, lendings and categories behind one lock
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

#[async_trait]
impl BookStore for MemoryStore {
    async fn list(&self, query: &BookQuery) -> AppResult<(Vec<BookWithLending>, i64)> {
        let state = self.state.read().await;
        let field = query.sort_by.unwrap_or_default();
        let direction = query.sort_order.unwrap_or_default();

        let mut books: Vec<&Book> = state.books.values().filter(|b| matches_book(b, query)).collect();
        books.sort_by(|a, b| compare_books(a, b, field, direction));
        let total = books.len() as i64;

        let books = page(books, query.page(), query.limit())
            .into_iter()
            .map(|b| state.with_relations(b))
            .collect();
        Ok((books, total))
    }

    async fn search(&self, term: &str, limit: i64) -> AppResult<Vec<BookWithLending>> {
        let state = self.state.read().await;
        let term = term.to_lowercase();

        let mut books: Vec<&Book> = state
            .books
            .values()
            .filter(|b| {
                contains(Some(b.title.as_str()), &term)
                    || contains(Some(b.author.as_str()), &term)
                    || contains(b.description.as_deref(), &term)
                    || contains(b.genre.as_deref(), &term)
            })
            .collect();
        books.sort_by(|a, b| compare_books(a, b, BookSortField::Title, SortOrder::Asc));

        Ok(books
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|b| state.with_relations(b))
            .collect())
    }

    async fn by_status(&self, status: BookStatus) -> AppResult<Vec<BookWithLending>> {
        let state = self.state.read().await;
        let mut books: Vec<&Book> = state.books.values().filter(|b| b.status == status).collect();
        books.sort_by(|a, b| compare_books(a, b, BookSortField::UpdatedAt, SortOrder::Desc));
        Ok(books.into_iter().map(|b| state.with_relations(b)).collect())
    }

    async fn by_category(&self, category_id: Uuid) -> AppResult<Vec<BookWithLending>> {
        let state = self.state.read().await;
        let mut books: Vec<&Book> = state
            .books
            .values()
            .filter(|b| b.category_id == Some(category_id))
            .collect();
        books.sort_by(|a, b| compare_books(a, b, BookSortField::Title, SortOrder::Asc));
        Ok(books.into_iter().map(|b| state.with_relations(b)).collect())
    }

    async fn get(&self, id: Uuid) -> AppResult<Book> {
        self.state.read().await.book(id).cloned()
    }

    async fn details(&self, id: Uuid) -> AppResult<BookDetails> {
        let state = self.state.read().await;
        let book = state.book(id)?.clone();

        let mut lending_history: Vec<LendingRecord> = state
            .lendings
            .values()
            .filter(|l| l.book_id == id)
            .cloned()
            .collect();
        lending_history.sort_by(|a, b| compare_lendings(a, b, LendingSortField::DateLent, SortOrder::Desc));

        Ok(BookDetails {
            category: book.category_id.and_then(|c| state.categories.get(&c).cloned()),
            book,
            lending_history,
        })
    }

    async fn create(&self, book: &Book) -> AppResult<Book> {
        let mut state = self.state.write().await;
        if let Some(ref isbn) = book.isbn {
            if state.isbn_taken(isbn, None) {
                return Err(AppError::Conflict("A book with this ISBN already exists".to_string()));
            }
        }
        state.ensure_category(book.category_id)?;

        state.books.insert(book.id, book.clone());
        Ok(book.clone())
    }

    async fn update(&self, id: Uuid, data: &UpdateBook, now: DateTime<Utc>) -> AppResult<Book> {
        let mut state = self.state.write().await;

        let has_active = state.active_for(id).is_some();
        state.book(id)?.check_status_change(data.status, has_active)?;
        if let Some(isbn) = data.new_isbn() {
            if state.isbn_taken(&isbn, Some(id)) {
                return Err(AppError::Conflict("A book with this ISBN already exists".to_string()));
            }
        }
        state.ensure_category(data.new_category())?;

        let book = state
            .books
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Book not found".to_string()))?;
        book.apply_update(data, now);
        Ok(book.clone())
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.book(id)?;
        if state.active_for(id).is_some() {
            return Err(AppError::InvalidState(
                "Cannot delete a book that is currently lent out".to_string(),
            ));
        }

        state.lendings.retain(|_, l| l.book_id != id);
        state.books.remove(&id);
        Ok(())
    }

    async fn count_by_status(&self) -> AppResult<Vec<(BookStatus, i64)>> {
        let state = self.state.read().await;
        Ok(BookStatus::ALL
            .into_iter()
            .map(|status| {
                let count = state.books.values().filter(|b| b.status == status).count() as i64;
                (status, count)
            })
            .filter(|(_, count)| *count > 0)
            .collect())
    }
}

#[async_trait]
impl LendingStore for MemoryStore {
    async fn lend(&self, book_id: Uuid, data: &LendBook, now: DateTime<Utc>) -> AppResult<LendingRecord> {
        let mut state = self.state.write().await;

        let has_active = state.active_for(book_id).is_some();
        state.book(book_id)?.check_lendable(has_active, data.expected_return, now)?;

        let record = LendingRecord::new(book_id, data, now);
        state.lendings.insert(record.id, record.clone());
        if let Some(book) = state.books.get_mut(&book_id) {
            book.status = BookStatus::Lent;
            book.updated_at = now;
        }
        Ok(record)
    }

    async fn return_lending(&self, lending_id: Uuid, now: DateTime<Utc>) -> AppResult<LendingRecord> {
        self.state.write().await.close(lending_id, now)
    }

    async fn return_for_book(&self, book_id: Uuid, now: DateTime<Utc>) -> AppResult<LendingRecord> {
        let mut state = self.state.write().await;
        state.book(book_id)?;
        let lending_id = state
            .active_for(book_id)
            .map(|l| l.id)
            .ok_or_else(|| AppError::NotFound("No active lending found for this book".to_string()))?;
        state.close(lending_id, now)
    }

    async fn extend(
        &self,
        lending_id: Uuid,
        new_expected_return: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<LendingRecord> {
        let mut state = self.state.write().await;
        state.lending(lending_id)?.check_extension(new_expected_return, now)?;

        let record = state
            .lendings
            .get_mut(&lending_id)
            .ok_or_else(|| AppError::NotFound("Lending record not found".to_string()))?;
        record.expected_return = new_expected_return;
        record.updated_at = now;
        Ok(record.clone())
    }

    async fn update(&self, lending_id: Uuid, data: &UpdateLending, now: DateTime<Utc>) -> AppResult<LendingRecord> {
        let mut state = self.state.write().await;
        let record = state
            .lendings
            .get_mut(&lending_id)
            .ok_or_else(|| AppError::NotFound("Lending record not found".to_string()))?;
        record.apply_update(data, now);
        Ok(record.clone())
    }

    async fn current(&self, now: DateTime<Utc>) -> AppResult<Vec<LendingDetails>> {
        let state = self.state.read().await;
        let mut records: Vec<&LendingRecord> = state.lendings.values().filter(|l| !l.is_returned).collect();
        records.sort_by(|a, b| compare_lendings(a, b, LendingSortField::DateLent, SortOrder::Desc));
        records.into_iter().map(|r| state.details(r, now)).collect()
    }

    async fn overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<LendingDetails>> {
        let state = self.state.read().await;
        let mut records: Vec<&LendingRecord> = state.lendings.values().filter(|l| l.is_overdue(now)).collect();
        records.sort_by(|a, b| compare_lendings(a, b, LendingSortField::ExpectedReturn, SortOrder::Asc));
        records.into_iter().map(|r| state.details(r, now)).collect()
    }

    async fn history(&self, query: &LendingQuery, now: DateTime<Utc>) -> AppResult<(Vec<LendingDetails>, i64)> {
        let state = self.state.read().await;
        let field = query.sort_by.unwrap_or_default();
        let direction = query.sort_order.unwrap_or_default();

        let mut records: Vec<&LendingRecord> = state.lendings.values().filter(|l| query.matches(l, now)).collect();
        records.sort_by(|a, b| compare_lendings(a, b, field, direction));
        let total = records.len() as i64;

        let records = page(records, query.page(), query.limit())
            .into_iter()
            .map(|r| state.details(r, now))
            .collect::<AppResult<Vec<_>>>()?;
        Ok((records, total))
    }

    async fn counts(&self, now: DateTime<Utc>) -> AppResult<LendingCounts> {
        let state = self.state.read().await;
        let mut counts = LendingCounts::default();
        for record in state.lendings.values() {
            counts.total += 1;
            if record.is_returned {
                counts.returned += 1;
                if let Some(actual_return) = record.actual_return {
                    counts.returned_periods.push((record.date_lent, actual_return));
                }
            } else {
                counts.active += 1;
                if record.is_overdue(now) {
                    counts.overdue += 1;
                }
            }
        }
        Ok(counts)
    }
}

#[async_trait]
impl CategoryStore for MemoryStore {
    async fn list_with_counts(&self) -> AppResult<Vec<CategoryWithCount>> {
        let state = self.state.read().await;
        let mut categories: Vec<CategoryWithCount> = state
            .categories
            .values()
            .map(|c| CategoryWithCount {
                id: c.id,
                name: c.name.clone(),
                description: c.description.clone(),
                book_count: state.books.values().filter(|b| b.category_id == Some(c.id)).count() as i64,
            })
            .collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn get(&self, id: Uuid) -> AppResult<Category> {
        self.state
            .read()
            .await
            .categories
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Category not found".to_string()))
    }

    async fn create(&self, category: &Category) -> AppResult<Category> {
        let mut state = self.state.write().await;
        if state.categories.values().any(|c| c.name == category.name) {
            return Err(AppError::Conflict("A category with this name already exists".to_string()));
        }
        state.categories.insert(category.id, category.clone());
        Ok(category.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::book::CreateBook;
    use chrono::Duration;

    fn new_book(title: &str, isbn: Option<&str>) -> Book {
        let data = CreateBook {
            title: title.to_string(),
            author: "Sarah Chen".to_string(),
            isbn: isbn.map(str::to_string),
            ..Default::default()
        };
        Book::new(&data, BookStatus::Owned, Utc::now())
    }

    fn lend_request(days: i64) -> LendBook {
        LendBook {
            borrower_name: "Alice".to_string(),
            borrower_contact: "alice@example.org".to_string(),
            expected_return: Utc::now() + Duration::days(days),
            notes: None,
        }
    }

    /// status == LENT exactly when one open record exists
    async fn assert_status_mirrors_records(store: &MemoryStore) {
        let state = store.state.read().await;
        for book in state.books.values() {
            let open = state
                .lendings
                .values()
                .filter(|l| l.book_id == book.id && !l.is_returned)
                .count();
            assert_eq!(book.status == BookStatus::Lent, open == 1, "book {}", book.title);
            assert!(open <= 1);
        }
    }

    #[tokio::test]
    async fn lend_then_return_keeps_status_in_step() {
        let store = MemoryStore::default();
        let book = BookStore::create(&store, &new_book("Dune", None)).await.unwrap();
        let now = Utc::now();

        let record = store.lend(book.id, &lend_request(7), now).await.unwrap();
        assert_eq!(BookStore::get(&store, book.id).await.unwrap().status, BookStatus::Lent);
        assert_status_mirrors_records(&store).await;

        store.return_lending(record.id, now).await.unwrap();
        assert_eq!(BookStore::get(&store, book.id).await.unwrap().status, BookStatus::Owned);
        assert_status_mirrors_records(&store).await;
    }

    #[tokio::test]
    async fn concurrent_lends_let_exactly_one_through() {
        let store = std::sync::Arc::new(MemoryStore::default());
        let book_id = BookStore::create(store.as_ref(), &new_book("Dune", None)).await.unwrap().id;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.lend(book_id, &lend_request(7), Utc::now()).await })
            })
            .collect();

        let mut ok = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(AppError::Conflict(_)) => {}
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }
        assert_eq!(ok, 1);
        assert_status_mirrors_records(&store).await;
    }

    #[tokio::test]
    async fn failed_lend_leaves_no_record() {
        let store = MemoryStore::default();
        let mut lost = new_book("Lost", None);
        lost.status = BookStatus::Lost;
        let lost = BookStore::create(&store, &lost).await.unwrap();

        let result = store.lend(lost.id, &lend_request(7), Utc::now()).await;
        assert!(matches!(result, Err(AppError::InvalidState(_))));
        assert_eq!(store.counts(Utc::now()).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn delete_is_refused_while_lent_and_drops_history_after() {
        let store = MemoryStore::default();
        let book = BookStore::create(&store, &new_book("Dune", None)).await.unwrap();
        let record = store.lend(book.id, &lend_request(7), Utc::now()).await.unwrap();

        assert!(matches!(BookStore::delete(&store, book.id).await, Err(AppError::InvalidState(_))));

        store.return_lending(record.id, Utc::now()).await.unwrap();
        BookStore::delete(&store, book.id).await.unwrap();
        assert_eq!(store.counts(Utc::now()).await.unwrap().total, 0);
        assert!(matches!(BookStore::get(&store, book.id).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn history_sorts_open_records_last_by_return_date() {
        let store = MemoryStore::default();
        let first = BookStore::create(&store, &new_book("A", None)).await.unwrap();
        let second = BookStore::create(&store, &new_book("B", None)).await.unwrap();
        let closed = store.lend(first.id, &lend_request(3), Utc::now()).await.unwrap();
        store.return_lending(closed.id, Utc::now()).await.unwrap();
        let open = store.lend(second.id, &lend_request(3), Utc::now()).await.unwrap();

        for direction in [SortOrder::Asc, SortOrder::Desc] {
            let query = LendingQuery {
                sort_by: Some(LendingSortField::ActualReturn),
                sort_order: Some(direction),
                ..Default::default()
            };
            let (records, total) = store.history(&query, Utc::now()).await.unwrap();
            assert_eq!(total, 2);
            assert_eq!(records[0].lending.id, closed.id);
            assert_eq!(records[1].lending.id, open.id);
        }
    }

    #[tokio::test]
    async fn category_names_are_unique() {
        let store = MemoryStore::default();
        let data = crate::models::category::CreateCategory {
            name: "Design".to_string(),
            description: None,
        };
        CategoryStore::create(&store, &Category::new(&data, Utc::now())).await.unwrap();
        let again = CategoryStore::create(&store, &Category::new(&data, Utc::now())).await;
        assert!(matches!(again, Err(AppError::Conflict(_))));
    }
}
