//! Book model, catalog DTOs and the status rules shared by every store

use std::borrow::Cow;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::{
    category::Category, lending::LendingRecord, non_blank, validate_not_blank, CategoryWithCount,
    SortOrder,
};
use crate::error::{AppError, AppResult};

static ISBN_DIGITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\d{10}|\d{13})$").expect("ISBN pattern is valid"));

static HTTP_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://[^\s/$.?#][^\s]*$").expect("URL pattern is valid"));

// ---------------------------------------------------------------------------
// BookStatus
// ---------------------------------------------------------------------------

/// Availability of a book in the collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "book_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookStatus {
    #[default]
    Owned,
    Lent,
    Wishlist,
    Lost,
}

impl BookStatus {
    pub const ALL: [BookStatus; 4] = [
        BookStatus::Owned,
        BookStatus::Lent,
        BookStatus::Wishlist,
        BookStatus::Lost,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BookStatus::Owned => "OWNED",
            BookStatus::Lent => "LENT",
            BookStatus::Wishlist => "WISHLIST",
            BookStatus::Lost => "LOST",
        }
    }
}

impl std::fmt::Display for BookStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BookStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                AppError::Validation(
                    "Invalid status. Must be one of: OWNED, LENT, WISHLIST, LOST".to_string(),
                )
            })
    }
}

// ---------------------------------------------------------------------------
// Book
// ---------------------------------------------------------------------------

/// Book record from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub isbn: Option<String>,
    pub genre: Option<String>,
    pub description: Option<String>,
    pub cover_image_url: Option<String>,
    pub pdf_file_url: Option<String>,
    pub status: BookStatus,
    pub category_id: Option<Uuid>,
    pub date_added: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    /// Build a new record from a validated create request
    pub fn new(data: &CreateBook, status: BookStatus, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: data.title.trim().to_string(),
            author: data.author.trim().to_string(),
            isbn: data.normalized_isbn(),
            genre: data.genre.as_deref().and_then(non_blank),
            description: data.description.as_deref().and_then(non_blank),
            cover_image_url: data.cover_image_url.as_deref().and_then(non_blank),
            pdf_file_url: data.pdf_file_url.as_deref().and_then(non_blank),
            status,
            category_id: data.category_id,
            date_added: data.date_added.unwrap_or(now),
            created_at: now,
            updated_at: now,
        }
    }

    /// Check that this book may be lent right now.
    ///
    /// `has_active` must be read in the same atomic section as the write
    /// that follows. A LENT status without an active record is treated as
    /// lent as well, so drift between the two never lets a second lending in.
    pub fn check_lendable(
        &self,
        has_active: bool,
        expected_return: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        if has_active || self.status == BookStatus::Lent {
            return Err(AppError::Conflict("Book is already lent out".to_string()));
        }
        if self.status != BookStatus::Owned {
            return Err(AppError::InvalidState(
                "Book is not available for lending".to_string(),
            ));
        }
        if expected_return <= now {
            return Err(AppError::Validation(
                "Expected return date must be in the future".to_string(),
            ));
        }
        Ok(())
    }

    /// Check a status change requested through a generic update.
    ///
    /// LENT and the LENT -> OWNED transition belong to the lending workflow.
    pub fn check_status_change(&self, requested: Option<BookStatus>, has_active: bool) -> AppResult<()> {
        let Some(requested) = requested else {
            return Ok(());
        };
        if requested == self.status {
            return Ok(());
        }
        if has_active {
            return Err(AppError::InvalidState(
                "Cannot change the status of a book that is currently lent out".to_string(),
            ));
        }
        if requested == BookStatus::Lent {
            return Err(AppError::InvalidState(
                "A book becomes LENT only by lending it".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply an update in place (stores that do not speak SQL)
    pub fn apply_update(&mut self, data: &UpdateBook, now: DateTime<Utc>) {
        if let Some(ref title) = data.title {
            self.title = title.trim().to_string();
        }
        if let Some(ref author) = data.author {
            self.author = author.trim().to_string();
        }
        if let Some(ref isbn) = data.isbn {
            self.isbn = normalize_isbn(isbn);
        }
        if let Some(ref genre) = data.genre {
            self.genre = non_blank(genre);
        }
        if let Some(ref description) = data.description {
            self.description = non_blank(description);
        }
        if let Some(ref url) = data.cover_image_url {
            self.cover_image_url = non_blank(url);
        }
        if let Some(ref url) = data.pdf_file_url {
            self.pdf_file_url = non_blank(url);
        }
        if let Some(status) = data.status {
            self.status = status;
        }
        if let Some(category_id) = data.category_id {
            self.category_id = category_id;
        }
        self.updated_at = now;
    }
}

/// Book with its category and active lending, for listings
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookWithLending {
    #[serde(flatten)]
    pub book: Book,
    pub category: Option<Category>,
    pub active_lending: Option<LendingRecord>,
}

/// Book with its category and full lending history
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookDetails {
    #[serde(flatten)]
    pub book: Book,
    pub category: Option<Category>,
    /// Lending records, newest first
    pub lending_history: Vec<LendingRecord>,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Create book request
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateBook {
    #[validate(
        length(min = 1, max = 255, message = "Title is required and must be less than 255 characters"),
        custom(function = "validate_not_blank", message = "Title is required")
    )]
    pub title: String,
    #[validate(
        length(min = 1, max = 255, message = "Author is required and must be less than 255 characters"),
        custom(function = "validate_not_blank", message = "Author is required")
    )]
    pub author: String,
    #[validate(custom(function = "validate_isbn"))]
    pub isbn: Option<String>,
    #[validate(length(max = 100, message = "Genre must be less than 100 characters"))]
    pub genre: Option<String>,
    #[validate(length(max = 2000, message = "Description must be less than 2000 characters"))]
    pub description: Option<String>,
    #[validate(custom(function = "validate_file_url"))]
    pub cover_image_url: Option<String>,
    #[validate(custom(function = "validate_file_url"))]
    pub pdf_file_url: Option<String>,
    /// Initial status (default OWNED, LENT is refused)
    pub status: Option<BookStatus>,
    pub category_id: Option<Uuid>,
    pub date_added: Option<DateTime<Utc>>,
}

impl CreateBook {
    /// Status a new book starts with
    pub fn initial_status(&self) -> AppResult<BookStatus> {
        match self.status.unwrap_or_default() {
            BookStatus::Lent => Err(AppError::Validation(
                "A new book cannot start as LENT; lend it instead".to_string(),
            )),
            status => Ok(status),
        }
    }

    /// ISBN as it will be stored
    pub fn normalized_isbn(&self) -> Option<String> {
        self.isbn.as_deref().and_then(normalize_isbn)
    }
}

/// Update book request; empty strings clear optional fields
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBook {
    #[validate(
        length(min = 1, max = 255, message = "Title cannot be empty and must be less than 255 characters"),
        custom(function = "validate_not_blank", message = "Title cannot be empty")
    )]
    pub title: Option<String>,
    #[validate(
        length(min = 1, max = 255, message = "Author cannot be empty and must be less than 255 characters"),
        custom(function = "validate_not_blank", message = "Author cannot be empty")
    )]
    pub author: Option<String>,
    #[validate(custom(function = "validate_isbn"))]
    pub isbn: Option<String>,
    #[validate(length(max = 100, message = "Genre must be less than 100 characters"))]
    pub genre: Option<String>,
    #[validate(length(max = 2000, message = "Description must be less than 2000 characters"))]
    pub description: Option<String>,
    #[validate(custom(function = "validate_file_url"))]
    pub cover_image_url: Option<String>,
    #[validate(custom(function = "validate_file_url"))]
    pub pdf_file_url: Option<String>,
    pub status: Option<BookStatus>,
    /// `null` removes the category, absent leaves it untouched
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<Uuid>)]
    pub category_id: Option<Option<Uuid>>,
}

impl UpdateBook {
    /// The new ISBN, if this update sets one
    pub fn new_isbn(&self) -> Option<String> {
        self.isbn.as_deref().and_then(normalize_isbn)
    }

    /// The category this update points to, if it sets one
    pub fn new_category(&self) -> Option<Uuid> {
        self.category_id.flatten()
    }
}

/// Sortable book columns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum BookSortField {
    Title,
    Author,
    #[default]
    DateAdded,
    CreatedAt,
    UpdatedAt,
}

impl BookSortField {
    pub fn column(self) -> &'static str {
        match self {
            BookSortField::Title => "title",
            BookSortField::Author => "author",
            BookSortField::DateAdded => "date_added",
            BookSortField::CreatedAt => "created_at",
            BookSortField::UpdatedAt => "updated_at",
        }
    }
}

/// Query parameters for book listings
#[derive(Debug, Clone, Default, Deserialize, Validate, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct BookQuery {
    /// Search in title, author and description
    #[serde(alias = "search")]
    #[validate(length(max = 255, message = "Search query must be less than 255 characters"))]
    pub query: Option<String>,
    pub status: Option<BookStatus>,
    #[validate(length(max = 100, message = "Genre filter must be less than 100 characters"))]
    pub genre: Option<String>,
    pub category_id: Option<Uuid>,
    /// Search in author
    #[validate(length(max = 255, message = "Author filter must be less than 255 characters"))]
    pub author: Option<String>,
    /// Page number (default: 1)
    #[validate(range(min = 1, max = 1_000_000, message = "Page must be between 1 and 1000000"))]
    pub page: Option<i64>,
    /// Items per page (default: 10)
    #[validate(range(min = 1, max = 100, message = "Limit must be between 1 and 100"))]
    pub limit: Option<i64>,
    pub sort_by: Option<BookSortField>,
    pub sort_order: Option<SortOrder>,
}

impl BookQuery {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1)
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(super::DEFAULT_PAGE_SIZE)
    }
}

/// Quick search parameters
#[derive(Debug, Clone, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BookSearchQuery {
    /// Search term
    #[validate(length(min = 1, max = 255, message = "Search query is required and must be less than 255 characters"))]
    pub q: String,
    /// Maximum results (default: 10)
    #[validate(range(min = 1, max = 50, message = "Limit must be between 1 and 50"))]
    pub limit: Option<i64>,
}

/// Collection counters
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookStats {
    pub total_books: i64,
    pub owned_books: i64,
    pub lent_books: i64,
    pub wishlist_books: i64,
    pub lost_books: i64,
    pub categories_with_counts: Vec<CategoryWithCount>,
}

// ---------------------------------------------------------------------------
// Field validators
// ---------------------------------------------------------------------------

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Borrowed(message));
    error
}

/// Stored form of an ISBN: hyphens and spaces dropped, blank means none
pub fn normalize_isbn(isbn: &str) -> Option<String> {
    let digits: String = isbn.chars().filter(|c| *c != '-' && !c.is_whitespace()).collect();
    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}

/// ISBN-10 or ISBN-13, hyphens ignored; blank is accepted (no ISBN)
pub fn validate_isbn(isbn: &str) -> Result<(), ValidationError> {
    match normalize_isbn(isbn) {
        None => Ok(()),
        Some(digits) if ISBN_DIGITS.is_match(&digits) => Ok(()),
        _ => Err(invalid("isbn", "Invalid ISBN format. Must be 10 or 13 digits")),
    }
}

/// Absolute http(s) URL or a path into the upload area; blank is accepted
pub fn validate_file_url(url: &str) -> Result<(), ValidationError> {
    let url = url.trim();
    if url.is_empty() || url.starts_with("/uploads/") || HTTP_URL.is_match(url) {
        Ok(())
    } else {
        Err(invalid("url", "Invalid URL format"))
    }
}
