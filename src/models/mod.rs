//! Data models for Bookshelf

pub mod book;
pub mod category;
pub mod lending;
pub mod upload;

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::ValidationError;

// Re-export commonly used types
pub use book::{Book, BookDetails, BookStatus, BookWithLending};
pub use category::{Category, CategoryWithCount};
pub use lending::{LendingDetails, LendingRecord, LendingStats};

/// Default page size for paginated listings
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Sort direction shared by list queries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Pagination block of a list response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        let total_pages = if limit > 0 { (total + limit - 1) / limit } else { 0 };
        Self {
            page,
            limit,
            total,
            total_pages,
        }
    }

    /// Row offset of the first record on `page` (1-based)
    pub fn offset(page: i64, limit: i64) -> i64 {
        (page.max(1) - 1).saturating_mul(limit.max(0))
    }
}

/// Maps empty strings to `None` so "" can clear an optional text column.
pub fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Rejects text that is empty once surrounding whitespace is trimmed
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut error = ValidationError::new("blank");
        error.message = Some(Cow::Borrowed("Value cannot be blank"));
        return Err(error);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(Pagination::new(1, 10, 0).total_pages, 0);
        assert_eq!(Pagination::new(1, 10, 10).total_pages, 1);
        assert_eq!(Pagination::new(1, 10, 11).total_pages, 2);
    }

    #[test]
    fn offset_is_zero_based() {
        assert_eq!(Pagination::offset(1, 10), 0);
        assert_eq!(Pagination::offset(3, 25), 50);
        assert_eq!(Pagination::offset(0, 10), 0);
    }

    #[test]
    fn offset_saturates_on_huge_pages() {
        assert_eq!(Pagination::offset(i64::MAX, 100), i64::MAX);
    }

    #[test]
    fn whitespace_only_text_is_blank() {
        assert!(validate_not_blank("   ").is_err());
        assert!(validate_not_blank("").is_err());
        assert!(validate_not_blank(" Ada ").is_ok());
    }

    #[test]
    fn blank_strings_clear() {
        assert_eq!(non_blank("   "), None);
        assert_eq!(non_blank(" Fiction "), Some("Fiction".to_string()));
    }
}
