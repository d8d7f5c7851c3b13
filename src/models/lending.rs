//! Lending record model and the lending state machine rules

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::{book::Book, non_blank, validate_not_blank, SortOrder};
use crate::error::{AppError, AppResult};

const MILLIS_PER_DAY: f64 = 24.0 * 60.0 * 60.0 * 1000.0;

/// Lending record from database.
///
/// A record is active while `is_returned` is false. It is created on lend,
/// its `expected_return` may move while active, and it is closed exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LendingRecord {
    pub id: Uuid,
    pub book_id: Uuid,
    pub borrower_name: String,
    pub borrower_contact: String,
    pub date_lent: DateTime<Utc>,
    pub expected_return: DateTime<Utc>,
    pub actual_return: Option<DateTime<Utc>>,
    pub is_returned: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LendingRecord {
    /// Open a new active record for `book_id`
    pub fn new(book_id: Uuid, data: &LendBook, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            book_id,
            borrower_name: data.borrower_name.trim().to_string(),
            borrower_contact: data.borrower_contact.trim().to_string(),
            date_lent: now,
            expected_return: data.expected_return,
            actual_return: None,
            is_returned: false,
            notes: data.notes.as_deref().and_then(non_blank),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.is_returned && self.expected_return < now
    }

    pub fn check_returnable(&self) -> AppResult<()> {
        if self.is_returned {
            return Err(AppError::InvalidState(
                "Book has already been returned".to_string(),
            ));
        }
        Ok(())
    }

    /// State is checked before the date, so a closed record always reports
    /// InvalidState whatever date is asked for.
    pub fn check_extension(&self, new_expected_return: DateTime<Utc>, now: DateTime<Utc>) -> AppResult<()> {
        if self.is_returned {
            return Err(AppError::InvalidState(
                "Cannot extend lending for a returned book".to_string(),
            ));
        }
        if new_expected_return <= now {
            return Err(AppError::Validation(
                "New expected return date must be in the future".to_string(),
            ));
        }
        Ok(())
    }

    /// Close the record (stores that do not speak SQL)
    pub fn mark_returned(&mut self, now: DateTime<Utc>) {
        self.is_returned = true;
        self.actual_return = Some(now);
        self.updated_at = now;
    }

    pub fn apply_update(&mut self, data: &UpdateLending, now: DateTime<Utc>) {
        if let Some(ref name) = data.borrower_name {
            self.borrower_name = name.trim().to_string();
        }
        if let Some(ref contact) = data.borrower_contact {
            self.borrower_contact = contact.trim().to_string();
        }
        if let Some(ref notes) = data.notes {
            self.notes = non_blank(notes);
        }
        self.updated_at = now;
    }
}

/// Lending record joined with its book
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LendingDetails {
    #[serde(flatten)]
    pub lending: LendingRecord,
    pub is_overdue: bool,
    pub book: Book,
}

impl LendingDetails {
    pub fn new(lending: LendingRecord, book: Book, now: DateTime<Utc>) -> Self {
        Self {
            is_overdue: lending.is_overdue(now),
            lending,
            book,
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Lend book request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LendBook {
    #[validate(
        length(min = 1, max = 255, message = "Borrower name is required and must be less than 255 characters"),
        custom(function = "validate_not_blank", message = "Borrower name is required")
    )]
    pub borrower_name: String,
    #[validate(
        length(min = 1, max = 255, message = "Borrower contact is required and must be less than 255 characters"),
        custom(function = "validate_not_blank", message = "Borrower contact is required")
    )]
    pub borrower_contact: String,
    /// Expected return date (ISO 8601), must be in the future
    pub expected_return: DateTime<Utc>,
    #[validate(length(max = 1000, message = "Notes must be less than 1000 characters"))]
    pub notes: Option<String>,
}

/// Extend lending request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtendLending {
    /// New expected return date (ISO 8601), must be in the future
    pub new_expected_return: DateTime<Utc>,
}

/// Edit borrower details; return state and dates belong to the workflow
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateLending {
    #[validate(
        length(min = 1, max = 255, message = "Borrower name cannot be empty and must be less than 255 characters"),
        custom(function = "validate_not_blank", message = "Borrower name cannot be empty")
    )]
    pub borrower_name: Option<String>,
    #[validate(
        length(min = 1, max = 255, message = "Borrower contact cannot be empty and must be less than 255 characters"),
        custom(function = "validate_not_blank", message = "Borrower contact cannot be empty")
    )]
    pub borrower_contact: Option<String>,
    #[validate(length(max = 1000, message = "Notes must be less than 1000 characters"))]
    pub notes: Option<String>,
}

/// Sortable lending columns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum LendingSortField {
    #[default]
    DateLent,
    ExpectedReturn,
    ActualReturn,
    BorrowerName,
}

impl LendingSortField {
    pub fn column(self) -> &'static str {
        match self {
            LendingSortField::DateLent => "date_lent",
            LendingSortField::ExpectedReturn => "expected_return",
            LendingSortField::ActualReturn => "actual_return",
            LendingSortField::BorrowerName => "borrower_name",
        }
    }
}

/// Query parameters for lending history
#[derive(Debug, Clone, Default, Deserialize, Validate, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct LendingQuery {
    pub is_returned: Option<bool>,
    /// true: active and past due; false: everything else
    pub overdue: Option<bool>,
    /// Search in borrower name
    #[validate(length(max = 255, message = "Borrower name filter must be less than 255 characters"))]
    pub borrower_name: Option<String>,
    /// Lent on or after (ISO 8601)
    pub start_date: Option<DateTime<Utc>>,
    /// Lent on or before (ISO 8601)
    pub end_date: Option<DateTime<Utc>>,
    #[validate(range(min = 1, max = 1_000_000, message = "Page must be between 1 and 1000000"))]
    pub page: Option<i64>,
    #[validate(range(min = 1, max = 100, message = "Limit must be between 1 and 100"))]
    pub limit: Option<i64>,
    pub sort_by: Option<LendingSortField>,
    pub sort_order: Option<SortOrder>,
}

impl LendingQuery {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1)
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(super::DEFAULT_PAGE_SIZE)
    }

    /// Filter predicate for stores that filter in memory
    pub fn matches(&self, record: &LendingRecord, now: DateTime<Utc>) -> bool {
        if let Some(is_returned) = self.is_returned {
            if record.is_returned != is_returned {
                return false;
            }
        }
        if let Some(overdue) = self.overdue {
            if record.is_overdue(now) != overdue {
                return false;
            }
        }
        if let Some(ref name) = self.borrower_name {
            if !record.borrower_name.to_lowercase().contains(&name.to_lowercase()) {
                return false;
            }
        }
        if let Some(start) = self.start_date {
            if record.date_lent < start {
                return false;
            }
        }
        if let Some(end) = self.end_date {
            if record.date_lent > end {
                return false;
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Raw counters read from a store in one pass
#[derive(Debug, Clone, Default)]
pub struct LendingCounts {
    pub total: i64,
    pub active: i64,
    pub overdue: i64,
    pub returned: i64,
    /// (date_lent, actual_return) of every closed record
    pub returned_periods: Vec<(DateTime<Utc>, DateTime<Utc>)>,
}

/// Lending statistics response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LendingStats {
    pub total_lendings: i64,
    pub active_lendings: i64,
    pub overdue_books: i64,
    pub returned_books: i64,
    pub average_lending_days: i64,
}

impl From<LendingCounts> for LendingStats {
    fn from(counts: LendingCounts) -> Self {
        Self {
            total_lendings: counts.total,
            active_lendings: counts.active,
            overdue_books: counts.overdue,
            returned_books: counts.returned,
            average_lending_days: average_lending_days(&counts.returned_periods),
        }
    }
}

/// Each period counts as its day span rounded up; the mean of those whole
/// days is then rounded half-up. No periods gives 0.
pub fn average_lending_days(periods: &[(DateTime<Utc>, DateTime<Utc>)]) -> i64 {
    if periods.is_empty() {
        return 0;
    }
    let total_days: f64 = periods
        .iter()
        .map(|(lent, returned)| ((*returned - *lent).num_milliseconds() as f64 / MILLIS_PER_DAY).ceil())
        .sum();
    (total_days / periods.len() as f64 + 0.5).floor() as i64
}
