//! Loan (borrow) model and related types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::book::BookSummary;
use super::user::Actor;

/// Default loan period in days
pub const DEFAULT_LOAN_PERIOD_DAYS: i64 = 14;

/// Loan model from database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Loan {
    pub id: Uuid,
    pub book_id: Uuid,
    /// Identity provider subject of the borrower
    pub user_id: String,
    /// Borrower display name at borrow time
    pub user_name: String,
    /// Borrower email at borrow time
    pub user_email: String,
    pub borrowed_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    /// Unset while the loan is active
    pub returned_at: Option<DateTime<Utc>>,
}

impl Loan {
    /// New active loan for `borrower`, due `period` after `borrowed_at`
    pub fn open(book_id: Uuid, borrower: &Actor, borrowed_at: DateTime<Utc>, period: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            book_id,
            user_id: borrower.user_id.clone(),
            user_name: borrower.name.clone(),
            user_email: borrower.email.clone(),
            borrowed_at,
            due_date: borrowed_at + period,
            returned_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.returned_at.is_none()
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.due_date < now
    }
}

/// Loan with its book for display
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoanDetails {
    #[serde(flatten)]
    pub loan: Loan,
    pub book: BookSummary,
    pub is_overdue: bool,
}

impl LoanDetails {
    pub fn new(loan: Loan, book: BookSummary, now: DateTime<Utc>) -> Self {
        let is_overdue = loan.is_overdue(now);
        Self {
            loan,
            book,
            is_overdue,
        }
    }
}

/// Loan list status filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Active,
    Overdue,
    Returned,
}

impl LoanStatus {
    pub fn matches(&self, loan: &Loan, now: DateTime<Utc>) -> bool {
        match self {
            LoanStatus::Active => loan.is_active(),
            LoanStatus::Overdue => loan.is_overdue(now),
            LoanStatus::Returned => !loan.is_active(),
        }
    }
}

/// Loan list query parameters
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct LoanQuery {
    /// active, overdue or returned
    pub status: Option<LoanStatus>,
}

/// Store-level loan listing filter
#[derive(Debug, Clone)]
pub struct LoanFilter {
    /// Restrict to one borrower
    pub user_id: Option<String>,
    pub status: Option<LoanStatus>,
    pub now: DateTime<Utc>,
    pub limit: Option<i64>,
}

impl LoanFilter {
    pub fn matches(&self, loan: &Loan) -> bool {
        if let Some(ref user_id) = self.user_id {
            if &loan.user_id != user_id {
                return false;
            }
        }
        self.status
            .map(|status| status.matches(loan, self.now))
            .unwrap_or(true)
    }
}

/// Dashboard figures
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LendingStats {
    pub total_books: i64,
    pub total_loans: i64,
    pub active_loans: i64,
    pub overdue_loans: i64,
    pub recent_loans: Vec<LoanDetails>,
}
