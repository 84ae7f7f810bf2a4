//! Data models for Bookshelf

pub mod book;
pub mod loan;
pub mod user;

// Re-export commonly used types
pub use book::{Book, BookDetail, BookInput, BookQuery, BookSummary};
pub use loan::{LendingStats, Loan, LoanDetails, LoanFilter, LoanQuery, LoanStatus};
pub use user::{Actor, Role, UserClaims};
