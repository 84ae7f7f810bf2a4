//! Repository layer for database operations
//!
//! Mutations go through a [`UnitOfWork`]: one transaction spanning the
//! inventory ledger (books and copy counters) and the loan registry. A unit of
//! work that is dropped without [`UnitOfWork::commit`] is rolled back.
//!
//! Locking protocol: the book row is locked first (`lock_book`), loan rows
//! after it. Every borrow, return, edit and delete on a book takes that lock,
//! so operations on the same book are serialized by the store.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{Book, BookQuery, LendingStats, Loan, LoanDetails, LoanFilter},
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Book records and copy counters
#[async_trait]
pub trait InventoryLedger: Send {
    /// Load a book and hold its lock until the unit of work ends
    async fn lock_book(&mut self, id: Uuid) -> AppResult<Option<Book>>;

    async fn insert_book(&mut self, book: &Book) -> AppResult<()>;

    /// Persist every column of an already locked book
    async fn update_book(&mut self, book: &Book) -> AppResult<()>;

    /// Remove a book together with its loan history
    async fn delete_book(&mut self, id: Uuid) -> AppResult<()>;

    /// Take one copy off the shelf. Fails with `OutOfStock` rather than
    /// going below zero.
    async fn decrement_available(&mut self, id: Uuid) -> AppResult<Book>;

    /// Put one copy back, capped at `total_copies - active loans`.
    async fn increment_available(&mut self, id: Uuid) -> AppResult<Book>;
}

/// Loan records and their return state
#[async_trait]
pub trait LoanRegistry: Send {
    async fn find_active_loan(&mut self, book_id: Uuid, user_id: &str) -> AppResult<Option<Loan>>;

    /// Fails with `AlreadyBorrowed` if the borrower already holds an active
    /// loan on the book.
    async fn create_loan(&mut self, loan: &Loan) -> AppResult<()>;

    async fn lock_loan(&mut self, id: Uuid) -> AppResult<Option<Loan>>;

    /// Write-once transition from active to returned
    async fn mark_returned(&mut self, id: Uuid, returned_at: DateTime<Utc>) -> AppResult<Loan>;

    async fn count_active(&mut self, book_id: Uuid) -> AppResult<i64>;
}

/// Atomic unit spanning the ledger and the registry
#[async_trait]
pub trait UnitOfWork: InventoryLedger + LoanRegistry {
    async fn commit(self: Box<Self>) -> AppResult<()>;
}

/// Entry point to a storage backend
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>>;

    async fn get_book(&self, id: Uuid) -> AppResult<Option<Book>>;

    async fn search_books(&self, query: &BookQuery) -> AppResult<Vec<Book>>;

    /// Distinct categories in use, ascending
    async fn categories(&self) -> AppResult<Vec<String>>;

    async fn get_loan(&self, id: Uuid) -> AppResult<Option<Loan>>;

    async fn active_loan_for(&self, book_id: Uuid, user_id: &str) -> AppResult<Option<Loan>>;

    /// Loans with their book, newest first
    async fn list_loans(&self, filter: &LoanFilter) -> AppResult<Vec<LoanDetails>>;

    async fn stats(&self, now: DateTime<Utc>, recent: i64) -> AppResult<LendingStats>;

    /// Connectivity check
    async fn ping(&self) -> AppResult<()>;
}
