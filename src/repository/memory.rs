//! In-process store
//!
//! A unit of work holds the store mutex from `begin` until it is committed or
//! dropped, and stages its writes on a copy of the state. Commit swaps the
//! copy in; dropping discards it. Units of work are therefore fully
//! serialized, which is stricter than the per-book locking of Postgres.
//!
//! Staging copies every book and loan, so a unit of work costs
//! O(books + loans). Meant for tests and local runs, not a large catalog.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{Book, BookQuery, BookSummary, LendingStats, Loan, LoanDetails, LoanFilter, LoanStatus},
};

use super::{InventoryLedger, LoanRegistry, Store, UnitOfWork};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    books: HashMap<Uuid, Book>,
    loans: HashMap<Uuid, Loan>,
}

impl MemoryState {
    fn active_count(&self, book_id: Uuid) -> i64 {
        self.loans
            .values()
            .filter(|l| l.book_id == book_id && l.is_active())
            .count() as i64
    }

    fn book_mut(&mut self, id: Uuid) -> AppResult<&mut Book> {
        self.books
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    fn details(&self, loan: &Loan, now: DateTime<Utc>) -> AppResult<LoanDetails> {
        let book = self.books.get(&loan.book_id).ok_or_else(|| {
            AppError::Internal(format!("Loan {} references missing book {}", loan.id, loan.book_id))
        })?;
        Ok(LoanDetails::new(loan.clone(), BookSummary::from(book), now))
    }

    fn loans_matching(&self, filter: &LoanFilter) -> AppResult<Vec<LoanDetails>> {
        let mut loans: Vec<&Loan> = self.loans.values().filter(|l| filter.matches(l)).collect();
        loans.sort_by(|a, b| b.borrowed_at.cmp(&a.borrowed_at));

        let limit = filter
            .limit
            .map(|l| l.max(0) as usize)
            .unwrap_or(usize::MAX);

        loans
            .into_iter()
            .take(limit)
            .map(|l| self.details(l, filter.now))
            .collect()
    }
}

/// Store keeping books and loans in process memory
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Unit of work over [`MemoryStore`]
pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

#[async_trait]
impl InventoryLedger for MemoryUnitOfWork {
    async fn lock_book(&mut self, id: Uuid) -> AppResult<Option<Book>> {
        Ok(self.staged.books.get(&id).cloned())
    }

    async fn insert_book(&mut self, book: &Book) -> AppResult<()> {
        if self.staged.books.contains_key(&book.id) {
            return Err(AppError::Internal(format!("Duplicate book id {}", book.id)));
        }
        self.staged.books.insert(book.id, book.clone());
        Ok(())
    }

    async fn update_book(&mut self, book: &Book) -> AppResult<()> {
        if book.available_copies < 0 || book.available_copies > book.total_copies {
            return Err(AppError::Internal(format!(
                "Book {} copy counters out of range ({}/{})",
                book.id, book.available_copies, book.total_copies
            )));
        }
        let stored = self.staged.book_mut(book.id)?;
        *stored = book.clone();
        Ok(())
    }

    async fn delete_book(&mut self, id: Uuid) -> AppResult<()> {
        if self.staged.books.remove(&id).is_none() {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }
        self.staged.loans.retain(|_, loan| loan.book_id != id);
        Ok(())
    }

    async fn decrement_available(&mut self, id: Uuid) -> AppResult<Book> {
        let book = self.staged.book_mut(id)?;
        if book.available_copies < 1 {
            return Err(AppError::OutOfStock);
        }
        book.available_copies -= 1;
        book.updated_at = Utc::now();
        Ok(book.clone())
    }

    async fn increment_available(&mut self, id: Uuid) -> AppResult<Book> {
        let active = self.staged.active_count(id);
        let book = self.staged.book_mut(id)?;
        let ceiling = (book.total_copies as i64 - active).max(0) as i32;
        book.available_copies = (book.available_copies + 1).min(ceiling);
        book.updated_at = Utc::now();
        Ok(book.clone())
    }
}

#[async_trait]
impl LoanRegistry for MemoryUnitOfWork {
    async fn find_active_loan(&mut self, book_id: Uuid, user_id: &str) -> AppResult<Option<Loan>> {
        Ok(self
            .staged
            .loans
            .values()
            .find(|l| l.book_id == book_id && l.user_id == user_id && l.is_active())
            .cloned())
    }

    async fn create_loan(&mut self, loan: &Loan) -> AppResult<()> {
        if !self.staged.books.contains_key(&loan.book_id) {
            return Err(AppError::NotFound(format!("Book with id {} not found", loan.book_id)));
        }
        if self.find_active_loan(loan.book_id, &loan.user_id).await?.is_some() {
            return Err(AppError::AlreadyBorrowed);
        }
        self.staged.loans.insert(loan.id, loan.clone());
        Ok(())
    }

    async fn lock_loan(&mut self, id: Uuid) -> AppResult<Option<Loan>> {
        Ok(self.staged.loans.get(&id).cloned())
    }

    async fn mark_returned(&mut self, id: Uuid, returned_at: DateTime<Utc>) -> AppResult<Loan> {
        let loan = self
            .staged
            .loans
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))?;
        if loan.returned_at.is_some() {
            return Err(AppError::AlreadyReturned);
        }
        loan.returned_at = Some(returned_at);
        Ok(loan.clone())
    }

    async fn count_active(&mut self, book_id: Uuid) -> AppResult<i64> {
        Ok(self.staged.active_count(book_id))
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn commit(self: Box<Self>) -> AppResult<()> {
        let MemoryUnitOfWork { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryUnitOfWork { guard, staged }))
    }

    async fn get_book(&self, id: Uuid) -> AppResult<Option<Book>> {
        Ok(self.state.lock().await.books.get(&id).cloned())
    }

    async fn search_books(&self, query: &BookQuery) -> AppResult<Vec<Book>> {
        let state = self.state.lock().await;
        let mut books: Vec<Book> = state
            .books
            .values()
            .filter(|b| query.matches(b))
            .cloned()
            .collect();
        books.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.id.cmp(&b.id)));
        Ok(books)
    }

    async fn categories(&self) -> AppResult<Vec<String>> {
        let state = self.state.lock().await;
        let mut categories: Vec<String> = state
            .books
            .values()
            .filter_map(|b| b.category.clone())
            .collect();
        categories.sort();
        categories.dedup();
        Ok(categories)
    }

    async fn get_loan(&self, id: Uuid) -> AppResult<Option<Loan>> {
        Ok(self.state.lock().await.loans.get(&id).cloned())
    }

    async fn active_loan_for(&self, book_id: Uuid, user_id: &str) -> AppResult<Option<Loan>> {
        let state = self.state.lock().await;
        Ok(state
            .loans
            .values()
            .find(|l| l.book_id == book_id && l.user_id == user_id && l.is_active())
            .cloned())
    }

    async fn list_loans(&self, filter: &LoanFilter) -> AppResult<Vec<LoanDetails>> {
        self.state.lock().await.loans_matching(filter)
    }

    async fn stats(&self, now: DateTime<Utc>, recent: i64) -> AppResult<LendingStats> {
        let state = self.state.lock().await;
        let count = |status: LoanStatus| {
            state
                .loans
                .values()
                .filter(|l| status.matches(l, now))
                .count() as i64
        };

        Ok(LendingStats {
            total_books: state.books.len() as i64,
            total_loans: state.loans.len() as i64,
            active_loans: count(LoanStatus::Active),
            overdue_loans: count(LoanStatus::Overdue),
            recent_loans: state.loans_matching(&LoanFilter {
                user_id: None,
                status: None,
                now,
                limit: Some(recent),
            })?,
        })
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}
