//! Loan lifecycle: borrowing and returning books
//!
//! Both operations run as one unit of work holding the book lock:
//! availability check, duplicate-loan check, counter update and loan write
//! either all commit or none do. Nothing here is retried; a failed unit of
//! work is reported to the caller as is.

use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use crate::{
    clock::Clock,
    error::{AppError, AppResult},
    models::{Actor, Loan},
    repository::Store,
};

#[derive(Clone)]
pub struct LendingService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    loan_period: Duration,
}

impl LendingService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, loan_period: Duration) -> Self {
        Self {
            store,
            clock,
            loan_period,
        }
    }

    /// Borrow one copy of a book
    pub async fn borrow(&self, book_id: Uuid, borrower: &Actor) -> AppResult<Loan> {
        let mut uow = self.store.begin().await?;

        let book = uow
            .lock_book(book_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))?;

        if !book.is_available() {
            tracing::warn!(book_id = %book_id, user_id = %borrower.user_id, "Borrow refused: out of stock");
            return Err(AppError::OutOfStock);
        }

        if uow.find_active_loan(book_id, &borrower.user_id).await?.is_some() {
            tracing::warn!(book_id = %book_id, user_id = %borrower.user_id, "Borrow refused: already borrowed");
            return Err(AppError::AlreadyBorrowed);
        }

        let loan = Loan::open(book_id, borrower, self.clock.now(), self.loan_period);
        let book = uow.decrement_available(book_id).await?;
        uow.create_loan(&loan).await?;
        uow.commit().await?;

        tracing::info!(
            loan_id = %loan.id,
            book_id = %book_id,
            user_id = %borrower.user_id,
            available_copies = book.available_copies,
            "Book borrowed"
        );
        Ok(loan)
    }

    /// Return a loan. Borrowers return their own loans, administrators any.
    pub async fn return_loan(&self, loan_id: Uuid, actor: &Actor) -> AppResult<Loan> {
        let not_found = || AppError::NotFound(format!("Loan with id {} not found", loan_id));

        let loan = self.store.get_loan(loan_id).await?.ok_or_else(not_found)?;

        let mut uow = self.store.begin().await?;
        // Book first, then the loan: same lock order as borrow
        uow.lock_book(loan.book_id).await?;
        let loan = uow.lock_loan(loan_id).await?.ok_or_else(not_found)?;

        if !loan.is_active() {
            return Err(AppError::AlreadyReturned);
        }

        if !actor.may_return(&loan) {
            tracing::warn!(loan_id = %loan_id, user_id = %actor.user_id, "Return refused: not the borrower");
            return Err(AppError::Forbidden(
                "Only the borrower or an administrator can return this loan".to_string(),
            ));
        }

        let returned = uow.mark_returned(loan_id, self.clock.now()).await?;
        let book = uow.increment_available(loan.book_id).await?;
        uow.commit().await?;

        tracing::info!(
            loan_id = %loan_id,
            book_id = %loan.book_id,
            returned_by = %actor.user_id,
            available_copies = book.available_copies,
            "Book returned"
        );
        Ok(returned)
    }
}
