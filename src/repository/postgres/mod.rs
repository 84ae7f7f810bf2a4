//! Postgres store
//!
//! Each unit of work is a database transaction. `lock_book` issues
//! `SELECT ... FOR UPDATE` on the book row, which serializes concurrent
//! lending operations on the same book across processes while leaving other
//! books untouched.

mod books;
mod loans;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Transaction};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{Book, BookQuery, LendingStats, Loan, LoanDetails, LoanFilter},
};

use super::{Store, UnitOfWork};

/// Store backed by a Postgres connection pool
#[derive(Clone)]
pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

/// Unit of work over one Postgres transaction
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn commit(self: Box<Self>) -> AppResult<()> {
        let PgUnitOfWork { tx } = *self;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn get_book(&self, id: Uuid) -> AppResult<Option<Book>> {
        self.books_get(id).await
    }

    async fn search_books(&self, query: &BookQuery) -> AppResult<Vec<Book>> {
        self.books_search(query).await
    }

    async fn categories(&self) -> AppResult<Vec<String>> {
        self.books_categories().await
    }

    async fn get_loan(&self, id: Uuid) -> AppResult<Option<Loan>> {
        self.loans_get(id).await
    }

    async fn active_loan_for(&self, book_id: Uuid, user_id: &str) -> AppResult<Option<Loan>> {
        self.loans_active_for(book_id, user_id).await
    }

    async fn list_loans(&self, filter: &LoanFilter) -> AppResult<Vec<LoanDetails>> {
        self.loans_list(filter).await
    }

    async fn stats(&self, now: DateTime<Utc>, recent: i64) -> AppResult<LendingStats> {
        self.loans_stats(now, recent).await
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
