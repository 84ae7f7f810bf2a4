//! Catalog and loan read model

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    clock::Clock,
    error::{AppError, AppResult},
    models::{Actor, Book, BookDetail, BookQuery, LendingStats, LoanDetails, LoanFilter, LoanQuery},
    repository::Store,
};

/// Number of loans shown on the dashboard
pub const RECENT_LOANS: i64 = 8;

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Search books, ordered by title
    pub async fn search_books(&self, query: &BookQuery) -> AppResult<Vec<Book>> {
        self.store.search_books(query).await
    }

    pub async fn categories(&self) -> AppResult<Vec<String>> {
        self.store.categories().await
    }

    /// Book with the caller's active loan on it
    pub async fn book_detail(&self, id: Uuid, actor: &Actor) -> AppResult<BookDetail> {
        let book = self
            .store
            .get_book(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;

        let active_loan = self.store.active_loan_for(id, &actor.user_id).await?;

        Ok(BookDetail { book, active_loan })
    }

    /// Loans visible to the caller: all for administrators, own otherwise
    pub async fn list_loans(&self, actor: &Actor, query: &LoanQuery) -> AppResult<Vec<LoanDetails>> {
        let filter = LoanFilter {
            user_id: if actor.is_admin() {
                None
            } else {
                Some(actor.user_id.clone())
            },
            status: query.status,
            now: self.clock.now(),
            limit: None,
        };
        self.store.list_loans(&filter).await
    }

    pub async fn stats(&self) -> AppResult<LendingStats> {
        self.store.stats(self.clock.now(), RECENT_LOANS).await
    }
}
