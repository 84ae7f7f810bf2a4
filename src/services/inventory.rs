//! Inventory management: creating, editing and deleting books
//!
//! Edits and deletes lock the book row for the whole unit of work, the same
//! lock borrow and return take, so the copy recompute and the active-loan
//! guard can't interleave with lending on that book.

use std::sync::Arc;

use uuid::Uuid;
use validator::Validate;

use crate::{
    clock::Clock,
    error::{AppError, AppResult},
    models::{Book, BookInput},
    repository::Store,
};

#[derive(Clone)]
pub struct InventoryService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl InventoryService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Add a book to the catalog with every copy available
    pub async fn create_book(&self, input: BookInput) -> AppResult<Book> {
        let input = input.normalized();
        input.validate()?;

        let book = Book::create(input, self.clock.now());

        let mut uow = self.store.begin().await?;
        uow.insert_book(&book).await?;
        uow.commit().await?;

        tracing::info!(book_id = %book.id, total_copies = book.total_copies, "Book created");
        Ok(book)
    }

    /// Update book fields; availability follows a change of the copy count
    pub async fn update_book(&self, id: Uuid, input: BookInput) -> AppResult<Book> {
        let input = input.normalized();
        input.validate()?;

        let mut uow = self.store.begin().await?;
        let mut book = uow
            .lock_book(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;

        let previous_total = book.total_copies;
        let active = uow.count_active(id).await?;
        book.apply_update(input, active, self.clock.now());
        uow.update_book(&book).await?;
        uow.commit().await?;

        if book.total_copies != previous_total {
            tracing::info!(
                book_id = %book.id,
                total_copies = book.total_copies,
                available_copies = book.available_copies,
                "Book copy count changed"
            );
        }
        Ok(book)
    }

    /// Delete a book; refused while any copy is on loan
    pub async fn delete_book(&self, id: Uuid) -> AppResult<()> {
        let mut uow = self.store.begin().await?;
        uow.lock_book(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;

        let active = uow.count_active(id).await?;
        if active > 0 {
            tracing::warn!(book_id = %id, active_loans = active, "Refusing to delete book with active loans");
            return Err(AppError::HasActiveLoans);
        }

        uow.delete_book(id).await?;
        uow.commit().await?;

        tracing::info!(book_id = %id, "Book deleted");
        Ok(())
    }
}
