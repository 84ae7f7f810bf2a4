//! Inventory ledger on Postgres

use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{Book, BookQuery},
    repository::InventoryLedger,
};

use super::{PgStore, PgUnitOfWork};

pub(super) const BOOK_COLUMNS: &str = "id, title, author, isbn, cover, description, category, \
     total_copies, available_copies, created_at, updated_at";

/// Escape LIKE wildcards in user input
fn escape_like(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Book with id {} not found", id))
}

impl PgStore {
    pub(super) async fn books_get(&self, id: Uuid) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(&format!("SELECT {} FROM books WHERE id = $1", BOOK_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(book)
    }

    pub(super) async fn books_search(&self, query: &BookQuery) -> AppResult<Vec<Book>> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM books WHERE 1=1", BOOK_COLUMNS));

        if let Some(term) = query.search_term() {
            let pattern = format!("%{}%", escape_like(term));
            qb.push(" AND (title ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR author ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR isbn ILIKE ")
                .push_bind(pattern)
                .push(")");
        }

        if let Some(category) = query.category_filter() {
            qb.push(" AND LOWER(category) = LOWER(")
                .push_bind(category.to_string())
                .push(")");
        }

        if query.only_available() {
            qb.push(" AND available_copies > 0");
        }

        qb.push(" ORDER BY title ASC, id ASC");

        let books = qb.build_query_as::<Book>().fetch_all(&self.pool).await?;
        Ok(books)
    }

    pub(super) async fn books_categories(&self) -> AppResult<Vec<String>> {
        let categories = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT category FROM books WHERE category IS NOT NULL ORDER BY category",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(categories)
    }
}

#[async_trait]
impl InventoryLedger for PgUnitOfWork {
    async fn lock_book(&mut self, id: Uuid) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(&format!(
            "SELECT {} FROM books WHERE id = $1 FOR UPDATE",
            BOOK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(book)
    }

    async fn insert_book(&mut self, book: &Book) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO books (id, title, author, isbn, cover, description, category,
                               total_copies, available_copies, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(book.id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(&book.cover)
        .bind(&book.description)
        .bind(&book.category)
        .bind(book.total_copies)
        .bind(book.available_copies)
        .bind(book.created_at)
        .bind(book.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_book(&mut self, book: &Book) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE books
            SET title = $2, author = $3, isbn = $4, cover = $5, description = $6,
                category = $7, total_copies = $8, available_copies = $9, updated_at = $10
            WHERE id = $1
            "#,
        )
        .bind(book.id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(&book.cover)
        .bind(&book.description)
        .bind(&book.category)
        .bind(book.total_copies)
        .bind(book.available_copies)
        .bind(book.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(not_found(book.id));
        }
        Ok(())
    }

    async fn delete_book(&mut self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    async fn decrement_available(&mut self, id: Uuid) -> AppResult<Book> {
        let book = sqlx::query_as::<_, Book>(&format!(
            r#"
            UPDATE books
            SET available_copies = available_copies - 1, updated_at = NOW()
            WHERE id = $1 AND available_copies > 0
            RETURNING {}
            "#,
            BOOK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        match book {
            Some(book) => Ok(book),
            None => match self.lock_book(id).await? {
                Some(_) => Err(AppError::OutOfStock),
                None => Err(not_found(id)),
            },
        }
    }

    async fn increment_available(&mut self, id: Uuid) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(&format!(
            r#"
            UPDATE books
            SET available_copies = LEAST(
                    available_copies + 1,
                    GREATEST(0, total_copies - (
                        SELECT COUNT(*)::int FROM loans
                        WHERE book_id = $1 AND returned_at IS NULL
                    ))
                ),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            BOOK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| not_found(id))
    }
}
