//! Book (catalog entry) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::loan::Loan;

/// Book model from database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub isbn: Option<String>,
    /// Cover image URL
    pub cover: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub total_copies: i32,
    pub available_copies: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    /// Build a new book from validated input. Every copy starts on the shelf.
    pub fn create(input: BookInput, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: input.title,
            author: input.author,
            isbn: input.isbn,
            cover: input.cover,
            description: input.description,
            category: input.category,
            total_copies: input.total_copies,
            available_copies: input.total_copies,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_available(&self) -> bool {
        self.available_copies > 0
    }

    /// Replace the editable fields, recomputing availability from the number
    /// of loans still active on the book.
    pub fn apply_update(&mut self, input: BookInput, active_loans: i64, now: DateTime<Utc>) {
        self.available_copies = recompute_available(input.total_copies, active_loans);
        self.total_copies = input.total_copies;
        self.title = input.title;
        self.author = input.author;
        self.isbn = input.isbn;
        self.cover = input.cover;
        self.description = input.description;
        self.category = input.category;
        self.updated_at = now;
    }
}

/// Available copies after an edit of the total copy count.
///
/// `active_loans` is the count of loans not yet returned, not the counter
/// difference: after a clamp the counters under-report what is out. When the
/// new total is below that count the result clamps to zero.
pub fn recompute_available(new_total: i32, active_loans: i64) -> i32 {
    (new_total as i64 - active_loans).clamp(0, new_total as i64) as i32
}

/// Create/update book request
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct BookInput {
    #[validate(length(min = 1, max = 255, message = "Title is required (max 255 characters)"))]
    pub title: String,
    #[validate(length(min = 1, max = 255, message = "Author is required (max 255 characters)"))]
    pub author: String,
    #[validate(length(max = 13, message = "ISBN must be at most 13 characters"))]
    pub isbn: Option<String>,
    #[validate(url(message = "Must be a valid URL"))]
    pub cover: Option<String>,
    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: Option<String>,
    #[validate(length(max = 100, message = "Category must be at most 100 characters"))]
    pub category: Option<String>,
    #[validate(range(min = 1, max = 100, message = "Total copies must be between 1 and 100"))]
    pub total_copies: i32,
}

impl BookInput {
    /// Trim text fields; blank optional fields count as absent.
    pub fn normalized(self) -> Self {
        fn optional(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        Self {
            title: self.title.trim().to_string(),
            author: self.author.trim().to_string(),
            isbn: optional(self.isbn),
            cover: optional(self.cover),
            description: optional(self.description),
            category: optional(self.category),
            total_copies: self.total_copies,
        }
    }
}

/// Catalog search parameters
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct BookQuery {
    /// Substring of title, author or ISBN (case-insensitive)
    pub q: Option<String>,
    /// Exact category (case-insensitive)
    pub category: Option<String>,
    /// Only books with at least one available copy
    pub available: Option<bool>,
}

impl BookQuery {
    pub fn search_term(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }

    pub fn category_filter(&self) -> Option<&str> {
        self.category.as_deref().map(str::trim).filter(|c| !c.is_empty())
    }

    pub fn only_available(&self) -> bool {
        self.available.unwrap_or(false)
    }

    /// In-process equivalent of the SQL search
    pub fn matches(&self, book: &Book) -> bool {
        if let Some(term) = self.search_term() {
            let term = term.to_lowercase();
            let hit = book.title.to_lowercase().contains(&term)
                || book.author.to_lowercase().contains(&term)
                || book
                    .isbn
                    .as_deref()
                    .map(|isbn| isbn.to_lowercase().contains(&term))
                    .unwrap_or(false);
            if !hit {
                return false;
            }
        }

        if let Some(category) = self.category_filter() {
            match book.category.as_deref() {
                Some(c) if c.to_lowercase() == category.to_lowercase() => {}
                _ => return false,
            }
        }

        !self.only_available() || book.is_available()
    }
}

/// Book with the caller's own active loan on it, if any
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookDetail {
    pub book: Book,
    pub active_loan: Option<Loan>,
}

/// Short book representation embedded in loan listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BookSummary {
    pub id: Uuid,
    pub title: String,
    pub author: String,
}

impl From<&Book> for BookSummary {
    fn from(book: &Book) -> Self {
        Self {
            id: book.id,
            title: book.title.clone(),
            author: book.author.clone(),
        }
    }
}
