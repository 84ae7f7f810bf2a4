//! Loan registry on Postgres

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, FromRow, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{BookSummary, LendingStats, Loan, LoanDetails, LoanFilter, LoanStatus},
    repository::LoanRegistry,
};

use super::{PgStore, PgUnitOfWork};

const LOAN_COLUMNS: &str =
    "id, book_id, user_id, user_name, user_email, borrowed_at, due_date, returned_at";

fn loan_details_from_row(row: &PgRow, now: DateTime<Utc>) -> AppResult<LoanDetails> {
    let loan = Loan::from_row(row)?;
    let book = BookSummary {
        id: loan.book_id,
        title: row.try_get("book_title")?,
        author: row.try_get("book_author")?,
    };
    Ok(LoanDetails::new(loan, book, now))
}

impl PgStore {
    pub(super) async fn loans_get(&self, id: Uuid) -> AppResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>(&format!("SELECT {} FROM loans WHERE id = $1", LOAN_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(loan)
    }

    pub(super) async fn loans_active_for(&self, book_id: Uuid, user_id: &str) -> AppResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>(&format!(
            "SELECT {} FROM loans WHERE book_id = $1 AND user_id = $2 AND returned_at IS NULL",
            LOAN_COLUMNS
        ))
        .bind(book_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(loan)
    }

    pub(super) async fn loans_list(&self, filter: &LoanFilter) -> AppResult<Vec<LoanDetails>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"
            SELECT l.id, l.book_id, l.user_id, l.user_name, l.user_email,
                   l.borrowed_at, l.due_date, l.returned_at,
                   b.title AS book_title, b.author AS book_author
            FROM loans l
            JOIN books b ON b.id = l.book_id
            WHERE 1=1
            "#,
        );

        if let Some(ref user_id) = filter.user_id {
            qb.push(" AND l.user_id = ").push_bind(user_id.clone());
        }

        match filter.status {
            Some(LoanStatus::Active) => {
                qb.push(" AND l.returned_at IS NULL");
            }
            Some(LoanStatus::Overdue) => {
                qb.push(" AND l.returned_at IS NULL AND l.due_date < ")
                    .push_bind(filter.now);
            }
            Some(LoanStatus::Returned) => {
                qb.push(" AND l.returned_at IS NOT NULL");
            }
            None => {}
        }

        qb.push(" ORDER BY l.borrowed_at DESC, l.id");

        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit.max(0));
        }

        let rows = qb.build().fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| loan_details_from_row(row, filter.now))
            .collect()
    }

    pub(super) async fn loans_stats(&self, now: DateTime<Utc>, recent: i64) -> AppResult<LendingStats> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM books) AS total_books,
                (SELECT COUNT(*) FROM loans) AS total_loans,
                (SELECT COUNT(*) FROM loans WHERE returned_at IS NULL) AS active_loans,
                (SELECT COUNT(*) FROM loans WHERE returned_at IS NULL AND due_date < $1) AS overdue_loans
            "#,
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        let recent_loans = self
            .loans_list(&LoanFilter {
                user_id: None,
                status: None,
                now,
                limit: Some(recent),
            })
            .await?;

        Ok(LendingStats {
            total_books: row.try_get("total_books")?,
            total_loans: row.try_get("total_loans")?,
            active_loans: row.try_get("active_loans")?,
            overdue_loans: row.try_get("overdue_loans")?,
            recent_loans,
        })
    }
}

#[async_trait]
impl LoanRegistry for PgUnitOfWork {
    async fn find_active_loan(&mut self, book_id: Uuid, user_id: &str) -> AppResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>(&format!(
            "SELECT {} FROM loans WHERE book_id = $1 AND user_id = $2 AND returned_at IS NULL",
            LOAN_COLUMNS
        ))
        .bind(book_id)
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(loan)
    }

    async fn create_loan(&mut self, loan: &Loan) -> AppResult<()> {
        // A unique violation on the active-loan index maps to AlreadyBorrowed
        sqlx::query(
            r#"
            INSERT INTO loans (id, book_id, user_id, user_name, user_email,
                               borrowed_at, due_date, returned_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(loan.id)
        .bind(loan.book_id)
        .bind(&loan.user_id)
        .bind(&loan.user_name)
        .bind(&loan.user_email)
        .bind(loan.borrowed_at)
        .bind(loan.due_date)
        .bind(loan.returned_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn lock_loan(&mut self, id: Uuid) -> AppResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>(&format!(
            "SELECT {} FROM loans WHERE id = $1 FOR UPDATE",
            LOAN_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(loan)
    }

    async fn mark_returned(&mut self, id: Uuid, returned_at: DateTime<Utc>) -> AppResult<Loan> {
        let loan = sqlx::query_as::<_, Loan>(&format!(
            "UPDATE loans SET returned_at = $2 WHERE id = $1 AND returned_at IS NULL RETURNING {}",
            LOAN_COLUMNS
        ))
        .bind(id)
        .bind(returned_at)
        .fetch_optional(&mut *self.tx)
        .await?;

        match loan {
            Some(loan) => Ok(loan),
            None => match self.lock_loan(id).await? {
                Some(_) => Err(AppError::AlreadyReturned),
                None => Err(AppError::NotFound(format!("Loan with id {} not found", id))),
            },
        }
    }

    async fn count_active(&mut self, book_id: Uuid) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM loans WHERE book_id = $1 AND returned_at IS NULL",
        )
        .bind(book_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(count)
    }
}
