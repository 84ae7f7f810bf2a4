//! Loan endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{Loan, LoanDetails, LoanQuery},
    AppState,
};

use super::{AuthenticatedUser, JsonBody};

/// Borrow request
#[derive(Deserialize, ToSchema)]
pub struct BorrowRequest {
    /// Book to borrow one copy of
    pub book_id: Uuid,
}

#[derive(Serialize, ToSchema)]
pub struct ReturnResponse {
    pub success: bool,
}

/// List loans: the caller's own, or every loan for administrators
#[utoipa::path(
    get,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(LoanQuery),
    responses(
        (status = 200, description = "Loans, newest first", body = Vec<LoanDetails>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_loans(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Query(query): Query<LoanQuery>,
) -> AppResult<Json<Vec<LoanDetails>>> {
    let loans = state.services.catalog.list_loans(&actor, &query).await?;
    Ok(Json(loans))
}

/// Borrow one copy of a book
#[utoipa::path(
    post,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = BorrowRequest,
    responses(
        (status = 201, description = "Loan created", body = Loan),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Book not found"),
        (status = 409, description = "No copy available, or the caller already borrows this book"),
        (status = 503, description = "Concurrent update, retry")
    )
)]
pub async fn borrow_book(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    JsonBody(request): JsonBody<BorrowRequest>,
) -> AppResult<(StatusCode, Json<Loan>)> {
    let loan = state.services.lending.borrow(request.book_id, &actor).await?;
    Ok((StatusCode::CREATED, Json(loan)))
}

/// Return a borrowed book
#[utoipa::path(
    post,
    path = "/loans/{id}/return",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Book returned", body = ReturnResponse),
        (status = 403, description = "Not the borrower"),
        (status = 404, description = "Loan not found"),
        (status = 409, description = "Already returned")
    )
)]
pub async fn return_loan(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(loan_id): Path<Uuid>,
) -> AppResult<Json<ReturnResponse>> {
    state.services.lending.return_loan(loan_id, &actor).await?;
    Ok(Json(ReturnResponse { success: true }))
}
