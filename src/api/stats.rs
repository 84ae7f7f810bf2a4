//! Dashboard statistics endpoint

use axum::{extract::State, Json};

use crate::{error::AppResult, models::LendingStats, AppState};

use super::AuthenticatedUser;

/// Lending figures and the most recent loans (admin)
#[utoipa::path(
    get,
    path = "/stats",
    tag = "stats",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Lending statistics", body = LendingStats),
        (status = 403, description = "Administrator privileges required")
    )
)]
pub async fn get_stats(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
) -> AppResult<Json<LendingStats>> {
    actor.require_admin()?;

    let stats = state.services.catalog.stats().await?;
    Ok(Json(stats))
}
