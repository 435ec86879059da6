use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use super::guard;
use crate::app::AppState;
use crate::authz::Capability;
use crate::config::seed_from_env;
use crate::errors::AppResult;
use crate::jwt::CurrentStaff;
use crate::services::seed::{self, SeedOutcome, SuperAdminSeed};

pub fn routes() -> Router<AppState> {
    Router::new().route("/seed", post(run_seed))
}

/// Re-runs the bootstrap seed. Existing records are left untouched.
#[utoipa::path(
    post,
    path = "/rbac/seed",
    tag = "RBAC",
    responses(
        (status = 200, description = "Seed result", body = SeedOutcome),
        (status = 403, description = "Top-tier only")
    ),
    security(("bearerAuth" = []))
)]
pub async fn run_seed(State(state): State<AppState>, current: CurrentStaff) -> AppResult<Json<SeedOutcome>> {
    guard(&state, &current, Capability::TopTier).await?;

    // The caller is the top-tier account, so these credentials are never used
    // to create one.
    let credentials = seed_from_env().unwrap_or_else(|_| SuperAdminSeed {
        name: current.staff.name.clone(),
        email: current.staff.email.clone(),
        password: String::new(),
    });

    Ok(Json(seed::run(&state.pool, &credentials).await?))
}
