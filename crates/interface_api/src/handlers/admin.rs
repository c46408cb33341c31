//! Admin handlers

use axum::{extract::State, Extension, Json};

use domain_claims::claim::Actor;
use domain_claims::ports::ClaimStats;

use crate::{error::ApiError, AppState};

/// Dashboard statistics over every claim
pub async fn stats(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<ClaimStats>, ApiError> {
    Ok(Json(state.service.stats(&actor).await?))
}
