// Administrative handlers, gated on the admin capability

use axum::{extract::State, response::Json};
use chrono::Utc;
use serde::Serialize;

use crate::{app::AppState, middleware::auth::RequireAdmin, utils::ApiError};

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub swept: usize,
}

/// POST /api/v1/admin/revocations/sweep - Evict expired revocation entries
/// The background job covers steady state; this exists for operators
pub async fn sweep_revocations(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<SweepResponse>, ApiError> {
    let swept = state
        .revocation_store
        .sweep(Utc::now())
        .await
        .map_err(|e| ApiError::DependencyUnavailable(e.to_string()))?;

    Ok(Json(SweepResponse { swept }))
}
