use axum::{extract::State, Json};

use super::{internal, ApiResult};
use crate::api::{state::AppState, types::*};

/// GET /api/stats
pub async fn get_global_stats(State(state): State<AppState>) -> ApiResult<Json<StatsView>> {
    let stats = state.api.get_global_stats().await.map_err(internal)?;
    Ok(Json(stats))
}
