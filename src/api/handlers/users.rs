use alloy::primitives::Address;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::str::FromStr;

use super::{internal, not_found, ApiResult};
use crate::api::{state::AppState, types::*};

const DEFAULT_LEADERBOARD: usize = 10;

/// GET /api/users/:address
pub async fn get_user(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult<Json<UserProfile>> {
    let parsed = Address::from_str(address.trim())
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid address: {e}")))?;

    state
        .api
        .get_user(parsed)
        .await
        .map_err(internal)?
        .map(Json)
        .ok_or_else(|| not_found(format!("user {}", address.to_lowercase())))
}

/// GET /api/leaderboard/volume?limit=
pub async fn top_traders_by_volume(
    State(state): State<AppState>,
    Query(params): Query<LeaderboardQuery>,
) -> ApiResult<Json<Vec<UserView>>> {
    let users = state
        .api
        .top_traders_by_volume(params.limit.unwrap_or(DEFAULT_LEADERBOARD))
        .await
        .map_err(internal)?;
    Ok(Json(users))
}

/// GET /api/leaderboard/pnl?limit=
pub async fn top_traders_by_pnl(
    State(state): State<AppState>,
    Query(params): Query<LeaderboardQuery>,
) -> ApiResult<Json<Vec<UserView>>> {
    let users = state
        .api
        .top_traders_by_pnl(params.limit.unwrap_or(DEFAULT_LEADERBOARD))
        .await
        .map_err(internal)?;
    Ok(Json(users))
}
