use axum::{
    extract::{Query, State},
    Json,
};

use super::{internal, ApiResult};
use crate::api::{state::AppState, types::*};

const DEFAULT_TRADES: usize = 20;

/// GET /api/trades?limit=&skip=
pub async fn get_trades(
    State(state): State<AppState>,
    Query(params): Query<TradeListQuery>,
) -> ApiResult<Json<Vec<TradeView>>> {
    let trades = state
        .api
        .get_all_trades(
            params.limit.unwrap_or(DEFAULT_TRADES),
            params.skip.unwrap_or(0),
        )
        .await
        .map_err(internal)?;
    Ok(Json(trades))
}
