use axum::{
    extract::{Path, Query, State},
    Json,
};

use super::{internal, not_found, ApiResult};
use crate::api::{state::AppState, types::*};
use crate::persistence::{Direction, MarketOrder, Page};

/// Matches the dashboard's default market listing
const DEFAULT_MARKET_PAGE: usize = 100;
const DEFAULT_MARKET_TRADES: usize = 20;

/// GET /api/markets?limit=&skip=&order_by=&direction=
pub async fn list_markets(
    State(state): State<AppState>,
    Query(params): Query<MarketListQuery>,
) -> ApiResult<Json<Vec<MarketView>>> {
    let page = Page::new(
        params.limit.unwrap_or(DEFAULT_MARKET_PAGE),
        params.skip.unwrap_or(0),
    );
    let markets = state
        .api
        .list_markets(
            page,
            params.order_by.unwrap_or(MarketOrder::CreatedAt),
            params.direction.unwrap_or(Direction::Desc),
        )
        .await
        .map_err(internal)?;

    Ok(Json(markets))
}

/// GET /api/markets/:id
pub async fn get_market(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Json<MarketView>> {
    state
        .api
        .get_market(id)
        .await
        .map_err(internal)?
        .map(Json)
        .ok_or_else(|| not_found(format!("market {id}")))
}

/// GET /api/markets/:id/outcomes
pub async fn get_market_outcomes(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Json<Vec<OutcomeView>>> {
    let outcomes = state.api.get_market_outcomes(id).await.map_err(internal)?;
    Ok(Json(outcomes))
}

/// GET /api/markets/:id/trades?limit=
pub async fn get_market_trades(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Query(params): Query<TradeListQuery>,
) -> ApiResult<Json<Vec<TradeView>>> {
    let trades = state
        .api
        .get_market_trades(id, params.limit.unwrap_or(DEFAULT_MARKET_TRADES))
        .await
        .map_err(internal)?;
    Ok(Json(trades))
}
