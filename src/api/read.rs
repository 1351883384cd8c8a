//! Read-only queries over the materialized entities.
//!
//! Nothing here writes. Lookups of unknown ids yield `None` and list
//! queries yield empty vectors; only storage failures are errors.

use alloy::primitives::Address;
use std::collections::HashMap;
use std::sync::Arc;

use super::types::{
    MarketView, OutcomeView, PositionView, StatsView, TradeView, UserProfile, UserView,
};
use crate::domain::{EventPosition, Market, MarketId};
use crate::error::Result;
use crate::persistence::{
    Direction, EntityStore, MarketOrder, MarketQuery, Page, TradeQuery, UserRanking,
};

#[derive(Clone)]
pub struct ReadApi {
    store: Arc<dyn EntityStore>,
    max_page_size: usize,
    recent_trades: usize,
}

impl ReadApi {
    pub fn new(store: Arc<dyn EntityStore>, max_page_size: usize, recent_trades: usize) -> Self {
        Self {
            store,
            max_page_size: max_page_size.max(1),
            recent_trades,
        }
    }

    pub fn max_page_size(&self) -> usize {
        self.max_page_size
    }

    fn clamp(&self, limit: usize) -> usize {
        limit.min(self.max_page_size)
    }

    pub async fn get_market(&self, id: MarketId) -> Result<Option<MarketView>> {
        Ok(self.store.market(id).await?.as_ref().map(MarketView::from))
    }

    pub async fn list_markets(
        &self,
        page: Page,
        order_by: MarketOrder,
        direction: Direction,
    ) -> Result<Vec<MarketView>> {
        let query = MarketQuery {
            page: Page::new(self.clamp(page.limit), page.skip),
            order_by,
            direction,
        };
        let markets = self.store.markets(&query).await?;
        Ok(markets.iter().map(MarketView::from).collect())
    }

    pub async fn get_market_outcomes(&self, id: MarketId) -> Result<Vec<OutcomeView>> {
        let outcomes = self.store.outcomes(id).await?;
        Ok(outcomes.iter().map(OutcomeView::from).collect())
    }

    /// User totals with every position record and the latest trades
    pub async fn get_user(&self, address: Address) -> Result<Option<UserProfile>> {
        let Some(user) = self.store.user(address).await? else {
            return Ok(None);
        };

        let positions = self.store.user_positions(address).await?;
        let mut markets: HashMap<MarketId, Option<Market>> = HashMap::new();
        for position in &positions {
            if !markets.contains_key(&position.market_id) {
                let market = self.store.market(position.market_id).await?;
                markets.insert(position.market_id, market);
            }
        }

        let trades = self
            .store
            .trades(&TradeQuery::for_user(address, Page::first(self.recent_trades)))
            .await?;

        Ok(Some(UserProfile {
            user: UserView::from(&user),
            positions: positions
                .iter()
                .map(|p| {
                    let market = markets.get(&p.market_id).and_then(Option::as_ref);
                    PositionView::new(p, market)
                })
                .collect(),
            recent_trades: trades.iter().map(TradeView::from).collect(),
        }))
    }

    pub async fn top_traders_by_volume(&self, n: usize) -> Result<Vec<UserView>> {
        self.top_users(UserRanking::Volume, n).await
    }

    pub async fn top_traders_by_pnl(&self, n: usize) -> Result<Vec<UserView>> {
        self.top_users(UserRanking::Pnl, n).await
    }

    async fn top_users(&self, ranking: UserRanking, n: usize) -> Result<Vec<UserView>> {
        let users = self.store.top_users(ranking, self.clamp(n)).await?;
        Ok(users.iter().map(UserView::from).collect())
    }

    /// Newest trades of one market
    pub async fn get_market_trades(&self, market_id: MarketId, n: usize) -> Result<Vec<TradeView>> {
        let query = TradeQuery::for_market(market_id, Page::first(self.clamp(n)));
        let trades = self.store.trades(&query).await?;
        Ok(trades.iter().map(TradeView::from).collect())
    }

    /// Newest trades across all markets
    pub async fn get_all_trades(&self, n: usize, skip: usize) -> Result<Vec<TradeView>> {
        let query = TradeQuery::all(Page::new(self.clamp(n), skip));
        let trades = self.store.trades(&query).await?;
        Ok(trades.iter().map(TradeView::from).collect())
    }

    pub async fn get_global_stats(&self) -> Result<StatsView> {
        Ok(StatsView::from(&self.store.stats().await?))
    }

    pub async fn get_watermark(&self) -> Result<Option<EventPosition>> {
        self.store.watermark().await
    }
}
