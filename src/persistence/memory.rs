//! In-memory entity store.
//!
//! All tables sit behind one `RwLock`; a commit takes the write lock once,
//! so readers see either the state before an event or after it.

use alloy::primitives::Address;
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::trace;

use super::store::{
    ChangeSet, Direction, EntityStore, MarketOrder, MarketQuery, TradeQuery, UserRanking,
};
use crate::domain::{
    EventPosition, GlobalStats, Market, MarketId, Outcome, OutcomeKey, Position, PositionKey,
    Trade, TradeId, User,
};
use crate::error::Result;

#[derive(Debug, Default)]
struct Tables {
    watermark: Option<EventPosition>,
    markets: BTreeMap<MarketId, Market>,
    outcomes: BTreeMap<OutcomeKey, Outcome>,
    users: HashMap<Address, User>,
    positions: BTreeMap<PositionKey, Position>,
    /// Append order is commit order, which is chain order
    trades: Vec<Trade>,
    trade_ids: HashSet<TradeId>,
    stats: GlobalStats,
}

/// Map-backed store for tests and ephemeral runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored trade records
    pub async fn trade_count(&self) -> usize {
        self.tables.read().await.trades.len()
    }
}

fn compare_markets(a: &Market, b: &Market, order: MarketOrder) -> Ordering {
    let primary = match order {
        MarketOrder::Id => a.id.cmp(&b.id),
        MarketOrder::CreatedAt => a.created_at.cmp(&b.created_at),
        MarketOrder::ClosingTime => a.closing_time.cmp(&b.closing_time),
        MarketOrder::TotalVolume => a.total_volume.cmp(&b.total_volume),
        MarketOrder::TotalLiquidity => a.total_liquidity.cmp(&b.total_liquidity),
        MarketOrder::ParticipantCount => a.participant_count.cmp(&b.participant_count),
        MarketOrder::TradeCount => a.trade_count.cmp(&b.trade_count),
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn watermark(&self) -> Result<Option<EventPosition>> {
        Ok(self.tables.read().await.watermark)
    }

    async fn market(&self, id: MarketId) -> Result<Option<Market>> {
        Ok(self.tables.read().await.markets.get(&id).cloned())
    }

    async fn markets(&self, query: &MarketQuery) -> Result<Vec<Market>> {
        let tables = self.tables.read().await;
        let mut markets: Vec<&Market> = tables.markets.values().collect();
        markets.sort_by(|a, b| {
            let ord = compare_markets(a, b, query.order_by);
            match query.direction {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            }
        });
        Ok(markets
            .into_iter()
            .skip(query.page.skip)
            .take(query.page.limit)
            .cloned()
            .collect())
    }

    async fn outcome(&self, key: OutcomeKey) -> Result<Option<Outcome>> {
        Ok(self.tables.read().await.outcomes.get(&key).cloned())
    }

    async fn outcomes(&self, market_id: MarketId) -> Result<Vec<Outcome>> {
        let tables = self.tables.read().await;
        Ok(tables
            .outcomes
            .range(OutcomeKey::new(market_id, 0)..=OutcomeKey::new(market_id, u32::MAX))
            .map(|(_, o)| o.clone())
            .collect())
    }

    async fn all_outcomes(&self) -> Result<Vec<Outcome>> {
        Ok(self.tables.read().await.outcomes.values().cloned().collect())
    }

    async fn user(&self, address: Address) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&address).cloned())
    }

    async fn top_users(&self, ranking: UserRanking, limit: usize) -> Result<Vec<User>> {
        let tables = self.tables.read().await;
        let mut users: Vec<&User> = tables.users.values().collect();
        users.sort_by(|a, b| {
            let ord = match ranking {
                UserRanking::Volume => b.total_volume.cmp(&a.total_volume),
                UserRanking::Pnl => b.total_pnl.cmp(&a.total_pnl),
            };
            ord.then_with(|| a.address.cmp(&b.address))
        });
        Ok(users.into_iter().take(limit).cloned().collect())
    }

    async fn position(&self, key: PositionKey) -> Result<Option<Position>> {
        Ok(self.tables.read().await.positions.get(&key).cloned())
    }

    async fn user_positions(&self, user: Address) -> Result<Vec<Position>> {
        let tables = self.tables.read().await;
        Ok(tables
            .positions
            .values()
            .filter(|p| p.user == user)
            .cloned()
            .collect())
    }

    async fn trade_exists(&self, id: TradeId) -> Result<bool> {
        Ok(self.tables.read().await.trade_ids.contains(&id))
    }

    async fn trades(&self, query: &TradeQuery) -> Result<Vec<Trade>> {
        let tables = self.tables.read().await;
        Ok(tables
            .trades
            .iter()
            .rev()
            .filter(|t| query.matches(t))
            .skip(query.page.skip)
            .take(query.page.limit)
            .cloned()
            .collect())
    }

    async fn stats(&self) -> Result<GlobalStats> {
        Ok(self.tables.read().await.stats.clone())
    }

    async fn commit(&self, changes: ChangeSet) -> Result<()> {
        let mut tables = self.tables.write().await;

        for market in changes.markets {
            tables.markets.insert(market.id, market);
        }
        for outcome in changes.outcomes {
            tables.outcomes.insert(outcome.key(), outcome);
        }
        for user in changes.users {
            tables.users.insert(user.address, user);
        }
        for position in changes.positions {
            tables.positions.insert(position.key(), position);
        }
        for trade in changes.trades {
            if tables.trade_ids.insert(trade.id) {
                tables.trades.push(trade);
            } else {
                trace!(trade = %trade.id, "trade already stored");
            }
        }
        if let Some(stats) = changes.stats {
            tables.stats = stats;
        }
        tables.watermark = Some(changes.watermark);

        Ok(())
    }
}
