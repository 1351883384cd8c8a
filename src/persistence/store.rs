//! Entity store contract.
//!
//! The aggregation engine is the only writer. It reads through the accessors
//! below and writes one [`ChangeSet`] per event; a backend must apply a
//! change set atomically, watermark included, so readers only ever observe
//! per-event committed states.

use alloy::primitives::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{
    EventPosition, GlobalStats, Market, MarketId, Outcome, OutcomeKey, Position, PositionKey,
    Trade, TradeId, User,
};
use crate::error::Result;

/// Offset pagination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub limit: usize,
    pub skip: usize,
}

impl Page {
    pub fn new(limit: usize, skip: usize) -> Self {
        Self { limit, skip }
    }

    pub fn first(limit: usize) -> Self {
        Self { limit, skip: 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MarketOrder {
    #[default]
    Id,
    CreatedAt,
    ClosingTime,
    TotalVolume,
    TotalLiquidity,
    ParticipantCount,
    TradeCount,
}

impl MarketOrder {
    /// Column used by SQL backends
    pub fn column(&self) -> &'static str {
        match self {
            MarketOrder::Id => "id",
            MarketOrder::CreatedAt => "created_at",
            MarketOrder::ClosingTime => "closing_time",
            MarketOrder::TotalVolume => "total_volume",
            MarketOrder::TotalLiquidity => "total_liquidity",
            MarketOrder::ParticipantCount => "participant_count",
            MarketOrder::TradeCount => "trade_count",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    #[default]
    Desc,
}

impl Direction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketQuery {
    pub page: Page,
    pub order_by: MarketOrder,
    pub direction: Direction,
}

/// Leaderboard ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserRanking {
    Volume,
    Pnl,
}

/// Trade history filter, newest first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeQuery {
    pub market_id: Option<MarketId>,
    pub user: Option<Address>,
    pub page: Page,
}

impl TradeQuery {
    pub fn all(page: Page) -> Self {
        Self {
            market_id: None,
            user: None,
            page,
        }
    }

    pub fn for_market(market_id: MarketId, page: Page) -> Self {
        Self {
            market_id: Some(market_id),
            user: None,
            page,
        }
    }

    pub fn for_user(user: Address, page: Page) -> Self {
        Self {
            market_id: None,
            user: Some(user),
            page,
        }
    }

    pub fn matches(&self, trade: &Trade) -> bool {
        self.market_id.map_or(true, |id| trade.market_id == Some(id))
            && self.user.map_or(true, |u| trade.user == u)
    }
}

/// Everything one event changed, plus the watermark it advances to
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet {
    pub markets: Vec<Market>,
    pub outcomes: Vec<Outcome>,
    pub users: Vec<User>,
    pub positions: Vec<Position>,
    /// Insert-or-ignore on trade id
    pub trades: Vec<Trade>,
    pub stats: Option<GlobalStats>,
    pub watermark: EventPosition,
}

impl ChangeSet {
    /// Advance the watermark without touching entities
    pub fn watermark_only(watermark: EventPosition) -> Self {
        Self {
            markets: Vec::new(),
            outcomes: Vec::new(),
            users: Vec::new(),
            positions: Vec::new(),
            trades: Vec::new(),
            stats: None,
            watermark,
        }
    }

    pub fn is_watermark_only(&self) -> bool {
        self.markets.is_empty()
            && self.outcomes.is_empty()
            && self.users.is_empty()
            && self.positions.is_empty()
            && self.trades.is_empty()
            && self.stats.is_none()
    }
}

#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Last committed event position
    async fn watermark(&self) -> Result<Option<EventPosition>>;

    async fn market(&self, id: MarketId) -> Result<Option<Market>>;

    async fn markets(&self, query: &MarketQuery) -> Result<Vec<Market>>;

    async fn outcome(&self, key: OutcomeKey) -> Result<Option<Outcome>>;

    /// Outcomes of one market, by index
    async fn outcomes(&self, market_id: MarketId) -> Result<Vec<Outcome>>;

    /// Every outcome row, used to rebuild the token index on startup
    async fn all_outcomes(&self) -> Result<Vec<Outcome>>;

    async fn user(&self, address: Address) -> Result<Option<User>>;

    async fn top_users(&self, ranking: UserRanking, limit: usize) -> Result<Vec<User>>;

    async fn position(&self, key: PositionKey) -> Result<Option<Position>>;

    async fn user_positions(&self, user: Address) -> Result<Vec<Position>>;

    async fn trade_exists(&self, id: TradeId) -> Result<bool>;

    async fn trades(&self, query: &TradeQuery) -> Result<Vec<Trade>>;

    /// Global counters, zeroed before the first event
    async fn stats(&self) -> Result<GlobalStats>;

    /// Apply a change set atomically
    async fn commit(&self, changes: ChangeSet) -> Result<()>;
}
