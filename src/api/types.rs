use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{
    format_address, EventPosition, GlobalStats, Market, Outcome, Position, Trade, User,
};
use crate::persistence::{Direction, MarketOrder};

// ============================================================================
// Market Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketView {
    pub id: u64,
    pub question: String,
    pub description: String,
    pub creator: Option<String>,
    pub collateral_token: String,
    pub created_at: DateTime<Utc>,
    pub closing_time: DateTime<Utc>,
    pub resolution_time: Option<DateTime<Utc>>,
    pub condition_id: String,
    pub outcome_count: u32,
    pub winning_outcome: Option<u32>,
    pub resolved: bool,
    pub paused: bool,
    pub status: String,
    pub total_volume: Decimal,
    pub total_liquidity: Decimal,
    pub participant_count: u64,
    pub trade_count: u64,
}

impl From<&Market> for MarketView {
    fn from(m: &Market) -> Self {
        Self {
            id: m.id,
            question: m.question.clone(),
            description: m.description.clone(),
            creator: m.creator.as_ref().map(format_address),
            collateral_token: format_address(&m.collateral_token),
            created_at: m.created_at,
            closing_time: m.closing_time,
            resolution_time: m.resolution_time,
            condition_id: m.condition_id.to_string(),
            outcome_count: m.outcome_count,
            winning_outcome: m.winning_outcome,
            resolved: m.resolved,
            paused: m.paused,
            status: m.phase().to_string(),
            total_volume: m.total_volume,
            total_liquidity: m.total_liquidity,
            participant_count: m.participant_count,
            trade_count: m.trade_count,
        }
    }
}

/// Market fields nested in positions and trades
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSummary {
    pub id: u64,
    pub question: String,
    pub resolved: bool,
    pub winning_outcome: Option<u32>,
}

impl From<&Market> for MarketSummary {
    fn from(m: &Market) -> Self {
        Self {
            id: m.id,
            question: m.question.clone(),
            resolved: m.resolved,
            winning_outcome: m.winning_outcome,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeView {
    pub market_id: u64,
    pub outcome_index: u32,
    /// Decimal token id, absent until the first mint binds it
    pub token_id: Option<String>,
    pub total_supply: Decimal,
    pub holders: u64,
}

impl From<&Outcome> for OutcomeView {
    fn from(o: &Outcome) -> Self {
        Self {
            market_id: o.market_id,
            outcome_index: o.index,
            token_id: o.token_id.map(|t| t.to_string()),
            total_supply: o.total_supply,
            holders: o.holders,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MarketListQuery {
    pub limit: Option<usize>,
    pub skip: Option<usize>,
    pub order_by: Option<MarketOrder>,
    pub direction: Option<Direction>,
}

// ============================================================================
// User Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserView {
    pub address: String,
    pub total_volume: Decimal,
    pub total_pnl: Decimal,
    pub markets_traded: u64,
    pub position_count: u64,
}

impl From<&User> for UserView {
    fn from(u: &User) -> Self {
        Self {
            address: format_address(&u.address),
            total_volume: u.total_volume,
            total_pnl: u.total_pnl,
            markets_traded: u.markets_traded,
            position_count: u.position_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionView {
    pub market: Option<MarketSummary>,
    pub market_id: u64,
    pub outcome_index: u32,
    pub balance: Decimal,
    pub average_cost: Decimal,
    pub realized_pnl: Decimal,
    pub status: String,
}

impl PositionView {
    pub fn new(p: &Position, market: Option<&Market>) -> Self {
        Self {
            market: market.map(MarketSummary::from),
            market_id: p.market_id,
            outcome_index: p.outcome_index,
            balance: p.balance,
            average_cost: p.average_cost,
            realized_pnl: p.realized_pnl,
            status: p.state().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(flatten)]
    pub user: UserView,
    pub positions: Vec<PositionView>,
    pub recent_trades: Vec<TradeView>,
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<usize>,
}

// ============================================================================
// Trade Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeView {
    pub id: String,
    pub user: String,
    pub market_id: Option<u64>,
    pub outcome_index: u32,
    pub token_id: Option<String>,
    pub amount: Decimal,
    pub payout: Option<Decimal>,
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: DateTime<Utc>,
    pub block_number: u64,
    pub transaction_hash: String,
}

impl From<&Trade> for TradeView {
    fn from(t: &Trade) -> Self {
        Self {
            id: t.id.to_string(),
            user: format_address(&t.user),
            market_id: t.market_id,
            outcome_index: t.outcome_index,
            token_id: t.token_id.map(|id| id.to_string()),
            amount: t.amount,
            payout: t.payout,
            kind: t.kind.to_string(),
            timestamp: t.timestamp,
            block_number: t.block_number,
            transaction_hash: t.transaction_hash().to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TradeListQuery {
    pub limit: Option<usize>,
    pub skip: Option<usize>,
}

// ============================================================================
// Stats & System Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsView {
    pub total_volume: Decimal,
    pub total_markets: u64,
    pub total_users: u64,
    pub total_trades: u64,
}

impl From<&GlobalStats> for StatsView {
    fn from(s: &GlobalStats) -> Self {
        Self {
            total_volume: s.total_volume,
            total_markets: s.total_markets,
            total_users: s.total_users,
            total_trades: s.total_trades,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: i64,
    pub watermark: Option<EventPosition>,
    pub head_block: u64,
    pub lag_blocks: u64,
}
