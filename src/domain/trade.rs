use alloy::primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::market::{MarketId, OutcomeIndex};

/// Kind of trade effect recorded in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeKind {
    /// Shares minted against collateral
    Mint,
    /// Shares redeemed before resolution
    Redeem,
    /// Winnings claimed after resolution
    Claim,
}

impl TradeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeKind::Mint => "MINT",
            TradeKind::Redeem => "REDEEM",
            TradeKind::Claim => "CLAIM",
        }
    }
}

impl fmt::Display for TradeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for TradeKind {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_uppercase().as_str() {
            "MINT" => Ok(TradeKind::Mint),
            "REDEEM" => Ok(TradeKind::Redeem),
            "CLAIM" => Ok(TradeKind::Claim),
            _ => Err(format!("Unknown trade kind: {}", s)),
        }
    }
}

/// Trade identity: unique per log, even with several effects in one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TradeId {
    pub transaction_hash: B256,
    pub log_index: u64,
}

impl TradeId {
    pub fn new(transaction_hash: B256, log_index: u64) -> Self {
        Self {
            transaction_hash,
            log_index,
        }
    }
}

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.transaction_hash, self.log_index)
    }
}

/// Immutable trade record
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub id: TradeId,
    pub user: Address,
    /// `None` for mints whose token could not be attributed to a market
    pub market_id: Option<MarketId>,
    pub outcome_index: OutcomeIndex,
    pub token_id: Option<U256>,
    pub amount: Decimal,
    /// Collateral paid out, for redemptions and claims
    pub payout: Option<Decimal>,
    pub kind: TradeKind,
    pub timestamp: DateTime<Utc>,
    pub block_number: u64,
}

impl Trade {
    pub fn transaction_hash(&self) -> B256 {
        self.id.transaction_hash
    }
}
