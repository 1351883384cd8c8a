use alloy::primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{checked_diff, checked_sum};
use crate::error::Result;

/// On-chain market id, assigned monotonically by the contract
pub type MarketId = u64;

/// Index of an outcome slot within a market
pub type OutcomeIndex = u32;

/// Market lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketPhase {
    Active,
    Resolved,
}

impl MarketPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketPhase::Active => "ACTIVE",
            MarketPhase::Resolved => "RESOLVED",
        }
    }

    /// Resolution is one-way
    pub fn can_transition_to(&self, target: MarketPhase) -> bool {
        matches!((self, target), (MarketPhase::Active, MarketPhase::Resolved))
    }
}

impl fmt::Display for MarketPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A prediction market and its derived aggregates
#[derive(Debug, Clone, PartialEq)]
pub struct Market {
    pub id: MarketId,
    pub question: String,
    pub description: String,
    /// Sender of the creating transaction, when the log source provides it
    pub creator: Option<Address>,
    pub collateral_token: Address,
    pub created_at: DateTime<Utc>,
    pub closing_time: DateTime<Utc>,
    pub resolution_time: Option<DateTime<Utc>>,
    pub condition_id: B256,
    pub outcome_count: u32,
    pub winning_outcome: Option<OutcomeIndex>,
    pub resolved: bool,
    pub paused: bool,

    /// Sum of minted amounts, never decreases
    pub total_volume: Decimal,
    /// Minted amounts minus redemption payouts
    pub total_liquidity: Decimal,
    pub participant_count: u64,
    pub trade_count: u64,
}

impl Market {
    pub fn phase(&self) -> MarketPhase {
        if self.resolved {
            MarketPhase::Resolved
        } else {
            MarketPhase::Active
        }
    }

    pub fn has_outcome(&self, index: OutcomeIndex) -> bool {
        index < self.outcome_count
    }

    /// Fresh outcome rows for this market, all unbound
    pub fn outcome_slots(&self) -> Vec<Outcome> {
        (0..self.outcome_count)
            .map(|index| Outcome::unbound(self.id, index))
            .collect()
    }

    /// Record a mint of `amount` collateral units. Nothing changes when
    /// either total would overflow.
    pub fn record_mint(&mut self, amount: Decimal) -> Result<()> {
        let volume = checked_sum(self.total_volume, amount, "market volume")?;
        let liquidity = checked_sum(self.total_liquidity, amount, "market liquidity")?;
        self.total_volume = volume;
        self.total_liquidity = liquidity;
        self.trade_count += 1;
        Ok(())
    }

    /// Record a redemption paying out `payout` collateral units
    pub fn record_redemption(&mut self, payout: Decimal) -> Result<()> {
        self.total_liquidity = checked_diff(self.total_liquidity, payout, "market liquidity")?;
        self.trade_count += 1;
        Ok(())
    }
}

/// Identity of an outcome slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutcomeKey {
    pub market_id: MarketId,
    pub index: OutcomeIndex,
}

impl OutcomeKey {
    pub fn new(market_id: MarketId, index: OutcomeIndex) -> Self {
        Self { market_id, index }
    }
}

impl fmt::Display for OutcomeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.market_id, self.index)
    }
}

/// One outcome slot of a market and its ERC-1155 token binding
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub market_id: MarketId,
    pub index: OutcomeIndex,
    /// `None` until the first mint of this outcome is observed
    pub token_id: Option<U256>,
    pub total_supply: Decimal,
    pub holders: u64,
}

impl Outcome {
    pub fn unbound(market_id: MarketId, index: OutcomeIndex) -> Self {
        Self {
            market_id,
            index,
            token_id: None,
            total_supply: Decimal::ZERO,
            holders: 0,
        }
    }

    pub fn key(&self) -> OutcomeKey {
        OutcomeKey::new(self.market_id, self.index)
    }

    pub fn is_bound(&self) -> bool {
        self.token_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn market() -> Market {
        Market {
            id: 1,
            question: "Will it rain?".into(),
            description: "Will it rain?".into(),
            creator: None,
            collateral_token: Address::ZERO,
            created_at: Utc::now(),
            closing_time: Utc::now(),
            resolution_time: None,
            condition_id: B256::ZERO,
            outcome_count: 3,
            winning_outcome: None,
            resolved: false,
            paused: false,
            total_volume: Decimal::ZERO,
            total_liquidity: Decimal::ZERO,
            participant_count: 0,
            trade_count: 0,
        }
    }

    #[test]
    fn test_phase_transitions() {
        assert!(MarketPhase::Active.can_transition_to(MarketPhase::Resolved));
        assert!(!MarketPhase::Resolved.can_transition_to(MarketPhase::Active));
        assert!(!MarketPhase::Resolved.can_transition_to(MarketPhase::Resolved));
    }

    #[test]
    fn test_outcome_slots_are_unbound() {
        let slots = market().outcome_slots();
        assert_eq!(slots.len(), 3);
        assert!(slots.iter().all(|o| !o.is_bound()));
        assert_eq!(slots[2].key(), OutcomeKey::new(1, 2));
    }

    #[test]
    fn test_liquidity_can_go_down_volume_cannot() {
        let mut m = market();
        m.record_mint(dec!(1000000)).unwrap();
        m.record_redemption(dec!(1800000)).unwrap();
        assert_eq!(m.total_volume, dec!(1000000));
        assert_eq!(m.total_liquidity, dec!(-800000));
        assert_eq!(m.trade_count, 2);
    }

    #[test]
    fn test_mint_past_decimal_range_leaves_market_untouched() {
        let half = Decimal::from_i128_with_scale(5 * 10i128.pow(28), 0);
        let mut m = market();
        m.record_mint(half).unwrap();
        assert!(m.record_mint(half).is_err());
        assert_eq!(m.total_volume, half);
        assert_eq!(m.total_liquidity, half);
        assert_eq!(m.trade_count, 1);
    }
}
