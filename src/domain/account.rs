use alloy::primitives::Address;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::checked_sum;
use super::market::{MarketId, OutcomeIndex, OutcomeKey};
use crate::error::{IndexerError, Result};

/// Decimal places kept on average cost basis
const COST_SCALE: u32 = 12;

/// A wallet that has interacted with the contract
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub address: Address,
    pub total_volume: Decimal,
    /// Realized P&L from claims, may go negative
    pub total_pnl: Decimal,
    pub markets_traded: u64,
    /// Positions with a non-zero balance
    pub position_count: u64,
}

impl User {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            total_volume: Decimal::ZERO,
            total_pnl: Decimal::ZERO,
            markets_traded: 0,
            position_count: 0,
        }
    }
}

/// Identity of a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PositionKey {
    pub market_id: MarketId,
    pub user: Address,
    pub outcome_index: OutcomeIndex,
}

impl PositionKey {
    pub fn new(outcome: OutcomeKey, user: Address) -> Self {
        Self {
            market_id: outcome.market_id,
            user,
            outcome_index: outcome.index,
        }
    }

    pub fn outcome(&self) -> OutcomeKey {
        OutcomeKey::new(self.market_id, self.outcome_index)
    }
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}",
            self.market_id,
            super::format_address(&self.user),
            self.outcome_index
        )
    }
}

/// Position phase; a closed position keeps its record and may reopen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionState {
    Open,
    Closed,
}

impl PositionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionState::Open => "OPEN",
            PositionState::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for PositionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of removing shares from a position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Debit {
    /// Shares actually removed
    pub removed: Decimal,
    /// Requested shares the position did not hold
    pub shortfall: Decimal,
    /// Balance went from non-zero to zero
    pub closed: bool,
}

/// A user's holding of one outcome
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub market_id: MarketId,
    pub user: Address,
    pub outcome_index: OutcomeIndex,
    pub balance: Decimal,
    /// Collateral units paid per share
    pub average_cost: Decimal,
    pub realized_pnl: Decimal,
}

impl Position {
    pub fn new(key: PositionKey) -> Self {
        Self {
            market_id: key.market_id,
            user: key.user,
            outcome_index: key.outcome_index,
            balance: Decimal::ZERO,
            average_cost: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
        }
    }

    pub fn key(&self) -> PositionKey {
        PositionKey {
            market_id: self.market_id,
            user: self.user,
            outcome_index: self.outcome_index,
        }
    }

    pub fn state(&self) -> PositionState {
        if self.balance > Decimal::ZERO {
            PositionState::Open
        } else {
            PositionState::Closed
        }
    }

    /// Add shares acquired at `unit_cost`. Returns true when this opens
    /// (or reopens) the position. The position is unchanged on overflow.
    pub fn credit(&mut self, amount: Decimal, unit_cost: Decimal) -> Result<bool> {
        let was_closed = self.state() == PositionState::Closed;
        let new_balance = checked_sum(self.balance, amount, "position balance")?;
        if new_balance > Decimal::ZERO {
            let overflow = || IndexerError::AmountOverflow {
                field: "position cost basis",
            };
            let held = self
                .balance
                .checked_mul(self.average_cost)
                .ok_or_else(overflow)?;
            let added = amount.checked_mul(unit_cost).ok_or_else(overflow)?;
            let cost = held.checked_add(added).ok_or_else(overflow)?;
            self.average_cost = cost
                .checked_div(new_balance)
                .ok_or_else(overflow)?
                .round_dp(COST_SCALE);
        }
        self.balance = new_balance;
        Ok(was_closed && self.state() == PositionState::Open)
    }

    /// Remove shares, clamping at zero
    pub fn debit(&mut self, amount: Decimal) -> Debit {
        let was_open = self.state() == PositionState::Open;
        let removed = amount.min(self.balance).max(Decimal::ZERO);
        self.balance -= removed;
        Debit {
            removed,
            shortfall: amount - removed,
            closed: was_open && self.state() == PositionState::Closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position() -> Position {
        Position::new(PositionKey::new(OutcomeKey::new(1, 0), Address::repeat_byte(0xaa)))
    }

    #[test]
    fn test_credit_opens_once() {
        let mut p = position();
        assert!(p.credit(dec!(100), Decimal::ONE).unwrap());
        assert!(!p.credit(dec!(50), Decimal::ONE).unwrap());
        assert_eq!(p.balance, dec!(150));
        assert_eq!(p.average_cost, Decimal::ONE);
    }

    #[test]
    fn test_average_cost_is_weighted() {
        let mut p = position();
        p.credit(dec!(100), Decimal::ONE).unwrap();
        p.credit(dec!(100), Decimal::ZERO).unwrap();
        assert_eq!(p.average_cost, dec!(0.5));
    }

    #[test]
    fn test_debit_clamps_and_closes() {
        let mut p = position();
        p.credit(dec!(100), Decimal::ONE).unwrap();
        let debit = p.debit(dec!(130));
        assert_eq!(debit.removed, dec!(100));
        assert_eq!(debit.shortfall, dec!(30));
        assert!(debit.closed);
        assert_eq!(p.state(), PositionState::Closed);
    }

    #[test]
    fn test_closed_position_reopens() {
        let mut p = position();
        p.credit(dec!(10), Decimal::ONE).unwrap();
        p.debit(dec!(10));
        assert!(p.credit(dec!(5), Decimal::ONE).unwrap());
        assert_eq!(p.state(), PositionState::Open);
    }

    #[test]
    fn test_debit_on_closed_position_is_noop() {
        let mut p = position();
        let debit = p.debit(dec!(5));
        assert_eq!(debit.removed, Decimal::ZERO);
        assert!(!debit.closed);
    }

    #[test]
    fn test_credit_overflow_keeps_position() {
        let half = Decimal::from_i128_with_scale(5 * 10i128.pow(28), 0);
        let mut p = position();
        p.credit(half, Decimal::ONE).unwrap();
        let err = p.credit(half, Decimal::ONE).unwrap_err();
        assert!(matches!(err, IndexerError::AmountOverflow { .. }));
        assert_eq!(p.balance, half);
        assert_eq!(p.average_cost, Decimal::ONE);
    }
}
