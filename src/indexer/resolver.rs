//! Token id → outcome slot resolution.
//!
//! Token ids are unknown until an outcome's first mint, so binding is lazy:
//! the first mint of an unseen token id binds it to the lowest unbound
//! `(market_id, index)` slot. Bound tokens resolve through a reverse index.
//! Unbound slots sit in an ordered pending set; an optional horizon limits
//! the candidates to the N most recently created markets.
//!
//! Resolution is a pure query. The engine records the binding in its change
//! set and calls [`TokenResolver::bind`] only after the commit succeeds.

use alloy::primitives::U256;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::domain::{MarketId, Outcome, OutcomeKey};
use crate::error::{IndexerError, Result};

/// How a mint's token id maps onto an outcome slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Token already bound to this slot
    Known(OutcomeKey),
    /// First observation: the token would bind to this slot
    NewBinding(OutcomeKey),
    /// No bound or pending slot matches
    Unattributed,
}

impl Resolution {
    pub fn outcome(&self) -> Option<OutcomeKey> {
        match self {
            Resolution::Known(key) | Resolution::NewBinding(key) => Some(*key),
            Resolution::Unattributed => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TokenResolver {
    tokens: HashMap<U256, OutcomeKey>,
    bound: HashMap<OutcomeKey, U256>,
    pending: BTreeSet<OutcomeKey>,
    markets: BTreeSet<MarketId>,
    horizon: Option<usize>,
}

impl TokenResolver {
    /// `horizon`: number of most recent markets eligible for new bindings,
    /// `None` for all of them
    pub fn new(horizon: Option<usize>) -> Self {
        Self {
            horizon,
            ..Self::default()
        }
    }

    /// Rebuild from stored outcome rows
    pub fn from_outcomes<'a>(
        horizon: Option<usize>,
        outcomes: impl IntoIterator<Item = &'a Outcome>,
    ) -> Result<Self> {
        let mut resolver = Self::new(horizon);
        for outcome in outcomes {
            resolver.markets.insert(outcome.market_id);
            match outcome.token_id {
                Some(token) => resolver.bind(token, outcome.key())?,
                None => {
                    resolver.pending.insert(outcome.key());
                }
            }
        }
        Ok(resolver)
    }

    /// Make a new market's slots eligible for binding
    pub fn register_market(&mut self, market_id: MarketId, outcome_count: u32) {
        self.markets.insert(market_id);
        for index in 0..outcome_count {
            let key = OutcomeKey::new(market_id, index);
            if !self.bound.contains_key(&key) {
                self.pending.insert(key);
            }
        }
    }

    /// Fast path for any transfer
    pub fn lookup(&self, token: &U256) -> Option<OutcomeKey> {
        self.tokens.get(token).copied()
    }

    /// Token bound to a slot, if any
    pub fn token_of(&self, key: OutcomeKey) -> Option<U256> {
        self.bound.get(&key).copied()
    }

    pub fn resolve_mint(&self, token: &U256) -> Resolution {
        if let Some(key) = self.lookup(token) {
            return Resolution::Known(key);
        }
        let floor = self.horizon_floor();
        match self.pending.range(OutcomeKey::new(floor, 0)..).next() {
            Some(key) => Resolution::NewBinding(*key),
            None => Resolution::Unattributed,
        }
    }

    /// Record a permanent binding. Rebinding either side is refused.
    pub fn bind(&mut self, token: U256, key: OutcomeKey) -> Result<()> {
        if let Some(existing) = self.tokens.get(&token) {
            if *existing == key {
                return Ok(());
            }
            return Err(IndexerError::InconsistentBinding {
                token: token.to_string(),
                bound: existing.to_string(),
                attempted: key.to_string(),
            });
        }
        if let Some(other) = self.bound.get(&key) {
            return Err(IndexerError::InconsistentBinding {
                token: token.to_string(),
                bound: format!("{key} (token {other})"),
                attempted: key.to_string(),
            });
        }

        self.tokens.insert(token, key);
        self.bound.insert(key, token);
        self.pending.remove(&key);
        self.markets.insert(key.market_id);
        debug!(%token, outcome = %key, "token bound");
        Ok(())
    }

    pub fn bound_count(&self) -> usize {
        self.tokens.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Lowest market id inside the horizon
    fn horizon_floor(&self) -> MarketId {
        match self.horizon {
            Some(n) if n < self.markets.len() => self
                .markets
                .iter()
                .rev()
                .nth(n.saturating_sub(1))
                .copied()
                .unwrap_or(MarketId::MAX),
            _ => 0,
        }
    }
}
