//! Aggregation engine.
//!
//! Applies decoded events to the entity store, one atomic change set per
//! event. Every event is checked against the `(block, log_index)` watermark
//! first; anything at or below it has already been applied and is dropped
//! before touching aggregates. Per-event failures (missing entities,
//! binding conflicts, duplicate trades) still advance the watermark so a
//! bad event is never retried forever.

use alloy::primitives::{Address, U256};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::decoder::{
    ChainEvent, DecodedEvent, EventMeta, MarketCreatedEvent, MarketResolvedEvent,
    RedemptionEvent, TransferEvent, TransferKind,
};
use super::resolver::{Resolution, TokenResolver};
use crate::domain::{
    checked_sum, EventPosition, GlobalStats, Market, MarketId, MarketPhase, Outcome, OutcomeKey, Position,
    PositionKey, Trade, TradeKind, User,
};
use crate::error::{IndexerError, Result};
use crate::persistence::{ChangeSet, EntityStore};

/// Shares minted cost one collateral unit each
const MINT_UNIT_COST: Decimal = Decimal::ONE;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub collateral_token: Address,
    pub binding_horizon: Option<usize>,
}

/// What happened to an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Committed,
    /// At or below the watermark, dropped
    Stale,
}

/// Resolver updates that only take effect once the change set is stored
#[derive(Debug, Default)]
struct Effects {
    binding: Option<(U256, OutcomeKey)>,
    market: Option<(MarketId, u32)>,
}

pub struct Aggregator {
    store: Arc<dyn EntityStore>,
    resolver: TokenResolver,
    watermark: Option<EventPosition>,
    settings: EngineSettings,
}

impl Aggregator {
    /// Restore watermark and token bindings from the store
    pub async fn bootstrap(store: Arc<dyn EntityStore>, settings: EngineSettings) -> Result<Self> {
        let watermark = store.watermark().await?;
        let outcomes = store.all_outcomes().await?;
        let resolver = TokenResolver::from_outcomes(settings.binding_horizon, &outcomes)?;

        info!(
            watermark = ?watermark,
            bound = resolver.bound_count(),
            pending = resolver.pending_count(),
            "aggregator restored"
        );

        Ok(Self {
            store,
            resolver,
            watermark,
            settings,
        })
    }

    pub fn watermark(&self) -> Option<EventPosition> {
        self.watermark
    }

    pub fn resolver(&self) -> &TokenResolver {
        &self.resolver
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    /// Apply one event. A recoverable error is returned after the watermark
    /// has moved past the event; a fatal one leaves everything untouched.
    pub async fn apply(&mut self, event: &DecodedEvent) -> Result<Applied> {
        let position = event.meta.position;
        if position.is_covered_by(self.watermark) {
            debug!(%position, watermark = ?self.watermark, "event already applied");
            return Ok(Applied::Stale);
        }

        let store = Arc::clone(&self.store);
        let mut uow = UnitOfWork::new(store.as_ref());
        let mut effects = Effects::default();

        let outcome = match &event.event {
            ChainEvent::MarketCreated(ev) => {
                self.on_market_created(&mut uow, &event.meta, ev, &mut effects)
                    .await
            }
            ChainEvent::MarketResolved(ev) => self.on_market_resolved(&mut uow, &event.meta, ev).await,
            ChainEvent::TransferSingle(ev) => match ev.kind() {
                TransferKind::Mint => self.on_mint(&mut uow, &event.meta, ev, &mut effects).await,
                TransferKind::Burn => self.on_burn(&mut uow, ev).await,
                TransferKind::Transfer => self.on_transfer(&mut uow, ev).await,
                TransferKind::Null => {
                    debug!(%position, "zero-to-zero transfer ignored");
                    Ok(())
                }
            },
            ChainEvent::TokensRedeemed(ev) => self.on_redeemed(&mut uow, &event.meta, ev).await,
        };

        match outcome {
            Ok(()) => {
                self.store.commit(uow.into_changes(position)).await?;
                self.watermark = Some(position);
                self.confirm(effects);
                Ok(Applied::Committed)
            }
            Err(err) if !err.is_fatal() => {
                self.store.commit(ChangeSet::watermark_only(position)).await?;
                self.watermark = Some(position);
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Move the watermark past an event that never reached `apply`
    pub async fn advance(&mut self, position: EventPosition) -> Result<()> {
        if position.is_covered_by(self.watermark) {
            return Ok(());
        }
        self.store.commit(ChangeSet::watermark_only(position)).await?;
        self.watermark = Some(position);
        Ok(())
    }

    fn confirm(&mut self, effects: Effects) {
        if let Some((market_id, outcome_count)) = effects.market {
            self.resolver.register_market(market_id, outcome_count);
        }
        if let Some((token, key)) = effects.binding {
            // the store already holds this binding; a refusal here means the
            // resolver and the store disagree
            if let Err(err) = self.resolver.bind(token, key) {
                warn!(error = %err, "binding committed but refused by resolver");
            }
        }
    }

    async fn on_market_created(
        &self,
        uow: &mut UnitOfWork<'_>,
        meta: &EventMeta,
        ev: &MarketCreatedEvent,
        effects: &mut Effects,
    ) -> Result<()> {
        if uow.market(ev.market_id).await?.is_some() {
            return Err(IndexerError::AlreadyExists {
                entity: "market",
                id: ev.market_id.to_string(),
            });
        }

        let market = Market {
            id: ev.market_id,
            question: ev.question.clone(),
            description: ev.question.clone(),
            creator: meta.transaction_from,
            collateral_token: self.settings.collateral_token,
            created_at: meta.block_timestamp,
            closing_time: ev.closing_time,
            resolution_time: None,
            condition_id: ev.condition_id,
            outcome_count: ev.outcome_count,
            winning_outcome: None,
            resolved: false,
            paused: false,
            total_volume: Decimal::ZERO,
            total_liquidity: Decimal::ZERO,
            participant_count: 0,
            trade_count: 0,
        };
        for outcome in market.outcome_slots() {
            uow.insert_outcome(outcome);
        }
        uow.insert_market(market);
        uow.stats().await?.total_markets += 1;

        effects.market = Some((ev.market_id, ev.outcome_count));
        info!(market_id = ev.market_id, outcomes = ev.outcome_count, "market created");
        Ok(())
    }

    async fn on_market_resolved(
        &self,
        uow: &mut UnitOfWork<'_>,
        meta: &EventMeta,
        ev: &MarketResolvedEvent,
    ) -> Result<()> {
        let market = uow
            .market(ev.market_id)
            .await?
            .ok_or_else(|| IndexerError::missing("market", ev.market_id))?;

        if !market.has_outcome(ev.winning_outcome) {
            return Err(IndexerError::missing(
                "outcome",
                OutcomeKey::new(ev.market_id, ev.winning_outcome),
            ));
        }

        if !market.phase().can_transition_to(MarketPhase::Resolved) {
            return match market.winning_outcome {
                Some(current) if current == ev.winning_outcome => {
                    debug!(market_id = ev.market_id, "market already resolved to same outcome");
                    Ok(())
                }
                current => Err(IndexerError::ResolutionConflict {
                    market_id: ev.market_id,
                    current: current.unwrap_or_default(),
                    attempted: ev.winning_outcome,
                }),
            };
        }

        market.resolved = true;
        market.winning_outcome = Some(ev.winning_outcome);
        market.resolution_time = Some(meta.block_timestamp);

        info!(market_id = ev.market_id, winner = ev.winning_outcome, "market resolved");
        Ok(())
    }

    async fn on_mint(
        &self,
        uow: &mut UnitOfWork<'_>,
        meta: &EventMeta,
        ev: &TransferEvent,
        effects: &mut Effects,
    ) -> Result<()> {
        uow.ensure_new_trade(meta).await?;

        let key = match self.resolver.resolve_mint(&ev.token_id) {
            Resolution::Known(key) => key,
            Resolution::NewBinding(key) => {
                effects.binding = Some((ev.token_id, key));
                key
            }
            Resolution::Unattributed => return self.on_unattributed_mint(uow, meta, ev).await,
        };

        if uow.market(key.market_id).await?.is_none() {
            return Err(IndexerError::missing("market", key.market_id));
        }

        let outcome = uow
            .outcome(key)
            .await?
            .ok_or_else(|| IndexerError::missing("outcome", key))?;
        match outcome.token_id {
            Some(bound) if bound != ev.token_id => {
                return Err(IndexerError::InconsistentBinding {
                    token: ev.token_id.to_string(),
                    bound: format!("{key} (token {bound})"),
                    attempted: key.to_string(),
                })
            }
            Some(_) => {}
            None => outcome.token_id = Some(ev.token_id),
        }
        outcome.total_supply = checked_sum(outcome.total_supply, ev.amount, "outcome supply")?;

        self.credit_holder(uow, key, ev.to, ev.amount, MINT_UNIT_COST)
            .await?;

        if let Some(market) = uow.market(key.market_id).await? {
            market.record_mint(ev.amount)?;
        }
        let user = uow.user(ev.to).await?;
        user.total_volume = checked_sum(user.total_volume, ev.amount, "user volume")?;

        uow.record_trade(Trade {
            id: meta.trade_id(),
            user: ev.to,
            market_id: Some(key.market_id),
            outcome_index: key.index,
            token_id: Some(ev.token_id),
            amount: ev.amount,
            payout: None,
            kind: TradeKind::Mint,
            timestamp: meta.block_timestamp,
            block_number: meta.block_number(),
        });

        let stats = uow.stats().await?;
        stats.total_trades += 1;
        stats.total_volume = checked_sum(stats.total_volume, ev.amount, "global volume")?;

        debug!(outcome = %key, user = %ev.to, amount = %ev.amount, "mint applied");
        Ok(())
    }

    /// Mint of a token no outcome slot can take: counted for the user and
    /// globally, recorded without a market
    async fn on_unattributed_mint(
        &self,
        uow: &mut UnitOfWork<'_>,
        meta: &EventMeta,
        ev: &TransferEvent,
    ) -> Result<()> {
        warn!(
            token = %ev.token_id,
            user = %ev.to,
            position = %meta.position,
            "mint could not be attributed to a market"
        );

        let user = uow.user(ev.to).await?;
        user.total_volume = checked_sum(user.total_volume, ev.amount, "user volume")?;
        uow.record_trade(Trade {
            id: meta.trade_id(),
            user: ev.to,
            market_id: None,
            outcome_index: 0,
            token_id: Some(ev.token_id),
            amount: ev.amount,
            payout: None,
            kind: TradeKind::Mint,
            timestamp: meta.block_timestamp,
            block_number: meta.block_number(),
        });

        let stats = uow.stats().await?;
        stats.total_trades += 1;
        stats.total_volume = checked_sum(stats.total_volume, ev.amount, "global volume")?;
        Ok(())
    }

    async fn on_burn(&self, uow: &mut UnitOfWork<'_>, ev: &TransferEvent) -> Result<()> {
        let key = self.attribute(&ev.token_id)?;

        let outcome = uow
            .outcome(key)
            .await?
            .ok_or_else(|| IndexerError::missing("outcome", key))?;
        outcome.total_supply = (outcome.total_supply - ev.amount).max(Decimal::ZERO);

        self.debit_holder(uow, key, ev.from, ev.amount).await?;

        debug!(outcome = %key, user = %ev.from, amount = %ev.amount, "burn applied");
        Ok(())
    }

    async fn on_transfer(&self, uow: &mut UnitOfWork<'_>, ev: &TransferEvent) -> Result<()> {
        let key = self.attribute(&ev.token_id)?;
        if uow.outcome(key).await?.is_none() {
            return Err(IndexerError::missing("outcome", key));
        }

        let carried_cost = self
            .debit_holder(uow, key, ev.from, ev.amount)
            .await?
            .unwrap_or(MINT_UNIT_COST);
        self.credit_holder(uow, key, ev.to, ev.amount, carried_cost)
            .await?;

        debug!(
            outcome = %key,
            from = %ev.from,
            to = %ev.to,
            amount = %ev.amount,
            "transfer applied"
        );
        Ok(())
    }

    async fn on_redeemed(
        &self,
        uow: &mut UnitOfWork<'_>,
        meta: &EventMeta,
        ev: &RedemptionEvent,
    ) -> Result<()> {
        uow.ensure_new_trade(meta).await?;

        let market = uow
            .market(ev.market_id)
            .await?
            .ok_or_else(|| IndexerError::missing("market", ev.market_id))?;
        let resolved = market.resolved;
        market.record_redemption(ev.payout)?;

        let kind = if resolved {
            TradeKind::Claim
        } else {
            TradeKind::Redeem
        };

        let user = uow.user(ev.user).await?;
        if resolved {
            let profit = ev.payout - ev.amount;
            user.total_pnl = checked_sum(user.total_pnl, profit, "user pnl")?;
            let key = PositionKey::new(OutcomeKey::new(ev.market_id, ev.outcome), ev.user);
            if let Some(position) = uow.position(key).await? {
                position.realized_pnl = checked_sum(position.realized_pnl, profit, "position pnl")?;
            }
        }

        let token_id = self
            .resolver
            .token_of(OutcomeKey::new(ev.market_id, ev.outcome));
        uow.record_trade(Trade {
            id: meta.trade_id(),
            user: ev.user,
            market_id: Some(ev.market_id),
            outcome_index: ev.outcome,
            token_id,
            amount: ev.amount,
            payout: Some(ev.payout),
            kind,
            timestamp: meta.block_timestamp,
            block_number: meta.block_number(),
        });
        uow.stats().await?.total_trades += 1;

        debug!(
            market_id = ev.market_id,
            user = %ev.user,
            kind = %kind,
            payout = %ev.payout,
            "redemption applied"
        );
        Ok(())
    }

    /// Non-mint transfers only use bound tokens
    fn attribute(&self, token: &U256) -> Result<OutcomeKey> {
        self.resolver
            .lookup(token)
            .ok_or_else(|| IndexerError::missing("outcome token", token))
    }

    /// Add shares to a holder, maintaining participant, market and holder
    /// counters
    async fn credit_holder(
        &self,
        uow: &mut UnitOfWork<'_>,
        key: OutcomeKey,
        holder: Address,
        amount: Decimal,
        unit_cost: Decimal,
    ) -> Result<()> {
        let position_key = PositionKey::new(key, holder);
        let first_in_market = !uow.holds_market(holder, key.market_id).await?;

        let (created, position) = uow.position_or_new(position_key).await?;
        let opened = position.credit(amount, unit_cost)?;

        // a second outcome in the same market is the same participant
        if created && first_in_market {
            if let Some(market) = uow.market(key.market_id).await? {
                market.participant_count += 1;
            }
        }
        if opened {
            if let Some(outcome) = uow.outcome(key).await? {
                outcome.holders += 1;
            }
        }

        let user = uow.user(holder).await?;
        if created && first_in_market {
            user.markets_traded += 1;
        }
        if opened {
            user.position_count += 1;
        }
        Ok(())
    }

    /// Remove shares from a holder, clamping at zero. Returns the holder's
    /// average cost when a position existed.
    async fn debit_holder(
        &self,
        uow: &mut UnitOfWork<'_>,
        key: OutcomeKey,
        holder: Address,
        amount: Decimal,
    ) -> Result<Option<Decimal>> {
        let position_key = PositionKey::new(key, holder);
        let Some(position) = uow.position(position_key).await? else {
            warn!(position = %position_key, %amount, "debit from unknown position");
            return Ok(None);
        };

        let cost = position.average_cost;
        let debit = position.debit(amount);
        if debit.shortfall > Decimal::ZERO {
            warn!(
                position = %position_key,
                shortfall = %debit.shortfall,
                "debit exceeds balance, clamped"
            );
        }

        if debit.closed {
            if let Some(outcome) = uow.outcome(key).await? {
                outcome.holders = outcome.holders.saturating_sub(1);
            }
            let user = uow.user(holder).await?;
            user.position_count = user.position_count.saturating_sub(1);
        }
        Ok(Some(cost))
    }
}

/// Read-through cache of the entities one event touches
struct UnitOfWork<'a> {
    store: &'a dyn EntityStore,
    markets: BTreeMap<MarketId, Market>,
    outcomes: BTreeMap<OutcomeKey, Outcome>,
    users: BTreeMap<Address, User>,
    positions: BTreeMap<PositionKey, Position>,
    trades: Vec<Trade>,
    stats: Option<GlobalStats>,
}

impl<'a> UnitOfWork<'a> {
    fn new(store: &'a dyn EntityStore) -> Self {
        Self {
            store,
            markets: BTreeMap::new(),
            outcomes: BTreeMap::new(),
            users: BTreeMap::new(),
            positions: BTreeMap::new(),
            trades: Vec::new(),
            stats: None,
        }
    }

    async fn market(&mut self, id: MarketId) -> Result<Option<&mut Market>> {
        if !self.markets.contains_key(&id) {
            if let Some(market) = self.store.market(id).await? {
                self.markets.insert(id, market);
            }
        }
        Ok(self.markets.get_mut(&id))
    }

    fn insert_market(&mut self, market: Market) {
        self.markets.insert(market.id, market);
    }

    async fn outcome(&mut self, key: OutcomeKey) -> Result<Option<&mut Outcome>> {
        if !self.outcomes.contains_key(&key) {
            if let Some(outcome) = self.store.outcome(key).await? {
                self.outcomes.insert(key, outcome);
            }
        }
        Ok(self.outcomes.get_mut(&key))
    }

    fn insert_outcome(&mut self, outcome: Outcome) {
        self.outcomes.insert(outcome.key(), outcome);
    }

    /// Load or create; a created user counts towards `total_users`
    async fn user(&mut self, address: Address) -> Result<&mut User> {
        if !self.users.contains_key(&address) {
            let user = match self.store.user(address).await? {
                Some(user) => user,
                None => {
                    self.stats().await?.total_users += 1;
                    User::new(address)
                }
            };
            self.users.insert(address, user);
        }
        Ok(self
            .users
            .entry(address)
            .or_insert_with(|| User::new(address)))
    }

    async fn position(&mut self, key: PositionKey) -> Result<Option<&mut Position>> {
        if !self.positions.contains_key(&key) {
            if let Some(position) = self.store.position(key).await? {
                self.positions.insert(key, position);
            }
        }
        Ok(self.positions.get_mut(&key))
    }

    /// Load or create; the flag is true when the position record is new
    async fn position_or_new(&mut self, key: PositionKey) -> Result<(bool, &mut Position)> {
        let created = self.position(key).await?.is_none();
        let position = self
            .positions
            .entry(key)
            .or_insert_with(|| Position::new(key));
        Ok((created, position))
    }

    /// Whether `user` has any position record in `market_id`
    async fn holds_market(&mut self, user: Address, market_id: MarketId) -> Result<bool> {
        if self
            .positions
            .keys()
            .any(|k| k.user == user && k.market_id == market_id)
        {
            return Ok(true);
        }
        Ok(self
            .store
            .user_positions(user)
            .await?
            .iter()
            .any(|p| p.market_id == market_id))
    }

    async fn stats(&mut self) -> Result<&mut GlobalStats> {
        if self.stats.is_none() {
            self.stats = Some(self.store.stats().await?);
        }
        Ok(self.stats.get_or_insert_with(GlobalStats::default))
    }

    async fn ensure_new_trade(&self, meta: &EventMeta) -> Result<()> {
        let id = meta.trade_id();
        if self.store.trade_exists(id).await? {
            return Err(IndexerError::DuplicateTrade(id.to_string()));
        }
        Ok(())
    }

    fn record_trade(&mut self, trade: Trade) {
        self.trades.push(trade);
    }

    fn into_changes(self, watermark: EventPosition) -> ChangeSet {
        ChangeSet {
            markets: self.markets.into_values().collect(),
            outcomes: self.outcomes.into_values().collect(),
            users: self.users.into_values().collect(),
            positions: self.positions.into_values().collect(),
            trades: self.trades,
            stats: self.stats,
            watermark,
        }
    }
}
