use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol_types::SolEvent;
use ctf_indexer::domain::{EventPosition, OutcomeKey, PositionKey, TradeKind};
use ctf_indexer::indexer::abi::{
    MarketCreated, MarketResolved, TokensRedeemed, TransferSingle, DEFAULT_COLLATERAL_TOKEN,
};
use ctf_indexer::indexer::{Aggregator, EngineSettings, Indexer, LogDecoder, RawLog};
use ctf_indexer::persistence::{EntityStore, MemoryStore, Page, TradeQuery};
use ctf_indexer::services::IndexerMetrics;
use ctf_indexer::IndexerError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

const CONTRACT: Address = Address::repeat_byte(0xcc);
const ALICE: Address = Address::repeat_byte(0xaa);
const BOB: Address = Address::repeat_byte(0xbb);

fn log<E: SolEvent>(event: &E, block: u64, log_index: u64) -> RawLog {
    let data = event.encode_log_data();
    RawLog {
        address: CONTRACT,
        topics: data.topics().to_vec(),
        data: data.data.clone(),
        block_number: block,
        block_timestamp: 1_700_000_000 + block * 2,
        transaction_hash: B256::left_padding_from(&(block * 1_000 + log_index).to_be_bytes()),
        log_index,
        transaction_from: Some(ALICE),
    }
}

fn created(market_id: u64, outcomes: u64, block: u64, log_index: u64) -> RawLog {
    log(
        &MarketCreated {
            marketId: U256::from(market_id),
            question: format!("Question {market_id}"),
            conditionId: B256::repeat_byte(0x42),
            outcomeCount: U256::from(outcomes),
            closingTime: U256::from(1_800_000_000u64),
        },
        block,
        log_index,
    )
}

fn resolved(market_id: u64, winner: u64, block: u64, log_index: u64) -> RawLog {
    log(
        &MarketResolved {
            marketId: U256::from(market_id),
            winningOutcome: U256::from(winner),
        },
        block,
        log_index,
    )
}

fn transfer(from: Address, to: Address, token: u64, value: u64, block: u64, log_index: u64) -> RawLog {
    transfer_units(from, to, token, U256::from(value), block, log_index)
}

fn transfer_units(from: Address, to: Address, token: u64, value: U256, block: u64, log_index: u64) -> RawLog {
    log(
        &TransferSingle {
            operator: to,
            from,
            to,
            id: U256::from(token),
            value,
        },
        block,
        log_index,
    )
}

fn mint(to: Address, token: u64, value: u64, block: u64, log_index: u64) -> RawLog {
    transfer(Address::ZERO, to, token, value, block, log_index)
}

fn mint_units(to: Address, token: u64, value: U256, block: u64, log_index: u64) -> RawLog {
    transfer_units(Address::ZERO, to, token, value, block, log_index)
}

fn redeemed(user: Address, market_id: u64, outcome: u64, amount: u64, payout: u64, block: u64, log_index: u64) -> RawLog {
    log(
        &TokensRedeemed {
            user,
            marketId: U256::from(market_id),
            outcome: U256::from(outcome),
            amount: U256::from(amount),
            payout: U256::from(payout),
        },
        block,
        log_index,
    )
}

async fn indexer(store: Arc<MemoryStore>) -> Indexer {
    let engine = Aggregator::bootstrap(
        store,
        EngineSettings {
            collateral_token: DEFAULT_COLLATERAL_TOKEN,
            binding_horizon: None,
        },
    )
    .await
    .unwrap();
    Indexer::new(
        LogDecoder::new(Some(CONTRACT)),
        engine,
        Arc::new(IndexerMetrics::new()),
    )
}

#[tokio::test]
async fn first_mint_binds_and_counts() {
    let store = Arc::new(MemoryStore::new());
    let mut indexer = indexer(store.clone()).await;

    indexer
        .ingest_batch(&[created(1, 2, 100, 0)])
        .await
        .unwrap();
    let outcomes = store.outcomes(1).await.unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.token_id.is_none()));

    indexer
        .ingest_batch(&[mint(ALICE, 111, 1_000_000, 101, 0)])
        .await
        .unwrap();

    let outcome = store.outcome(OutcomeKey::new(1, 0)).await.unwrap().unwrap();
    assert_eq!(outcome.token_id, Some(U256::from(111)));
    assert_eq!(store.market(1).await.unwrap().unwrap().total_volume, dec!(1000000));
    assert_eq!(store.user(ALICE).await.unwrap().unwrap().total_volume, dec!(1000000));
    assert_eq!(store.stats().await.unwrap().total_users, 1);

    let trades = store.trades(&TradeQuery::all(Page::first(10))).await.unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].kind, TradeKind::Mint);
}

#[tokio::test]
async fn second_mint_reuses_binding() {
    let store = Arc::new(MemoryStore::new());
    let mut indexer = indexer(store.clone()).await;

    indexer
        .ingest_batch(&[
            created(1, 2, 100, 0),
            mint(ALICE, 111, 1_000_000, 101, 0),
            mint(BOB, 111, 500_000, 102, 0),
        ])
        .await
        .unwrap();

    let market = store.market(1).await.unwrap().unwrap();
    assert_eq!(market.total_volume, dec!(1500000));
    assert_eq!(market.participant_count, 2);

    let second = store.outcome(OutcomeKey::new(1, 1)).await.unwrap().unwrap();
    assert!(second.token_id.is_none());
    let first = store.outcome(OutcomeKey::new(1, 0)).await.unwrap().unwrap();
    assert_eq!(first.total_supply, dec!(1500000));
    assert_eq!(first.holders, 2);
}

#[tokio::test]
async fn claim_after_resolution() {
    let store = Arc::new(MemoryStore::new());
    let mut indexer = indexer(store.clone()).await;

    indexer
        .ingest_batch(&[
            created(1, 2, 100, 0),
            mint(ALICE, 111, 1_000_000, 101, 0),
            resolved(1, 0, 102, 0),
            redeemed(ALICE, 1, 0, 1_000_000, 1_800_000, 103, 0),
        ])
        .await
        .unwrap();

    let alice = store.user(ALICE).await.unwrap().unwrap();
    assert_eq!(alice.total_pnl, dec!(800000));

    let market = store.market(1).await.unwrap().unwrap();
    assert!(market.resolved);
    assert_eq!(market.winning_outcome, Some(0));
    assert_eq!(market.total_liquidity, dec!(-800000));

    let trades = store.trades(&TradeQuery::all(Page::first(1))).await.unwrap();
    assert_eq!(trades[0].kind, TradeKind::Claim);
    assert_eq!(trades[0].payout, Some(dec!(1800000)));
}

#[tokio::test]
async fn redelivered_range_changes_nothing() {
    let store = Arc::new(MemoryStore::new());
    let mut indexer = indexer(store.clone()).await;
    let batch = vec![
        created(1, 2, 100, 0),
        mint(ALICE, 111, 1_000_000, 101, 0),
        mint(BOB, 222, 700_000, 101, 1),
    ];

    let first = indexer.ingest_batch(&batch).await.unwrap();
    assert_eq!(first.applied, 3);
    let market = store.market(1).await.unwrap().unwrap();
    let stats = store.stats().await.unwrap();

    let again = indexer.ingest_batch(&batch).await.unwrap();
    assert_eq!(again.stale, 3);
    assert_eq!(store.market(1).await.unwrap().unwrap(), market);
    assert_eq!(store.stats().await.unwrap(), stats);
    assert_eq!(store.trade_count().await, 2);
}

#[tokio::test]
async fn restart_resumes_from_store() {
    let store = Arc::new(MemoryStore::new());
    {
        let mut indexer = indexer(store.clone()).await;
        indexer
            .ingest_batch(&[
                created(1, 2, 100, 0),
                created(2, 3, 100, 1),
                mint(ALICE, 111, 1_000_000, 101, 0),
            ])
            .await
            .unwrap();
    }

    // bindings and the watermark are rebuilt from the store
    let mut indexer = indexer(store.clone()).await;
    assert_eq!(indexer.watermark(), Some(EventPosition::new(101, 0)));

    let report = indexer
        .ingest_batch(&[
            mint(ALICE, 111, 1_000_000, 101, 0),
            mint(BOB, 111, 250_000, 102, 0),
            mint(BOB, 999, 10, 102, 1),
        ])
        .await
        .unwrap();
    assert_eq!(report.stale, 1);
    assert_eq!(report.applied, 2);

    assert_eq!(store.market(1).await.unwrap().unwrap().total_volume, dec!(1250010));
    let next = store.outcome(OutcomeKey::new(1, 1)).await.unwrap().unwrap();
    assert_eq!(next.token_id, Some(U256::from(999)));
}

#[tokio::test]
async fn bad_logs_are_skipped_not_fatal() {
    let store = Arc::new(MemoryStore::new());
    let mut indexer = indexer(store.clone()).await;

    let mut foreign = created(7, 2, 100, 0);
    foreign.address = Address::repeat_byte(0x01);
    let mut truncated = mint(ALICE, 111, 5, 100, 1);
    truncated.data = Bytes::from(vec![0u8; 10]);

    let report = indexer
        .ingest_batch(&[
            foreign,
            truncated,
            resolved(9, 0, 100, 2),
            created(1, 2, 100, 3),
        ])
        .await
        .unwrap();

    assert_eq!(report.skipped, 3);
    assert_eq!(report.applied, 1);
    assert!(store.market(7).await.unwrap().is_none());
    assert_eq!(store.stats().await.unwrap().total_markets, 1);
    assert_eq!(indexer.watermark(), Some(EventPosition::new(100, 3)));
    assert_eq!(indexer.metrics().skipped_total(), 3);
}

#[tokio::test]
async fn backward_batch_is_fatal() {
    let store = Arc::new(MemoryStore::new());
    let mut indexer = indexer(store.clone()).await;

    let err = indexer
        .ingest_batch(&[created(1, 2, 100, 1), created(2, 2, 100, 0)])
        .await
        .unwrap_err();
    assert!(matches!(err, IndexerError::OrderingViolation { .. }));
    assert!(err.is_fatal());
    assert!(store.market(1).await.unwrap().is_none());
}

#[tokio::test]
async fn secondary_transfer_moves_position() {
    let store = Arc::new(MemoryStore::new());
    let mut indexer = indexer(store.clone()).await;

    indexer
        .ingest_batch(&[
            created(1, 2, 100, 0),
            mint(ALICE, 111, 1_000_000, 101, 0),
            transfer(ALICE, BOB, 111, 1_000_000, 102, 0),
        ])
        .await
        .unwrap();

    let key = OutcomeKey::new(1, 0);
    let alice = store.position(PositionKey::new(key, ALICE)).await.unwrap().unwrap();
    let bob = store.position(PositionKey::new(key, BOB)).await.unwrap().unwrap();
    assert_eq!(alice.balance, dec!(0));
    assert_eq!(bob.balance, dec!(1000000));

    let outcome = store.outcome(key).await.unwrap().unwrap();
    assert_eq!(outcome.total_supply, dec!(1000000));
    assert_eq!(outcome.holders, 1);
    assert_eq!(store.user(ALICE).await.unwrap().unwrap().position_count, 0);
    assert_eq!(store.user(BOB).await.unwrap().unwrap().position_count, 1);
    // transfers are not trades
    assert_eq!(store.trade_count().await, 1);
}

#[tokio::test]
async fn mint_beyond_decimal_range_is_skipped() {
    let store = Arc::new(MemoryStore::new());
    let mut indexer = indexer(store.clone()).await;

    let report = indexer
        .ingest_batch(&[
            created(1, 2, 100, 0),
            mint_units(ALICE, 111, U256::from(10u128.pow(29)), 101, 0),
            mint(BOB, 111, 300, 102, 0),
        ])
        .await
        .unwrap();

    assert_eq!(report.skipped, 1);
    assert_eq!(report.applied, 2);
    assert_eq!(store.market(1).await.unwrap().unwrap().total_volume, dec!(300));
    assert!(store.user(ALICE).await.unwrap().is_none());
    assert_eq!(indexer.metrics().decode_errors.load(std::sync::atomic::Ordering::Relaxed), 1);
}

#[tokio::test]
async fn overflowing_totals_skip_the_event_and_keep_going() {
    let store = Arc::new(MemoryStore::new());
    let half = 5 * 10u128.pow(28);
    let batch = vec![
        created(1, 2, 100, 0),
        mint_units(ALICE, 111, U256::from(half), 101, 0),
        mint_units(BOB, 111, U256::from(half), 102, 0),
        mint(BOB, 111, 10, 103, 0),
    ];

    {
        let mut indexer = indexer(store.clone()).await;
        let report = indexer.ingest_batch(&batch).await.unwrap();
        assert_eq!(report.applied, 3);
        assert_eq!(report.skipped, 1);
        assert_eq!(indexer.watermark(), Some(EventPosition::new(103, 0)));
        assert_eq!(
            indexer
                .metrics()
                .amount_overflows
                .load(std::sync::atomic::Ordering::Relaxed),
            1
        );
    }

    let expected = Decimal::from_i128_with_scale(half as i128 + 10, 0);
    let market = store.market(1).await.unwrap().unwrap();
    assert_eq!(market.total_volume, expected);
    assert_eq!(market.trade_count, 2);
    assert_eq!(store.stats().await.unwrap().total_volume, expected);
    assert_eq!(store.user(BOB).await.unwrap().unwrap().total_volume, dec!(10));
    let outcome = store.outcome(OutcomeKey::new(1, 0)).await.unwrap().unwrap();
    assert_eq!(outcome.total_supply, expected);
    assert_eq!(store.trade_count().await, 2);

    // after a restart the overflowing log is behind the watermark
    let mut indexer = indexer(store.clone()).await;
    let again = indexer.ingest_batch(&batch).await.unwrap();
    assert_eq!(again.stale, 4);
    assert_eq!(store.market(1).await.unwrap().unwrap().total_volume, expected);
}
