//! Raw log → typed domain event.
//!
//! Decoding is pure. Shape is checked before handing the words to the
//! `sol!`-generated decoders: topic count, canonical address padding in
//! indexed topics, and data length. Every decoded value carries the log's
//! provenance, which the engine uses for ordering and trade identity.

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol_types::SolEvent;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;

use super::abi::{self, MarketCreated, MarketResolved, TokensRedeemed, TransferSingle};
use crate::domain::{format_address, EventPosition, MarketId, OutcomeIndex, TradeId};
use crate::error::DecodeError;

const WORD: usize = 32;

/// A log as delivered by the chain
#[derive(Debug, Clone, PartialEq)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: u64,
    /// Seconds since epoch
    pub block_timestamp: u64,
    pub transaction_hash: B256,
    pub log_index: u64,
    /// Sender of the emitting transaction, when known
    pub transaction_from: Option<Address>,
}

impl RawLog {
    pub fn position(&self) -> EventPosition {
        EventPosition::new(self.block_number, self.log_index)
    }
}

/// Provenance attached to every decoded event
#[derive(Debug, Clone, PartialEq)]
pub struct EventMeta {
    pub position: EventPosition,
    pub block_timestamp: DateTime<Utc>,
    pub transaction_hash: B256,
    pub transaction_from: Option<Address>,
    pub emitter: Address,
}

impl EventMeta {
    pub fn block_number(&self) -> u64 {
        self.position.block_number
    }

    pub fn trade_id(&self) -> TradeId {
        TradeId::new(self.transaction_hash, self.position.log_index)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarketCreatedEvent {
    pub market_id: MarketId,
    pub question: String,
    pub condition_id: B256,
    pub outcome_count: u32,
    pub closing_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarketResolvedEvent {
    pub market_id: MarketId,
    pub winning_outcome: OutcomeIndex,
}

/// Direction of an ERC-1155 transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Mint,
    Burn,
    Transfer,
    /// Both ends are the zero address
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransferEvent {
    pub operator: Address,
    pub from: Address,
    pub to: Address,
    pub token_id: U256,
    pub amount: Decimal,
}

impl TransferEvent {
    pub fn kind(&self) -> TransferKind {
        match (self.from == abi::ZERO_ADDRESS, self.to == abi::ZERO_ADDRESS) {
            (true, false) => TransferKind::Mint,
            (false, true) => TransferKind::Burn,
            (false, false) => TransferKind::Transfer,
            (true, true) => TransferKind::Null,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RedemptionEvent {
    pub user: Address,
    pub market_id: MarketId,
    pub outcome: OutcomeIndex,
    pub amount: Decimal,
    pub payout: Decimal,
}

/// The closed set of events the indexer understands
#[derive(Debug, Clone, PartialEq)]
pub enum ChainEvent {
    MarketCreated(MarketCreatedEvent),
    MarketResolved(MarketResolvedEvent),
    TransferSingle(TransferEvent),
    TokensRedeemed(RedemptionEvent),
}

impl ChainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ChainEvent::MarketCreated(_) => "MarketCreated",
            ChainEvent::MarketResolved(_) => "MarketResolved",
            ChainEvent::TransferSingle(_) => "TransferSingle",
            ChainEvent::TokensRedeemed(_) => "TokensRedeemed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEvent {
    pub meta: EventMeta,
    pub event: ChainEvent,
}

/// Decoder bound to an optional emitting contract
#[derive(Debug, Clone, Default)]
pub struct LogDecoder {
    contract: Option<Address>,
}

impl LogDecoder {
    pub fn new(contract: Option<Address>) -> Self {
        Self { contract }
    }

    pub fn decode(&self, log: &RawLog) -> Result<DecodedEvent, DecodeError> {
        if let Some(expected) = self.contract {
            if log.address != expected {
                return Err(DecodeError::UnexpectedEmitter {
                    expected: format_address(&expected),
                    actual: format_address(&log.address),
                });
            }
        }
        decode_log(log)
    }
}

/// Decode one raw log into a domain event
pub fn decode_log(log: &RawLog) -> Result<DecodedEvent, DecodeError> {
    let topic0 = *log.topics.first().ok_or(DecodeError::MissingTopic0)?;

    let event = if topic0 == MarketCreated::SIGNATURE_HASH {
        ChainEvent::MarketCreated(decode_market_created(log)?)
    } else if topic0 == MarketResolved::SIGNATURE_HASH {
        ChainEvent::MarketResolved(decode_market_resolved(log)?)
    } else if topic0 == TransferSingle::SIGNATURE_HASH {
        ChainEvent::TransferSingle(decode_transfer(log)?)
    } else if topic0 == TokensRedeemed::SIGNATURE_HASH {
        ChainEvent::TokensRedeemed(decode_redemption(log)?)
    } else {
        return Err(DecodeError::UnknownEvent(topic0.to_string()));
    };

    let block_timestamp = timestamp("block_timestamp", U256::from(log.block_timestamp))?;

    Ok(DecodedEvent {
        meta: EventMeta {
            position: log.position(),
            block_timestamp,
            transaction_hash: log.transaction_hash,
            transaction_from: log.transaction_from,
            emitter: log.address,
        },
        event,
    })
}

fn decode_market_created(log: &RawLog) -> Result<MarketCreatedEvent, DecodeError> {
    const NAME: &str = "MarketCreated";
    expect_topics(NAME, log, 2)?;
    // head: string offset, conditionId, outcomeCount, closingTime; tail: string length
    let len = log.data.len();
    if len < 5 * WORD || len % WORD != 0 {
        return Err(DecodeError::DataLength { event: NAME, len });
    }

    let ev = MarketCreated::decode_raw_log(log.topics.iter().copied(), &log.data)
        .map_err(|e| abi_error(NAME, e))?;

    let outcome_count = outcome_number("outcomeCount", ev.outcomeCount)?;
    if outcome_count < 2 {
        return Err(DecodeError::InvalidOutcomeCount(u64::from(outcome_count)));
    }

    Ok(MarketCreatedEvent {
        market_id: market_id(ev.marketId)?,
        question: ev.question,
        condition_id: ev.conditionId,
        outcome_count,
        closing_time: timestamp("closingTime", ev.closingTime)?,
    })
}

fn decode_market_resolved(log: &RawLog) -> Result<MarketResolvedEvent, DecodeError> {
    const NAME: &str = "MarketResolved";
    expect_topics(NAME, log, 2)?;
    expect_words(NAME, log, 1)?;

    let ev = MarketResolved::decode_raw_log(log.topics.iter().copied(), &log.data)
        .map_err(|e| abi_error(NAME, e))?;

    Ok(MarketResolvedEvent {
        market_id: market_id(ev.marketId)?,
        winning_outcome: outcome_number("winningOutcome", ev.winningOutcome)?,
    })
}

fn decode_transfer(log: &RawLog) -> Result<TransferEvent, DecodeError> {
    const NAME: &str = "TransferSingle";
    expect_topics(NAME, log, 4)?;
    for index in 1..=3 {
        expect_address_topic(NAME, log, index)?;
    }
    expect_words(NAME, log, 2)?;

    let ev = TransferSingle::decode_raw_log(log.topics.iter().copied(), &log.data)
        .map_err(|e| abi_error(NAME, e))?;

    Ok(TransferEvent {
        operator: ev.operator,
        from: ev.from,
        to: ev.to,
        token_id: ev.id,
        amount: amount("value", ev.value)?,
    })
}

fn decode_redemption(log: &RawLog) -> Result<RedemptionEvent, DecodeError> {
    const NAME: &str = "TokensRedeemed";
    expect_topics(NAME, log, 3)?;
    expect_address_topic(NAME, log, 1)?;
    expect_words(NAME, log, 3)?;

    let ev = TokensRedeemed::decode_raw_log(log.topics.iter().copied(), &log.data)
        .map_err(|e| abi_error(NAME, e))?;

    Ok(RedemptionEvent {
        user: ev.user,
        market_id: market_id(ev.marketId)?,
        outcome: outcome_number("outcome", ev.outcome)?,
        amount: amount("amount", ev.amount)?,
        payout: amount("payout", ev.payout)?,
    })
}

fn expect_topics(event: &'static str, log: &RawLog, expected: usize) -> Result<(), DecodeError> {
    if log.topics.len() != expected {
        return Err(DecodeError::TopicCount {
            event,
            expected,
            actual: log.topics.len(),
        });
    }
    Ok(())
}

fn expect_words(event: &'static str, log: &RawLog, words: usize) -> Result<(), DecodeError> {
    if log.data.len() != words * WORD {
        return Err(DecodeError::DataLength {
            event,
            len: log.data.len(),
        });
    }
    Ok(())
}

/// Indexed addresses are left-padded with twelve zero bytes
fn expect_address_topic(event: &'static str, log: &RawLog, index: usize) -> Result<(), DecodeError> {
    let canonical = log
        .topics
        .get(index)
        .map(|t| t[..12].iter().all(|b| *b == 0))
        .unwrap_or(false);
    if !canonical {
        return Err(DecodeError::NonCanonicalAddress { event, index });
    }
    Ok(())
}

fn abi_error(event: &'static str, err: alloy::sol_types::Error) -> DecodeError {
    DecodeError::Abi {
        event,
        reason: err.to_string(),
    }
}

/// Market ids must fit the store's signed 64-bit column
fn market_id(value: U256) -> Result<MarketId, DecodeError> {
    i64::try_from(value)
        .map(|id| id as MarketId)
        .map_err(|_| DecodeError::OutOfRange {
            field: "marketId",
            value: value.to_string(),
        })
}

/// Outcome counts and indices are 32-bit signed on the store side
fn outcome_number(field: &'static str, value: U256) -> Result<u32, DecodeError> {
    i32::try_from(value)
        .map(|n| n as u32)
        .map_err(|_| DecodeError::OutOfRange {
            field,
            value: value.to_string(),
        })
}

/// Raw token amounts are kept in base units
fn amount(field: &'static str, value: U256) -> Result<Decimal, DecodeError> {
    Decimal::from_str(&value.to_string()).map_err(|_| DecodeError::OutOfRange {
        field,
        value: value.to_string(),
    })
}

fn timestamp(field: &'static str, value: U256) -> Result<DateTime<Utc>, DecodeError> {
    let out_of_range = || DecodeError::OutOfRange {
        field,
        value: value.to_string(),
    };
    let secs = i64::try_from(value).map_err(|_| out_of_range())?;
    DateTime::from_timestamp(secs, 0).ok_or_else(out_of_range)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_decode_market_created() {
        let log = market_created_log(7, 3, 100, 0);
        let decoded = decode_log(&log).unwrap();
        assert_eq!(decoded.meta.position, EventPosition::new(100, 0));
        match decoded.event {
            ChainEvent::MarketCreated(ev) => {
                assert_eq!(ev.market_id, 7);
                assert_eq!(ev.outcome_count, 3);
                assert_eq!(ev.question, "Market 7?");
                assert_eq!(ev.closing_time.timestamp(), 2_000_000_000);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_decode_transfer_kinds() {
        let mint = decode_log(&mint_log(user_a(), 111, 1_000_000, 5, 1)).unwrap();
        match mint.event {
            ChainEvent::TransferSingle(ev) => {
                assert_eq!(ev.kind(), TransferKind::Mint);
                assert_eq!(ev.amount, dec!(1000000));
                assert_eq!(ev.token_id, U256::from(111));
                assert_eq!(ev.to, user_a());
            }
            other => panic!("unexpected event {other:?}"),
        }

        let burn = decode_log(&transfer_log(user_a(), Address::ZERO, 111, 10, 5, 2)).unwrap();
        assert!(matches!(
            burn.event,
            ChainEvent::TransferSingle(ref ev) if ev.kind() == TransferKind::Burn
        ));

        let moved = decode_log(&transfer_log(user_a(), user_b(), 111, 10, 5, 3)).unwrap();
        assert!(matches!(
            moved.event,
            ChainEvent::TransferSingle(ref ev) if ev.kind() == TransferKind::Transfer
        ));
    }

    #[test]
    fn test_decode_redemption_and_resolution() {
        let resolved = decode_log(&market_resolved_log(1, 0, 9, 0)).unwrap();
        assert_eq!(
            resolved.event,
            ChainEvent::MarketResolved(MarketResolvedEvent {
                market_id: 1,
                winning_outcome: 0,
            })
        );

        let redeemed = decode_log(&redeemed_log(user_a(), 1, 0, 1_000_000, 1_800_000, 10, 0)).unwrap();
        match redeemed.event {
            ChainEvent::TokensRedeemed(ev) => {
                assert_eq!(ev.user, user_a());
                assert_eq!(ev.payout, dec!(1800000));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(redeemed.meta.trade_id().log_index, 0);
    }

    #[test]
    fn test_unknown_topic_is_rejected() {
        let mut log = mint_log(user_a(), 1, 1, 1, 0);
        log.topics[0] = B256::repeat_byte(0x42);
        assert!(matches!(decode_log(&log), Err(DecodeError::UnknownEvent(_))));

        log.topics.clear();
        assert_eq!(decode_log(&log), Err(DecodeError::MissingTopic0));
    }

    #[test]
    fn test_wrong_topic_count_is_rejected() {
        let mut log = mint_log(user_a(), 1, 1, 1, 0);
        log.topics.pop();
        assert_eq!(
            decode_log(&log),
            Err(DecodeError::TopicCount {
                event: "TransferSingle",
                expected: 4,
                actual: 3,
            })
        );
    }

    #[test]
    fn test_non_canonical_address_padding_is_rejected() {
        let mut log = mint_log(user_a(), 1, 1, 1, 0);
        let mut dirty = log.topics[3];
        dirty[0] = 0xff;
        log.topics[3] = dirty;
        assert_eq!(
            decode_log(&log),
            Err(DecodeError::NonCanonicalAddress {
                event: "TransferSingle",
                index: 3,
            })
        );
    }

    #[test]
    fn test_wrong_word_count_is_rejected() {
        let mut log = market_resolved_log(1, 0, 9, 0);
        log.data = Bytes::from(vec![0u8; 64]);
        assert!(matches!(
            decode_log(&log),
            Err(DecodeError::DataLength { event: "MarketResolved", len: 64 })
        ));
    }

    #[test]
    fn test_single_outcome_market_is_rejected() {
        let log = market_created_log(3, 1, 1, 0);
        assert_eq!(decode_log(&log), Err(DecodeError::InvalidOutcomeCount(1)));
    }

    #[test]
    fn test_market_id_must_fit_signed_column() {
        let largest = market_created_log(i64::MAX as u64, 2, 1, 0);
        assert!(decode_log(&largest).is_ok());

        let log = market_resolved_log(i64::MAX as u64 + 1, 0, 1, 1);
        assert!(matches!(
            decode_log(&log),
            Err(DecodeError::OutOfRange { field: "marketId", .. })
        ));
        let log = redeemed_log(user_a(), u64::MAX, 0, 1, 1, 1, 2);
        assert!(matches!(
            decode_log(&log),
            Err(DecodeError::OutOfRange { field: "marketId", .. })
        ));
    }

    #[test]
    fn test_outcome_index_must_fit_signed_column() {
        let log = market_resolved_log(1, u64::from(u32::MAX), 1, 0);
        assert!(matches!(
            decode_log(&log),
            Err(DecodeError::OutOfRange { field: "winningOutcome", .. })
        ));
    }

    #[test]
    fn test_emitter_check() {
        let decoder = LogDecoder::new(Some(Address::repeat_byte(0x01)));
        let mut log = mint_log(user_a(), 1, 1, 1, 0);
        log.address = Address::repeat_byte(0x02);
        assert!(matches!(
            decoder.decode(&log),
            Err(DecodeError::UnexpectedEmitter { .. })
        ));

        log.address = Address::repeat_byte(0x01);
        assert!(decoder.decode(&log).is_ok());
    }
}
