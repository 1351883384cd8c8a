//! Log builders shared by unit tests.

use alloy::primitives::{Address, B256, U256};
use alloy::sol_types::SolEvent;

use crate::indexer::abi::{MarketCreated, MarketResolved, TokensRedeemed, TransferSingle};
use crate::indexer::decoder::RawLog;

pub fn contract() -> Address {
    Address::repeat_byte(0xcc)
}

pub fn creator() -> Address {
    Address::repeat_byte(0xc0)
}

pub fn user_a() -> Address {
    Address::repeat_byte(0xaa)
}

pub fn user_b() -> Address {
    Address::repeat_byte(0xbb)
}

fn tx_hash(block: u64, log_index: u64) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&block.to_be_bytes());
    bytes[24..].copy_from_slice(&log_index.to_be_bytes());
    B256::from(bytes)
}

fn raw_log<E: SolEvent>(event: &E, block: u64, log_index: u64) -> RawLog {
    let data = event.encode_log_data();
    RawLog {
        address: contract(),
        topics: data.topics().to_vec(),
        data: data.data.clone(),
        block_number: block,
        block_timestamp: 1_700_000_000 + block * 12,
        transaction_hash: tx_hash(block, log_index),
        log_index,
        transaction_from: None,
    }
}

pub fn market_created_log(market_id: u64, outcome_count: u64, block: u64, log_index: u64) -> RawLog {
    let event = MarketCreated {
        marketId: U256::from(market_id),
        question: format!("Market {market_id}?"),
        conditionId: B256::repeat_byte(market_id as u8),
        outcomeCount: U256::from(outcome_count),
        closingTime: U256::from(2_000_000_000u64),
    };
    RawLog {
        transaction_from: Some(creator()),
        ..raw_log(&event, block, log_index)
    }
}

pub fn market_resolved_log(market_id: u64, winner: u64, block: u64, log_index: u64) -> RawLog {
    let event = MarketResolved {
        marketId: U256::from(market_id),
        winningOutcome: U256::from(winner),
    };
    raw_log(&event, block, log_index)
}

pub fn transfer_log(
    from: Address,
    to: Address,
    token: u64,
    value: u64,
    block: u64,
    log_index: u64,
) -> RawLog {
    let event = TransferSingle {
        operator: from,
        from,
        to,
        id: U256::from(token),
        value: U256::from(value),
    };
    raw_log(&event, block, log_index)
}

pub fn mint_log(to: Address, token: u64, value: u64, block: u64, log_index: u64) -> RawLog {
    transfer_log(Address::ZERO, to, token, value, block, log_index)
}

pub fn redeemed_log(
    user: Address,
    market_id: u64,
    outcome: u64,
    amount: u64,
    payout: u64,
    block: u64,
    log_index: u64,
) -> RawLog {
    let event = TokensRedeemed {
        user,
        marketId: U256::from(market_id),
        outcome: U256::from(outcome),
        amount: U256::from(amount),
        payout: U256::from(payout),
    };
    raw_log(&event, block, log_index)
}
