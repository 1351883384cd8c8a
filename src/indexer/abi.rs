//! Contract event definitions and addresses.
//!
//! The indexer only needs the four events the prediction-market contract
//! emits; everything else on the contract is ignored.

use alloy::primitives::{address, Address, B256};
use alloy::sol;
use alloy::sol_types::SolEvent;

// ============================================================================
// Contract addresses & constants
// ============================================================================

/// USDC on Base Sepolia, the collateral of the deployed markets
pub const DEFAULT_COLLATERAL_TOKEN: Address = address!("036CbD53842c5426634e7929541eC2318f3dCF7e");

/// Zero address: `from` on mints, `to` on burns
pub const ZERO_ADDRESS: Address = Address::ZERO;

// ============================================================================
// Solidity event definitions (alloy sol! macro)
// ============================================================================

sol! {
    /// Emitted once per market by the prediction-market contract
    #[derive(Debug, PartialEq, Eq)]
    event MarketCreated(
        uint256 indexed marketId,
        string question,
        bytes32 conditionId,
        uint256 outcomeCount,
        uint256 closingTime
    );

    /// Emitted when the winning outcome is set
    #[derive(Debug, PartialEq, Eq)]
    event MarketResolved(uint256 indexed marketId, uint256 winningOutcome);

    /// ERC-1155 single transfer; mints and burns use the zero address
    #[derive(Debug, PartialEq, Eq)]
    event TransferSingle(
        address indexed operator,
        address indexed from,
        address indexed to,
        uint256 id,
        uint256 value
    );

    /// Emitted when outcome shares are exchanged back for collateral
    #[derive(Debug, PartialEq, Eq)]
    event TokensRedeemed(
        address indexed user,
        uint256 indexed marketId,
        uint256 outcome,
        uint256 amount,
        uint256 payout
    );
}

/// Topic0 of every event the indexer consumes, for log filters
pub fn event_topics() -> Vec<B256> {
    vec![
        MarketCreated::SIGNATURE_HASH,
        MarketResolved::SIGNATURE_HASH,
        TransferSingle::SIGNATURE_HASH,
        TokensRedeemed::SIGNATURE_HASH,
    ]
}

/// `(signature, topic0)` pairs, printed by the `topics` command
pub fn event_signatures() -> Vec<(&'static str, B256)> {
    vec![
        (MarketCreated::SIGNATURE, MarketCreated::SIGNATURE_HASH),
        (MarketResolved::SIGNATURE, MarketResolved::SIGNATURE_HASH),
        (TransferSingle::SIGNATURE, TransferSingle::SIGNATURE_HASH),
        (TokensRedeemed::SIGNATURE, TokensRedeemed::SIGNATURE_HASH),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{b256, keccak256};

    #[test]
    fn test_transfer_single_topic_matches_erc1155() {
        assert_eq!(
            TransferSingle::SIGNATURE_HASH,
            b256!("c3d58168c5ae7397731d063d5bbf3d657854427343f4c083240f7aacaa2d0f62")
        );
    }

    #[test]
    fn test_signatures_hash_to_topics() {
        for (sig, topic) in event_signatures() {
            assert_eq!(keccak256(sig.as_bytes()), topic, "{sig}");
        }
        assert_eq!(
            MarketCreated::SIGNATURE,
            "MarketCreated(uint256,string,bytes32,uint256,uint256)"
        );
    }

    #[test]
    fn test_event_topics_are_distinct() {
        let mut topics = event_topics();
        topics.sort();
        topics.dedup();
        assert_eq!(topics.len(), 4);
    }
}
