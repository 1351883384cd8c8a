pub mod account;
pub mod market;
pub mod state;
pub mod trade;

pub use account::*;
pub use market::*;
pub use state::*;
pub use trade::*;

use alloy::primitives::{hex, Address};
use rust_decimal::Decimal;

use crate::error::{IndexerError, Result};

/// Lowercase `0x`-prefixed address, the normalized form used for storage and output
pub fn format_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address))
}

/// `total + amount`, refused when the result leaves the decimal range
pub fn checked_sum(total: Decimal, amount: Decimal, field: &'static str) -> Result<Decimal> {
    total
        .checked_add(amount)
        .ok_or(IndexerError::AmountOverflow { field })
}

/// `total - amount`, refused when the result leaves the decimal range
pub fn checked_diff(total: Decimal, amount: Decimal, field: &'static str) -> Result<Decimal> {
    total
        .checked_sub(amount)
        .ok_or(IndexerError::AmountOverflow { field })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_format_address_is_lowercase() {
        let addr = Address::from_str("0x036CbD53842c5426634e7929541eC2318f3dCF7e").unwrap();
        assert_eq!(
            format_address(&addr),
            "0x036cbd53842c5426634e7929541ec2318f3dcf7e"
        );
    }

    #[test]
    fn test_checked_sum_refuses_overflow() {
        assert_eq!(checked_sum(Decimal::ONE, Decimal::ONE, "x").unwrap(), Decimal::TWO);
        let err = checked_sum(Decimal::MAX, Decimal::ONE, "market volume").unwrap_err();
        assert!(matches!(err, IndexerError::AmountOverflow { field: "market volume" }));
        assert!(checked_diff(Decimal::MIN, Decimal::ONE, "liquidity").is_err());
    }
}
