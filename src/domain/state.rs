use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of the global stats singleton
pub const GLOBAL_STATS_ID: &str = "global";

/// Protocol-wide counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalStats {
    pub total_volume: Decimal,
    pub total_markets: u64,
    pub total_users: u64,
    pub total_trades: u64,
}

/// Position of a log in the chain: `(block_number, log_index)`.
///
/// Ordering is lexicographic, which is the order events must be applied in.
/// The highest applied position is the indexer watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventPosition {
    pub block_number: u64,
    pub log_index: u64,
}

impl EventPosition {
    pub fn new(block_number: u64, log_index: u64) -> Self {
        Self {
            block_number,
            log_index,
        }
    }

    /// True if an event at `self` was already covered by `watermark`
    pub fn is_covered_by(&self, watermark: Option<EventPosition>) -> bool {
        watermark.map(|w| *self <= w).unwrap_or(false)
    }
}

impl fmt::Display for EventPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block_number, self.log_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_ordering() {
        assert!(EventPosition::new(10, 5) < EventPosition::new(11, 0));
        assert!(EventPosition::new(10, 1) < EventPosition::new(10, 2));
    }

    #[test]
    fn test_covered_by_watermark() {
        let wm = Some(EventPosition::new(10, 3));
        assert!(EventPosition::new(10, 3).is_covered_by(wm));
        assert!(EventPosition::new(9, 99).is_covered_by(wm));
        assert!(!EventPosition::new(10, 4).is_covered_by(wm));
        assert!(!EventPosition::new(0, 0).is_covered_by(None));
    }
}
