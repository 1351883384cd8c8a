use thiserror::Error;

use crate::domain::EventPosition;

/// Main error type for the indexer
#[derive(Error, Debug)]
pub enum IndexerError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // Chain access errors
    #[error("RPC error: {0}")]
    Rpc(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Per-event errors
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Missing {entity}: {id}")]
    MissingEntity { entity: &'static str, id: String },

    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: &'static str, id: String },

    #[error("Inconsistent binding: token {token} is bound to {bound}, refused {attempted}")]
    InconsistentBinding {
        token: String,
        bound: String,
        attempted: String,
    },

    #[error("Duplicate trade: {0}")]
    DuplicateTrade(String),

    #[error("Resolution conflict on market {market_id}: winner {current}, refused {attempted}")]
    ResolutionConflict {
        market_id: u64,
        current: u32,
        attempted: u32,
    },

    #[error("{field} would leave the representable amount range")]
    AmountOverflow { field: &'static str },

    // Stream errors
    #[error("Ordering violation: {next} delivered after {previous}")]
    OrderingViolation {
        previous: EventPosition,
        next: EventPosition,
    },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl IndexerError {
    pub fn missing(entity: &'static str, id: impl ToString) -> Self {
        IndexerError::MissingEntity {
            entity,
            id: id.to_string(),
        }
    }

    /// Errors that stop ingestion. Everything else is isolated to the event
    /// that raised it.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            IndexerError::Decode(_)
                | IndexerError::MissingEntity { .. }
                | IndexerError::AlreadyExists { .. }
                | IndexerError::InconsistentBinding { .. }
                | IndexerError::DuplicateTrade(_)
                | IndexerError::ResolutionConflict { .. }
                | IndexerError::AmountOverflow { .. }
        )
    }
}

/// Result type alias for IndexerError
pub type Result<T> = std::result::Result<T, IndexerError>;

/// Reasons a raw log cannot be turned into a domain event
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("log has no topics")]
    MissingTopic0,

    #[error("unknown event signature {0}")]
    UnknownEvent(String),

    #[error("log emitted by {actual}, expected {expected}")]
    UnexpectedEmitter { expected: String, actual: String },

    #[error("{event}: expected {expected} topics, got {actual}")]
    TopicCount {
        event: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{event}: topic {index} is not a canonical address")]
    NonCanonicalAddress { event: &'static str, index: usize },

    #[error("{event}: invalid data length {len}")]
    DataLength { event: &'static str, len: usize },

    #[error("{event}: abi decoding failed: {reason}")]
    Abi { event: &'static str, reason: String },

    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: String },

    #[error("outcome count must be at least 2, got {0}")]
    InvalidOutcomeCount(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_event_errors_are_not_fatal() {
        assert!(!IndexerError::Decode(DecodeError::MissingTopic0).is_fatal());
        assert!(!IndexerError::missing("market", 7).is_fatal());
        assert!(!IndexerError::DuplicateTrade("0xabc-1".into()).is_fatal());
        assert!(!IndexerError::InconsistentBinding {
            token: "1".into(),
            bound: "1-0".into(),
            attempted: "2-0".into(),
        }
        .is_fatal());
        assert!(!IndexerError::AmountOverflow { field: "market volume" }.is_fatal());
    }

    #[test]
    fn test_stream_and_storage_errors_are_fatal() {
        let err = IndexerError::OrderingViolation {
            previous: EventPosition::new(10, 2),
            next: EventPosition::new(9, 0),
        };
        assert!(err.is_fatal());
        assert!(IndexerError::Rpc("connection reset".into()).is_fatal());
        assert!(IndexerError::InvalidState("poisoned".into()).is_fatal());
    }

    #[test]
    fn test_missing_entity_message() {
        let err = IndexerError::missing("market", 42);
        assert_eq!(err.to_string(), "Missing market: 42");
    }
}
