pub mod adapters;
pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod indexer;
pub mod persistence;
pub mod services;

#[cfg(test)]
mod test_support;

pub use config::AppConfig;
pub use error::{DecodeError, IndexerError, Result};
pub use indexer::{Aggregator, Indexer, LogDecoder, RawLog};
pub use persistence::{EntityStore, MemoryStore};
