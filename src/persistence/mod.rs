//! Entity storage
//!
//! - `store`: the `EntityStore` contract and query types
//! - `memory`: map-backed implementation
//!
//! The Postgres backend lives in `adapters::postgres`.

pub mod memory;
pub mod store;

pub use memory::MemoryStore;
pub use store::{
    ChangeSet, Direction, EntityStore, MarketOrder, MarketQuery, Page, TradeQuery, UserRanking,
};
