//! Event indexing core
//!
//! - `abi`: contract event definitions
//! - `decoder`: raw log → typed event
//! - `resolver`: token id → outcome slot binding
//! - `engine`: per-event aggregation into the entity store
//! - `pipeline`: batch ingestion with per-event failure isolation

pub mod abi;
pub mod decoder;
pub mod engine;
pub mod pipeline;
pub mod resolver;

pub use decoder::{decode_log, ChainEvent, DecodedEvent, EventMeta, LogDecoder, RawLog};
pub use engine::{Aggregator, Applied, EngineSettings};
pub use pipeline::{BatchReport, Indexer, Ingested};
pub use resolver::{Resolution, TokenResolver};
