pub mod metrics;

pub use metrics::IndexerMetrics;
