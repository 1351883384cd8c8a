use chrono::Utc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use tracing::info;

use crate::domain::EventPosition;
use crate::error::IndexerError;

/// Ingestion counters
pub struct IndexerMetrics {
    /// Raw logs handed to the pipeline
    pub logs_received: AtomicU64,
    /// Events committed to the store
    pub events_applied: AtomicU64,
    /// Events at or below the watermark
    pub events_stale: AtomicU64,
    pub decode_errors: AtomicU64,
    pub missing_entities: AtomicU64,
    pub binding_conflicts: AtomicU64,
    pub duplicate_trades: AtomicU64,
    pub resolution_conflicts: AtomicU64,
    pub amount_overflows: AtomicU64,
    /// Poller RPC failures
    pub rpc_errors: AtomicU64,
    watermark_block: AtomicU64,
    head_block: AtomicU64,
    last_update: AtomicI64,
}

impl IndexerMetrics {
    pub fn new() -> Self {
        Self {
            logs_received: AtomicU64::new(0),
            events_applied: AtomicU64::new(0),
            events_stale: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            missing_entities: AtomicU64::new(0),
            binding_conflicts: AtomicU64::new(0),
            duplicate_trades: AtomicU64::new(0),
            resolution_conflicts: AtomicU64::new(0),
            amount_overflows: AtomicU64::new(0),
            rpc_errors: AtomicU64::new(0),
            watermark_block: AtomicU64::new(0),
            head_block: AtomicU64::new(0),
            last_update: AtomicI64::new(Utc::now().timestamp()),
        }
    }

    pub fn inc_logs_received(&self) {
        self.logs_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_events_applied(&self) {
        self.events_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_events_stale(&self) {
        self.events_stale.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rpc_errors(&self) {
        self.rpc_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a skipped event under its error kind
    pub fn record_skip(&self, err: &IndexerError) {
        let counter = match err {
            IndexerError::Decode(_) => &self.decode_errors,
            IndexerError::MissingEntity { .. } | IndexerError::AlreadyExists { .. } => {
                &self.missing_entities
            }
            IndexerError::InconsistentBinding { .. } => &self.binding_conflicts,
            IndexerError::DuplicateTrade(_) => &self.duplicate_trades,
            IndexerError::ResolutionConflict { .. } => &self.resolution_conflicts,
            IndexerError::AmountOverflow { .. } => &self.amount_overflows,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_watermark(&self, position: EventPosition) {
        self.watermark_block
            .store(position.block_number, Ordering::Relaxed);
        self.last_update
            .store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    pub fn set_head_block(&self, block: u64) {
        self.head_block.store(block, Ordering::Relaxed);
    }

    pub fn watermark_block(&self) -> u64 {
        self.watermark_block.load(Ordering::Relaxed)
    }

    pub fn head_block(&self) -> u64 {
        self.head_block.load(Ordering::Relaxed)
    }

    /// Seconds since epoch of the last watermark move
    pub fn last_update(&self) -> i64 {
        self.last_update.load(Ordering::Relaxed)
    }

    pub fn skipped_total(&self) -> u64 {
        self.decode_errors.load(Ordering::Relaxed)
            + self.missing_entities.load(Ordering::Relaxed)
            + self.binding_conflicts.load(Ordering::Relaxed)
            + self.duplicate_trades.load(Ordering::Relaxed)
            + self.resolution_conflicts.load(Ordering::Relaxed)
            + self.amount_overflows.load(Ordering::Relaxed)
    }

    /// Export metrics in Prometheus format
    pub fn prometheus(&self) -> String {
        format!(
            r#"# HELP ctf_indexer_logs_received_total Raw logs received
# TYPE ctf_indexer_logs_received_total counter
ctf_indexer_logs_received_total {}

# HELP ctf_indexer_events_applied_total Events committed to the store
# TYPE ctf_indexer_events_applied_total counter
ctf_indexer_events_applied_total {}

# HELP ctf_indexer_events_stale_total Events dropped at or below the watermark
# TYPE ctf_indexer_events_stale_total counter
ctf_indexer_events_stale_total {}

# HELP ctf_indexer_events_skipped_total Events skipped by error kind
# TYPE ctf_indexer_events_skipped_total counter
ctf_indexer_events_skipped_total{{reason="decode"}} {}
ctf_indexer_events_skipped_total{{reason="missing_entity"}} {}
ctf_indexer_events_skipped_total{{reason="binding_conflict"}} {}
ctf_indexer_events_skipped_total{{reason="duplicate_trade"}} {}
ctf_indexer_events_skipped_total{{reason="resolution_conflict"}} {}
ctf_indexer_events_skipped_total{{reason="amount_overflow"}} {}

# HELP ctf_indexer_rpc_errors_total Chain RPC failures
# TYPE ctf_indexer_rpc_errors_total counter
ctf_indexer_rpc_errors_total {}

# HELP ctf_indexer_watermark_block Block of the last applied event
# TYPE ctf_indexer_watermark_block gauge
ctf_indexer_watermark_block {}

# HELP ctf_indexer_head_block Latest confirmed block seen by the poller
# TYPE ctf_indexer_head_block gauge
ctf_indexer_head_block {}
"#,
            self.logs_received.load(Ordering::Relaxed),
            self.events_applied.load(Ordering::Relaxed),
            self.events_stale.load(Ordering::Relaxed),
            self.decode_errors.load(Ordering::Relaxed),
            self.missing_entities.load(Ordering::Relaxed),
            self.binding_conflicts.load(Ordering::Relaxed),
            self.duplicate_trades.load(Ordering::Relaxed),
            self.resolution_conflicts.load(Ordering::Relaxed),
            self.amount_overflows.load(Ordering::Relaxed),
            self.rpc_errors.load(Ordering::Relaxed),
            self.watermark_block(),
            self.head_block(),
        )
    }

    /// Log periodic status
    pub fn log_status(&self) {
        info!(
            received = self.logs_received.load(Ordering::Relaxed),
            applied = self.events_applied.load(Ordering::Relaxed),
            stale = self.events_stale.load(Ordering::Relaxed),
            skipped = self.skipped_total(),
            watermark_block = self.watermark_block(),
            head_block = self.head_block(),
            "indexer status"
        );
    }
}

impl Default for IndexerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;

    #[test]
    fn test_skip_counters_by_kind() {
        let metrics = IndexerMetrics::new();
        metrics.record_skip(&IndexerError::Decode(DecodeError::MissingTopic0));
        metrics.record_skip(&IndexerError::missing("market", 1));
        metrics.record_skip(&IndexerError::DuplicateTrade("x".into()));
        metrics.record_skip(&IndexerError::Rpc("down".into()));

        assert_eq!(metrics.decode_errors.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.missing_entities.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.skipped_total(), 3);
    }

    #[test]
    fn test_prometheus_output() {
        let metrics = IndexerMetrics::new();
        metrics.inc_events_applied();
        metrics.set_watermark(EventPosition::new(42, 3));

        let text = metrics.prometheus();
        assert!(text.contains("ctf_indexer_events_applied_total 1"));
        assert!(text.contains("ctf_indexer_watermark_block 42"));
        assert!(text.contains("ctf_indexer_events_skipped_total{reason=\"decode\"} 0"));
    }
}
