//! Ingestion pipeline: decode, apply, isolate failures.
//!
//! A malformed or inconsistent event never stops the stream; it is logged,
//! counted and stepped over. Only storage failures and a batch that steps
//! backwards in `(block, log_index)` order are fatal.

use std::sync::Arc;
use tracing::{debug, warn};

use super::decoder::{LogDecoder, RawLog};
use super::engine::{Aggregator, Applied};
use crate::domain::EventPosition;
use crate::error::{IndexerError, Result};
use crate::services::IndexerMetrics;

/// Fate of a single log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingested {
    Applied,
    Stale,
    Skipped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub applied: usize,
    pub stale: usize,
    pub skipped: usize,
}

impl BatchReport {
    fn record(&mut self, ingested: Ingested) {
        match ingested {
            Ingested::Applied => self.applied += 1,
            Ingested::Stale => self.stale += 1,
            Ingested::Skipped => self.skipped += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.applied + self.stale + self.skipped
    }
}

pub struct Indexer {
    decoder: LogDecoder,
    engine: Aggregator,
    metrics: Arc<IndexerMetrics>,
}

impl Indexer {
    pub fn new(decoder: LogDecoder, engine: Aggregator, metrics: Arc<IndexerMetrics>) -> Self {
        if let Some(position) = engine.watermark() {
            metrics.set_watermark(position);
        }
        Self {
            decoder,
            engine,
            metrics,
        }
    }

    pub fn watermark(&self) -> Option<EventPosition> {
        self.engine.watermark()
    }

    pub fn engine(&self) -> &Aggregator {
        &self.engine
    }

    pub fn metrics(&self) -> &Arc<IndexerMetrics> {
        &self.metrics
    }

    /// Decode and apply one log
    pub async fn ingest(&mut self, log: &RawLog) -> Result<Ingested> {
        self.metrics.inc_logs_received();
        let position = log.position();

        let event = match self.decoder.decode(log) {
            Ok(event) => event,
            Err(err) => {
                if position.is_covered_by(self.engine.watermark()) {
                    self.metrics.inc_events_stale();
                    return Ok(Ingested::Stale);
                }
                warn!(%position, tx = %log.transaction_hash, error = %err, "undecodable log skipped");
                let err = IndexerError::from(err);
                self.metrics.record_skip(&err);
                self.engine.advance(position).await?;
                self.metrics.set_watermark(position);
                return Ok(Ingested::Skipped);
            }
        };

        match self.engine.apply(&event).await {
            Ok(Applied::Committed) => {
                self.metrics.inc_events_applied();
                self.metrics.set_watermark(position);
                Ok(Ingested::Applied)
            }
            Ok(Applied::Stale) => {
                self.metrics.inc_events_stale();
                Ok(Ingested::Stale)
            }
            Err(err) if !err.is_fatal() => {
                match &err {
                    IndexerError::DuplicateTrade(id) => {
                        debug!(%position, trade = %id, "duplicate trade ignored")
                    }
                    _ => warn!(
                        %position,
                        event = event.event.name(),
                        error = %err,
                        "event skipped"
                    ),
                }
                self.metrics.record_skip(&err);
                self.metrics.set_watermark(position);
                Ok(Ingested::Skipped)
            }
            Err(err) => Err(err),
        }
    }

    /// Ingest logs delivered together. The batch must be in non-decreasing
    /// chain order; a backward step is refused before anything is applied.
    pub async fn ingest_batch(&mut self, logs: &[RawLog]) -> Result<BatchReport> {
        check_order(logs)?;

        let mut report = BatchReport::default();
        for log in logs {
            report.record(self.ingest(log).await?);
        }

        debug!(
            applied = report.applied,
            stale = report.stale,
            skipped = report.skipped,
            watermark = ?self.watermark(),
            "batch ingested"
        );
        Ok(report)
    }
}

/// Refuses a batch whose positions step backward
pub(crate) fn check_order(logs: &[RawLog]) -> Result<()> {
    for pair in logs.windows(2) {
        let (previous, next) = (pair[0].position(), pair[1].position());
        if next < previous {
            return Err(IndexerError::OrderingViolation { previous, next });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::abi::DEFAULT_COLLATERAL_TOKEN;
    use crate::indexer::engine::EngineSettings;
    use crate::persistence::{EntityStore, MemoryStore};
    use crate::test_support::*;
    use alloy::primitives::{Bytes, B256};
    use rust_decimal_macros::dec;
    use std::sync::atomic::Ordering;

    async fn indexer(store: Arc<MemoryStore>) -> Indexer {
        let engine = Aggregator::bootstrap(
            store,
            EngineSettings {
                collateral_token: DEFAULT_COLLATERAL_TOKEN,
                binding_horizon: None,
            },
        )
        .await
        .unwrap();
        Indexer::new(
            LogDecoder::new(Some(contract())),
            engine,
            Arc::new(IndexerMetrics::new()),
        )
    }

    #[tokio::test]
    async fn test_batch_reports_each_fate() {
        let store = Arc::new(MemoryStore::new());
        let mut indexer = indexer(store.clone()).await;

        let mut garbage = mint_log(user_a(), 1, 1, 3, 0);
        garbage.topics[0] = B256::repeat_byte(0x99);

        let logs = vec![
            market_created_log(1, 2, 1, 0),
            mint_log(user_a(), 111, 1_000_000, 2, 0),
            mint_log(user_a(), 111, 1_000_000, 2, 0),
            garbage,
            market_resolved_log(5, 0, 4, 0),
        ];
        let report = indexer.ingest_batch(&logs).await.unwrap();

        assert_eq!(
            report,
            BatchReport {
                applied: 2,
                stale: 1,
                skipped: 2,
            }
        );
        assert_eq!(indexer.watermark(), Some(EventPosition::new(4, 0)));
        assert_eq!(store.watermark().await.unwrap(), Some(EventPosition::new(4, 0)));

        let metrics = indexer.metrics();
        assert_eq!(metrics.logs_received.load(Ordering::Relaxed), 5);
        assert_eq!(metrics.decode_errors.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.missing_entities.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.watermark_block(), 4);
    }

    #[tokio::test]
    async fn test_backward_batch_is_fatal_and_applies_nothing() {
        let store = Arc::new(MemoryStore::new());
        let mut indexer = indexer(store.clone()).await;

        let logs = vec![
            market_created_log(1, 2, 5, 0),
            mint_log(user_a(), 111, 10, 4, 0),
        ];
        let err = indexer.ingest_batch(&logs).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, IndexerError::OrderingViolation { .. }));
        assert!(store.market(1).await.unwrap().is_none());
        assert_eq!(indexer.watermark(), None);
    }

    #[tokio::test]
    async fn test_later_batch_behind_watermark_is_stale() {
        let store = Arc::new(MemoryStore::new());
        let mut indexer = indexer(store.clone()).await;

        indexer
            .ingest_batch(&[
                market_created_log(1, 2, 1, 0),
                mint_log(user_a(), 111, 10, 2, 0),
            ])
            .await
            .unwrap();
        let report = indexer
            .ingest_batch(&[mint_log(user_b(), 111, 10, 1, 5)])
            .await
            .unwrap();
        assert_eq!(report.stale, 1);
        assert_eq!(store.market(1).await.unwrap().unwrap().total_volume, dec!(10));
    }

    #[tokio::test]
    async fn test_foreign_emitter_is_skipped() {
        let store = Arc::new(MemoryStore::new());
        let mut indexer = indexer(store.clone()).await;

        let mut log = market_created_log(1, 2, 1, 0);
        log.address = user_b();
        assert_eq!(indexer.ingest(&log).await.unwrap(), Ingested::Skipped);
        assert!(store.market(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_truncated_data_does_not_halt_stream() {
        let store = Arc::new(MemoryStore::new());
        let mut indexer = indexer(store.clone()).await;

        let mut broken = market_created_log(1, 2, 1, 0);
        broken.data = Bytes::from(vec![0u8; 40]);
        let report = indexer
            .ingest_batch(&[broken, market_created_log(2, 2, 1, 1)])
            .await
            .unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.applied, 1);
        assert_eq!(store.stats().await.unwrap().total_markets, 1);
    }
}
