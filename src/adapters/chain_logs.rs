//! `eth_getLogs` poller.
//!
//! Walks the chain from the watermark in bounded block ranges, staying
//! `confirmations` blocks behind the head so delivered logs are final.
//! Each range is handed to the pipeline as one batch in the order the node
//! returned it; the pipeline refuses a batch that steps backward.

use alloy::network::TransactionResponse;
use alloy::primitives::{Address, B256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{BlockNumberOrTag, Filter, Log};
use alloy::sol_types::SolEvent;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{IndexerError, Result};
use crate::indexer::abi::{self, MarketCreated};
use crate::indexer::{Indexer, RawLog};

#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub rpc_url: String,
    pub contract: Address,
    pub start_block: u64,
    pub confirmations: u64,
    pub poll_interval: Duration,
    pub max_block_range: u64,
    /// Look up the sender of `MarketCreated` transactions
    pub fetch_creator: bool,
}

pub struct LogPoller {
    provider: DynProvider,
    settings: PollerSettings,
    next_block: Option<u64>,
}

impl LogPoller {
    pub async fn connect(settings: PollerSettings) -> Result<Self> {
        let provider = ProviderBuilder::new()
            .connect(&settings.rpc_url)
            .await
            .map_err(rpc_error)?
            .erased();

        let chain_id = provider.get_chain_id().await.map_err(rpc_error)?;
        info!(
            chain_id,
            contract = %settings.contract,
            start_block = settings.start_block,
            "connected to chain"
        );

        Ok(Self {
            provider,
            settings,
            next_block: None,
        })
    }

    /// Poll until `shutdown` flips to true. RPC failures are retried after
    /// the poll interval; pipeline failures end the loop.
    pub async fn run(mut self, indexer: &mut Indexer, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(interval_ms = self.settings.poll_interval.as_millis() as u64, "log poller started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let caught_up = match self.poll_once(indexer).await {
                Ok(caught_up) => caught_up,
                Err(IndexerError::Rpc(msg)) => {
                    indexer.metrics().inc_rpc_errors();
                    warn!(error = %msg, "rpc request failed, retrying");
                    true
                }
                Err(err) => return Err(err),
            };

            if caught_up {
                tokio::select! {
                    _ = tokio::time::sleep(self.settings.poll_interval) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }

        info!(watermark = ?indexer.watermark(), "log poller stopped");
        Ok(())
    }

    /// Fetch and ingest one block range. Returns true when the poller has
    /// reached the confirmed head.
    pub async fn poll_once(&mut self, indexer: &mut Indexer) -> Result<bool> {
        let head = self
            .provider
            .get_block_number()
            .await
            .map_err(rpc_error)?
            .saturating_sub(self.settings.confirmations);
        indexer.metrics().set_head_block(head);

        // the watermark block is fetched again; its applied logs come back stale
        let from = *self.next_block.get_or_insert_with(|| {
            indexer
                .watermark()
                .map(|w| w.block_number)
                .unwrap_or(self.settings.start_block)
                .max(self.settings.start_block)
        });
        if from > head {
            return Ok(true);
        }
        let to = block_range_end(from, head, self.settings.max_block_range);

        let logs = self.fetch_range(from, to).await?;
        let report = indexer.ingest_batch(&logs).await?;
        self.next_block = Some(to + 1);

        if !logs.is_empty() {
            info!(
                from,
                to,
                applied = report.applied,
                stale = report.stale,
                skipped = report.skipped,
                "block range indexed"
            );
        } else {
            debug!(from, to, "empty block range");
        }
        Ok(to >= head)
    }

    async fn fetch_range(&self, from: u64, to: u64) -> Result<Vec<RawLog>> {
        let filter = Filter::new()
            .address(self.settings.contract)
            .event_signature(abi::event_topics())
            .from_block(from)
            .to_block(to);

        let logs = self.provider.get_logs(&filter).await.map_err(rpc_error)?;

        let mut timestamps: HashMap<u64, u64> = HashMap::new();
        let mut raw = Vec::with_capacity(logs.len());
        for log in &logs {
            if log.removed {
                debug!(tx = ?log.transaction_hash, "removed log ignored");
                continue;
            }
            let Some(block) = log.block_number else {
                warn!(tx = ?log.transaction_hash, "log without block number ignored");
                continue;
            };

            let timestamp = match log.block_timestamp.or_else(|| timestamps.get(&block).copied()) {
                Some(ts) => ts,
                None => self.block_timestamp(block).await?,
            };
            timestamps.insert(block, timestamp);

            let sender = if self.settings.fetch_creator
                && log.topic0() == Some(&MarketCreated::SIGNATURE_HASH)
            {
                match log.transaction_hash {
                    Some(hash) => self.transaction_sender(hash).await?,
                    None => None,
                }
            } else {
                None
            };

            match to_raw_log(log, timestamp, sender) {
                Some(entry) => raw.push(entry),
                None => warn!(block, "incomplete log ignored"),
            }
        }

        check_window(&raw, from, to)?;
        Ok(raw)
    }

    async fn block_timestamp(&self, block: u64) -> Result<u64> {
        let header = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(block))
            .await
            .map_err(rpc_error)?
            .ok_or_else(|| IndexerError::Rpc(format!("block {block} not found")))?;
        Ok(header.header.timestamp)
    }

    async fn transaction_sender(&self, hash: B256) -> Result<Option<Address>> {
        let tx = self
            .provider
            .get_transaction_by_hash(hash)
            .await
            .map_err(rpc_error)?;
        Ok(tx.map(|tx| tx.from()))
    }
}

/// Last block of a range starting at `from`, capped by `head`
fn block_range_end(from: u64, head: u64, max_range: u64) -> u64 {
    from.saturating_add(max_range.max(1) - 1).min(head)
}

/// Every log of a range must come from the blocks that were asked for.
/// Anything earlier would otherwise be dropped as stale without a trace.
fn check_window(logs: &[RawLog], from: u64, to: u64) -> Result<()> {
    match logs
        .iter()
        .find(|l| l.block_number < from || l.block_number > to)
    {
        Some(log) => Err(IndexerError::Rpc(format!(
            "node returned log {} outside requested blocks {from}..={to}",
            log.position()
        ))),
        None => Ok(()),
    }
}

/// `None` when the node left out a positional field
pub fn to_raw_log(log: &Log, block_timestamp: u64, transaction_from: Option<Address>) -> Option<RawLog> {
    Some(RawLog {
        address: log.address(),
        topics: log.topics().to_vec(),
        data: log.data().data.clone(),
        block_number: log.block_number?,
        block_timestamp,
        transaction_hash: log.transaction_hash?,
        log_index: log.log_index?,
        transaction_from,
    })
}

fn rpc_error(err: impl std::fmt::Display) -> IndexerError {
    IndexerError::Rpc(err.to_string())
}
