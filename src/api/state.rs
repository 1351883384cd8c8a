use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::api::read::ReadApi;
use crate::services::IndexerMetrics;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub api: ReadApi,

    /// Ingestion counters, shared with the poller
    pub metrics: Arc<IndexerMetrics>,

    /// Application start time
    pub start_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(api: ReadApi, metrics: Arc<IndexerMetrics>) -> Self {
        Self {
            api,
            metrics,
            start_time: Utc::now(),
        }
    }

    /// Get system uptime in seconds
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.start_time).num_seconds()
    }
}
