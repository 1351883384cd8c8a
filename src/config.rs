use alloy::primitives::Address;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::adapters::chain_logs::PollerSettings;
use crate::indexer::abi::DEFAULT_COLLATERAL_TOKEN;
use crate::indexer::EngineSettings;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub chain: ChainConfig,
    #[serde(default)]
    pub indexer: IndexerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// JSON-RPC endpoint
    pub rpc_url: String,
    /// Prediction-market contract emitting the indexed events
    pub contract_address: String,
    /// First block to index when the store is empty
    #[serde(default)]
    pub start_block: u64,
    /// Blocks to stay behind the head
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Largest block span per `eth_getLogs` call
    #[serde(default = "default_max_block_range")]
    pub max_block_range: u64,
    /// Fetch the sender of each `MarketCreated` transaction as market creator
    #[serde(default = "default_true")]
    pub fetch_creator: bool,
}

fn default_confirmations() -> u64 {
    2
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_max_block_range() -> u64 {
    2_000
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexerConfig {
    /// Collateral recorded on every market
    #[serde(default = "default_collateral_token")]
    pub collateral_token: String,
    /// Most recent markets eligible for new token bindings; unset means all
    #[serde(default)]
    pub binding_horizon: Option<usize>,
}

fn default_collateral_token() -> String {
    DEFAULT_COLLATERAL_TOKEN.to_string()
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            collateral_token: default_collateral_token(),
            binding_horizon: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Trades nested in a user lookup
    #[serde(default = "default_recent_trades")]
    pub recent_trades: usize,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_recent_trades() -> usize {
    10
}

fn default_max_page_size() -> usize {
    100
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_host(),
            port: default_port(),
            recent_trades: default_recent_trades(),
            max_page_size: default_max_page_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for daily log files; stdout only when unset
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("storage.backend", "memory")?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("CTF_INDEXER_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (CTF_INDEXER__CHAIN__RPC_URL, etc.)
            .add_source(
                Environment::with_prefix("CTF_INDEXER")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// In-memory configuration for a single RPC endpoint
    pub fn default_config(rpc_url: &str, contract_address: &str) -> Self {
        Self {
            chain: ChainConfig {
                rpc_url: rpc_url.to_string(),
                contract_address: contract_address.to_string(),
                start_block: 0,
                confirmations: default_confirmations(),
                poll_interval_ms: default_poll_interval_ms(),
                max_block_range: default_max_block_range(),
                fetch_creator: true,
            },
            indexer: IndexerConfig::default(),
            storage: StorageConfig::default(),
            database: None,
            api: ApiConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    pub fn contract_address(&self) -> Result<Address, String> {
        Address::from_str(&self.chain.contract_address)
            .map_err(|e| format!("invalid chain.contract_address: {e}"))
    }

    pub fn collateral_token(&self) -> Result<Address, String> {
        Address::from_str(&self.indexer.collateral_token)
            .map_err(|e| format!("invalid indexer.collateral_token: {e}"))
    }

    pub fn engine_settings(&self) -> Result<EngineSettings, String> {
        Ok(EngineSettings {
            collateral_token: self.collateral_token()?,
            binding_horizon: self.indexer.binding_horizon,
        })
    }

    pub fn poller_settings(&self) -> Result<PollerSettings, String> {
        Ok(PollerSettings {
            rpc_url: self.chain.rpc_url.clone(),
            contract: self.contract_address()?,
            start_block: self.chain.start_block,
            confirmations: self.chain.confirmations,
            poll_interval: Duration::from_millis(self.chain.poll_interval_ms),
            max_block_range: self.chain.max_block_range,
            fetch_creator: self.chain.fetch_creator,
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.chain.rpc_url.trim().is_empty() {
            errors.push("chain.rpc_url must be set".to_string());
        }
        if let Err(e) = self.contract_address() {
            errors.push(e);
        }
        if let Err(e) = self.collateral_token() {
            errors.push(e);
        }
        if self.chain.max_block_range == 0 {
            errors.push("chain.max_block_range must be positive".to_string());
        }
        if self.chain.poll_interval_ms == 0 {
            errors.push("chain.poll_interval_ms must be positive".to_string());
        }
        if self.indexer.binding_horizon == Some(0) {
            errors.push("indexer.binding_horizon must be at least 1 when set".to_string());
        }

        if self.storage.backend == StorageBackend::Postgres {
            match &self.database {
                Some(db) if !db.url.trim().is_empty() => {
                    if db.max_connections == 0 {
                        errors.push("database.max_connections must be positive".to_string());
                    }
                }
                _ => errors.push("database.url is required for the postgres backend".to_string()),
            }
        }

        if self.api.max_page_size == 0 {
            errors.push("api.max_page_size must be positive".to_string());
        }
        if self.api.recent_trades > self.api.max_page_size {
            errors.push("api.recent_trades should not exceed api.max_page_size".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTRACT: &str = "0x00000000000000000000000000000000000000cc";

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default_config("http://localhost:8545", CONTRACT);
        assert!(config.validate().is_ok());
        assert_eq!(config.collateral_token().unwrap(), DEFAULT_COLLATERAL_TOKEN);
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.indexer.binding_horizon, None);
    }

    #[test]
    fn test_validate_collects_all_problems() {
        let mut config = AppConfig::default_config("", "not-an-address");
        config.chain.max_block_range = 0;
        config.indexer.binding_horizon = Some(0);
        config.storage.backend = StorageBackend::Postgres;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(errors.iter().any(|e| e.contains("database.url")));
    }

    #[test]
    fn test_poller_settings() {
        let mut config = AppConfig::default_config("http://localhost:8545", CONTRACT);
        config.chain.poll_interval_ms = 500;
        let settings = config.poller_settings().unwrap();
        assert_eq!(settings.poll_interval, Duration::from_millis(500));
        assert_eq!(settings.contract, Address::with_last_byte(0xcc));
    }

    #[test]
    fn test_load_from_toml() {
        let dir = std::env::temp_dir().join(format!("ctf-indexer-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("default.toml"),
            format!(
                "[chain]\nrpc_url = \"http://node:8545\"\ncontract_address = \"{CONTRACT}\"\nstart_block = 100\n\n[indexer]\nbinding_horizon = 100\n"
            ),
        )
        .unwrap();

        let config = AppConfig::load_from(&dir).unwrap();
        assert_eq!(config.chain.start_block, 100);
        assert_eq!(config.chain.confirmations, 2);
        assert_eq!(config.indexer.binding_horizon, Some(100));
        assert_eq!(config.storage.backend, StorageBackend::Memory);

        std::fs::remove_dir_all(&dir).ok();
    }
}
