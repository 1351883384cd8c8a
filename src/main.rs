use anyhow::{anyhow, bail, Context};
use clap::Parser;
use ctf_indexer::adapters::{start_api_server, LogPoller, PostgresStore};
use ctf_indexer::api::{AppState, ReadApi};
use ctf_indexer::cli::{self, Cli, Commands};
use ctf_indexer::config::{AppConfig, StorageBackend};
use ctf_indexer::indexer::{Aggregator, Indexer, LogDecoder};
use ctf_indexer::persistence::{EntityStore, MemoryStore};
use ctf_indexer::services::IndexerMetrics;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Duration;
use tracing::{info, warn};

mod main_runtime;

use main_runtime::{init_logging, init_logging_simple, shutdown_signal};

const STATUS_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run {
        from_block: None,
        no_api: false,
    }) {
        Commands::Topics => {
            for line in cli::topic_lines() {
                println!("{line}");
            }
        }
        Commands::Migrate => {
            init_logging_simple();
            let config = load_config(&cli.config_dir)?;
            run_migrations(&config).await?;
        }
        Commands::Serve => {
            let config = load_config(&cli.config_dir)?;
            init_logging(&config.logging);
            run_serve_mode(&config).await?;
        }
        Commands::Run { from_block, no_api } => {
            let mut config = load_config(&cli.config_dir)?;
            if let Some(block) = from_block {
                config.chain.start_block = block;
            }
            init_logging(&config.logging);
            run_indexer_mode(&config, !no_api && config.api.enabled).await?;
        }
    }

    Ok(())
}

fn load_config(dir: &str) -> anyhow::Result<AppConfig> {
    let config = AppConfig::load_from(dir)
        .with_context(|| format!("failed to load configuration from {dir}"))?;
    if let Err(errors) = config.validate() {
        bail!("invalid configuration: {}", errors.join("; "));
    }
    Ok(config)
}

async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn EntityStore>> {
    match config.storage.backend {
        StorageBackend::Memory => {
            info!("using in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageBackend::Postgres => {
            let db = config
                .database
                .as_ref()
                .ok_or_else(|| anyhow!("database section is required for postgres"))?;
            let store = PostgresStore::new(&db.url, db.max_connections).await?;
            store.migrate().await?;
            Ok(Arc::new(store))
        }
    }
}

async fn run_migrations(config: &AppConfig) -> anyhow::Result<()> {
    let db = config
        .database
        .as_ref()
        .ok_or_else(|| anyhow!("database.url must be set to run migrations"))?;
    let store = PostgresStore::new(&db.url, db.max_connections).await?;
    store.migrate().await?;
    println!("migrations applied");
    Ok(())
}

fn app_state(config: &AppConfig, store: Arc<dyn EntityStore>, metrics: Arc<IndexerMetrics>) -> AppState {
    AppState::new(
        ReadApi::new(store, config.api.max_page_size, config.api.recent_trades),
        metrics,
    )
}

async fn run_serve_mode(config: &AppConfig) -> anyhow::Result<()> {
    if config.storage.backend == StorageBackend::Memory {
        warn!("serving an in-memory store; nothing is indexed in serve mode");
    }
    let store = open_store(config).await?;
    let metrics = Arc::new(IndexerMetrics::new());
    if let Some(watermark) = store.watermark().await? {
        metrics.set_watermark(watermark);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let state = app_state(config, store, metrics);
    let host = config.api.host.clone();
    let port = config.api.port;
    let server = tokio::spawn(async move { start_api_server(state, &host, port, shutdown_rx).await });

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
    server.await??;
    Ok(())
}

async fn run_indexer_mode(config: &AppConfig, serve_api: bool) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    let metrics = Arc::new(IndexerMetrics::new());

    let settings = config.engine_settings().map_err(|e| anyhow!(e))?;
    let engine = Aggregator::bootstrap(store.clone(), settings).await?;
    info!(
        watermark = ?engine.watermark(),
        bound_tokens = engine.resolver().bound_count(),
        "aggregator ready"
    );

    let contract = config.contract_address().map_err(|e| anyhow!(e))?;
    let mut indexer = Indexer::new(LogDecoder::new(Some(contract)), engine, metrics.clone());
    let poller = LogPoller::connect(config.poller_settings().map_err(|e| anyhow!(e))?).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let server = if serve_api {
        let state = app_state(config, store.clone(), metrics.clone());
        let host = config.api.host.clone();
        let port = config.api.port;
        let rx = shutdown_rx.clone();
        Some(tokio::spawn(async move { start_api_server(state, &host, port, rx).await }))
    } else {
        None
    };

    let status_metrics = metrics.clone();
    let mut status_rx = shutdown_rx.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(STATUS_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => status_metrics.log_status(),
                _ = status_rx.changed() => break,
            }
        }
    });

    let poller_rx = shutdown_rx.clone();
    let mut poller_task = tokio::spawn(async move { poller.run(&mut indexer, poller_rx).await });

    let finished_early = tokio::select! {
        _ = shutdown_signal() => None,
        res = &mut poller_task => Some(res),
    };
    let _ = shutdown_tx.send(true);

    let poller_result = match finished_early {
        Some(res) => {
            warn!("log poller exited, stopping");
            res
        }
        None => poller_task.await,
    };

    if let Some(server) = server {
        server.await??;
    }
    poller_result??;

    metrics.log_status();
    Ok(())
}
