use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

use ord_indexer::app::ports::{CheckpointStore, CollectionRepo, TokenRepo};
use ord_indexer::app::query_use_case::QueryUseCase;
use ord_indexer::config::{Config, StorageBackend};
use ord_indexer::domain::ListOptions;
use ord_indexer::indexer::{Applier, Syncer};
use ord_indexer::infra::{FileCheckpoint, HtmlPageParser, ReqwestHttp};
use ord_indexer::protocol::registry::DecoderRegistry;
use ord_indexer::storage::{InMemoryStore, SqliteStore};
use ord_indexer::{logging, metrics, server};

#[derive(Parser)]
#[command(name = "ord_indexer")]
#[command(about = "Incremental BRC-721 indexer for ord explorer inscriptions")]
#[command(version)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl the explorer and apply inscriptions until interrupted
    Sync,
    /// Serve the read API
    Serve {
        /// Override the configured API port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print the checkpoint and stored counts
    Status,
}

/// Repositories for the configured backend.
struct Stores {
    collections: Arc<dyn CollectionRepo>,
    tokens: Arc<dyn TokenRepo>,
}

fn open_stores(config: &Config) -> anyhow::Result<Stores> {
    match config.data.backend {
        StorageBackend::Sqlite => {
            std::fs::create_dir_all(&config.data.data_root).with_context(|| {
                format!("creating data root {}", config.data.data_root.display())
            })?;
            let store = Arc::new(SqliteStore::open(config.data.database_path())?);
            Ok(Stores {
                collections: store.clone(),
                tokens: store,
            })
        }
        StorageBackend::Memory => {
            let store = Arc::new(InMemoryStore::new());
            Ok(Stores {
                collections: store.clone(),
                tokens: store,
            })
        }
    }
}

fn page_parser(config: &Config) -> Arc<HtmlPageParser> {
    let http = Arc::new(ReqwestHttp::default());
    let registry = Arc::new(DecoderRegistry::with_brc721());
    Arc::new(HtmlPageParser::new(http, config.ord.server_addr.clone(), registry))
}

/// Raise the stop flag on SIGINT or SIGTERM.
fn spawn_signal_handler(stop: watch::Sender<bool>) {
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("stop signal received, draining in-flight work");
        let _ = stop.send(true);
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn run_sync(config: Config) -> anyhow::Result<()> {
    let stores = open_stores(&config)?;
    let checkpoint: Arc<dyn CheckpointStore> =
        Arc::new(FileCheckpoint::new(config.data.checkpoint_path()));
    let applier = Applier::new(stores.collections, stores.tokens, checkpoint.clone())
        .with_update(config.ord.enable_update);

    let (stop_tx, stop_rx) = watch::channel(false);
    spawn_signal_handler(stop_tx);

    let syncer = Syncer::new(
        config.ord.clone(),
        page_parser(&config),
        Arc::new(applier),
        checkpoint,
    );
    syncer.run(stop_rx).await?;
    info!("indexer stopped");
    Ok(())
}

async fn run_serve(config: Config, port: Option<u16>) -> anyhow::Result<()> {
    let stores = open_stores(&config)?;
    let query = QueryUseCase::new(stores.collections, stores.tokens, page_parser(&config));
    let port = port.unwrap_or(config.api.port);
    server::start_server(Arc::new(query), port, shutdown_signal()).await
}

async fn run_status(config: Config) -> anyhow::Result<()> {
    let stores = open_stores(&config)?;
    let checkpoint = FileCheckpoint::new(config.data.checkpoint_path());
    let all = ListOptions::default();

    println!("📊 Indexer status");
    match checkpoint.load()? {
        Some(id) => println!("   Last applied inscription: {}", id),
        None => println!("   Last applied inscription: none"),
    }
    println!("   Collections: {}", stores.collections.count(&all).await?);
    println!("   Tokens: {}", stores.tokens.count(&all).await?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    let _log_guard = logging::init_logging(&config.logging, cli.debug);
    if let Some(port) = config.metrics.port {
        metrics::init_metrics(port);
    }

    match cli.command {
        Commands::Sync => run_sync(config).await,
        Commands::Serve { port } => run_serve(config, port).await,
        Commands::Status => run_status(config).await,
    }
}
