use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use codecollab::config::{ServerConfig, StorageBackend};
use codecollab::server::{AppState, create_router};
use codecollab::store::{MemoryStore, SqliteStore, Store};

#[derive(Parser)]
#[command(name = "codecollab")]
#[command(about = "A collaborative code editing server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory, database and config file
    Init {
        /// Data directory for the database and config file
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,
    },

    /// Start the server
    Serve {
        /// Config file (defaults to <data-dir>/codecollab.toml when present)
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(long, short)]
        port: Option<u16>,

        /// Data directory for the database
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Record storage: "memory" or "sqlite"
        #[arg(long)]
        storage: Option<StorageBackend>,
    },
}

fn run_init(data_dir: PathBuf) -> anyhow::Result<()> {
    let config_path = ServerConfig::config_path(&data_dir);
    if config_path.exists() {
        bail!("Already initialized. Config exists at: {}", config_path.display());
    }

    fs::create_dir_all(&data_dir)?;

    let config = ServerConfig {
        data_dir: data_dir.clone(),
        ..ServerConfig::default()
    };

    let store = SqliteStore::new(config.db_path())?;
    store.initialize()?;
    store.close()?;

    fs::write(&config_path, config.to_toml()?)?;

    println!("Initialized codecollab in {}", data_dir.display());
    println!("  database: {}", config.db_path().display());
    println!("  config:   {}", config_path.display());

    Ok(())
}

fn resolve_config(
    config: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
    data_dir: Option<PathBuf>,
    storage: Option<StorageBackend>,
) -> anyhow::Result<ServerConfig> {
    let file = match config {
        Some(path) => Some(path),
        None => {
            let dir = data_dir.clone().unwrap_or_else(|| ServerConfig::default().data_dir);
            Some(ServerConfig::config_path(&dir)).filter(|p| p.exists())
        }
    };

    let mut config = match file {
        Some(path) => {
            info!("Loading config from {}", path.display());
            ServerConfig::load(&path)?
        }
        None => ServerConfig::default(),
    };

    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(data_dir) = data_dir {
        config.data_dir = data_dir;
    }
    if let Some(storage) = storage {
        config.storage = storage;
    }

    Ok(config)
}

fn open_store(config: &ServerConfig) -> anyhow::Result<Arc<dyn Store>> {
    let store: Arc<dyn Store> = match config.storage {
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
        StorageBackend::Sqlite => {
            let db_path = config.db_path();
            if !db_path.exists() {
                bail!(
                    "Database not found at {}. Run 'codecollab init' first, or use --storage memory.",
                    db_path.display()
                );
            }
            Arc::new(SqliteStore::new(db_path)?)
        }
    };
    store.initialize()?;
    Ok(store)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("codecollab=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { data_dir } => {
            run_init(data_dir)?;
        }
        Commands::Serve {
            config,
            host,
            port,
            data_dir,
            storage,
        } => {
            let config = resolve_config(config, host, port, data_dir, storage)?;
            let store = open_store(&config)?;

            info!("Using {} storage", config.storage);

            let state = Arc::new(AppState::new(store.clone(), config.relay.clone()));
            let app = create_router(state);
            let addr = config.socket_addr()?;

            info!("Starting server on {}", addr);

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                    info!("Shutting down");
                })
                .await?;

            store.close()?;
        }
    }

    Ok(())
}
