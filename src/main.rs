use anyhow::{Context, Result};
use clap::Parser;
use inode_index_server::config::{
    AppConfig, CliConfig, FileConfig, DEFAULT_PAGE_SIZE, DEFAULT_PORT,
    DEFAULT_SYNC_POLL_INTERVAL_MS,
};
use inode_index_server::{run_server, RequestsLoggingLevel, SqliteIndex, SyncedQueryStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the SQLite index database file.
    #[clap(value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Index partition to serve (e.g. a contract address).
    #[clap(long)]
    pub scope: Option<String>,

    /// Path to a TOML config file. Its values override the command line.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Number of items per result page.
    #[clap(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: usize,

    /// The port to listen on.
    #[clap(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// How often the sync state is polled, in milliseconds.
    #[clap(long, default_value_t = DEFAULT_SYNC_POLL_INTERVAL_MS)]
    pub sync_poll_interval_ms: u64,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_path: self.db_path.clone(),
            scope: self.scope.clone(),
            page_size: self.page_size,
            port: self.port,
            logging_level: self.logging_level.clone(),
            sync_poll_interval_ms: self.sync_poll_interval_ms,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    info!(
        "Serving scope {} from {:?} (page size {})",
        config.scope, config.db_path, config.page_size
    );

    let index = SqliteIndex::open(&config.db_path)?.with_poll_interval(config.sync_poll_interval);
    let database = index.scoped(&config.scope)?;
    let store = Arc::new(SyncedQueryStore::new(database, config.page_size));

    let subscription = store
        .initialize()
        .await
        .context("Failed to initialize the index store")?;
    let mut progress = store.subscribe_progress();
    tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let current = *progress.borrow_and_update();
            info!(
                "Sync progress: {}/{:?} ({:?})",
                current.synced(),
                current.total().known(),
                current.phase()
            );
        }
    });

    // A broken sync feed stops the process instead of serving frozen progress
    subscription
        .supervise(run_server(store, config.logging_level, config.port))
        .await
}
