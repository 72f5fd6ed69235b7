mod server;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use castbridge_core::bus::EventBus;
use castbridge_core::cache::CacheLayout;
use castbridge_core::download::DownloadManager;
use castbridge_core::origin::{NoopKeepAwake, Origin};
use castbridge_core::session::CastSession;
use castbridge_core::config::LoggingConfig;
use castbridge_core::store::{ExtractionStore, HistoryStore, SettingsStore};
use castbridge_core::transcoder::Transcoder;
use castbridge_core::Config;

use server::{NullMediaController, OriginServer};

#[derive(Parser, Debug)]
#[command(name = "castbridge", about = "HLS transcoding proxy for cast receivers")]
struct Cli {
    /// Path to a YAML config file.
    #[arg(long)]
    config: Option<String>,

    /// Override the listen host.
    #[arg(long)]
    host: Option<String>,

    /// Override the listen port.
    #[arg(long)]
    port: Option<u16>,
}

/// Load configuration. Search order: --config flag, CASTBRIDGE_CONFIG_PATH,
/// ./config.yaml, environment variables only.
fn load_config(cli: &Cli) -> Result<Config> {
    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var("CASTBRIDGE_CONFIG_PATH").ok())
        .filter(|p| std::path::Path::new(p).exists())
        .or_else(|| {
            std::path::Path::new("config.yaml")
                .exists()
                .then(|| "config.yaml".to_string())
        });

    let mut config = match config_path {
        Some(path) => Config::from_file(&path)?,
        None => Config::from_env().unwrap_or_default(),
    };

    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    Ok(config)
}

/// Wire up tracing: the configured level (overridable via `RUST_LOG`),
/// pretty or JSON output, optionally appended to a log file instead of
/// stderr.
fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.level))
        .map_err(|e| anyhow::anyhow!("invalid log level {:?}: {e}", config.level))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match (config.format.as_str(), &config.file_path) {
        ("json", Some(path)) => {
            let file = open_log_file(path)?;
            builder
                .json()
                .with_writer(std::sync::Arc::new(file))
                .init();
        }
        ("json", None) => builder.json().init(),
        (_, Some(path)) => {
            let file = open_log_file(path)?;
            builder
                .with_ansi(false)
                .with_writer(std::sync::Arc::new(file))
                .init();
        }
        (_, None) => builder.pretty().init(),
    }
    Ok(())
}

fn open_log_file(path: &str) -> Result<std::fs::File> {
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| anyhow::anyhow!("cannot open log file {path:?}: {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    init_logging(&config.logging)?;
    info!("castbridge starting on {}", config.http_address());

    let layout = CacheLayout::new(config.cache.root.clone());
    tokio::fs::create_dir_all(layout.root()).await?;

    let transcoder = Arc::new(Transcoder::new(config.transcoder.candidates.clone()));
    let bus = EventBus::new();
    let origin = Origin::new(Arc::new(NoopKeepAwake));

    let extractions = ExtractionStore::new(layout.clone());
    let settings = SettingsStore::open(config.settings_path()).await;
    let history = HistoryStore::open(config.history_path()).await;

    let downloads = Arc::new(DownloadManager::new(
        extractions.clone(),
        layout.clone(),
        transcoder.clone(),
        bus.clone(),
    ));

    let session = CastSession::new(
        config.clone(),
        origin.clone(),
        Arc::new(NullMediaController),
        extractions,
        history,
        layout,
        transcoder,
        bus.clone(),
    );

    let server = OriginServer::new(config, origin, session, downloads, settings, bus);
    server.run().await
}
