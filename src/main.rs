//! CairnKV - Durable Key-Value Store Server
//!
//! Serves a single storage engine over the newline-delimited JSON
//! protocol. The engine replays its WAL at startup, so a node restarted
//! after a crash comes back with every acknowledged write.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cairnkv::config::CairnConfig;
use cairnkv::error::Result;
use cairnkv::network::KvServer;
use cairnkv::store::KvEngine;

/// CairnKV - durable TCP key-value store
#[derive(Parser)]
#[command(name = "cairnkv")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind host (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// WAL file path (overrides config)
    #[arg(long)]
    data_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level);

    let mut config = match &cli.config {
        Some(path) => match CairnConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("Failed to load configuration from {:?}: {}", path, e);
                return Err(e);
            }
        },
        None => CairnConfig::default(),
    };

    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(data_file) = cli.data_file {
        config.wal.data_file = data_file;
    }
    config.validate()?;

    let wal_path = config.wal_path();
    tracing::info!(node = %config.node.id, wal = %wal_path.display(), "opening store");
    let engine = Arc::new(KvEngine::open(&wal_path)?);

    let server = KvServer::bind(&config.bind_address(), engine).await?;
    server.serve().await
}

fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
