use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use imgstore::api::{self, AppState};
use imgstore::config::{Backend, Config, CDN_URL_ENV};
use imgstore::datamodel::{FjallStore, MemStore, Store};

/// Product image store with embedded-reference cleanup.
#[derive(Parser, Debug)]
#[command(name = "imgstore")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "imgstore.toml")]
    config: PathBuf,

    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port.
    #[arg(long)]
    port: Option<u16>,

    /// Override the fjall data directory.
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    config.apply_cdn_override(std::env::var(CDN_URL_ENV).ok());
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(data_dir) = cli.data_dir {
        config.storage.path = data_dir;
    }

    match config.storage.backend {
        Backend::Fjall => {
            let store = FjallStore::open(&config.storage.path).with_context(|| {
                format!("failed to open store at `{}`", config.storage.path.display())
            })?;
            info!(path = %config.storage.path.display(), "opened fjall store");
            serve(store, &config).await
        }
        Backend::Memory => {
            info!("using in-memory store, nothing will be persisted");
            serve(MemStore::new(), &config).await
        }
    }
}

async fn serve<S: Store>(store: S, config: &Config) -> anyhow::Result<()> {
    let urls = config.images.urls();
    info!(
        api_path = urls.api_path(),
        cdn_url = urls.cdn_url(),
        max_upload_bytes = config.images.max_upload_bytes,
        "serving images"
    );
    let state = AppState::new(Arc::new(store), urls, config.images.max_upload_bytes);
    let app = api::router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind `{addr}`"))?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
