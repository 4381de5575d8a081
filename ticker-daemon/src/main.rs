mod bridge;

use std::path::PathBuf;
use std::sync::Arc;

use reqwest::{redirect, ClientBuilder};
use ticker_core::{CategoryTable, LocalStore, ObserverRegistry, ServiceConfig, TickerService};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let dir = config_dir();
    let config = ServiceConfig::from_file(dir.join("config.json"));
    let store_path = dir.join("store.json");
    let store = LocalStore::load_from(&store_path).await;
    let categories = Arc::new(CategoryTable::load_or_default(dir.join("categories.json")));
    let client = ClientBuilder::new()
        .redirect(redirect::Policy::limited(5))
        .user_agent("NewsTicker/0.1")
        .build()?;

    info!(dir = %dir.display(), endpoint = %config.endpoint, "starting news ticker");
    let service = TickerService::new(client, config, categories, store, ObserverRegistry::new());

    let (out_tx, out_rx) = mpsc::channel(64);
    let writer = tokio::spawn(bridge::write_stdout(out_rx));

    service.start().await;

    tokio::select! {
        result = bridge::read_stdin(&service, out_tx.clone(), &store_path) => {
            if let Err(e) = result {
                warn!(error = %e, "failed to read stdin");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received");
        }
    }

    service.shutdown().await;
    drop(service);
    drop(out_tx);
    writer.await?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn config_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("NEWS_TICKER_HOME") {
        return PathBuf::from(dir);
    }
    // Linux: ~/.config/news-ticker
    let mut dir = dirs::config_dir()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_default();
    dir.push("news-ticker");
    dir
}
