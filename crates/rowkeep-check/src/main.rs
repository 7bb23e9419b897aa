//! Connectivity check for configured rowkeep data stores.
//!
//! Loads the store configuration, registers every store the way an
//! application would at startup, and reports whether each connection
//! answers.
//!
//! # Usage
//!
//! ```bash
//! rowkeep-check [config.yaml]
//! ```
//!
//! The path defaults to `ROWKEEP_CONFIG`, then `rowkeep.yaml`.
//! `DATABASE_URL` and `DRAGONFLY_URL` fill in connection URLs the file
//! leaves unset.

use std::path::PathBuf;

use anyhow::Context;
use rowkeep_core::StoreRegistry;
use rowkeep_db::{DalConfig, register_stores};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Config file used when neither an argument nor `ROWKEEP_CONFIG` is given.
const DEFAULT_CONFIG_PATH: &str = "rowkeep.yaml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let path = config_path();
    let config = DalConfig::from_file(&path)
        .with_context(|| format!("loading {}", path.display()))?;
    info!(
        path = %path.display(),
        stores = config.stores.len(),
        "Configuration loaded"
    );

    let registry = StoreRegistry::new();
    registry.boot();
    let handles = register_stores(&registry, &config)
        .await
        .context("registering stores")?;

    let mut unhealthy = 0_usize;
    for handle in &handles {
        if handle.connection.is_connected().await {
            info!(
                store = %handle.name,
                kind = handle.connection.kind(),
                mapper = ?handle.mapper,
                "Store reachable"
            );
        } else {
            warn!(store = %handle.name, kind = handle.connection.kind(), "Store not answering");
            unhealthy = unhealthy.saturating_add(1);
        }
        if let Err(e) = handle.connection.disconnect().await {
            warn!(store = %handle.name, error = %e, "Disconnect failed");
        }
    }

    anyhow::ensure!(unhealthy == 0, "{unhealthy} store(s) not answering");
    info!(stores = handles.len(), "All stores reachable");
    Ok(())
}

fn config_path() -> PathBuf {
    std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os("ROWKEEP_CONFIG"))
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
}
