use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use parlor_server::{api, AppState, ServerConfig};
use parlor_store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,parlor_server=debug")),
        )
        .init();

    info!("Starting parlor hub v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");
    info!(
        instance = %config.instance_name,
        admin_enabled = config.admin_public_key.is_some(),
        "Instance settings"
    );

    let store = Arc::new(Store::open_at(&config.db_path)?);
    let http_addr = config.http_addr;
    let state = AppState::new(store, Arc::new(config));

    tokio::select! {
        result = api::serve(state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
