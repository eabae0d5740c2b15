//! `hearthd`, the Hearth host process.
//!
//! Wires the pieces together: configuration, plugin discovery and loading,
//! the HTTP API, and graceful shutdown with a full unload.

use std::sync::Arc;

use log::{error, info};

use hearth_plugin_system::http_api::{self, AppState};
use hearth_plugin_system::{Config, PluginLoader, PluginRegistry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env()?;
    info!(
        "starting hearthd (plugins: {}, data: {})",
        config.plugin_dir.display(),
        config.data_dir.display()
    );

    let registry = Arc::new(PluginRegistry::new());
    let loader = Arc::new(PluginLoader::new(config.clone(), registry.clone()));

    loader.load_all().await;

    let state = AppState {
        registry: registry.clone(),
        loader: loader.clone(),
    };
    let app = http_api::router(state, Some(&config.web_dir));

    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("failed to listen for shutdown signal: {}", err);
            }
            info!("shutdown signal received");
        })
        .await?;

    loader.unload_all().await;
    info!("all plugins unloaded, bye");

    Ok(())
}
