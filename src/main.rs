use anyhow::Result;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;

mod config;
mod error;
mod logging;
mod routes;
mod services;
pub mod models;

use services::store::TableStore;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logging()?;

    let config = config::load_config()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let state = Arc::new(AppState::new(config));

    let app = Router::new()
        .nest("/api", routes::routes(&state.config))
        .with_state(state.clone());

    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.store.clear();
    tracing::info!("Shutdown complete, {} tables left in store", state.store.len());

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

// Application state
pub struct AppState {
    pub config: config::Config,
    pub store: TableStore,
}

impl AppState {
    pub fn new(config: config::Config) -> Self {
        Self {
            config,
            store: TableStore::new(),
        }
    }
}
