use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::api::{self, AppState};
use crate::config::ScreenwiseConfig;
use crate::coordinator::ScreeningCoordinator;
use crate::fallback::FallbackChain;
use crate::store::SqliteStore;
use crate::ws;

/// Configuration for the progress server.
pub struct ServerConfig {
    pub port: u16,
    pub db_path: PathBuf,
    /// Bind on all interfaces and allow any origin.
    pub dev_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3170,
            db_path: PathBuf::from(".screenwise/screenwise.db"),
            dev_mode: false,
        }
    }
}

/// Build the full application router with the REST API and the event stream.
pub fn build_router(state: Arc<AppState>) -> Router {
    api::api_router()
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
}

/// Start the server and block until Ctrl+C.
pub async fn start_server(config: ServerConfig, settings: &ScreenwiseConfig) -> Result<()> {
    let chain = FallbackChain::from_config(settings).context("Invalid review tier configuration")?;
    for warning in settings.warnings() {
        tracing::warn!("{}", warning);
    }

    let store = SqliteStore::open(&config.db_path).with_context(|| {
        format!(
            "Failed to open screening database {}",
            config.db_path.display()
        )
    })?;
    let coordinator = ScreeningCoordinator::new(Arc::new(chain), Arc::new(store))
        .with_pacing(settings.pacing());
    let (ws_tx, _rx) = broadcast::channel::<String>(256);
    let state = Arc::new(AppState::new(coordinator, ws_tx));

    let mut app = build_router(state);
    if config.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let host = if config.dev_mode { "0.0.0.0" } else { "127.0.0.1" };
    let addr = format!("{}:{}", host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    info!(%local_addr, db = %config.db_path.display(), "Progress server listening");
    println!("Screenwise server running at http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    println!("Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    println!("\nShutting down...");
}
