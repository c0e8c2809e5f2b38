//! Meteorflux server binary.
//!
//! Configuration comes from the environment:
//!
//! - `METEORFLUX_PORT` - listening port (default 3000)
//! - `METEORFLUX_DATABASE_URL` - SQLite connection string
//! - `RUST_LOG` - extra tracing directives

use std::env;
use std::net::SocketAddr;

use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use meteorflux::api::{AppState, router};
use meteorflux::storage::Storage;

/// Default port if not specified via environment variable.
const DEFAULT_PORT: u16 = 3000;

/// Default database path if not specified via environment variable.
const DEFAULT_DB_PATH: &str = "sqlite:meteorflux.db?mode=rwc";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing with environment filter
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("meteorflux=info".parse()?))
        .init();

    // Load configuration from environment
    let port: u16 = env::var("METEORFLUX_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let db_url =
        env::var("METEORFLUX_DATABASE_URL").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());

    info!(port, db_url = %db_url, "Starting meteorflux server");

    // Initialize storage
    let storage = Storage::new(&db_url).await?;
    info!("Database initialized");

    // Build router with request tracing
    let app =
        router(AppState { storage }).layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "Meteorflux is listening");

    axum::serve(listener, app).await?;

    Ok(())
}
