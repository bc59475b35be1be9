// crates/server/src/main.rs
//! PowerPulse server binary.

use std::net::SocketAddr;

use anyhow::Result;
use powerpulse_core::llm::factory::create_provider;
use powerpulse_core::Config;
use powerpulse_db::Database;
use powerpulse_server::{create_app, AppState};
use tracing_subscriber::FmtSubscriber;

const DEFAULT_PORT: u16 = 8787;

/// Get the server port from environment or use default.
fn get_port() -> u16 {
    std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT)
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    eprintln!("\n\u{1f50b} powerpulse v{}\n", env!("CARGO_PKG_VERSION"));

    powerpulse_server::metrics::init_metrics();

    let config = Config::from_env();

    let db = Database::open_configured(&config.database_url).await?;
    let provider = create_provider(&config)?;
    let state = AppState::new(db, config, provider);

    let app = create_app(state);

    let port = get_port();
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(port, "powerpulse listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutting down");
        })
        .await?;

    Ok(())
}
