//! Tribuna - live debate server
//!
//! Serves debate rooms over TCP. Configuration is read from
//! `$TRIBUNA_CONFIG` or the platform config directory; log verbosity
//! follows `RUST_LOG`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tribuna_net::Server;

mod state;

use state::AppState;

async fn run(state: AppState) -> tribuna_net::Result<()> {
    let db = state.open_database()?;
    let server = Server::start(state.listen_addr(), db, state.server_config()).await?;
    tracing::info!(addr = %server.addr(), "Listening");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Interrupt received, shutting down");
    server.shutdown().await;
    Ok(())
}

fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting Tribuna");

    let state = match AppState::load() {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(state)) {
        tracing::error!("Server stopped: {}", e);
        std::process::exit(1);
    }
}
