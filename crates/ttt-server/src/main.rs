//! Relay hub: shared record store and change channel for tic-tac-toe participants.
//!
//! Listens on `SERVER_ADDR` (default `0.0.0.0:8709`, the port `ttt --server`
//! dials by default). Log level comes from `RUST_LOG`.

use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod hub;
mod server;

use server::ServerState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Hub address; clients default to ws://127.0.0.1:8709
    let addr: SocketAddr = std::env::var("SERVER_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8709".into())
        .parse()?;

    info!("Starting tic-tac-toe hub...");

    let state = Arc::new(ServerState::new());

    server::run_server(addr, state).await
}
