use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bingo_presence::{
    account::AccountConfig,
    identity::IdentityConfig,
    state::{AppState, RegistryConfig},
};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bingo_presence=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting bingo presence service...");

    let identity_config = IdentityConfig::from_env();
    let account_config = AccountConfig::from_env();
    let registry_config = RegistryConfig::from_env();

    let state = Arc::new(
        AppState::new(
            identity_config.build_verifier(),
            account_config.build_lookup(identity_config.timeout),
        )
        .with_registry_config(registry_config)
        .with_auth_timeout(identity_config.timeout),
    );

    let app = bingo_presence::router(state);

    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or_else(|| DEFAULT_BIND_ADDR.parse().unwrap());
    tracing::info!("Listening on ws://{}/ws", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Received shutdown signal, stopping...");
}
