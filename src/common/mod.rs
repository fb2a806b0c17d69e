//! Common utilities and types shared across minitable

pub mod config;
pub mod error;
pub mod tracing_middleware;

pub use config::{
    Config, DurabilityKind, MasterConfig, ReplicationConfig, ReplicationMode, ReplicationPolicy,
    SlaveConfig,
};
pub use error::{Error, ObjectKind, Result};
pub use tracing_middleware::{request_tracing_middleware, REQUEST_ID_HEADER};

/// Install the global tracing subscriber: `RUST_LOG` wins, `default_level` otherwise.
pub fn init_tracing(default_level: &str) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Resolves when the process receives Ctrl-C
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
