//! Slave server

use crate::common::{shutdown_signal, Result, SlaveConfig};
use crate::persistence;
use crate::slave::apply::ReplicaApplier;
use crate::slave::http::{create_router, SlaveState};
use tokio::net::TcpListener;

pub struct SlaveServer {
    config: SlaveConfig,
    node_id: String,
}

impl SlaveServer {
    pub fn new(config: SlaveConfig, node_id: String) -> Self {
        Self { config, node_id }
    }

    /// Restore the store and build the router
    pub fn build(&self) -> Result<axum::Router> {
        let (store, persistence) =
            persistence::open_store(self.config.durability, &self.config.data_path)?;
        let state = SlaveState {
            applier: ReplicaApplier::new(store, persistence),
            node_id: self.node_id.clone(),
        };
        Ok(create_router(state, self.config.max_body_bytes))
    }

    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.run(listener).await
    }

    /// Serve on an already bound listener until Ctrl-C
    pub async fn run(self, listener: TcpListener) -> Result<()> {
        tracing::info!("Starting slave: {}", self.node_id);
        tracing::info!("  HTTP API: {}", listener.local_addr()?);
        tracing::info!(
            "  Data: {} ({:?})",
            self.config.data_path.display(),
            self.config.durability
        );

        let router = self.build()?;

        tracing::info!("✓ Slave ready");
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Slave stopped");
        Ok(())
    }
}
