//! Master server

use crate::common::{shutdown_signal, MasterConfig, Result};
use crate::master::http::{create_router, MasterState};
use crate::master::replication::ReplicationClient;
use crate::persistence;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct MasterServer {
    config: MasterConfig,
    node_id: String,
}

impl MasterServer {
    pub fn new(config: MasterConfig, node_id: String) -> Self {
        Self { config, node_id }
    }

    /// Restore the store, connect the replication client and build the router
    pub fn build(&self) -> Result<axum::Router> {
        let (store, persistence) =
            persistence::open_store(self.config.durability, &self.config.data_path)?;
        let replication = ReplicationClient::new(&self.config.slaves, &self.config.replication)?;

        let state = MasterState {
            store,
            persistence,
            replication: Arc::new(replication),
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
        tracing::info!("Starting master: {}", self.node_id);
        tracing::info!("  HTTP API: {}", listener.local_addr()?);
        tracing::info!("  Data: {} ({:?})", self.config.data_path.display(), self.config.durability);
        tracing::info!("  Slaves: {:?}", self.config.slaves);
        tracing::info!("  Replication: {:?}", self.config.replication.policy());

        let router = self.build()?;

        tracing::info!("✓ Master ready");
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Master stopped");
        Ok(())
    }
}
