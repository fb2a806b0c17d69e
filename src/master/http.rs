//! HTTP API for the master
//!
//! Every write follows the same path: decode the body, apply it to the
//! store and persist it as one commit, then hand insert/update/delete to the
//! replication client. The client is answered once the commit is done;
//! whether it also waits for slaves depends on the replication policy.

use crate::api::{decode_request, post_only, read_routes, with_common_layers};
use crate::common::Result;
use crate::master::replication::{ReplicationClient, ReplicationOp};
use crate::persistence::Persistence;
use crate::store::{Mutation, MutationRequest, Table, TableStore};
use axum::{
    body::Bytes,
    extract::{FromRef, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

#[derive(Clone)]
pub struct MasterState {
    pub store: Arc<TableStore>,
    pub persistence: Arc<Persistence>,
    pub replication: Arc<ReplicationClient>,
    pub node_id: String,
}

impl FromRef<MasterState> for Arc<TableStore> {
    fn from_ref(state: &MasterState) -> Self {
        state.store.clone()
    }
}

impl MasterState {
    /// Forward a committed record mutation to the slaves. Slaves that create
    /// the table lazily take its columns from the forwarded request.
    async fn replicate(&self, op: ReplicationOp, mut req: MutationRequest, table: &Table) {
        if req.columns.is_empty() {
            req.columns = table.columns().to_vec();
        }
        // detached deliveries keep running after the handles are dropped
        let _ = self.replication.replicate(op, req).await;
    }
}

pub fn create_router(state: MasterState, max_body_bytes: usize) -> Router {
    let router = Router::new()
        .route("/create_database", post_only(create_database))
        .route("/create_table", post_only(create_table))
        .route("/insert", post_only(insert))
        .route("/update", post_only(update))
        .route("/delete", post_only(delete))
        .route("/drop_table", post_only(drop_table))
        .route("/drop_database", post_only(drop_database))
        .route("/health", get(health))
        .merge(read_routes())
        .with_state(state);

    with_common_layers(router, max_body_bytes)
}

async fn create_database(State(state): State<MasterState>, body: Bytes) -> Result<&'static str> {
    let req = decode_request(&body, false)?;
    let store = &state.store;
    state.persistence.commit(store, || {
        store.create_database(&req.database)?;
        let mutation = Mutation::CreateDatabase {
            database: req.database.clone(),
        };
        Ok(((), vec![mutation]))
    })?;
    tracing::info!(database = %req.database, "database created");
    Ok("Database created successfully.")
}

async fn create_table(State(state): State<MasterState>, body: Bytes) -> Result<&'static str> {
    let req = decode_request(&body, true)?;
    let store = &state.store;
    state.persistence.commit(store, || {
        store.create_table(&req.database, &req.table, req.columns.clone())?;
        let mutation = Mutation::CreateTable {
            database: req.database.clone(),
            table: req.table.clone(),
            columns: req.columns.clone(),
        };
        Ok(((), vec![mutation]))
    })?;
    tracing::info!(
        database = %req.database,
        table = %req.table,
        columns = req.columns.len(),
        "table created"
    );
    Ok("Table created successfully.")
}

async fn insert(State(state): State<MasterState>, body: Bytes) -> Result<&'static str> {
    let req = decode_request(&body, true)?;
    let store = &state.store;
    let table = state.persistence.commit(store, || {
        let table = store.table(&req.database, &req.table)?;
        table.append(req.record.clone());
        Ok((table, vec![Mutation::insert(&req)]))
    })?;

    state.replicate(ReplicationOp::Insert, req, &table).await;
    Ok("Record inserted successfully.")
}

async fn update(State(state): State<MasterState>, body: Bytes) -> Result<String> {
    let req = decode_request(&body, true)?;
    let store = &state.store;
    let (table, updated) = state.persistence.commit(store, || {
        let table = store.table(&req.database, &req.table)?;
        let updated = table.update_where(&req.conditions, &req.update_data);
        Ok(((table, updated), vec![Mutation::update(&req)]))
    })?;

    state.replicate(ReplicationOp::Update, req, &table).await;
    Ok(format!("Updated {} records.", updated))
}

async fn delete(State(state): State<MasterState>, body: Bytes) -> Result<String> {
    let req = decode_request(&body, true)?;
    let store = &state.store;
    let (table, deleted) = state.persistence.commit(store, || {
        let table = store.table(&req.database, &req.table)?;
        let deleted = table.delete_where(&req.conditions);
        Ok(((table, deleted), vec![Mutation::delete(&req)]))
    })?;

    state.replicate(ReplicationOp::Delete, req, &table).await;
    Ok(format!("Deleted {} records.", deleted))
}

async fn drop_table(State(state): State<MasterState>, body: Bytes) -> Result<String> {
    let req = decode_request(&body, true)?;
    let store = &state.store;
    let dropped = state.persistence.commit(store, || {
        if !store.drop_table(&req.database, &req.table) {
            return Ok((false, vec![]));
        }
        let mutation = Mutation::DropTable {
            database: req.database.clone(),
            table: req.table.clone(),
        };
        Ok((true, vec![mutation]))
    })?;
    if dropped {
        tracing::info!(database = %req.database, table = %req.table, "table dropped");
    }
    Ok(format!("Table {} dropped from {}", req.table, req.database))
}

async fn drop_database(State(state): State<MasterState>, body: Bytes) -> Result<String> {
    let req = decode_request(&body, false)?;
    let store = &state.store;
    let dropped = state.persistence.commit(store, || {
        if !store.drop_database(&req.database) {
            return Ok((false, vec![]));
        }
        let mutation = Mutation::DropDatabase {
            database: req.database.clone(),
        };
        Ok((true, vec![mutation]))
    })?;
    if dropped {
        tracing::info!(database = %req.database, "database dropped");
    }
    Ok(format!("Database {} dropped", req.database))
}

async fn health(State(state): State<MasterState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "role": "master",
        "node_id": state.node_id,
        "databases": state.store.list_databases().len(),
        "slaves": state.replication.slaves().len(),
        "durability": state.persistence.describe(),
    }))
}
