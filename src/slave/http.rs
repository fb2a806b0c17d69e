//! HTTP API for a slave

use crate::api::{decode_request, get_only, post_only, read_routes, with_common_layers, TableQuery};
use crate::common::Result;
use crate::slave::apply::ReplicaApplier;
use crate::store::{Record, TableStore};
use axum::{
    body::Bytes,
    extract::{FromRef, Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

#[derive(Clone)]
pub struct SlaveState {
    pub applier: ReplicaApplier,
    pub node_id: String,
}

impl FromRef<SlaveState> for Arc<TableStore> {
    fn from_ref(state: &SlaveState) -> Self {
        state.applier.store().clone()
    }
}

pub fn create_router(state: SlaveState, max_body_bytes: usize) -> Router {
    let router = Router::new()
        .route("/replicate_insert", post_only(replicate_insert))
        .route("/replicate_update", post_only(replicate_update))
        .route("/replicate_delete", post_only(replicate_delete))
        .route("/replicate_get", get_only(replicate_get))
        .route("/health", get(health))
        .merge(read_routes())
        .with_state(state);

    with_common_layers(router, max_body_bytes)
}

async fn replicate_insert(State(state): State<SlaveState>, body: Bytes) -> Result<&'static str> {
    let req = decode_request(&body, true)?;
    state.applier.insert(&req)?;
    Ok("Record inserted successfully on slave")
}

async fn replicate_update(State(state): State<SlaveState>, body: Bytes) -> Result<String> {
    let req = decode_request(&body, true)?;
    let updated = state.applier.update(&req)?;
    Ok(format!("Updated {} records in slave.", updated))
}

async fn replicate_delete(State(state): State<SlaveState>, body: Bytes) -> Result<String> {
    let req = decode_request(&body, true)?;
    let deleted = state.applier.delete(&req)?;
    Ok(format!("Deleted {} records in slave.", deleted))
}

/// Full contents of one table, for comparing against the master
async fn replicate_get(
    State(state): State<SlaveState>,
    Query(query): Query<TableQuery>,
) -> Result<Json<Vec<Record>>> {
    let records = state
        .applier
        .store()
        .select(&query.database, &query.table, None)?;
    Ok(Json(records))
}

async fn health(State(state): State<SlaveState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "role": "slave",
        "node_id": state.node_id,
        "databases": state.applier.store().list_databases().len(),
        "durability": state.applier.persistence().describe(),
    }))
}
