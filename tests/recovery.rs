//! Recovery tests: restart a node on the same data file

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use minitable::common::{DurabilityKind, MasterConfig};
use minitable::MasterServer;
use serde_json::{json, Value};
use std::path::Path;
use tempfile::TempDir;
use tower::ServiceExt;

fn master(path: &Path, durability: DurabilityKind) -> Router {
    let config = MasterConfig {
        data_path: path.to_path_buf(),
        durability,
        slaves: vec![],
        ..Default::default()
    };
    MasterServer::new(config, "master".into()).build().unwrap()
}

async fn post(router: &Router, uri: &str, body: Value) -> StatusCode {
    let request = Request::post(uri)
        .body(Body::from(body.to_string()))
        .unwrap();
    router.clone().oneshot(request).await.unwrap().status()
}

async fn get(router: &Router, uri: &str) -> Value {
    let request = Request::get(uri).body(Body::empty()).unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn populate(router: &Router) {
    post(router, "/create_database", json!({"database": "shop"})).await;
    post(router, "/create_database", json!({"database": "scratch"})).await;
    post(
        router,
        "/create_table",
        json!({"database": "shop", "table": "orders", "columns": ["id", "status"]}),
    )
    .await;
    for id in ["1", "2", "3"] {
        post(
            router,
            "/insert",
            json!({"database": "shop", "table": "orders", "record": {"id": id, "status": "new"}}),
        )
        .await;
    }
    post(
        router,
        "/update",
        json!({"database": "shop", "table": "orders", "update_data": {"status": "shipped"}, "conditions": {"id": "3"}}),
    )
    .await;
    post(
        router,
        "/delete",
        json!({"database": "shop", "table": "orders", "conditions": {"id": "1"}}),
    )
    .await;
    post(router, "/drop_database", json!({"database": "scratch"})).await;
}

async fn assert_restored(router: &Router) {
    assert_eq!(get(router, "/list_databases").await, json!(["shop"]));
    assert_eq!(
        get(router, "/describe_table?database=shop&table=orders").await,
        json!({"columns": ["id", "status"], "origin": "declared"})
    );
    assert_eq!(
        get(router, "/select?database=shop&table=orders").await,
        json!([{"id": "2", "status": "new"}, {"id": "3", "status": "shipped"}])
    );
}

#[tokio::test]
async fn test_snapshot_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data.json");

    populate(&master(&path, DurabilityKind::Snapshot)).await;
    assert_restored(&master(&path, DurabilityKind::Snapshot)).await;
}

#[tokio::test]
async fn test_log_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data.log");

    {
        let router = master(&path, DurabilityKind::Log);
        populate(&router).await;
    }
    let router = master(&path, DurabilityKind::Log);
    assert_restored(&router).await;

    // writes after a restart land after the replayed ones
    post(
        &router,
        "/insert",
        json!({"database": "shop", "table": "orders", "record": {"id": "4"}}),
    )
    .await;
    drop(router);
    let records = get(
        &master(&path, DurabilityKind::Log),
        "/select?database=shop&table=orders",
    )
    .await;
    assert_eq!(records.as_array().unwrap().len(), 3);
    assert_eq!(records[2]["id"], "4");
}

#[tokio::test]
async fn test_unreadable_snapshot_starts_empty() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data.json");
    std::fs::write(&path, b"{ not json").unwrap();

    let router = master(&path, DurabilityKind::Snapshot);
    assert_eq!(get(&router, "/list_databases").await, json!([]));

    // the next write replaces the broken file
    assert_eq!(
        post(&router, "/create_database", json!({"database": "shop"})).await,
        StatusCode::OK
    );
    let text = std::fs::read_to_string(&path).unwrap();
    let image: Value = serde_json::from_str(&text).unwrap();
    assert!(image.get("shop").is_some());
}
