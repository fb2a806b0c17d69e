//! HTTP plumbing shared by master and slave routers
//!
//! Bodies are decoded from raw bytes regardless of `Content-Type`, so any
//! client that sends JSON works. Undecodable bodies become
//! [`Error::MalformedRequest`]. A wrong verb on a known path answers 405 with
//! a message instead of axum's empty default.

use crate::common::{request_tracing_middleware, Error, Result};
use crate::store::{MutationRequest, Record, TableDescription, TableStore};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    middleware,
    routing::{get, MethodRouter},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;

/// Decode a JSON body into `T`
pub fn decode_json<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| Error::MalformedRequest(e.to_string()))
}

/// Decode a mutation request that must name a database (and, when
/// `needs_table`, a table).
///
/// Absent name fields decode as `""`, so an empty name counts as missing and
/// is rejected with 400. This deliberately refuses an explicit `""` too,
/// rather than creating a database or table with an empty name.
pub fn decode_request(body: &Bytes, needs_table: bool) -> Result<MutationRequest> {
    let req: MutationRequest = decode_json(body)?;
    if req.database.is_empty() {
        return Err(Error::MalformedRequest("missing database name".into()));
    }
    if needs_table && req.table.is_empty() {
        return Err(Error::MalformedRequest("missing table name".into()));
    }
    Ok(req)
}

/// `?database=..&table=..&limit=..`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TableQuery {
    pub database: String,
    pub table: String,
    pub limit: Option<String>,
}

/// `?database=..`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseQuery {
    pub database: String,
}

/// A limit only counts when it is a positive integer; anything else means
/// "no limit".
pub fn parse_limit(raw: Option<&str>) -> Option<usize> {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|n| *n > 0)
        .and_then(|n| usize::try_from(n).ok())
}

async fn only_post() -> Error {
    Error::MethodNotAllowed("Only POST allowed".into())
}

async fn only_get() -> Error {
    Error::MethodNotAllowed("Only GET allowed".into())
}

/// POST route answering 405 for every other verb
pub fn post_only<H, T, S>(handler: H) -> MethodRouter<S>
where
    H: axum::handler::Handler<T, S>,
    T: 'static,
    S: Clone + Send + Sync + 'static,
{
    axum::routing::post(handler).fallback(only_post)
}

/// GET route answering 405 for every other verb
pub fn get_only<H, T, S>(handler: H) -> MethodRouter<S>
where
    H: axum::handler::Handler<T, S>,
    T: 'static,
    S: Clone + Send + Sync + 'static,
{
    get(handler).fallback(only_get)
}

// === Reads served by every node ===

pub async fn select(
    State(store): State<Arc<TableStore>>,
    Query(query): Query<TableQuery>,
) -> Result<Json<Vec<Record>>> {
    let limit = parse_limit(query.limit.as_deref());
    Ok(Json(store.select(&query.database, &query.table, limit)?))
}

pub async fn list_databases(State(store): State<Arc<TableStore>>) -> Json<Vec<String>> {
    Json(store.list_databases())
}

pub async fn list_tables(
    State(store): State<Arc<TableStore>>,
    Query(query): Query<DatabaseQuery>,
) -> Result<Json<Vec<String>>> {
    Ok(Json(store.list_tables(&query.database)?))
}

pub async fn describe_table(
    State(store): State<Arc<TableStore>>,
    Query(query): Query<TableQuery>,
) -> Result<Json<TableDescription>> {
    Ok(Json(store.describe_table(&query.database, &query.table)?))
}

/// Read-only routes over the node's own store
pub fn read_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    Arc<TableStore>: axum::extract::FromRef<S>,
{
    Router::new()
        .route("/select", get_only(select))
        .route("/list_databases", get_only(list_databases))
        .route("/list_tables", get_only(list_tables))
        .route("/describe_table", get_only(describe_table))
}

/// Request tracing and body size limit, applied to a finished router
pub fn with_common_layers(router: Router, max_body_bytes: usize) -> Router {
    router
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(middleware::from_fn(request_tracing_middleware))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_limit() {
        assert_eq!(parse_limit(Some("3")), Some(3));
        assert_eq!(parse_limit(Some(" 7 ")), Some(7));
        assert_eq!(parse_limit(Some("0")), None);
        assert_eq!(parse_limit(Some("-2")), None);
        assert_eq!(parse_limit(Some("abc")), None);
        assert_eq!(parse_limit(Some("")), None);
        assert_eq!(parse_limit(None), None);
    }

    #[test]
    fn test_decode_request_requires_names() {
        let body = Bytes::from_static(br#"{"table":"orders"}"#);
        assert!(matches!(
            decode_request(&body, true),
            Err(Error::MalformedRequest(_))
        ));

        let body = Bytes::from_static(br#"{"database":"shop"}"#);
        assert!(decode_request(&body, false).is_ok());
        assert!(decode_request(&body, true).is_err());

        let body = Bytes::from_static(br#"{"database":"","table":"orders"}"#);
        assert!(matches!(
            decode_request(&body, true),
            Err(Error::MalformedRequest(_))
        ));

        let body = Bytes::from_static(b"not json");
        assert!(matches!(
            decode_request(&body, false),
            Err(Error::MalformedRequest(_))
        ));
    }
}
