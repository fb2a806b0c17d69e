//! HTTP client for master and slave nodes

use crate::common::{Error, Result};
use crate::store::{MutationRequest, Record};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

/// `describe_table` response as seen by a client
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteTableDescription {
    pub columns: Vec<String>,
    pub origin: String,
}

#[derive(Debug, Clone)]
pub struct TableClient {
    http: reqwest::Client,
    base: String,
}

impl TableClient {
    pub fn new(base: &str) -> Result<Self> {
        Self::with_timeout(base, Duration::from_secs(10))
    }

    pub fn with_timeout(base: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path)
    }

    async fn post(&self, path: &str, req: &MutationRequest) -> Result<String> {
        let resp = self.http.post(self.url(path)).json(req).send().await?;
        text_or_error(resp).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let resp = self.http.get(self.url(path)).query(query).send().await?;
        let body = text_or_error(resp).await?;
        Ok(serde_json::from_str(&body)?)
    }

    // === Writes (master) ===

    pub async fn create_database(&self, database: &str) -> Result<String> {
        self.post("create_database", &MutationRequest::new(database, ""))
            .await
    }

    pub async fn create_table(
        &self,
        database: &str,
        table: &str,
        columns: Vec<String>,
    ) -> Result<String> {
        let req = MutationRequest::new(database, table).with_columns(columns);
        self.post("create_table", &req).await
    }

    pub async fn insert(&self, database: &str, table: &str, record: Record) -> Result<String> {
        let req = MutationRequest::new(database, table).with_record(record);
        self.post("insert", &req).await
    }

    pub async fn update(
        &self,
        database: &str,
        table: &str,
        update_data: Record,
        conditions: Record,
    ) -> Result<String> {
        let req = MutationRequest::new(database, table)
            .with_update(update_data)
            .with_conditions(conditions);
        self.post("update", &req).await
    }

    pub async fn delete(&self, database: &str, table: &str, conditions: Record) -> Result<String> {
        let req = MutationRequest::new(database, table).with_conditions(conditions);
        self.post("delete", &req).await
    }

    pub async fn drop_table(&self, database: &str, table: &str) -> Result<String> {
        self.post("drop_table", &MutationRequest::new(database, table))
            .await
    }

    pub async fn drop_database(&self, database: &str) -> Result<String> {
        self.post("drop_database", &MutationRequest::new(database, ""))
            .await
    }

    // === Reads (any node) ===

    pub async fn select(
        &self,
        database: &str,
        table: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Record>> {
        let limit = limit.map(|l| l.to_string());
        let mut query = vec![("database", database), ("table", table)];
        if let Some(limit) = limit.as_deref() {
            query.push(("limit", limit));
        }
        self.get("select", &query).await
    }

    pub async fn list_databases(&self) -> Result<Vec<String>> {
        self.get("list_databases", &[]).await
    }

    pub async fn list_tables(&self, database: &str) -> Result<Vec<String>> {
        self.get("list_tables", &[("database", database)]).await
    }

    pub async fn describe_table(
        &self,
        database: &str,
        table: &str,
    ) -> Result<RemoteTableDescription> {
        self.get("describe_table", &[("database", database), ("table", table)])
            .await
    }

    /// Slave only: the full contents of a table
    pub async fn replicate_get(&self, database: &str, table: &str) -> Result<Vec<Record>> {
        self.get("replicate_get", &[("database", database), ("table", table)])
            .await
    }

    pub async fn health(&self) -> Result<serde_json::Value> {
        self.get("health", &[]).await
    }
}

async fn text_or_error(resp: reqwest::Response) -> Result<String> {
    let status = resp.status();
    let body = resp.text().await?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(Error::Http(format!("{}: {}", status, body.trim())))
    }
}
