//! Plain serializable images of the store, used by snapshots

use crate::store::table::{Record, SchemaOrigin};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Every database, keyed by name
pub type StoreImage = BTreeMap<String, DatabaseImage>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseImage {
    pub name: String,
    #[serde(default)]
    pub tables: BTreeMap<String, TableImage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableImage {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub origin: SchemaOrigin,
    #[serde(default)]
    pub records: Vec<Record>,
}
