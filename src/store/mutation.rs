//! Mutation requests as they travel over HTTP, and the typed mutations the
//! store applies and the durability layer records.

use crate::store::table::{Conditions, Patch, Record};
use serde::{Deserialize, Deserializer, Serialize};

/// Wire-level description of an operation.
///
/// Every field is optional on the wire; `null` is read as empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MutationRequest {
    #[serde(default, deserialize_with = "null_as_default")]
    pub database: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub table: String,

    /// Declared columns (create table, and lazy creation on slaves)
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub columns: Vec<String>,

    /// Record to insert
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Record::is_empty"
    )]
    pub record: Record,

    /// Patch applied by update
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Patch::is_empty"
    )]
    pub update_data: Patch,

    /// Conjunction of exact-match conditions for update/delete
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Conditions::is_empty"
    )]
    pub conditions: Conditions,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl MutationRequest {
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
            ..Default::default()
        }
    }

    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_record(mut self, record: Record) -> Self {
        self.record = record;
        self
    }

    pub fn with_update(mut self, update_data: Patch) -> Self {
        self.update_data = update_data;
        self
    }

    pub fn with_conditions(mut self, conditions: Conditions) -> Self {
        self.conditions = conditions;
        self
    }
}

/// A committed change to the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Mutation {
    CreateDatabase {
        database: String,
    },
    CreateTable {
        database: String,
        table: String,
        columns: Vec<String>,
    },
    /// Create the database and/or table only if missing
    EnsureTable {
        database: String,
        table: String,
        columns: Vec<String>,
    },
    Insert {
        database: String,
        table: String,
        record: Record,
    },
    Update {
        database: String,
        table: String,
        conditions: Conditions,
        patch: Patch,
    },
    Delete {
        database: String,
        table: String,
        conditions: Conditions,
    },
    DropTable {
        database: String,
        table: String,
    },
    DropDatabase {
        database: String,
    },
}

impl Mutation {
    pub fn insert(req: &MutationRequest) -> Self {
        Mutation::Insert {
            database: req.database.clone(),
            table: req.table.clone(),
            record: req.record.clone(),
        }
    }

    pub fn update(req: &MutationRequest) -> Self {
        Mutation::Update {
            database: req.database.clone(),
            table: req.table.clone(),
            conditions: req.conditions.clone(),
            patch: req.update_data.clone(),
        }
    }

    pub fn delete(req: &MutationRequest) -> Self {
        Mutation::Delete {
            database: req.database.clone(),
            table: req.table.clone(),
            conditions: req.conditions.clone(),
        }
    }

    pub fn ensure_table(req: &MutationRequest) -> Self {
        Mutation::EnsureTable {
            database: req.database.clone(),
            table: req.table.clone(),
            columns: req.columns.clone(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mutation::CreateDatabase { .. } => "create_database",
            Mutation::CreateTable { .. } => "create_table",
            Mutation::EnsureTable { .. } => "ensure_table",
            Mutation::Insert { .. } => "insert",
            Mutation::Update { .. } => "update",
            Mutation::Delete { .. } => "delete",
            Mutation::DropTable { .. } => "drop_table",
            Mutation::DropDatabase { .. } => "drop_database",
        }
    }
}
