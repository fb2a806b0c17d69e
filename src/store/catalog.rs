//! Process-wide table store
//!
//! Two lock levels:
//! - the catalog lock guards the database → table mapping (create, drop,
//!   list, lookup);
//! - each table's own lock guards its records.
//!
//! The catalog lock is held only long enough to resolve an `Arc<Table>` and is
//! released before the table lock is taken. The two are never held together,
//! so there is no lock ordering to get wrong, and a concurrent drop can only
//! detach a table, never invalidate a handle already resolved.

use crate::common::{Error, ObjectKind, Result};
use crate::store::image::{DatabaseImage, StoreImage};
use crate::store::mutation::Mutation;
use crate::store::table::{Conditions, Patch, Record, SchemaOrigin, Table};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Database {
    tables: BTreeMap<String, Arc<Table>>,
}

/// Declared shape of a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDescription {
    pub columns: Vec<String>,
    pub origin: SchemaOrigin,
}

/// Result of an ensure-exists-or-create lookup
#[derive(Debug, Clone)]
pub struct Ensured {
    pub table: Arc<Table>,
    pub created_database: bool,
    pub created_table: bool,
}

impl Ensured {
    pub fn created_anything(&self) -> bool {
        self.created_database || self.created_table
    }
}

#[derive(Debug, Default)]
pub struct TableStore {
    databases: Mutex<BTreeMap<String, Database>>,
}

impl TableStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn catalog(&self) -> MutexGuard<'_, BTreeMap<String, Database>> {
        self.databases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // === Structure ===

    pub fn create_database(&self, name: &str) -> Result<()> {
        let mut catalog = self.catalog();
        if catalog.contains_key(name) {
            return Err(Error::already_exists(ObjectKind::Database, name));
        }
        catalog.insert(name.to_string(), Database::default());
        Ok(())
    }

    pub fn create_table(&self, database: &str, name: &str, columns: Vec<String>) -> Result<()> {
        let mut catalog = self.catalog();
        let db = catalog
            .get_mut(database)
            .ok_or_else(|| Error::DatabaseNotFound(database.to_string()))?;
        if db.tables.contains_key(name) {
            return Err(Error::already_exists(ObjectKind::Table, name));
        }
        db.tables.insert(
            name.to_string(),
            Arc::new(Table::new(name, columns, SchemaOrigin::Declared)),
        );
        Ok(())
    }

    /// Resolve the named table, creating the database and table when missing.
    /// Tables created here carry [`SchemaOrigin::Inferred`] and take `columns`
    /// as their declared columns; an existing table is returned untouched.
    pub fn ensure_table(&self, database: &str, name: &str, columns: &[String]) -> Ensured {
        let mut catalog = self.catalog();
        let created_database = !catalog.contains_key(database);
        let db = catalog.entry(database.to_string()).or_default();

        let created_table = !db.tables.contains_key(name);
        let table = db
            .tables
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(Table::new(name, columns.to_vec(), SchemaOrigin::Inferred))
            })
            .clone();

        Ensured {
            table,
            created_database,
            created_table,
        }
    }

    /// Remove a table. Missing database or table is a no-op; returns whether
    /// anything was removed.
    pub fn drop_table(&self, database: &str, name: &str) -> bool {
        self.catalog()
            .get_mut(database)
            .and_then(|db| db.tables.remove(name))
            .is_some()
    }

    /// Remove a database and its tables. Missing database is a no-op.
    pub fn drop_database(&self, name: &str) -> bool {
        self.catalog().remove(name).is_some()
    }

    pub fn list_databases(&self) -> Vec<String> {
        self.catalog().keys().cloned().collect()
    }

    pub fn list_tables(&self, database: &str) -> Result<Vec<String>> {
        self.catalog()
            .get(database)
            .map(|db| db.tables.keys().cloned().collect())
            .ok_or_else(|| Error::DatabaseNotFound(database.to_string()))
    }

    pub fn describe_table(&self, database: &str, name: &str) -> Result<TableDescription> {
        let table = self.table(database, name)?;
        Ok(TableDescription {
            columns: table.columns().to_vec(),
            origin: table.origin(),
        })
    }

    /// Resolve a table handle under the catalog lock, then release it.
    pub fn table(&self, database: &str, name: &str) -> Result<Arc<Table>> {
        let catalog = self.catalog();
        let db = catalog
            .get(database)
            .ok_or_else(|| Error::DatabaseNotFound(database.to_string()))?;
        db.tables
            .get(name)
            .cloned()
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    // === Records ===

    pub fn insert(&self, database: &str, table: &str, record: Record) -> Result<()> {
        self.table(database, table)?.append(record);
        Ok(())
    }

    pub fn select(&self, database: &str, table: &str, limit: Option<usize>) -> Result<Vec<Record>> {
        Ok(self.table(database, table)?.records(limit))
    }

    pub fn update(
        &self,
        database: &str,
        table: &str,
        conditions: &Conditions,
        patch: &Patch,
    ) -> Result<usize> {
        Ok(self.table(database, table)?.update_where(conditions, patch))
    }

    pub fn delete(&self, database: &str, table: &str, conditions: &Conditions) -> Result<usize> {
        Ok(self.table(database, table)?.delete_where(conditions))
    }

    /// Apply a recorded mutation. Returns the number of affected records
    /// (or 1/0 for structural changes).
    pub fn apply(&self, mutation: &Mutation) -> Result<usize> {
        match mutation {
            Mutation::CreateDatabase { database } => self.create_database(database).map(|_| 1),
            Mutation::CreateTable {
                database,
                table,
                columns,
            } => self.create_table(database, table, columns.clone()).map(|_| 1),
            Mutation::EnsureTable {
                database,
                table,
                columns,
            } => Ok(usize::from(
                self.ensure_table(database, table, columns).created_table,
            )),
            Mutation::Insert {
                database,
                table,
                record,
            } => self.insert(database, table, record.clone()).map(|_| 1),
            Mutation::Update {
                database,
                table,
                conditions,
                patch,
            } => self.update(database, table, conditions, patch),
            Mutation::Delete {
                database,
                table,
                conditions,
            } => self.delete(database, table, conditions),
            Mutation::DropTable { database, table } => {
                Ok(usize::from(self.drop_table(database, table)))
            }
            Mutation::DropDatabase { database } => Ok(usize::from(self.drop_database(database))),
        }
    }

    // === Images ===

    /// Serializable copy of the whole store. Handles are collected under the
    /// catalog lock, records are copied afterwards one table lock at a time.
    pub fn image(&self) -> StoreImage {
        let handles: Vec<(String, Vec<Arc<Table>>)> = self
            .catalog()
            .iter()
            .map(|(name, db)| (name.clone(), db.tables.values().cloned().collect()))
            .collect();

        handles
            .into_iter()
            .map(|(name, tables)| {
                let tables = tables
                    .iter()
                    .map(|t| (t.name().to_string(), t.image()))
                    .collect();
                (name.clone(), DatabaseImage { name, tables })
            })
            .collect()
    }

    /// Replace the whole store with `image`
    pub fn restore(&self, image: StoreImage) {
        let databases = image
            .into_iter()
            .map(|(name, db)| {
                let tables = db
                    .tables
                    .into_iter()
                    .map(|(table_name, t)| (table_name, Arc::new(Table::from(t))))
                    .collect();
                (name, Database { tables })
            })
            .collect();
        *self.catalog() = databases;
    }
}
