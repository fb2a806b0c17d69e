//! Applying forwarded mutations on a slave
//!
//! A slave never refuses a replicated write for a missing database or table:
//! both are created on the spot from the forwarded request, tagged as
//! inferred, and recorded in the same commit as the write itself.

use crate::common::Result;
use crate::persistence::Persistence;
use crate::store::{Ensured, Mutation, MutationRequest, Table, TableStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct ReplicaApplier {
    store: Arc<TableStore>,
    persistence: Arc<Persistence>,
}

impl ReplicaApplier {
    pub fn new(store: Arc<TableStore>, persistence: Arc<Persistence>) -> Self {
        Self { store, persistence }
    }

    pub fn store(&self) -> &Arc<TableStore> {
        &self.store
    }

    pub fn persistence(&self) -> &Arc<Persistence> {
        &self.persistence
    }

    pub fn insert(&self, req: &MutationRequest) -> Result<usize> {
        self.apply(req, Mutation::insert(req), |table| {
            table.append(req.record.clone());
            1
        })
    }

    pub fn update(&self, req: &MutationRequest) -> Result<usize> {
        self.apply(req, Mutation::update(req), |table| {
            table.update_where(&req.conditions, &req.update_data)
        })
    }

    pub fn delete(&self, req: &MutationRequest) -> Result<usize> {
        self.apply(req, Mutation::delete(req), |table| {
            table.delete_where(&req.conditions)
        })
    }

    /// Ensure the table, run `write` on it and record both in one commit, so
    /// a lazily created table is always recorded ahead of writes to it.
    fn apply<F>(&self, req: &MutationRequest, mutation: Mutation, write: F) -> Result<usize>
    where
        F: FnOnce(&Table) -> usize,
    {
        self.persistence.commit(&self.store, || {
            let ensured = self.ensure(req);
            let affected = write(&ensured.table);

            let mut mutations = Vec::with_capacity(2);
            if ensured.created_anything() {
                mutations.push(Mutation::ensure_table(req));
            }
            mutations.push(mutation);
            Ok((affected, mutations))
        })
    }

    fn ensure(&self, req: &MutationRequest) -> Ensured {
        let ensured = self
            .store
            .ensure_table(&req.database, &req.table, &req.columns);
        if ensured.created_database {
            tracing::info!(database = %req.database, "database created by replication");
        }
        if ensured.created_table {
            tracing::info!(
                database = %req.database,
                table = %req.table,
                columns = ?req.columns,
                "table created by replication"
            );
        }
        ensured
    }
}
