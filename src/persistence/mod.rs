//! Durability strategies
//!
//! A node restores its store once at startup and records every committed
//! mutation afterwards. Recording happens after the in-memory apply; a failed
//! write is logged and the in-memory change stands.
//!
//! Writers go through [`Persistence::commit`], which runs the apply and the
//! record as one step. The recorded order is therefore the applied order,
//! which the mutation log relies on for replay.

pub mod log;
pub mod snapshot;

pub use log::MutationLog;
pub use snapshot::SnapshotFile;

use crate::common::{DurabilityKind, Result};
use crate::store::{Mutation, TableStore};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

pub trait Durability: Send + Sync {
    /// Load durable state into `store`. Unreadable state is reported through
    /// logs and leaves the store empty rather than failing startup.
    fn restore(&self, store: &TableStore) -> Result<()>;

    /// Record mutations that were just applied to `store`.
    fn persist(&self, store: &TableStore, mutations: &[Mutation]) -> Result<()>;

    /// Short label for logs
    fn describe(&self) -> String;

    /// `persist`, logging instead of returning failures
    fn persist_or_warn(&self, store: &TableStore, mutations: &[Mutation]) {
        if let Err(e) = self.persist(store, mutations) {
            tracing::warn!(
                durability = %self.describe(),
                mutations = mutations.len(),
                "failed to persist committed mutation: {}",
                e
            );
        }
    }
}

/// A durability strategy plus the lock that pairs each apply with its record
pub struct Persistence {
    durability: Arc<dyn Durability>,
    commit: Mutex<()>,
}

impl Persistence {
    pub fn new(durability: Arc<dyn Durability>) -> Self {
        Self {
            durability,
            commit: Mutex::new(()),
        }
    }

    pub fn durability(&self) -> &Arc<dyn Durability> {
        &self.durability
    }

    pub fn describe(&self) -> String {
        self.durability.describe()
    }

    /// Run `apply` and persist the mutations it reports, with no other
    /// commit in between. `apply` returns its output and the mutations that
    /// actually changed the store; an empty list records nothing, and an
    /// error records nothing and is returned as-is.
    ///
    /// Lock order is commit lock, then catalog or table locks. Nothing takes
    /// the commit lock while holding a store lock.
    pub fn commit<R, F>(&self, store: &TableStore, apply: F) -> Result<R>
    where
        F: FnOnce() -> Result<(R, Vec<Mutation>)>,
    {
        let _guard = self.commit.lock().unwrap_or_else(PoisonError::into_inner);
        let (output, mutations) = apply()?;
        if !mutations.is_empty() {
            self.durability.persist_or_warn(store, &mutations);
        }
        Ok(output)
    }
}

/// Build the strategy selected in config
pub fn open(kind: DurabilityKind, path: &Path) -> Result<Arc<dyn Durability>> {
    Ok(match kind {
        DurabilityKind::Snapshot => Arc::new(SnapshotFile::new(path)),
        DurabilityKind::Log => Arc::new(MutationLog::open(path)?),
    })
}

/// Open the configured strategy and load its state into a fresh store
pub fn open_store(kind: DurabilityKind, path: &Path) -> Result<(Arc<TableStore>, Arc<Persistence>)> {
    let durability = open(kind, path)?;
    let store = Arc::new(TableStore::new());
    durability.restore(&store)?;
    tracing::info!(
        durability = %durability.describe(),
        databases = store.list_databases().len(),
        "Store restored"
    );
    Ok((store, Arc::new(Persistence::new(durability))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MutationRequest, Record};
    use tempfile::tempdir;

    fn rec(pairs: &[(&str, &str)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_failed_apply_records_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mutations.log");
        let store = TableStore::new();
        let persistence = Persistence::new(Arc::new(MutationLog::open(&path).unwrap()));

        let res = persistence.commit(&store, || {
            store.insert("shop", "orders", rec(&[("id", "1")]))?;
            Ok(((), vec![]))
        });
        assert!(res.unwrap_err().is_not_found());

        let mut count = 0;
        MutationLog::replay(&path, |_| {
            count += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_concurrent_writers_replay_to_live_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mutations.log");
        let store = Arc::new(TableStore::new());
        let persistence = Arc::new(Persistence::new(Arc::new(MutationLog::open(&path).unwrap())));

        persistence
            .commit(&store, || {
                store.create_database("shop")?;
                store.create_table("shop", "orders", vec!["id".into(), "status".into()])?;
                Ok((
                    (),
                    vec![
                        Mutation::CreateDatabase {
                            database: "shop".into(),
                        },
                        Mutation::CreateTable {
                            database: "shop".into(),
                            table: "orders".into(),
                            columns: vec!["id".into(), "status".into()],
                        },
                    ],
                ))
            })
            .unwrap();

        // one thread inserts and ships, the other deletes whatever is shipped;
        // the outcome depends on interleaving, the replay must not
        let shipper = {
            let (store, persistence) = (store.clone(), persistence.clone());
            std::thread::spawn(move || {
                for i in 0..200 {
                    let id = i.to_string();
                    let insert = MutationRequest::new("shop", "orders")
                        .with_record(rec(&[("id", id.as_str()), ("status", "new")]));
                    persistence
                        .commit(&store, || {
                            store.table("shop", "orders")?.append(insert.record.clone());
                            Ok(((), vec![Mutation::insert(&insert)]))
                        })
                        .unwrap();

                    let ship = MutationRequest::new("shop", "orders")
                        .with_conditions(rec(&[("id", id.as_str())]))
                        .with_update(rec(&[("status", "shipped")]));
                    persistence
                        .commit(&store, || {
                            let table = store.table("shop", "orders")?;
                            table.update_where(&ship.conditions, &ship.update_data);
                            Ok(((), vec![Mutation::update(&ship)]))
                        })
                        .unwrap();
                }
            })
        };
        let cleaner = {
            let (store, persistence) = (store.clone(), persistence.clone());
            std::thread::spawn(move || {
                let purge = MutationRequest::new("shop", "orders")
                    .with_conditions(rec(&[("status", "shipped")]));
                for _ in 0..200 {
                    persistence
                        .commit(&store, || {
                            store.table("shop", "orders")?.delete_where(&purge.conditions);
                            Ok(((), vec![Mutation::delete(&purge)]))
                        })
                        .unwrap();
                }
            })
        };
        shipper.join().unwrap();
        cleaner.join().unwrap();

        let replayed = TableStore::new();
        MutationLog::open(&path).unwrap().restore(&replayed).unwrap();
        assert_eq!(replayed.image(), store.image());
    }
}
