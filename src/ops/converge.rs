//! Compare a table on the master with every slave's copy

use crate::client::TableClient;
use crate::common::Result;
use crate::store::Record;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicaStatus {
    /// Same records in the same order
    InSync,
    /// Reachable but holding different contents
    Diverged { master: usize, slave: usize },
    /// Request failed (unreachable, or table missing on the slave)
    Unavailable(String),
}

#[derive(Debug)]
pub struct ConvergenceReport {
    pub database: String,
    pub table: String,
    pub master_records: usize,
    pub slaves: Vec<(String, ReplicaStatus)>,
}

impl ConvergenceReport {
    pub fn converged(&self) -> bool {
        self.slaves
            .iter()
            .all(|(_, state)| *state == ReplicaStatus::InSync)
    }
}

pub fn compare(master: &[Record], slave: &[Record]) -> ReplicaStatus {
    if master == slave {
        ReplicaStatus::InSync
    } else {
        ReplicaStatus::Diverged {
            master: master.len(),
            slave: slave.len(),
        }
    }
}

/// Fetch the table from the master, then each slave's copy. Failing to read
/// the master is an error; a failing slave is reported in its entry.
pub async fn verify_convergence(
    master: &TableClient,
    slaves: &[TableClient],
    database: &str,
    table: &str,
) -> Result<ConvergenceReport> {
    tracing::info!(database, table, slaves = slaves.len(), "Checking convergence");

    let expected = master.select(database, table, None).await?;
    let mut report = ConvergenceReport {
        database: database.to_string(),
        table: table.to_string(),
        master_records: expected.len(),
        slaves: Vec::with_capacity(slaves.len()),
    };

    for slave in slaves {
        let state = match slave.replicate_get(database, table).await {
            Ok(records) => compare(&expected, &records),
            Err(e) => ReplicaStatus::Unavailable(e.to_string()),
        };
        if state != ReplicaStatus::InSync {
            tracing::warn!(slave = slave.base(), ?state, "slave out of sync");
        }
        report.slaves.push((slave.base().to_string(), state));
    }

    Ok(report)
}
