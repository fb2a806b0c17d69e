//! Master → slave replication
//!
//! After a local insert/update/delete commits, the master forwards the same
//! request to every slave. Each slave is one base URL; the three replicate
//! routes are derived from it.
//!
//! Deliveries are independent of each other. Nothing orders them across
//! slaves or across successive mutations, and a failed delivery is logged
//! and otherwise dropped. The policy only decides whether the writer waits
//! and how many attempts a delivery gets.

use crate::common::{Error, ReplicationConfig, ReplicationPolicy, Result};
use crate::store::MutationRequest;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationOp {
    Insert,
    Update,
    Delete,
}

impl ReplicationOp {
    pub fn route(self) -> &'static str {
        match self {
            ReplicationOp::Insert => "replicate_insert",
            ReplicationOp::Update => "replicate_update",
            ReplicationOp::Delete => "replicate_delete",
        }
    }
}

/// Base URL of one slave, e.g. `http://localhost:8001`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlaveEndpoint {
    base: String,
}

impl SlaveEndpoint {
    pub fn parse(base: &str) -> Result<Self> {
        let url = reqwest::Url::parse(base)
            .map_err(|e| Error::InvalidConfig(format!("invalid slave URL {:?}: {}", base, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::InvalidConfig(format!(
                "slave URL {:?} must use http or https",
                base
            )));
        }
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn url_for(&self, op: ReplicationOp) -> String {
        format!("{}/{}", self.base, op.route())
    }
}

/// Outcome of deliveries that were awaited
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplicationReport {
    pub delivered: usize,
    pub failed: usize,
}

impl ReplicationReport {
    fn record(&mut self, ok: bool) {
        if ok {
            self.delivered += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// What `replicate` did with the deliveries
#[derive(Debug)]
pub enum Dispatch {
    /// Deliveries running detached; each handle yields whether it succeeded
    Background(Vec<JoinHandle<bool>>),
    /// Every delivery already finished
    Acknowledged(ReplicationReport),
}

impl Dispatch {
    /// Wait for detached deliveries. The master never does this; it exists
    /// for callers that want to observe the outcome.
    pub async fn settle(self) -> ReplicationReport {
        match self {
            Dispatch::Acknowledged(report) => report,
            Dispatch::Background(handles) => {
                let mut report = ReplicationReport::default();
                for ok in join_all(handles).await {
                    report.record(matches!(ok, Ok(true)));
                }
                report
            }
        }
    }
}

pub struct ReplicationClient {
    http: reqwest::Client,
    slaves: Vec<SlaveEndpoint>,
    policy: ReplicationPolicy,
}

impl ReplicationClient {
    pub fn new(slaves: &[String], config: &ReplicationConfig) -> Result<Self> {
        Self::with_policy(slaves, config.policy(), config.timeout())
    }

    pub fn with_policy(
        slaves: &[String],
        policy: ReplicationPolicy,
        timeout: Duration,
    ) -> Result<Self> {
        let slaves = slaves
            .iter()
            .map(|s| SlaveEndpoint::parse(s))
            .collect::<Result<Vec<_>>>()?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            slaves,
            policy,
        })
    }

    pub fn slaves(&self) -> &[SlaveEndpoint] {
        &self.slaves
    }

    pub fn policy(&self) -> ReplicationPolicy {
        self.policy
    }

    /// Forward `req` to every slave according to the policy
    pub async fn replicate(&self, op: ReplicationOp, req: MutationRequest) -> Dispatch {
        let req = Arc::new(req);
        match self.policy {
            ReplicationPolicy::FireAndForget => self.spawn_all(op, req, 1, Duration::ZERO),
            ReplicationPolicy::BoundedRetry {
                max_attempts,
                backoff,
            } => self.spawn_all(op, req, max_attempts, backoff),
            ReplicationPolicy::SyncAck => {
                let deliveries = self.slaves.iter().map(|slave| {
                    deliver_logged(self.http.clone(), slave.clone(), op, req.clone(), 1, Duration::ZERO)
                });
                let mut report = ReplicationReport::default();
                for ok in join_all(deliveries).await {
                    report.record(ok);
                }
                tracing::debug!(
                    op = op.route(),
                    delivered = report.delivered,
                    failed = report.failed,
                    "replication acknowledged"
                );
                Dispatch::Acknowledged(report)
            }
        }
    }

    fn spawn_all(
        &self,
        op: ReplicationOp,
        req: Arc<MutationRequest>,
        attempts: u32,
        backoff: Duration,
    ) -> Dispatch {
        let handles = self
            .slaves
            .iter()
            .map(|slave| {
                tokio::spawn(deliver_logged(
                    self.http.clone(),
                    slave.clone(),
                    op,
                    req.clone(),
                    attempts,
                    backoff,
                ))
            })
            .collect();
        Dispatch::Background(handles)
    }
}

/// One POST of `req` to the slave's route for `op`
pub async fn deliver(
    http: &reqwest::Client,
    slave: &SlaveEndpoint,
    op: ReplicationOp,
    req: &MutationRequest,
) -> Result<()> {
    let url = slave.url_for(op);
    let failure = |reason: String| Error::Replication {
        endpoint: url.clone(),
        reason,
    };

    let resp = http
        .post(&url)
        .json(req)
        .send()
        .await
        .map_err(|e| failure(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(failure(format!("status {}: {}", status, body.trim())));
    }
    Ok(())
}

async fn deliver_logged(
    http: reqwest::Client,
    slave: SlaveEndpoint,
    op: ReplicationOp,
    req: Arc<MutationRequest>,
    attempts: u32,
    backoff: Duration,
) -> bool {
    let attempts = attempts.max(1);
    for attempt in 1..=attempts {
        match deliver(&http, &slave, op, &req).await {
            Ok(()) => {
                tracing::debug!(
                    slave = slave.base(),
                    op = op.route(),
                    attempt,
                    "replicated to slave"
                );
                return true;
            }
            Err(e) if attempt < attempts => {
                tracing::debug!(slave = slave.base(), attempt, "replication attempt failed: {}", e);
                tokio::time::sleep(backoff).await;
            }
            Err(e) => {
                tracing::warn!(
                    slave = slave.base(),
                    op = op.route(),
                    database = %req.database,
                    table = %req.table,
                    attempts,
                    "replication failed: {}",
                    e
                );
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routes_derive_from_one_base() {
        let slave = SlaveEndpoint::parse("http://localhost:8001/").unwrap();
        assert_eq!(slave.base(), "http://localhost:8001");
        assert_eq!(
            slave.url_for(ReplicationOp::Insert),
            "http://localhost:8001/replicate_insert"
        );
        assert_eq!(
            slave.url_for(ReplicationOp::Update),
            "http://localhost:8001/replicate_update"
        );
        assert_eq!(
            slave.url_for(ReplicationOp::Delete),
            "http://localhost:8001/replicate_delete"
        );
    }

    #[test]
    fn test_rejects_bad_endpoints() {
        assert!(SlaveEndpoint::parse("localhost:8001").is_err());
        assert!(SlaveEndpoint::parse("ftp://localhost:8001").is_err());
        assert!(SlaveEndpoint::parse("not a url").is_err());
    }

    #[tokio::test]
    async fn test_no_slaves_is_a_no_op() {
        for policy in [
            ReplicationPolicy::FireAndForget,
            ReplicationPolicy::SyncAck,
            ReplicationPolicy::BoundedRetry {
                max_attempts: 2,
                backoff: Duration::from_millis(1),
            },
        ] {
            let client = ReplicationClient::with_policy(&[], policy, Duration::from_secs(1)).unwrap();
            let report = client
                .replicate(ReplicationOp::Insert, MutationRequest::new("shop", "orders"))
                .await
                .settle()
                .await;
            assert_eq!(report, ReplicationReport::default());
        }
    }

    #[tokio::test]
    async fn test_unreachable_slave_is_reported_not_raised() {
        // port 9 (discard) on localhost is closed in test environments
        let slaves = vec!["http://127.0.0.1:9".to_string()];
        let client = ReplicationClient::with_policy(
            &slaves,
            ReplicationPolicy::BoundedRetry {
                max_attempts: 2,
                backoff: Duration::from_millis(5),
            },
            Duration::from_millis(500),
        )
        .unwrap();

        let dispatch = client
            .replicate(ReplicationOp::Delete, MutationRequest::new("shop", "orders"))
            .await;
        assert!(matches!(dispatch, Dispatch::Background(ref h) if h.len() == 1));
        let report = dispatch.settle().await;
        assert_eq!(report.delivered, 0);
        assert_eq!(report.failed, 1);
    }
}
