//! Configuration for minitable nodes

use crate::common::Result;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable pointing at the TOML config file
pub const CONFIG_PATH_ENV: &str = "MINITABLE_CONFIG";

/// Config file used when `MINITABLE_CONFIG` is unset
pub const DEFAULT_CONFIG_PATH: &str = "minitable.toml";

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Node ID (used in logs and health output)
    pub node_id: String,

    /// Master-specific config
    pub master: MasterConfig,

    /// Slave-specific config
    pub slave: SlaveConfig,

    /// Logging level
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id: "node-1".to_string(),
            master: MasterConfig::default(),
            slave: SlaveConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load config from the file named by `MINITABLE_CONFIG` (optional) layered with
    /// `MINITABLE__*` environment variables.
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(&path)
    }

    pub fn load_from(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("MINITABLE")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("master.slaves")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

/// How committed mutations reach disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurabilityKind {
    /// Rewrite the whole store after every mutation
    Snapshot,
    /// Append each mutation to a checksummed log
    Log,
}

/// Replication mode as written in config files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicationMode {
    FireAndForget,
    SyncAck,
    BoundedRetry,
}

/// Replication behaviour of the master
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationPolicy {
    /// One independent delivery task per slave, no retry, no acknowledgment
    FireAndForget,
    /// Wait for every delivery to finish before answering the writer
    SyncAck,
    /// Background deliveries retried up to `max_attempts` with a fixed backoff
    BoundedRetry { max_attempts: u32, backoff: Duration },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    pub mode: ReplicationMode,

    /// Total attempts per delivery in `bounded_retry` mode
    pub max_attempts: u32,

    /// Pause between attempts in `bounded_retry` mode
    pub backoff_ms: u64,

    /// Timeout for a single outbound delivery
    pub timeout_ms: u64,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            mode: ReplicationMode::FireAndForget,
            max_attempts: 3,
            backoff_ms: 200,
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl ReplicationConfig {
    pub fn policy(&self) -> ReplicationPolicy {
        match self.mode {
            ReplicationMode::FireAndForget => ReplicationPolicy::FireAndForget,
            ReplicationMode::SyncAck => ReplicationPolicy::SyncAck,
            ReplicationMode::BoundedRetry => ReplicationPolicy::BoundedRetry {
                max_attempts: self.max_attempts.max(1),
                backoff: Duration::from_millis(self.backoff_ms),
            },
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_max_body_bytes() -> usize {
    4 * 1024 * 1024
}

/// Master configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterConfig {
    /// Bind address for HTTP API
    pub bind_addr: SocketAddr,

    /// Snapshot file or mutation log path
    pub data_path: PathBuf,

    pub durability: DurabilityKind,

    /// Slave base URLs, e.g. `http://localhost:8001`
    pub slaves: Vec<String>,

    pub replication: ReplicationConfig,

    pub max_body_bytes: usize,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            data_path: PathBuf::from("data.json"),
            durability: DurabilityKind::Snapshot,
            slaves: vec![
                "http://localhost:8001".to_string(),
                "http://localhost:8002".to_string(),
            ],
            replication: ReplicationConfig::default(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Slave configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlaveConfig {
    /// Bind address for HTTP API
    pub bind_addr: SocketAddr,

    /// Snapshot file or mutation log path
    pub data_path: PathBuf,

    pub durability: DurabilityKind,

    pub max_body_bytes: usize,
}

impl Default for SlaveConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8001)),
            data_path: PathBuf::from("slave_data.json"),
            durability: DurabilityKind::Snapshot,
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.master.bind_addr.port(), 8000);
        assert_eq!(config.slave.bind_addr.port(), 8001);
        assert_eq!(config.master.slaves.len(), 2);
        assert_eq!(
            config.master.replication.policy(),
            ReplicationPolicy::FireAndForget
        );
        assert_eq!(config.master.durability, DurabilityKind::Snapshot);
    }

    #[test]
    fn test_load_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("minitable.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
node_id = "master-a"

[master]
bind_addr = "127.0.0.1:9000"
durability = "log"
slaves = ["http://10.0.0.2:8001"]

[master.replication]
mode = "bounded_retry"
max_attempts = 3
backoff_ms = 50
timeout_ms = 250
"#
        )
        .unwrap();

        let config = Config::load_from(path.to_str().unwrap()).unwrap();
        assert_eq!(config.node_id, "master-a");
        assert_eq!(config.master.bind_addr.port(), 9000);
        assert_eq!(config.master.durability, DurabilityKind::Log);
        assert_eq!(config.master.slaves, vec!["http://10.0.0.2:8001"]);
        assert_eq!(
            config.master.replication.policy(),
            ReplicationPolicy::BoundedRetry {
                max_attempts: 3,
                backoff: Duration::from_millis(50)
            }
        );
        assert_eq!(config.master.replication.timeout(), Duration::from_millis(250));
        // untouched sections keep their defaults
        assert_eq!(config.slave.bind_addr.port(), 8001);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = Config::load_from("/nonexistent/minitable-test-config").unwrap();
        assert_eq!(config.log_level, "info");
    }
}
