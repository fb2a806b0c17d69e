//! Master binary

use clap::{Parser, Subcommand, ValueEnum};
use minitable::common::{init_tracing, Config, DurabilityKind, ReplicationMode};
use minitable::MasterServer;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "minitable-master")]
#[command(about = "minitable master node")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Durability {
    Snapshot,
    Log,
}

#[derive(Clone, Copy, ValueEnum)]
enum Replication {
    FireAndForget,
    SyncAck,
    BoundedRetry,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the master server
    Serve {
        /// Config file (defaults to $MINITABLE_CONFIG or minitable.toml)
        #[arg(long)]
        config: Option<String>,

        /// Node ID
        #[arg(long)]
        id: Option<String>,

        /// Bind address for HTTP
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Snapshot or log file
        #[arg(long)]
        data: Option<PathBuf>,

        /// Durability strategy
        #[arg(long, value_enum)]
        durability: Option<Durability>,

        /// Slave base URLs (comma-separated)
        #[arg(long, value_delimiter = ',')]
        slaves: Option<Vec<String>>,

        /// Replication policy
        #[arg(long, value_enum)]
        replication: Option<Replication>,

        /// Per-delivery timeout in milliseconds
        #[arg(long)]
        replication_timeout_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            id,
            bind,
            data,
            durability,
            slaves,
            replication,
            replication_timeout_ms,
        } => {
            // Load config from file, then override with CLI arguments
            let mut config = match config {
                Some(path) => Config::load_from(&path)?,
                None => Config::load()?,
            };
            init_tracing(&config.log_level);

            let master = &mut config.master;
            if let Some(bind) = bind {
                master.bind_addr = bind;
            }
            if let Some(data) = data {
                master.data_path = data;
            }
            if let Some(durability) = durability {
                master.durability = match durability {
                    Durability::Snapshot => DurabilityKind::Snapshot,
                    Durability::Log => DurabilityKind::Log,
                };
            }
            if let Some(slaves) = slaves {
                master.slaves = slaves;
            }
            if let Some(replication) = replication {
                master.replication.mode = match replication {
                    Replication::FireAndForget => ReplicationMode::FireAndForget,
                    Replication::SyncAck => ReplicationMode::SyncAck,
                    Replication::BoundedRetry => ReplicationMode::BoundedRetry,
                };
            }
            if let Some(timeout_ms) = replication_timeout_ms {
                master.replication.timeout_ms = timeout_ms;
            }

            let node_id = id.unwrap_or(config.node_id);
            MasterServer::new(config.master, node_id).serve().await?;
        }
    }

    Ok(())
}
