//! Slave binary

use clap::{Parser, Subcommand, ValueEnum};
use minitable::common::{init_tracing, Config, DurabilityKind};
use minitable::SlaveServer;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "minitable-slave")]
#[command(about = "minitable slave node")]
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

#[derive(Subcommand)]
enum Commands {
    /// Start a slave server
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
        } => {
            let mut config = match config {
                Some(path) => Config::load_from(&path)?,
                None => Config::load()?,
            };
            init_tracing(&config.log_level);

            let slave = &mut config.slave;
            if let Some(bind) = bind {
                slave.bind_addr = bind;
            }
            if let Some(data) = data {
                slave.data_path = data;
            }
            if let Some(durability) = durability {
                slave.durability = match durability {
                    Durability::Snapshot => DurabilityKind::Snapshot,
                    Durability::Log => DurabilityKind::Log,
                };
            }

            let node_id = id.unwrap_or_else(|| format!("slave-{}", config.slave.bind_addr.port()));
            SlaveServer::new(config.slave, node_id).serve().await?;
        }
    }

    Ok(())
}
