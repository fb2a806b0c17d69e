//! CLI over the minitable HTTP API

use clap::{Parser, Subcommand};
use minitable::ops::{verify_convergence, ReplicaStatus};
use minitable::store::Record;
use minitable::TableClient;

#[derive(Parser)]
#[command(name = "minitable")]
#[command(about = "minitable replicated table store CLI")]
#[command(version)]
struct Cli {
    /// Node URL (the master for writes; any node for reads)
    #[arg(long, default_value = "http://localhost:8000")]
    node: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a database
    CreateDatabase { database: String },

    /// Create a table
    CreateTable {
        database: String,
        table: String,

        /// Declared columns (comma-separated)
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,
    },

    /// Insert a record given as column=value pairs
    Insert {
        database: String,
        table: String,
        #[arg(value_parser = parse_pair)]
        values: Vec<(String, String)>,
    },

    /// Print records as JSON
    Select {
        database: String,
        table: String,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Update matching records
    Update {
        database: String,
        table: String,

        /// column=value to write (repeatable)
        #[arg(long = "set", value_parser = parse_pair)]
        set: Vec<(String, String)>,

        /// column=value to match (repeatable; none matches all)
        #[arg(long = "where", value_parser = parse_pair)]
        conditions: Vec<(String, String)>,
    },

    /// Delete matching records
    Delete {
        database: String,
        table: String,

        /// column=value to match (repeatable; none matches all)
        #[arg(long = "where", value_parser = parse_pair)]
        conditions: Vec<(String, String)>,
    },

    /// Drop a table
    DropTable { database: String, table: String },

    /// Drop a database
    DropDatabase { database: String },

    /// List databases
    ListDatabases,

    /// List tables of a database
    ListTables { database: String },

    /// Show a table's columns and schema origin
    Describe { database: String, table: String },

    /// Show node health
    Health,

    /// Compare a table on the node with each slave's copy
    Converge {
        database: String,
        table: String,

        /// Slave base URLs (comma-separated)
        #[arg(long, value_delimiter = ',', required = true)]
        slaves: Vec<String>,
    },
}

fn parse_pair(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected column=value, got {:?}", s))
}

fn record(pairs: Vec<(String, String)>) -> Record {
    pairs.into_iter().collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let client = TableClient::new(&cli.node)?;

    match cli.command {
        Commands::CreateDatabase { database } => {
            println!("{}", client.create_database(&database).await?);
        }

        Commands::CreateTable {
            database,
            table,
            columns,
        } => {
            println!("{}", client.create_table(&database, &table, columns).await?);
        }

        Commands::Insert {
            database,
            table,
            values,
        } => {
            println!("{}", client.insert(&database, &table, record(values)).await?);
        }

        Commands::Select {
            database,
            table,
            limit,
        } => {
            let records = client.select(&database, &table, limit).await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }

        Commands::Update {
            database,
            table,
            set,
            conditions,
        } => {
            let text = client
                .update(&database, &table, record(set), record(conditions))
                .await?;
            println!("{}", text);
        }

        Commands::Delete {
            database,
            table,
            conditions,
        } => {
            println!("{}", client.delete(&database, &table, record(conditions)).await?);
        }

        Commands::DropTable { database, table } => {
            println!("{}", client.drop_table(&database, &table).await?);
        }

        Commands::DropDatabase { database } => {
            println!("{}", client.drop_database(&database).await?);
        }

        Commands::ListDatabases => {
            for name in client.list_databases().await? {
                println!("{}", name);
            }
        }

        Commands::ListTables { database } => {
            for name in client.list_tables(&database).await? {
                println!("{}", name);
            }
        }

        Commands::Describe { database, table } => {
            let description = client.describe_table(&database, &table).await?;
            println!("Columns: {}", description.columns.join(", "));
            println!("Origin:  {}", description.origin);
        }

        Commands::Health => {
            println!("{}", serde_json::to_string_pretty(&client.health().await?)?);
        }

        Commands::Converge {
            database,
            table,
            slaves,
        } => {
            let slaves = slaves
                .iter()
                .map(|url| TableClient::new(url))
                .collect::<Result<Vec<_>, _>>()?;
            let report = verify_convergence(&client, &slaves, &database, &table).await?;

            println!("Convergence report for {}.{}:", report.database, report.table);
            println!("  Master records: {}", report.master_records);
            for (slave, status) in &report.slaves {
                match status {
                    ReplicaStatus::InSync => println!("  {}: in sync", slave),
                    ReplicaStatus::Diverged { slave: n, .. } => {
                        println!("  {}: diverged ({} records)", slave, n)
                    }
                    ReplicaStatus::Unavailable(e) => println!("  {}: unavailable ({})", slave, e),
                }
            }
            if !report.converged() {
                anyhow::bail!("slaves have not converged");
            }
        }
    }

    Ok(())
}
