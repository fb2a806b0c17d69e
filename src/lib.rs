//! # minitable
//!
//! A small replicated tabular store over HTTP:
//! - one master owns every write and serves reads
//! - any number of slaves receive each committed insert/update/delete
//! - records are string maps kept in insertion order per table
//! - durability by full JSON snapshot or an append-only mutation log
//!
//! ## Architecture

#![allow(clippy::result_large_err)]
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │                 Master                   │
//! │  TableStore ─ apply ─ persist            │
//! │        └─ replicate (per policy)         │
//! └───────┬──────────────────┬───────────────┘
//!         │ HTTP             │ HTTP
//! ┌───────▼──────┐    ┌──────▼───────┐
//! │   Slave 1    │    │   Slave 2    │
//! │ ensure+apply │    │ ensure+apply │
//! │  + persist   │    │  + persist   │
//! └──────────────┘    └──────────────┘
//! ```
//!
//! ## Usage
//!
//! ### Start a master
//! ```bash
//! minitable-master serve \
//!   --bind 0.0.0.0:8000 \
//!   --data ./data.json \
//!   --slaves http://localhost:8001,http://localhost:8002
//! ```
//!
//! ### Start a slave
//! ```bash
//! minitable-slave serve --bind 0.0.0.0:8001 --data ./slave_data.json
//! ```
//!
//! ### Use the CLI
//! ```bash
//! minitable create-database shop
//! minitable create-table shop orders --columns id,status
//! minitable insert shop orders id=1 status=new
//! minitable select shop orders --limit 10
//! minitable converge shop orders --slaves http://localhost:8001
//! ```

pub mod api;
pub mod client;
pub mod common;
pub mod master;
pub mod ops;
pub mod persistence;
pub mod slave;
pub mod store;

// Re-export commonly used types
pub use client::TableClient;
pub use common::{Config, Error, Result};
pub use master::MasterServer;
pub use slave::SlaveServer;
pub use store::TableStore;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
