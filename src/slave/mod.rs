//! Slave node: applies mutations forwarded by the master and serves reads
//! over its own copy.

pub mod apply;
pub mod http;
pub mod server;

pub use apply::ReplicaApplier;
pub use http::{create_router, SlaveState};
pub use server::SlaveServer;
