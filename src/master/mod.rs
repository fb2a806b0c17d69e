//! Master node: owns every write and fans committed record mutations out to
//! the slaves.

pub mod http;
pub mod replication;
pub mod server;

pub use http::{create_router, MasterState};
pub use replication::{
    Dispatch, ReplicationClient, ReplicationOp, ReplicationReport, SlaveEndpoint,
};
pub use server::MasterServer;
