//! Operational checks over a running deployment

pub mod converge;

pub use converge::{verify_convergence, ConvergenceReport, ReplicaStatus};
