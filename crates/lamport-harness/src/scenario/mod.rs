//! Cluster scenarios for deterministic simulation tests.
//!
//! A scenario launches N processes inside one turmoil simulation, each
//! running the production runtime over [`SimTransport`](crate::SimTransport)
//! and [`SimEnv`](crate::SimEnv). When every process has finished, the
//! collected [`Outcome`] is handed to an oracle. The oracle is mandatory: a
//! [`Cluster`] cannot be run without one.

mod builder;
pub mod oracle;
mod outcome;

pub use builder::{Cluster, RunnableCluster};
pub use oracle::{OracleFn, verify_event_logs};
pub use outcome::Outcome;
