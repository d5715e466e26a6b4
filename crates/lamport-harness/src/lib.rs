//! Deterministic simulation harness for the Lamport protocol.
//!
//! This crate provides turmoil-based implementations of the `Environment`
//! and `Transport` traits, so the production runtime loop can be run for a
//! whole cluster inside one deterministic, reproducible simulation.
//!
//! On top of those it offers a [`scenario::Cluster`] builder that launches N
//! processes, records critical-section occupancy in virtual time and hands
//! the collected [`scenario::Outcome`] to an oracle.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod monitor;
pub mod scenario;
pub mod sim_env;
pub mod sim_transport;
pub mod sink;

pub use monitor::{MonitoredSection, OccupancyMonitor};
pub use sim_env::SimEnv;
pub use sim_transport::SimTransport;
pub use sink::SharedLog;
