//! Lamport mutual-exclusion protocol core.
//!
//! The protocol logic is a set of deterministic state machines that never
//! touch sockets, clocks or randomness directly. Callers feed them inputs and
//! execute the declarative actions they return.
//!
//! The async shells in this crate ([`mesh`] and [`runtime`]) are the only code
//! that performs I/O, and they do so through the [`env::Environment`] and
//! [`transport::Transport`] seams. The same runtime runs against real TCP in
//! production and against turmoil in deterministic simulation.
//!
//! # Components
//!
//! - [`clock`]: Lamport logical clock
//! - [`queue`]: request priority queue
//! - [`log`]: append-only event log and sinks
//! - [`worker`]: per-process protocol state machine
//! - [`session`]: mesh bootstrap state machine
//! - [`mesh`]: full-mesh channels over a transport
//! - [`runtime`]: control loop driving a worker over a mesh
//! - [`mod@env`]: environment abstraction (time, RNG)
//! - [`transport`]: transport abstraction (streams)
//! - [`error`]: error types

pub mod clock;
pub mod env;
pub mod error;
pub mod log;
pub mod mesh;
pub mod queue;
pub mod runtime;
pub mod session;
pub mod transport;
pub mod worker;

pub use clock::LamportClock;
pub use env::Environment;
pub use error::{RuntimeError, SessionError, WorkerError};
pub use log::{EventLog, EventSink};
pub use mesh::Mesh;
pub use queue::RequestQueue;
pub use runtime::{CriticalSection, NodeConfig, RunReport, Runtime, RuntimeConfig};
pub use session::{Session, SessionConfig, SessionState};
pub use transport::Transport;
pub use worker::{Phase, Worker, WorkerAction, WorkerConfig};
