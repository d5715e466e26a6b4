//! Wire formats for the Lamport mutual-exclusion protocol.
//!
//! Peers exchange length-prefixed frames over byte streams. Each frame is a
//! 4-byte native-endian signed length followed by that many payload bytes.
//! During bootstrap the payload is a [`Handshake`] carrying the sender's
//! process id; afterwards every payload is the colon-delimited text form of
//! a [`Message`].
//!
//! The same colon-delimited vocabulary is reused for [`EventLogEntry`], the
//! append-only per-process record of protocol traffic. Entries are written to
//! local sinks and never transmitted.
//!
//! Decoding is schema-checked: a record that splits into the wrong number of
//! fields, or whose fields fail to parse as their expected type, is rejected
//! with a [`ProtocolError`]. There is no best-effort recovery.
//!
//! # Modules
//!
//! - [`message`]: protocol messages (REQUEST, GRANT, RELEASE, REFUSE)
//! - [`event`]: event-log entries (SEND, RECEIVE, COMPUTE)
//! - [`request`]: critical-section requests and their total order
//! - [`frame`]: length-prefixed framing
//! - [`handshake`]: identity handshake payload
//! - [`snapshot`]: bootstrap snapshot of a worker's state
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod errors;
pub mod event;
pub mod frame;
pub mod handshake;
pub mod message;
pub mod request;
pub mod snapshot;

mod fields;

pub use errors::{ProtocolError, Result};
pub use event::{EventKind, EventLogEntry};
pub use handshake::Handshake;
pub use message::{Message, MessageKind};
pub use request::Request;
pub use snapshot::{PeerAddr, Snapshot};

/// Logical identity of a process. Doubles as the index into the peer table.
pub type ProcessId = u32;

/// Lamport logical time.
pub type Timestamp = u64;

/// Separator between fields of every text record.
pub const FIELD_DELIMITER: char = ':';
