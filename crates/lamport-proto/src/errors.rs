//! Error types for the Lamport wire formats.
//!
//! All errors are structured, testable, and provide actionable information.

use thiserror::Error;

/// Errors raised while encoding or decoding frames and records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    // Record errors
    /// Record split into the wrong number of fields
    #[error("{record} has {actual} fields, expected {expected}")]
    FieldCount {
        /// Record type being decoded
        record: &'static str,
        /// Number of fields the schema requires
        expected: usize,
        /// Number of fields found
        actual: usize,
    },

    /// A field did not parse as its expected type
    #[error("invalid {field}: {value:?}")]
    InvalidField {
        /// Name of the offending field
        field: &'static str,
        /// Raw text of the field
        value: String,
    },

    /// Unknown message kind
    #[error("unknown message kind: {0:?}")]
    UnknownMessageKind(String),

    /// Unknown event-log event
    #[error("unknown event kind: {0:?}")]
    UnknownEventKind(String),

    /// Payload contains the field delimiter and cannot be encoded
    #[error("payload {0:?} contains the field delimiter")]
    DelimiterInPayload(String),

    /// Record bytes are not valid UTF-8
    #[error("record is not valid UTF-8")]
    InvalidUtf8,

    // Framing errors
    /// Length prefix is negative
    #[error("negative frame length: {0}")]
    NegativeLength(i32),

    /// Payload exceeds the maximum frame size
    #[error("payload too large: {size} bytes exceeds maximum {max}")]
    PayloadTooLarge {
        /// Actual payload size
        size: usize,
        /// Maximum allowed size
        max: usize,
    },

    /// Handshake payload has the wrong size
    #[error("handshake payload is {0} bytes, expected 4")]
    InvalidHandshake(usize),

    // Snapshot errors (wrapped for testability)
    /// Failed to encode a snapshot as CBOR
    #[error("failed to encode snapshot: {0}")]
    SnapshotEncode(String),

    /// Failed to decode a snapshot from CBOR
    #[error("failed to decode snapshot: {0}")]
    SnapshotDecode(String),
}

/// Convenient Result type alias for wire operations
pub type Result<T> = std::result::Result<T, ProtocolError>;
