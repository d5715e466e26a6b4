//! Error types for the protocol core.
//!
//! Each layer has its own enum:
//! - [`WorkerError`]: protocol violations and invalid worker transitions
//! - [`SessionError`]: mesh bootstrap and channel I/O
//! - [`RuntimeError`]: anything that ends a run early
//!
//! `std::io::Error` is converted to a string at the transport seam so that
//! protocol errors stay `Clone + PartialEq` and easy to assert on.

use std::{io, time::Duration};

use lamport_proto::{MessageKind, ProcessId, ProtocolError, Request};
use thiserror::Error;

use crate::{session::SessionState, worker::Phase};

/// Errors raised by the worker state machine.
///
/// Every variant except [`WorkerError::AttemptsExhausted`] and
/// [`WorkerError::InvalidState`] is fatal for the run: the algorithm assumes
/// a closed, correct peer set and has no recovery path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// A peer sent REFUSE, which this algorithm never emits
    #[error("received REFUSE from process {peer}")]
    Refused {
        /// Sender of the REFUSE
        peer: ProcessId,
    },

    /// RELEASE for a request that is not in the queue
    #[error("process {peer} released request at {timestamp} that is not queued")]
    UnknownRelease {
        /// Sender of the RELEASE
        peer: ProcessId,
        /// Request timestamp carried in the payload
        timestamp: u64,
    },

    /// A peer issued a second REQUEST while one is still outstanding
    #[error("process {peer} sent {incoming} while {outstanding} is still outstanding")]
    DuplicateRequest {
        /// Requesting peer
        peer: ProcessId,
        /// Request already queued
        outstanding: Request,
        /// Request just received
        incoming: Request,
    },

    /// Message arrived on one peer's channel but names another sender
    #[error("message on channel from process {channel} declares sender {declared}")]
    SenderMismatch {
        /// Peer the channel belongs to
        channel: ProcessId,
        /// Sender field of the message
        declared: ProcessId,
    },

    /// Process id outside the peer table, or the worker itself
    #[error("unknown peer {0}")]
    UnknownPeer(ProcessId),

    /// Payload does not carry a request timestamp
    #[error("invalid {kind} payload {payload:?} from process {peer}")]
    InvalidPayload {
        /// Sender
        peer: ProcessId,
        /// Message kind
        kind: MessageKind,
        /// Raw payload
        payload: String,
    },

    /// Operation not allowed in the current phase
    #[error("cannot {operation} while {phase:?}")]
    InvalidState {
        /// Current phase
        phase: Phase,
        /// Attempted operation
        operation: &'static str,
    },

    /// Retry budget is used up
    #[error("all {max} critical-section attempts used")]
    AttemptsExhausted {
        /// Configured maximum
        max: u32,
    },

    /// Queue head is not the request being released
    #[error("queue head is {found:?}, expected own request {expected}")]
    HeadMismatch {
        /// Own outstanding request
        expected: Request,
        /// Actual queue head
        found: Option<Request>,
    },

    /// Advancing the logical clock would overflow
    #[error("logical clock overflow (peer {peer:?})")]
    ClockOverflow {
        /// Peer whose timestamp exhausted the clock; `None` for a local tick
        peer: Option<ProcessId>,
    },

    /// Snapshot does not describe a reachable worker state
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// Outgoing record could not be encoded
    #[error(transparent)]
    Codec(#[from] ProtocolError),
}

impl WorkerError {
    /// Process id of the offending peer, where known.
    pub fn peer(&self) -> Option<ProcessId> {
        match self {
            Self::Refused { peer }
            | Self::UnknownRelease { peer, .. }
            | Self::DuplicateRequest { peer, .. }
            | Self::InvalidPayload { peer, .. } => Some(*peer),
            Self::SenderMismatch { channel, .. } => Some(*channel),
            Self::UnknownPeer(peer) => Some(*peer),
            Self::ClockOverflow { peer } => *peer,
            Self::InvalidState { .. }
            | Self::AttemptsExhausted { .. }
            | Self::HeadMismatch { .. }
            | Self::InvalidSnapshot(_)
            | Self::Codec(_) => None,
        }
    }

    /// True if the error was caused by a misbehaving peer.
    pub fn is_violation(&self) -> bool {
        matches!(
            self,
            Self::Refused { .. }
                | Self::UnknownRelease { .. }
                | Self::DuplicateRequest { .. }
                | Self::SenderMismatch { .. }
                | Self::InvalidPayload { .. }
                | Self::ClockOverflow { peer: Some(_) }
        )
    }
}

/// Errors raised while bootstrapping or using the peer mesh.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Bootstrap did not complete in time
    #[error(
        "mesh not established after {elapsed:?}: no outbound channel to {missing_outbound:?}, no inbound channel from {missing_inbound:?}"
    )]
    HandshakeTimeout {
        /// How long we waited
        elapsed: Duration,
        /// Peers we could not connect to
        missing_outbound: Vec<ProcessId>,
        /// Peers that never handshaked with us
        missing_inbound: Vec<ProcessId>,
    },

    /// Handshake frame was malformed
    #[error("invalid handshake: {0}")]
    Handshake(ProtocolError),

    /// Two inbound connections announced the same peer
    #[error("duplicate handshake from process {0}")]
    DuplicateHandshake(ProcessId),

    /// Second outbound channel to the same peer
    #[error("duplicate outbound connection to process {0}")]
    DuplicateConnection(ProcessId),

    /// Peer id outside the table, or our own id
    #[error("unknown peer {0}")]
    UnknownPeer(ProcessId),

    /// Operation not allowed in the current session state
    #[error("cannot {operation} while {state:?}")]
    InvalidState {
        /// Current state
        state: SessionState,
        /// Attempted operation
        operation: &'static str,
    },

    /// Peer closed its channel
    #[error("channel from process {0} closed")]
    ChannelClosed(ProcessId),

    /// A frame from a peer could not be decoded
    #[error("corrupt stream from process {peer}: {source}")]
    Codec {
        /// Peer the stream belongs to
        peer: ProcessId,
        /// Decode failure
        source: ProtocolError,
    },

    /// Underlying transport error
    #[error("transport error: {0}")]
    Transport(String),
}

impl SessionError {
    /// True for stall-class failures: the peer is gone but nothing is corrupt.
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, Self::ChannelClosed(_) | Self::Transport(_))
    }
}

impl From<io::Error> for SessionError {
    fn from(err: io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Errors that end a run early.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// Protocol violation or invalid transition
    #[error(transparent)]
    Worker(#[from] WorkerError),

    /// Mesh failure
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Event sink rejected an entry
    #[error("event sink failed: {0}")]
    Sink(String),
}

impl RuntimeError {
    /// Process id of the offending peer, where known.
    pub fn peer(&self) -> Option<ProcessId> {
        match self {
            Self::Worker(err) => err.peer(),
            Self::Session(
                SessionError::ChannelClosed(peer)
                | SessionError::Codec { peer, .. }
                | SessionError::UnknownPeer(peer)
                | SessionError::DuplicateHandshake(peer)
                | SessionError::DuplicateConnection(peer),
            ) => Some(*peer),
            Self::Session(_) | Self::Sink(_) => None,
        }
    }
}
