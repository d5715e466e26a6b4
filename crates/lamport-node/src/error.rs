//! Node error types.

use std::path::PathBuf;

use lamport_core::RuntimeError;
use lamport_proto::ProcessId;
use thiserror::Error;

/// Errors that stop a node.
#[derive(Error, Debug)]
pub enum NodeError {
    /// Command-line settings out of range
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Snapshot file unreadable or undecodable
    #[error("cannot load snapshot {}: {reason}", .path.display())]
    Snapshot {
        /// Snapshot file
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// Listening endpoint could not be bound
    #[error("cannot bind {address}: {reason}")]
    Bind {
        /// Address from the peer table
        address: String,
        /// What went wrong
        reason: String,
    },

    /// Event log file could not be created
    #[error("cannot create event log {}: {reason}", .path.display())]
    EventLog {
        /// Log file
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// OS entropy source failed
    #[error("entropy source failed: {0}")]
    Entropy(String),

    /// Bootstrap or run failure
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl NodeError {
    /// Offending peer, where known.
    pub fn peer(&self) -> Option<ProcessId> {
        match self {
            Self::Runtime(err) => err.peer(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use lamport_core::WorkerError;

    use super::*;

    #[test]
    fn runtime_errors_name_the_peer() {
        let err = NodeError::from(RuntimeError::Worker(WorkerError::Refused { peer: 2 }));

        assert_eq!(err.peer(), Some(2));
        assert!(err.to_string().contains('2'));
    }

    #[test]
    fn config_errors_have_no_peer() {
        assert_eq!(NodeError::Config("budget must be positive".into()).peer(), None);
    }
}
