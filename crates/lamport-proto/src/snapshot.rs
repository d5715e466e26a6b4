//! Bootstrap snapshot.
//!
//! A driver produces one snapshot per process before launch. It carries the
//! whole peer table, the process's own id and the serialized protocol state,
//! which is zeroed for a fresh run. Snapshots are encoded as CBOR.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    EventLogEntry, ProcessId, Request, Timestamp,
    errors::{ProtocolError, Result},
};

/// Default bound on critical-section attempts per process.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Listening address of one process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddr {
    /// Host name or IP literal
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl PeerAddr {
    /// Create an address.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for PeerAddr {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ProtocolError::InvalidField { field: "peer address", value: s.to_string() };

        let (host, port) = s.rsplit_once(':').ok_or_else(invalid)?;
        if host.is_empty() {
            return Err(invalid());
        }
        let port = port.parse().map_err(|_| invalid())?;

        Ok(Self::new(host, port))
    }
}

/// Serialized state of one worker.
///
/// Index `i` of `peers` is the listening address of process `i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Address table, indexed by process id
    pub peers: Vec<PeerAddr>,
    /// Own process id
    pub self_id: ProcessId,
    /// Logical clock
    pub clock: Timestamp,
    /// Queued requests in ascending order
    pub queue: Vec<Request>,
    /// Releases received for requests not yet at the queue head
    #[serde(default)]
    pub pending_releases: Vec<Request>,
    /// An own request is outstanding
    pub requesting: bool,
    /// The critical section is held
    pub in_critical_section: bool,
    /// Attempts made so far
    pub attempts: u32,
    /// Bound on attempts
    pub max_attempts: u32,
    /// Peers that granted the outstanding request, ascending
    pub acks: Vec<ProcessId>,
    /// Event log recorded so far
    #[serde(default)]
    pub log: Vec<EventLogEntry>,
}

impl Snapshot {
    /// Zeroed initial state for process `self_id`.
    pub fn bootstrap(peers: Vec<PeerAddr>, self_id: ProcessId, max_attempts: u32) -> Self {
        Self {
            peers,
            self_id,
            clock: 0,
            queue: Vec::new(),
            pending_releases: Vec::new(),
            requesting: false,
            in_critical_section: false,
            attempts: 0,
            max_attempts,
            acks: Vec::new(),
            log: Vec::new(),
        }
    }

    /// One zeroed snapshot per process in `peers`.
    pub fn bootstrap_all(peers: &[PeerAddr], max_attempts: u32) -> Vec<Self> {
        (0..peers.len() as ProcessId)
            .map(|id| Self::bootstrap(peers.to_vec(), id, max_attempts))
            .collect()
    }

    /// Own listening address, if `self_id` is in range.
    pub fn own_address(&self) -> Option<&PeerAddr> {
        self.peers.get(self.self_id as usize)
    }

    /// Encode as CBOR.
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(self, &mut bytes)
            .map_err(|e| ProtocolError::SnapshotEncode(e.to_string()))?;
        Ok(bytes)
    }

    /// Decode from CBOR.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::SnapshotDecode(e.to_string()))
    }
}
