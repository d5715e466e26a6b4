//! Mesh bootstrap state machine.
//!
//! Tracks which peers we hold an outbound (send) channel to and which peers
//! have handshaked on an inbound (receive) channel. Pure bookkeeping; the
//! async [`crate::mesh::Mesh`] performs the connects and accepts.
//!
//! # State Machine
//!
//! ```text
//! ┌────────────┐  first outbound   ┌─────────────┐  all channels  ┌─────────────┐
//! │ Connecting │──────────────────>│ Handshaking │───────────────>│ Established │
//! └────────────┘  or handshake     └─────────────┘                └─────────────┘
//!        │                                │                              │
//!        └──────────── close ─────────────┴──────────── close ───────────┘
//!                                         ↓
//!                                    ┌────────┐
//!                                    │ Closed │
//!                                    └────────┘
//! ```

use std::{collections::BTreeSet, time::Duration};

use lamport_proto::ProcessId;

use crate::error::SessionError;

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing connected yet
    Connecting,
    /// Some channels up, waiting for the rest
    Handshaking,
    /// One outbound and one inbound channel per peer
    Established,
    /// Channels shut down
    Closed,
}

/// Bootstrap configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Bound on the whole bootstrap. `None` waits forever.
    pub handshake_timeout: Option<Duration>,
    /// Delay between connect attempts to a peer that is not listening yet
    pub connect_retry_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Some(Duration::from_secs(30)),
            connect_retry_interval: Duration::from_millis(100),
        }
    }
}

/// Bootstrap bookkeeping for one process.
#[derive(Debug, Clone)]
pub struct Session {
    id: ProcessId,
    cluster_size: usize,
    state: SessionState,
    outbound: BTreeSet<ProcessId>,
    inbound: BTreeSet<ProcessId>,
}

impl Session {
    /// Session for process `id` in a cluster of `cluster_size`.
    ///
    /// A single-process cluster has no peers and starts established.
    pub fn new(id: ProcessId, cluster_size: usize) -> Self {
        let state =
            if cluster_size <= 1 { SessionState::Established } else { SessionState::Connecting };
        Self { id, cluster_size, state, outbound: BTreeSet::new(), inbound: BTreeSet::new() }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Own id
    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// Every other process id, ascending.
    pub fn peers(&self) -> impl Iterator<Item = ProcessId> + '_ {
        (0..self.cluster_size as ProcessId).filter(move |&peer| peer != self.id)
    }

    /// Record an outbound channel to `peer` (our handshake has been sent).
    pub fn record_outbound(&mut self, peer: ProcessId) -> Result<(), SessionError> {
        self.check_open("record an outbound channel")?;
        self.check_peer(peer)?;
        if !self.outbound.insert(peer) {
            return Err(SessionError::DuplicateConnection(peer));
        }
        self.advance();
        Ok(())
    }

    /// Record an inbound channel whose handshake announced `peer`.
    pub fn record_handshake(&mut self, peer: ProcessId) -> Result<(), SessionError> {
        self.check_open("accept a handshake")?;
        self.check_peer(peer)?;
        if !self.inbound.insert(peer) {
            return Err(SessionError::DuplicateHandshake(peer));
        }
        self.advance();
        Ok(())
    }

    /// True once every peer has handshaked with us.
    pub fn inbound_complete(&self) -> bool {
        self.inbound.len() + 1 >= self.cluster_size
    }

    /// Peers we have no outbound channel to.
    pub fn missing_outbound(&self) -> Vec<ProcessId> {
        self.peers().filter(|peer| !self.outbound.contains(peer)).collect()
    }

    /// Peers that have not handshaked with us.
    pub fn missing_inbound(&self) -> Vec<ProcessId> {
        self.peers().filter(|peer| !self.inbound.contains(peer)).collect()
    }

    /// Transition to `Closed`.
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }

    fn advance(&mut self) {
        self.state = if self.inbound_complete() && self.outbound.len() + 1 >= self.cluster_size {
            SessionState::Established
        } else {
            SessionState::Handshaking
        };
    }

    fn check_open(&self, operation: &'static str) -> Result<(), SessionError> {
        match self.state {
            SessionState::Connecting | SessionState::Handshaking => Ok(()),
            state => Err(SessionError::InvalidState { state, operation }),
        }
    }

    fn check_peer(&self, peer: ProcessId) -> Result<(), SessionError> {
        if peer == self.id || peer as usize >= self.cluster_size {
            return Err(SessionError::UnknownPeer(peer));
        }
        Ok(())
    }
}
