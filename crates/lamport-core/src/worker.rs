//! Per-process protocol state machine.
//!
//! # Architecture: Action-Based State Machine
//!
//! The worker owns all protocol state of one process: clock, request queue,
//! acknowledgment set, flags, retry counter and event log. It performs no I/O.
//! Every input method returns `Result<Vec<WorkerAction>, WorkerError>` and the
//! driver executes the actions (send a message, run the critical section).
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐  request   ┌────────────┐  N-1 grants + head  ┌───────────────────┐
//! │ Idle │───────────>│ Requesting │────────────────────>│ InCriticalSection │
//! └──────┘            └────────────┘                     └───────────────────┘
//!     ^                                                            │
//!     └─────────────────────── release broadcast ──────────────────┘
//! ```
//!
//! # Invariants
//!
//! - At most one own request is outstanding, and it stays queued until the
//!   worker leaves the critical section.
//! - A peer has at most one outstanding request in the queue.
//! - A peer's request is popped only once its RELEASE has arrived and it has
//!   reached the queue head. Early releases are parked, never dropped.
//! - The acknowledgment set holds distinct peer ids granting the current
//!   request only.

use std::collections::BTreeSet;

use lamport_proto::{
    EventKind, EventLogEntry, Message, MessageKind, PeerAddr, ProcessId, Request, Snapshot,
    Timestamp,
};
use tracing::{debug, info, warn};

use crate::{clock::LamportClock, error::WorkerError, log::EventLog, queue::RequestQueue};

/// Coarse worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No own request outstanding
    Idle,
    /// Own request broadcast, waiting for grants and the queue head
    Requesting,
    /// Holding the critical section
    InCriticalSection,
}

/// Effects the driver must carry out, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerAction {
    /// Send `message` on the outbound channel to `to`
    Send {
        /// Destination process
        to: ProcessId,
        /// Message to frame and write
        message: Message,
    },

    /// Run the critical section, then call [`Worker::exit_critical_section`]
    EnterCriticalSection {
        /// Request that was admitted
        request: Request,
    },
}

/// Worker configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkerConfig {
    /// Chance that an idle worker requests the critical section on a given
    /// iteration
    pub request_probability: f64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { request_probability: 0.3 }
    }
}

/// Protocol state of one process.
#[derive(Debug, Clone)]
pub struct Worker {
    peers: Vec<PeerAddr>,
    id: ProcessId,
    clock: LamportClock,
    queue: RequestQueue,
    /// Releases that arrived before their request reached the head
    pending_releases: BTreeSet<Request>,
    acks: BTreeSet<ProcessId>,
    requesting: bool,
    in_critical_section: bool,
    attempts: u32,
    max_attempts: u32,
    /// Own outstanding request
    current: Option<Request>,
    log: EventLog,
    config: WorkerConfig,
}

impl Worker {
    /// Fresh worker for process `id`.
    pub fn new(
        peers: Vec<PeerAddr>,
        id: ProcessId,
        max_attempts: u32,
        config: WorkerConfig,
    ) -> Result<Self, WorkerError> {
        Self::from_snapshot(Snapshot::bootstrap(peers, id, max_attempts), config)
    }

    /// Restore a worker from its snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::InvalidSnapshot`] if the snapshot does not
    /// describe a state this worker could have reached.
    pub fn from_snapshot(snapshot: Snapshot, config: WorkerConfig) -> Result<Self, WorkerError> {
        let invalid = |reason: String| Err(WorkerError::InvalidSnapshot(reason));

        let Snapshot {
            peers,
            self_id,
            clock,
            queue,
            pending_releases,
            requesting,
            in_critical_section,
            attempts,
            max_attempts,
            acks,
            log,
        } = snapshot;

        let size = peers.len();
        if size == 0 {
            return invalid("empty peer table".into());
        }
        if self_id as usize >= size {
            return invalid(format!("own id {self_id} outside peer table of {size}"));
        }
        if requesting && in_critical_section {
            return invalid("both requesting and in the critical section".into());
        }
        if attempts > max_attempts {
            return invalid(format!("{attempts} attempts made with a bound of {max_attempts}"));
        }

        let in_range = |id: ProcessId| (id as usize) < size;

        let ack_set: BTreeSet<ProcessId> = acks.iter().copied().collect();
        if ack_set.len() != acks.len() {
            return invalid("duplicate acknowledgments".into());
        }
        if let Some(&bad) = ack_set.iter().find(|&&id| id == self_id || !in_range(id)) {
            return invalid(format!("acknowledgment from invalid peer {bad}"));
        }

        if let Some(bad) = queue.iter().chain(&pending_releases).find(|r| !in_range(r.requester)) {
            return invalid(format!("request {bad} from unknown process"));
        }

        let queued: BTreeSet<Request> = queue.iter().copied().collect();
        if queued.len() != queue.len() {
            return invalid("duplicate queued requests".into());
        }

        let pending: BTreeSet<Request> = pending_releases.iter().copied().collect();
        if pending.len() != pending_releases.len() {
            return invalid("duplicate pending releases".into());
        }
        if let Some(bad) = pending.iter().find(|r| !queued.contains(*r) || r.requester == self_id) {
            return invalid(format!("pending release {bad} has no queued request"));
        }

        let mut outstanding = BTreeSet::new();
        for request in queued.difference(&pending) {
            if !outstanding.insert(request.requester) {
                return invalid(format!(
                    "process {} has more than one outstanding request",
                    request.requester
                ));
            }
        }

        let own: Vec<Request> = queue.iter().copied().filter(|r| r.requester == self_id).collect();
        let current = match (requesting || in_critical_section, own.as_slice()) {
            (true, [request]) => Some(*request),
            (false, []) => None,
            (outstanding, own) => {
                return invalid(format!(
                    "{} own requests queued with outstanding = {outstanding}",
                    own.len()
                ));
            },
        };

        Ok(Self {
            peers,
            id: self_id,
            clock: LamportClock::at(clock),
            queue: queue.into_iter().collect(),
            pending_releases: pending,
            acks: ack_set,
            requesting,
            in_critical_section,
            attempts,
            max_attempts,
            current,
            log: EventLog::from_entries(log),
            config,
        })
    }

    /// Serialize the full state.
    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            peers: self.peers.clone(),
            self_id: self.id,
            clock: self.clock.now(),
            queue: self.queue.to_sorted_vec(),
            pending_releases: self.pending_releases.iter().copied().collect(),
            requesting: self.requesting,
            in_critical_section: self.in_critical_section,
            attempts: self.attempts,
            max_attempts: self.max_attempts,
            acks: self.acks.iter().copied().collect(),
            log: self.log.entries().to_vec(),
        }
    }

    /// Own process id.
    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// Peer address table.
    pub fn peers(&self) -> &[PeerAddr] {
        &self.peers
    }

    /// Number of processes, including this one.
    pub fn cluster_size(&self) -> usize {
        self.peers.len()
    }

    /// Every process id except our own, ascending.
    pub fn other_peers(&self) -> impl Iterator<Item = ProcessId> + '_ {
        (0..self.peers.len() as ProcessId).filter(move |&peer| peer != self.id)
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        if self.in_critical_section {
            Phase::InCriticalSection
        } else if self.requesting {
            Phase::Requesting
        } else {
            Phase::Idle
        }
    }

    /// Logical clock.
    pub fn clock(&self) -> Timestamp {
        self.clock.now()
    }

    /// Request queue.
    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    /// Peers that granted the current request.
    pub fn acks(&self) -> &BTreeSet<ProcessId> {
        &self.acks
    }

    /// Attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Bound on attempts.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Own outstanding request.
    pub fn current_request(&self) -> Option<Request> {
        self.current
    }

    /// Event log.
    pub fn log(&self) -> &EventLog {
        &self.log
    }

    /// Event log, for flushing.
    pub fn log_mut(&mut self) -> &mut EventLog {
        &mut self.log
    }

    /// True if idle with attempts left.
    pub fn can_request(&self) -> bool {
        self.phase() == Phase::Idle && self.attempts < self.max_attempts
    }

    /// Request decision for one loop iteration.
    ///
    /// `roll` is a uniform sample from `[0, 1)`; the worker requests if it is
    /// allowed to and `roll` falls under the configured probability.
    pub fn decide(&mut self, roll: f64) -> Result<Vec<WorkerAction>, WorkerError> {
        if self.can_request() && roll < self.config.request_probability {
            return self.request_critical_section();
        }
        Ok(Vec::new())
    }

    /// Enqueue an own request and broadcast REQUEST to every peer.
    ///
    /// The request is keyed by the timestamp of the enqueue tick. Each send
    /// ticks again, and every REQUEST carries the request timestamp as payload.
    ///
    /// # Errors
    ///
    /// - `InvalidState` unless idle
    /// - `AttemptsExhausted` once the retry budget is used up
    /// - `ClockOverflow` if the logical clock is exhausted
    pub fn request_critical_section(&mut self) -> Result<Vec<WorkerAction>, WorkerError> {
        if self.phase() != Phase::Idle {
            return Err(WorkerError::InvalidState {
                phase: self.phase(),
                operation: "request the critical section",
            });
        }
        if self.attempts >= self.max_attempts {
            return Err(WorkerError::AttemptsExhausted { max: self.max_attempts });
        }

        let timestamp = self.clock.tick().ok_or(WorkerError::ClockOverflow { peer: None })?;
        let request = Request::new(timestamp, self.id);
        self.queue.insert(request);
        self.acks.clear();
        self.requesting = true;
        self.current = Some(request);
        self.attempts += 1;

        info!(process = self.id, %request, attempt = self.attempts, "requesting critical section");

        self.broadcast(MessageKind::Request, request.timestamp)
    }

    /// Process one message received on the channel from `channel`.
    ///
    /// # Errors
    ///
    /// Every error is a protocol violation by `channel` and is fatal.
    pub fn handle_message(
        &mut self,
        channel: ProcessId,
        message: Message,
    ) -> Result<Vec<WorkerAction>, WorkerError> {
        self.check_peer(channel)?;
        if message.sender != channel {
            return Err(WorkerError::SenderMismatch { channel, declared: message.sender });
        }

        let now = self
            .clock
            .observe(message.timestamp)
            .ok_or(WorkerError::ClockOverflow { peer: Some(channel) })?;
        self.record(EventLogEntry::new(
            now,
            EventKind::Receive,
            channel,
            message.kind,
            message.payload.clone(),
        ));

        match message.kind {
            MessageKind::Request => self.on_request(channel, &message),
            MessageKind::Grant => {
                self.on_grant(channel, &message)?;
                Ok(Vec::new())
            },
            MessageKind::Release => {
                self.on_release(channel, &message)?;
                Ok(Vec::new())
            },
            MessageKind::Refuse => Err(WorkerError::Refused { peer: channel }),
        }
    }

    /// Admission check.
    ///
    /// Admits the worker if it is requesting, its own request heads the queue,
    /// and every other process has granted it.
    pub fn poll_admission(&mut self) -> Vec<WorkerAction> {
        let Some(request) = self.current else {
            return Vec::new();
        };
        if !self.requesting
            || self.queue.peek() != Some(request)
            || self.acks.len() + 1 != self.cluster_size()
        {
            return Vec::new();
        }

        self.requesting = false;
        self.in_critical_section = true;

        info!(process = self.id, %request, "entering critical section");

        vec![WorkerAction::EnterCriticalSection { request }]
    }

    /// Leave the critical section and broadcast RELEASE.
    ///
    /// # Errors
    ///
    /// - `InvalidState` unless in the critical section
    /// - `HeadMismatch` if the own request no longer heads the queue
    pub fn exit_critical_section(&mut self) -> Result<Vec<WorkerAction>, WorkerError> {
        let invalid = WorkerError::InvalidState {
            phase: self.phase(),
            operation: "exit the critical section",
        };
        if !self.in_critical_section {
            return Err(invalid);
        }
        let request = self.current.ok_or(invalid)?;

        let head = self.queue.peek();
        if head != Some(request) {
            return Err(WorkerError::HeadMismatch { expected: request, found: head });
        }

        self.in_critical_section = false;
        let actions = self.broadcast(MessageKind::Release, request.timestamp)?;

        self.queue.pop_min();
        self.current = None;
        self.drain_released();
        self.acks.clear();

        info!(process = self.id, %request, "left critical section");

        Ok(actions)
    }

    fn on_request(
        &mut self,
        peer: ProcessId,
        message: &Message,
    ) -> Result<Vec<WorkerAction>, WorkerError> {
        let incoming = Request::new(self.payload_timestamp(peer, message)?, peer);

        let outstanding =
            self.queue.requests_from(peer).find(|queued| !self.pending_releases.contains(queued));
        if let Some(outstanding) = outstanding {
            return Err(WorkerError::DuplicateRequest { peer, outstanding, incoming });
        }

        self.queue.insert(incoming);

        let action = self.send(peer, MessageKind::Grant, incoming.timestamp)?;
        Ok(vec![action])
    }

    fn on_grant(&mut self, peer: ProcessId, message: &Message) -> Result<(), WorkerError> {
        let granted = self.payload_timestamp(peer, message)?;

        match self.current {
            Some(request) if self.requesting && request.timestamp == granted => {
                self.acks.insert(peer);
            },
            current => {
                warn!(
                    process = self.id,
                    peer,
                    granted,
                    current = ?current.map(|r| r.timestamp),
                    "ignoring grant for a request that is not outstanding"
                );
            },
        }
        Ok(())
    }

    fn on_release(&mut self, peer: ProcessId, message: &Message) -> Result<(), WorkerError> {
        let timestamp = self.payload_timestamp(peer, message)?;
        let released = Request::new(timestamp, peer);

        if !self.queue.contains(&released) || self.pending_releases.contains(&released) {
            return Err(WorkerError::UnknownRelease { peer, timestamp });
        }

        self.pending_releases.insert(released);
        self.drain_released();
        Ok(())
    }

    /// Pop queue heads whose release has already arrived.
    fn drain_released(&mut self) {
        while let Some(head) = self.queue.peek() {
            if !self.pending_releases.remove(&head) {
                break;
            }
            self.queue.pop_min();
            debug!(process = self.id, request = %head, "request released");
        }
    }

    fn broadcast(
        &mut self,
        kind: MessageKind,
        request_ts: Timestamp,
    ) -> Result<Vec<WorkerAction>, WorkerError> {
        let peers: Vec<ProcessId> = self.other_peers().collect();
        peers.into_iter().map(|peer| self.send(peer, kind, request_ts)).collect()
    }

    fn send(
        &mut self,
        to: ProcessId,
        kind: MessageKind,
        request_ts: Timestamp,
    ) -> Result<WorkerAction, WorkerError> {
        let timestamp = self.clock.tick().ok_or(WorkerError::ClockOverflow { peer: None })?;
        let payload = request_ts.to_string();

        self.record(EventLogEntry::new(timestamp, EventKind::Send, to, kind, payload.clone()));

        Ok(WorkerAction::Send { to, message: Message::new(timestamp, self.id, kind, payload) })
    }

    fn record(&mut self, entry: EventLogEntry) {
        debug!(process = self.id, "{}", entry.describe(self.id));
        self.log.append(entry);
    }

    fn payload_timestamp(
        &self,
        peer: ProcessId,
        message: &Message,
    ) -> Result<Timestamp, WorkerError> {
        message.request_timestamp().map_err(|_| WorkerError::InvalidPayload {
            peer,
            kind: message.kind,
            payload: message.payload.clone(),
        })
    }

    fn check_peer(&self, peer: ProcessId) -> Result<(), WorkerError> {
        if peer == self.id || peer as usize >= self.peers.len() {
            return Err(WorkerError::UnknownPeer(peer));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peers(n: u16) -> Vec<PeerAddr> {
        (0..n).map(|i| PeerAddr::new("127.0.0.1", 9000 + i)).collect()
    }

    fn worker(n: u16, id: ProcessId) -> Worker {
        Worker::new(peers(n), id, 4, WorkerConfig::default()).unwrap()
    }

    fn sent(actions: &[WorkerAction]) -> Vec<(ProcessId, Message)> {
        actions
            .iter()
            .filter_map(|action| match action {
                WorkerAction::Send { to, message } => Some((*to, message.clone())),
                WorkerAction::EnterCriticalSection { .. } => None,
            })
            .collect()
    }

    fn msg(ts: Timestamp, sender: ProcessId, kind: MessageKind, payload: &str) -> Message {
        Message::new(ts, sender, kind, payload)
    }

    #[test]
    fn request_broadcast_ticks_per_send() {
        let mut w = worker(3, 0);
        let actions = w.request_critical_section().unwrap();

        assert_eq!(w.current_request(), Some(Request::new(1, 0)));
        assert_eq!(
            sent(&actions),
            vec![
                (1, msg(2, 0, MessageKind::Request, "1")),
                (2, msg(3, 0, MessageKind::Request, "1")),
            ]
        );
        assert_eq!(w.phase(), Phase::Requesting);
        assert_eq!(w.attempts(), 1);
        assert_eq!(w.log().len(), 2);
    }

    #[test]
    fn request_is_granted_with_request_timestamp() {
        let mut w = worker(3, 1);
        let actions = w.handle_message(0, msg(6, 0, MessageKind::Request, "5")).unwrap();

        assert_eq!(w.clock(), 8);
        assert_eq!(sent(&actions), vec![(0, msg(8, 1, MessageKind::Grant, "5"))]);
        assert_eq!(w.queue().peek(), Some(Request::new(5, 0)));

        let events: Vec<_> = w.log().entries().iter().map(|e| e.encode().unwrap()).collect();
        assert_eq!(events, vec!["7:RECEIVE:0:REQUEST:5", "8:SEND:0:GRANT:5"]);
    }

    #[test]
    fn admission_needs_every_grant() {
        let mut w = worker(3, 0);
        w.request_critical_section().unwrap();

        w.handle_message(1, msg(5, 1, MessageKind::Grant, "1")).unwrap();
        assert!(w.poll_admission().is_empty());

        w.handle_message(1, msg(6, 1, MessageKind::Grant, "1")).unwrap();
        assert_eq!(w.acks().len(), 1);
        assert!(w.poll_admission().is_empty());

        w.handle_message(2, msg(5, 2, MessageKind::Grant, "1")).unwrap();
        assert_eq!(
            w.poll_admission(),
            vec![WorkerAction::EnterCriticalSection { request: Request::new(1, 0) }]
        );
        assert_eq!(w.phase(), Phase::InCriticalSection);
    }

    #[test]
    fn stale_grant_is_not_counted() {
        let mut w = worker(2, 0);
        w.handle_message(1, msg(1, 1, MessageKind::Grant, "1")).unwrap();
        assert!(w.acks().is_empty());

        w.request_critical_section().unwrap();
        w.handle_message(1, msg(4, 1, MessageKind::Grant, "99")).unwrap();
        assert!(w.acks().is_empty());
    }

    #[test]
    fn exit_releases_and_pops_own_request() {
        let mut w = worker(2, 0);
        w.request_critical_section().unwrap();
        w.handle_message(1, msg(4, 1, MessageKind::Grant, "1")).unwrap();
        w.poll_admission();

        let actions = w.exit_critical_section().unwrap();
        assert_eq!(sent(&actions), vec![(1, msg(6, 0, MessageKind::Release, "1"))]);
        assert!(w.queue().is_empty());
        assert!(w.acks().is_empty());
        assert_eq!(w.phase(), Phase::Idle);
    }

    #[test]
    fn early_release_waits_for_head() {
        let mut w = worker(3, 2);
        w.handle_message(0, msg(2, 0, MessageKind::Request, "1")).unwrap();
        w.handle_message(1, msg(3, 1, MessageKind::Request, "2")).unwrap();

        // Release of <2, 1> arrives while <1, 0> still heads the queue.
        w.handle_message(1, msg(9, 1, MessageKind::Release, "2")).unwrap();
        assert_eq!(w.queue().len(), 2);

        w.handle_message(0, msg(10, 0, MessageKind::Release, "1")).unwrap();
        assert!(w.queue().is_empty());
    }

    #[test]
    fn early_release_drained_after_own_exit() {
        let mut w = worker(3, 0);
        w.request_critical_section().unwrap();
        w.handle_message(1, msg(5, 1, MessageKind::Request, "4")).unwrap();
        w.handle_message(1, msg(7, 1, MessageKind::Grant, "1")).unwrap();
        w.handle_message(2, msg(5, 2, MessageKind::Grant, "1")).unwrap();
        assert_eq!(w.poll_admission().len(), 1);

        // Peer 1 cannot legitimately release before we do, but a parked release
        // behind our own request must still be applied when we pop.
        w.pending_releases.insert(Request::new(4, 1));
        w.exit_critical_section().unwrap();
        assert!(w.queue().is_empty());
        assert!(w.pending_releases.is_empty());
    }

    #[test]
    fn refuse_is_fatal() {
        let mut w = worker(2, 0);
        assert_eq!(
            w.handle_message(1, msg(1, 1, MessageKind::Refuse, "")),
            Err(WorkerError::Refused { peer: 1 })
        );
    }

    #[test]
    fn unknown_release_is_fatal() {
        let mut w = worker(2, 0);
        assert_eq!(
            w.handle_message(1, msg(1, 1, MessageKind::Release, "3")),
            Err(WorkerError::UnknownRelease { peer: 1, timestamp: 3 })
        );
    }

    #[test]
    fn second_outstanding_request_is_rejected() {
        let mut w = worker(2, 0);
        w.handle_message(1, msg(2, 1, MessageKind::Request, "1")).unwrap();
        assert_eq!(
            w.handle_message(1, msg(4, 1, MessageKind::Request, "3")),
            Err(WorkerError::DuplicateRequest {
                peer: 1,
                outstanding: Request::new(1, 1),
                incoming: Request::new(3, 1),
            })
        );
    }

    #[test]
    fn channel_must_match_sender() {
        let mut w = worker(3, 0);
        assert_eq!(
            w.handle_message(1, msg(1, 2, MessageKind::Grant, "1")),
            Err(WorkerError::SenderMismatch { channel: 1, declared: 2 })
        );
        assert_eq!(
            w.handle_message(0, msg(1, 0, MessageKind::Grant, "1")),
            Err(WorkerError::UnknownPeer(0))
        );
        assert_eq!(
            w.handle_message(7, msg(1, 7, MessageKind::Grant, "1")),
            Err(WorkerError::UnknownPeer(7))
        );
    }

    #[test]
    fn malformed_payload_is_fatal() {
        let mut w = worker(2, 0);
        assert!(matches!(
            w.handle_message(1, msg(1, 1, MessageKind::Request, "soon")),
            Err(WorkerError::InvalidPayload { peer: 1, kind: MessageKind::Request, .. })
        ));
    }

    #[test]
    fn attempts_are_bounded() {
        let mut w = Worker::new(peers(1), 0, 2, WorkerConfig::default()).unwrap();
        for _ in 0..2 {
            w.request_critical_section().unwrap();
            assert_eq!(w.poll_admission().len(), 1);
            w.exit_critical_section().unwrap();
        }

        assert!(!w.can_request());
        assert_eq!(w.decide(0.0), Ok(Vec::new()));
        assert_eq!(w.request_critical_section(), Err(WorkerError::AttemptsExhausted { max: 2 }));
    }

    #[test]
    fn decide_uses_probability() {
        let mut w = worker(2, 0);
        assert!(w.decide(0.9).unwrap().is_empty());
        assert_eq!(w.decide(0.1).unwrap().len(), 1);
        assert_eq!(
            w.request_critical_section(),
            Err(WorkerError::InvalidState {
                phase: Phase::Requesting,
                operation: "request the critical section"
            })
        );
    }

    #[test]
    fn snapshot_restores_operational_state() {
        let mut w = worker(3, 0);
        w.request_critical_section().unwrap();
        w.handle_message(1, msg(3, 1, MessageKind::Request, "2")).unwrap();
        w.handle_message(2, msg(5, 2, MessageKind::Grant, "1")).unwrap();

        let snapshot = w.to_snapshot();
        let bytes = snapshot.to_cbor().unwrap();
        let restored =
            Worker::from_snapshot(Snapshot::from_cbor(&bytes).unwrap(), WorkerConfig::default())
                .unwrap();

        assert_eq!(restored.to_snapshot(), snapshot);
        assert_eq!(restored.phase(), Phase::Requesting);
        assert_eq!(restored.current_request(), Some(Request::new(1, 0)));
        assert!(restored.log().unflushed().is_empty());
    }

    #[test]
    fn inconsistent_snapshots_rejected() {
        let base = Snapshot::bootstrap(peers(3), 0, 4);

        let mut out_of_range = base.clone();
        out_of_range.self_id = 3;

        let mut self_ack = base.clone();
        self_ack.acks = vec![0];

        let mut orphan_request = base.clone();
        orphan_request.queue = vec![Request::new(1, 0)];

        let mut missing_request = base.clone();
        missing_request.requesting = true;

        let mut both_flags = base.clone();
        both_flags.queue = vec![Request::new(1, 0)];
        both_flags.requesting = true;
        both_flags.in_critical_section = true;

        let mut stray_release = base.clone();
        stray_release.pending_releases = vec![Request::new(4, 1)];

        let mut two_outstanding = base.clone();
        two_outstanding.queue = vec![Request::new(1, 1), Request::new(3, 1)];

        let mut over_budget = base.clone();
        over_budget.attempts = 5;

        let mut repeated_release = base.clone();
        repeated_release.queue = vec![Request::new(1, 1), Request::new(2, 2)];
        repeated_release.pending_releases = vec![Request::new(2, 2), Request::new(2, 2)];

        let mut repeated_request = base.clone();
        repeated_request.queue = vec![Request::new(1, 1), Request::new(1, 1)];
        repeated_request.pending_releases = vec![Request::new(1, 1)];

        let mut empty = base;
        empty.peers.clear();

        for snapshot in [
            out_of_range,
            self_ack,
            orphan_request,
            missing_request,
            both_flags,
            stray_release,
            two_outstanding,
            over_budget,
            repeated_release,
            repeated_request,
            empty,
        ] {
            assert!(matches!(
                Worker::from_snapshot(snapshot, WorkerConfig::default()),
                Err(WorkerError::InvalidSnapshot(_))
            ));
        }
    }

    #[test]
    fn released_request_may_precede_an_outstanding_one() {
        let mut snapshot = Snapshot::bootstrap(peers(3), 0, 4);
        snapshot.queue = vec![Request::new(1, 2), Request::new(2, 1), Request::new(3, 1)];
        snapshot.pending_releases = vec![Request::new(2, 1)];

        assert!(Worker::from_snapshot(snapshot, WorkerConfig::default()).is_ok());
    }

    #[test]
    fn remote_timestamp_at_clock_limit_is_fatal() {
        let mut w = worker(2, 0);
        assert_eq!(
            w.handle_message(1, msg(Timestamp::MAX, 1, MessageKind::Grant, "1")),
            Err(WorkerError::ClockOverflow { peer: Some(1) })
        );
        assert_eq!(w.clock(), 0);
        assert!(w.log().is_empty());
    }

    #[test]
    fn exhausted_clock_cannot_send() {
        let mut snapshot = Snapshot::bootstrap(peers(2), 0, 4);
        snapshot.clock = Timestamp::MAX - 1;
        let mut w = Worker::from_snapshot(snapshot, WorkerConfig::default()).unwrap();

        // The enqueue tick reaches the limit, so the REQUEST send has no timestamp left.
        assert_eq!(w.request_critical_section(), Err(WorkerError::ClockOverflow { peer: None }));
    }
}
