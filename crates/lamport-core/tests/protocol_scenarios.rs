//! Protocol scenarios over an in-memory message router.
//!
//! Workers are driven directly, without a runtime. Every ordered pair of
//! processes has its own FIFO channel, and the test decides which channel
//! delivers next, so arbitrary interleavings can be explored.

use std::collections::{BTreeMap, VecDeque};

use lamport_core::{Phase, Worker, WorkerAction, WorkerConfig};
use lamport_proto::{Message, MessageKind, PeerAddr, ProcessId, Request, Snapshot};
use proptest::prelude::*;

struct Router {
    workers: Vec<Worker>,
    channels: BTreeMap<(ProcessId, ProcessId), VecDeque<Message>>,
    holder: Option<ProcessId>,
    admitted: Vec<Request>,
}

impl Router {
    fn new(n: u16, max_attempts: u32) -> Self {
        Self::with_clocks(&vec![0; n as usize], max_attempts)
    }

    fn with_clocks(clocks: &[u64], max_attempts: u32) -> Self {
        let peers: Vec<PeerAddr> =
            (0..clocks.len() as u16).map(|i| PeerAddr::new("node", 7000 + i)).collect();

        let workers = clocks
            .iter()
            .enumerate()
            .map(|(id, &clock)| {
                let mut snapshot = Snapshot::bootstrap(peers.clone(), id as ProcessId, max_attempts);
                snapshot.clock = clock;
                Worker::from_snapshot(snapshot, WorkerConfig::default()).unwrap()
            })
            .collect();

        Self { workers, channels: BTreeMap::new(), holder: None, admitted: Vec::new() }
    }

    fn size(&self) -> ProcessId {
        self.workers.len() as ProcessId
    }

    fn apply(&mut self, from: ProcessId, actions: Vec<WorkerAction>) {
        for action in actions {
            match action {
                WorkerAction::Send { to, message } => {
                    self.channels.entry((from, to)).or_default().push_back(message);
                },
                WorkerAction::EnterCriticalSection { request } => {
                    assert_eq!(self.holder, None, "{from} admitted while {:?} holds", self.holder);
                    self.holder = Some(from);
                    self.admitted.push(request);
                },
            }
        }
    }

    fn request(&mut self, id: ProcessId) {
        if self.workers[id as usize].can_request() {
            let actions = self.workers[id as usize].request_critical_section().unwrap();
            self.apply(id, actions);
        }
    }

    fn deliver(&mut self, from: ProcessId, to: ProcessId) -> bool {
        let Some(message) = self.channels.get_mut(&(from, to)).and_then(VecDeque::pop_front) else {
            return false;
        };
        let actions = self.workers[to as usize].handle_message(from, message).unwrap();
        self.apply(to, actions);
        true
    }

    fn admit(&mut self, id: ProcessId) -> bool {
        let actions = self.workers[id as usize].poll_admission();
        let admitted = !actions.is_empty();
        self.apply(id, actions);
        admitted
    }

    fn exit(&mut self) -> bool {
        let Some(holder) = self.holder.take() else {
            return false;
        };
        let actions = self.workers[holder as usize].exit_critical_section().unwrap();
        self.apply(holder, actions);
        true
    }

    fn next_channel(&self) -> Option<(ProcessId, ProcessId)> {
        self.channels.iter().find(|(_, queue)| !queue.is_empty()).map(|(&pair, _)| pair)
    }

    /// Deliver every message and run every admitted section to completion.
    fn settle(&mut self) {
        loop {
            let mut progressed = false;
            while let Some((from, to)) = self.next_channel() {
                progressed |= self.deliver(from, to);
            }
            for id in 0..self.size() {
                progressed |= self.admit(id);
            }
            progressed |= self.exit();
            if !progressed {
                break;
            }
        }
    }

    fn queue_of(&self, id: ProcessId) -> Vec<Request> {
        self.workers[id as usize].queue().to_sorted_vec()
    }
}

#[test]
fn single_requester_round_trip() {
    let mut router = Router::with_clocks(&[4, 0, 0], 4);

    router.request(0);
    assert_eq!(
        router.channels[&(0, 1)].front(),
        Some(&Message::new(6, 0, MessageKind::Request, "5"))
    );
    assert_eq!(router.workers[0].current_request(), Some(Request::new(5, 0)));

    assert!(router.deliver(0, 1));
    assert!(router.deliver(0, 2));
    assert_eq!(router.queue_of(1), vec![Request::new(5, 0)]);
    assert_eq!(router.queue_of(2), vec![Request::new(5, 0)]);

    assert!(router.deliver(1, 0));
    assert!(!router.admit(0));
    assert!(router.deliver(2, 0));
    assert!(router.admit(0));
    assert_eq!(router.admitted, vec![Request::new(5, 0)]);

    assert!(router.exit());
    let release = router.channels[&(0, 1)].front().cloned().unwrap();
    assert_eq!(release.kind, MessageKind::Release);
    assert_eq!(release.payload, "5");

    router.settle();
    assert!(router.queue_of(0).is_empty());
    assert!(router.queue_of(1).is_empty());
    assert!(router.queue_of(2).is_empty());
}

#[test]
fn equal_timestamps_favour_lower_id() {
    let mut router = Router::with_clocks(&[0, 4, 4], 4);

    router.request(1);
    router.request(2);
    assert_eq!(router.workers[1].current_request(), Some(Request::new(5, 1)));
    assert_eq!(router.workers[2].current_request(), Some(Request::new(5, 2)));

    while let Some((from, to)) = router.next_channel() {
        router.deliver(from, to);
    }
    for id in 0..3 {
        assert_eq!(router.queue_of(id), vec![Request::new(5, 1), Request::new(5, 2)]);
    }

    assert!(!router.admit(2));
    assert!(router.admit(1));

    router.exit();
    router.settle();
    assert_eq!(router.admitted, vec![Request::new(5, 1), Request::new(5, 2)]);
}

#[test]
fn duplicate_grants_count_once() {
    let mut router = Router::new(3, 4);
    router.request(0);
    router.deliver(0, 1);

    let grant = router.channels[&(1, 0)].front().cloned().unwrap();
    router.channels.get_mut(&(1, 0)).unwrap().push_back(grant);
    router.deliver(1, 0);
    router.deliver(1, 0);

    assert_eq!(router.workers[0].acks().len(), 1);
    assert!(!router.admit(0));
}

#[test]
fn release_overtaking_head_is_applied_later() {
    // Traffic from 0 to 2 is slow, so 2 sees 1's release while 0's older
    // request still heads its queue. The release must be parked, not dropped.
    let mut router = Router::new(3, 4);
    router.request(0);
    router.deliver(0, 1);
    router.deliver(0, 2);

    router.request(1);
    let second = router.workers[1].current_request().unwrap();
    router.deliver(1, 2);
    router.deliver(2, 1);
    while router.deliver(1, 0) {}
    router.deliver(2, 0);

    assert!(router.admit(0));
    assert!(router.exit());

    while router.deliver(0, 1) {}
    assert!(router.admit(1));
    assert!(router.exit());

    router.deliver(1, 2);
    assert_eq!(router.queue_of(2), vec![Request::new(1, 0), second]);

    router.deliver(0, 2);
    assert!(router.queue_of(2).is_empty());

    router.settle();
    assert_eq!(router.admitted, vec![Request::new(1, 0), second]);
    for id in 0..3 {
        assert!(router.queue_of(id).is_empty(), "process {id} queue not drained");
        assert_eq!(router.workers[id as usize].phase(), Phase::Idle);
    }
}

#[derive(Debug, Clone)]
enum Op {
    Deliver(ProcessId, ProcessId),
    Request(ProcessId),
    Admit(ProcessId),
    Exit,
}

fn op(n: ProcessId) -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..n, 0..n).prop_map(|(from, to)| Op::Deliver(from, to)),
        1 => (0..n).prop_map(Op::Request),
        1 => (0..n).prop_map(Op::Admit),
        1 => Just(Op::Exit),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn mutual_exclusion_under_any_interleaving(
        n in 2u16..5,
        ops in prop::collection::vec(op(4), 0..300),
    ) {
        let mut router = Router::new(n, 3);
        let size = router.size();

        for op in ops {
            match op {
                Op::Deliver(from, to) if from < size && to < size => {
                    router.deliver(from, to);
                },
                Op::Request(id) if id < size => router.request(id),
                Op::Admit(id) if id < size => {
                    router.admit(id);
                },
                Op::Exit => {
                    router.exit();
                },
                _ => {},
            }
        }
        router.settle();

        // Every request issued was eventually served, in total order.
        let attempts: u32 = router.workers.iter().map(Worker::attempts).sum();
        prop_assert_eq!(router.admitted.len(), attempts as usize);
        prop_assert!(router.admitted.windows(2).all(|w| w[0] < w[1]));

        for worker in &router.workers {
            prop_assert!(worker.queue().is_empty());
            prop_assert_eq!(worker.phase(), Phase::Idle);

            let entries = worker.log().entries();
            prop_assert!(entries.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        }
    }
}
