//! Request priority queue.
//!
//! A min-heap of [`Request`]s under the `(timestamp, requester)` total order.
//! The queue does not reject duplicates. The worker guarantees that a peer has
//! at most one outstanding request before inserting.

use std::{cmp::Reverse, collections::BinaryHeap};

use lamport_proto::{ProcessId, Request};

/// Local view of pending critical-section requests.
#[derive(Debug, Clone, Default)]
pub struct RequestQueue {
    heap: BinaryHeap<Reverse<Request>>,
}

impl RequestQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a request.
    pub fn insert(&mut self, request: Request) {
        self.heap.push(Reverse(request));
    }

    /// Smallest request, if any.
    pub fn peek(&self) -> Option<Request> {
        self.heap.peek().map(|Reverse(request)| *request)
    }

    /// Remove and return the smallest request.
    pub fn pop_min(&mut self) -> Option<Request> {
        self.heap.pop().map(|Reverse(request)| request)
    }

    /// Number of queued requests.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// True if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// True if `request` is queued.
    pub fn contains(&self, request: &Request) -> bool {
        self.heap.iter().any(|Reverse(queued)| queued == request)
    }

    /// Queued requests issued by `requester`, in no particular order.
    pub fn requests_from(&self, requester: ProcessId) -> impl Iterator<Item = Request> + '_ {
        self.heap
            .iter()
            .map(|Reverse(request)| *request)
            .filter(move |request| request.requester == requester)
    }

    /// All queued requests in ascending order.
    pub fn to_sorted_vec(&self) -> Vec<Request> {
        let mut requests: Vec<Request> = self.heap.iter().map(|Reverse(r)| *r).collect();
        requests.sort_unstable();
        requests
    }
}

impl FromIterator<Request> for RequestQueue {
    fn from_iter<I: IntoIterator<Item = Request>>(iter: I) -> Self {
        Self { heap: iter.into_iter().map(Reverse).collect() }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn empty_queue() {
        let mut queue = RequestQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.peek(), None);
        assert_eq!(queue.pop_min(), None);
    }

    #[test]
    fn tie_broken_by_requester() {
        let mut queue = RequestQueue::new();
        queue.insert(Request::new(5, 2));
        queue.insert(Request::new(5, 1));
        queue.insert(Request::new(6, 0));

        assert_eq!(queue.pop_min(), Some(Request::new(5, 1)));
        assert_eq!(queue.pop_min(), Some(Request::new(5, 2)));
        assert_eq!(queue.pop_min(), Some(Request::new(6, 0)));
    }

    #[test]
    fn membership_queries() {
        let queue: RequestQueue =
            [Request::new(3, 0), Request::new(7, 1), Request::new(9, 0)].into_iter().collect();

        assert!(queue.contains(&Request::new(7, 1)));
        assert!(!queue.contains(&Request::new(7, 0)));

        let mut from_zero: Vec<_> = queue.requests_from(0).collect();
        from_zero.sort_unstable();
        assert_eq!(from_zero, vec![Request::new(3, 0), Request::new(9, 0)]);
    }

    proptest! {
        #[test]
        fn pops_in_total_order(requests in prop::collection::vec((0u64..50, 0u32..8), 0..64)) {
            let mut queue: RequestQueue =
                requests.iter().map(|&(ts, id)| Request::new(ts, id)).collect();
            let sorted = queue.to_sorted_vec();

            let mut popped = Vec::new();
            while let Some(request) = queue.pop_min() {
                popped.push(request);
            }

            prop_assert_eq!(&popped, &sorted);
            prop_assert!(popped.windows(2).all(|w| w[0] <= w[1]));
        }
    }
}
