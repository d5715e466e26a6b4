//! Critical-section requests.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ProcessId, Timestamp};

/// A request to enter the critical section.
///
/// The derived ordering compares `timestamp` first and breaks ties by
/// `requester`. Field order is therefore load-bearing: this is the total order
/// every process uses to decide who goes next.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Request {
    /// Logical time at which the requester issued the request
    pub timestamp: Timestamp,
    /// Requesting process
    pub requester: ProcessId,
}

impl Request {
    /// Create a request.
    pub const fn new(timestamp: Timestamp, requester: ProcessId) -> Self {
        Self { timestamp, requester }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}, {}>", self.timestamp, self.requester)
    }
}
