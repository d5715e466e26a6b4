//! Event-log entries.
//!
//! Every SEND and RECEIVE of a protocol message is recorded in the owning
//! process's append-only log. Text form: `timestamp:event:peer:info:payload`.
//! Entries are consumed by post-run ordering verification and are never put
//! on the wire.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    MessageKind, ProcessId, Timestamp,
    errors::{ProtocolError, Result},
    fields,
};

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A message was sent to `peer`
    Send,
    /// A message was received from `peer`
    Receive,
    /// Reserved for local computation, never recorded by this protocol
    Compute,
}

impl EventKind {
    /// Canonical text form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Send => "SEND",
            Self::Receive => "RECEIVE",
            Self::Compute => "COMPUTE",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "SEND" => Ok(Self::Send),
            "RECEIVE" => Ok(Self::Receive),
            "COMPUTE" => Ok(Self::Compute),
            other => Err(ProtocolError::UnknownEventKind(other.to_string())),
        }
    }
}

/// One entry of a process's event log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventLogEntry {
    /// Owner's logical clock after the event
    pub timestamp: Timestamp,
    /// Event kind
    pub event: EventKind,
    /// Destination for SEND, source for RECEIVE
    pub peer: ProcessId,
    /// Kind of the message involved
    pub info: MessageKind,
    /// Payload of the message involved
    pub payload: String,
}

impl EventLogEntry {
    /// Number of fields in the text form.
    pub const FIELDS: usize = 5;

    /// Create an entry.
    pub fn new(
        timestamp: Timestamp,
        event: EventKind,
        peer: ProcessId,
        info: MessageKind,
        payload: impl Into<String>,
    ) -> Self {
        Self { timestamp, event, peer, info, payload: payload.into() }
    }

    /// Encode as `timestamp:event:peer:info:payload`.
    pub fn encode(&self) -> Result<String> {
        fields::check_payload(&self.payload)?;
        Ok(format!(
            "{}:{}:{}:{}:{}",
            self.timestamp, self.event, self.peer, self.info, self.payload
        ))
    }

    /// Decode from the text form.
    pub fn decode(text: &str) -> Result<Self> {
        let [timestamp, event, peer, info, payload] = fields::split("event log entry", text)?;

        Ok(Self {
            timestamp: fields::parse("timestamp", timestamp)?,
            event: event.parse()?,
            peer: fields::parse("peer", peer)?,
            info: info.parse()?,
            payload: payload.to_string(),
        })
    }

    /// Human-readable rendering from the point of view of `owner`.
    ///
    /// Requests are written as `<timestamp, requester>`.
    pub fn describe(&self, owner: ProcessId) -> String {
        let Self { timestamp, peer, payload, .. } = self;

        match (self.event, self.info) {
            (EventKind::Send, MessageKind::Request) => {
                format!("{timestamp} request <{payload}, {owner}>")
            },
            (EventKind::Send, MessageKind::Grant) => {
                format!("{timestamp} reply {owner} to <{payload}, {peer}>")
            },
            (EventKind::Send, MessageKind::Release) => {
                format!("{timestamp} release <{payload}, {owner}> to {peer}")
            },
            (EventKind::Receive, MessageKind::Request) => {
                format!("{timestamp} recv <{payload}, {peer}>")
            },
            (EventKind::Receive, MessageKind::Grant) => {
                format!("{timestamp} recv reply from {peer} for <{payload}, {owner}>")
            },
            (EventKind::Receive, MessageKind::Release) => {
                format!("{timestamp} recv release <{payload}, {peer}>")
            },
            (event, info) => format!("{timestamp} {event} {info} peer {peer} payload {payload:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_text_form() {
        let entry = EventLogEntry::new(7, EventKind::Send, 2, MessageKind::Request, "5");
        insta::assert_snapshot!(entry.encode().unwrap(), @"7:SEND:2:REQUEST:5");
        assert_eq!(EventLogEntry::decode("7:SEND:2:REQUEST:5").unwrap(), entry);
    }

    #[test]
    fn compute_decodes() {
        let entry = EventLogEntry::decode("1:COMPUTE:0:GRANT:").unwrap();
        assert_eq!(entry.event, EventKind::Compute);
    }

    #[test]
    fn schema_is_enforced() {
        assert_eq!(
            EventLogEntry::decode("7:SEND:2:REQUEST"),
            Err(ProtocolError::FieldCount { record: "event log entry", expected: 5, actual: 4 })
        );
        assert_eq!(
            EventLogEntry::decode("7:SENT:2:REQUEST:5"),
            Err(ProtocolError::UnknownEventKind("SENT".into()))
        );
        assert!(matches!(
            EventLogEntry::decode("7:SEND:two:REQUEST:5"),
            Err(ProtocolError::InvalidField { field: "peer", .. })
        ));
    }

    #[test]
    fn describe_matches_protocol_vocabulary() {
        let send = EventLogEntry::new(6, EventKind::Send, 1, MessageKind::Request, "5");
        assert_eq!(send.describe(0), "6 request <5, 0>");

        let reply = EventLogEntry::new(9, EventKind::Send, 0, MessageKind::Grant, "5");
        assert_eq!(reply.describe(1), "9 reply 1 to <5, 0>");

        let release = EventLogEntry::new(12, EventKind::Receive, 0, MessageKind::Release, "5");
        assert_eq!(release.describe(2), "12 recv release <5, 0>");
    }
}
