//! Protocol messages exchanged between peers.
//!
//! Text form: `timestamp:sender:kind:payload`. The payload is opaque to the
//! codec; the protocol uses it to carry the timestamp of the request a
//! REQUEST, GRANT or RELEASE refers to.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    ProcessId, Timestamp,
    errors::{ProtocolError, Result},
    fields,
};

/// Kind of a protocol message.
///
/// REFUSE is part of the vocabulary but never legitimately emitted by this
/// algorithm. It decodes so that the state machine can reject it explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageKind {
    /// Ask every peer for permission to enter the critical section
    Request,
    /// Acknowledge a peer's request
    Grant,
    /// Announce that the critical section has been left
    Release,
    /// Reserved, never sent
    Refuse,
}

impl MessageKind {
    /// Canonical text form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Request => "REQUEST",
            Self::Grant => "GRANT",
            Self::Release => "RELEASE",
            Self::Refuse => "REFUSE",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "REQUEST" => Ok(Self::Request),
            "GRANT" => Ok(Self::Grant),
            "RELEASE" => Ok(Self::Release),
            "REFUSE" => Ok(Self::Refuse),
            other => Err(ProtocolError::UnknownMessageKind(other.to_string())),
        }
    }
}

/// A protocol message.
///
/// # Invariants
///
/// - `payload` never contains [`crate::FIELD_DELIMITER`]. This is enforced by
///   [`Message::encode`] rather than the constructor so that decoding and
///   construction stay symmetric.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Message {
    /// Sender's logical clock at send time
    pub timestamp: Timestamp,
    /// Sending process
    pub sender: ProcessId,
    /// Message kind
    pub kind: MessageKind,
    /// Opaque payload
    pub payload: String,
}

impl Message {
    /// Number of fields in the text form.
    pub const FIELDS: usize = 4;

    /// Create a message.
    pub fn new(
        timestamp: Timestamp,
        sender: ProcessId,
        kind: MessageKind,
        payload: impl Into<String>,
    ) -> Self {
        Self { timestamp, sender, kind, payload: payload.into() }
    }

    /// Encode as `timestamp:sender:kind:payload`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::DelimiterInPayload`] if the payload contains a
    /// colon.
    pub fn encode(&self) -> Result<String> {
        fields::check_payload(&self.payload)?;
        Ok(format!("{}:{}:{}:{}", self.timestamp, self.sender, self.kind, self.payload))
    }

    /// Decode from the text form.
    ///
    /// # Errors
    ///
    /// Fails closed on a field count other than four, a non-numeric timestamp
    /// or sender, or an unknown kind.
    pub fn decode(text: &str) -> Result<Self> {
        let [timestamp, sender, kind, payload] = fields::split("message", text)?;

        Ok(Self {
            timestamp: fields::parse("timestamp", timestamp)?,
            sender: fields::parse("sender", sender)?,
            kind: kind.parse()?,
            payload: payload.to_string(),
        })
    }

    /// Decode from raw frame payload bytes.
    pub fn decode_bytes(bytes: &[u8]) -> Result<Self> {
        Self::decode(fields::utf8(bytes)?)
    }

    /// Interpret the payload as the timestamp of the request it refers to.
    pub fn request_timestamp(&self) -> Result<Timestamp> {
        fields::parse("request timestamp", &self.payload)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}:{}", self.timestamp, self.sender, self.kind, self.payload)
    }
}
