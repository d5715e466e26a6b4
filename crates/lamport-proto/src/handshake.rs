//! Identity handshake sent as the first frame on every outbound connection.

use crate::{
    ProcessId,
    errors::{ProtocolError, Result},
};

/// Handshake payload: the connecting process's id.
///
/// Encoded as a 4-byte native-endian integer inside one frame. The receiving
/// side indexes the accepted connection by this id and only ever reads from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handshake {
    /// Id of the process that opened the connection
    pub process: ProcessId,
}

impl Handshake {
    /// Encoded size.
    pub const SIZE: usize = 4;

    /// Create a handshake announcing `process`.
    pub const fn new(process: ProcessId) -> Self {
        Self { process }
    }

    /// Payload bytes.
    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        self.process.to_ne_bytes()
    }

    /// Decode a handshake payload.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidHandshake`] unless `bytes` is exactly
    /// four bytes long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; Self::SIZE] =
            bytes.try_into().map_err(|_| ProtocolError::InvalidHandshake(bytes.len()))?;

        Ok(Self { process: ProcessId::from_ne_bytes(raw) })
    }
}
