//! Length-prefixed framing.
//!
//! Layout on the wire:
//! `[length: 4 bytes, native-endian i32] + [payload: length bytes]`
//!
//! The length prefix is native-endian because every process of a run shares
//! one host architecture. Decoding is incremental: bytes accumulate in a
//! [`BytesMut`] until a whole frame is present, and nothing is consumed
//! before that.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::errors::{ProtocolError, Result};

/// Size of the length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Largest accepted payload (1 MiB).
///
/// Protocol messages are a few dozen bytes; anything near this limit signals a
/// corrupted stream.
pub const MAX_PAYLOAD_SIZE: usize = 1 << 20;

/// Append one frame carrying `payload` to `dst`.
///
/// # Errors
///
/// Returns [`ProtocolError::PayloadTooLarge`] if `payload` exceeds
/// [`MAX_PAYLOAD_SIZE`].
pub fn encode_frame(payload: &[u8], dst: &mut impl BufMut) -> Result<()> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooLarge { size: payload.len(), max: MAX_PAYLOAD_SIZE });
    }

    dst.put_slice(&(payload.len() as i32).to_ne_bytes());
    dst.put_slice(payload);

    Ok(())
}

/// Validate a length prefix and return the payload size it announces.
pub fn parse_length(prefix: [u8; LENGTH_PREFIX_SIZE]) -> Result<usize> {
    let length = i32::from_ne_bytes(prefix);
    if length < 0 {
        return Err(ProtocolError::NegativeLength(length));
    }

    let length = length as usize;
    if length > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooLarge { size: length, max: MAX_PAYLOAD_SIZE });
    }

    Ok(length)
}

/// Take one complete frame off the front of `src`.
///
/// Returns `Ok(None)` if the prefix or payload is not fully buffered yet; in
/// that case `src` is left untouched.
///
/// # Errors
///
/// Fails if the length prefix is negative or exceeds [`MAX_PAYLOAD_SIZE`].
/// The stream cannot be resynchronised after that.
pub fn decode_frame(src: &mut BytesMut) -> Result<Option<Bytes>> {
    let Some(prefix) = src.get(..LENGTH_PREFIX_SIZE) else {
        return Ok(None);
    };

    let mut header = [0u8; LENGTH_PREFIX_SIZE];
    header.copy_from_slice(prefix);
    let length = parse_length(header)?;

    if src.len() < LENGTH_PREFIX_SIZE + length {
        return Ok(None);
    }

    src.advance(LENGTH_PREFIX_SIZE);
    Ok(Some(src.split_to(length).freeze()))
}
