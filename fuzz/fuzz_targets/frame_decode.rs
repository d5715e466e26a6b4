//! Arbitrary bytes through the frame decoder and then the message decoder.
//!
//! Every complete frame must be consumed exactly, and nothing may panic.

#![no_main]

use bytes::BytesMut;
use lamport_proto::{Message, frame};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut buf = BytesMut::from(data);

    loop {
        let before = buf.len();
        match frame::decode_frame(&mut buf) {
            Ok(Some(payload)) => {
                assert_eq!(before - buf.len(), frame::LENGTH_PREFIX_SIZE + payload.len());
                let _ = Message::decode_bytes(&payload);
            },
            Ok(None) => {
                assert_eq!(buf.len(), before);
                break;
            },
            Err(_) => break,
        }
    }
});
