//! Arbitrary text through the record decoders.
//!
//! Anything that decodes must survive a re-encode unchanged.

#![no_main]

use lamport_proto::{EventLogEntry, Message};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(message) = Message::decode(text) {
        let encoded = message.encode().expect("decoded message re-encodes");
        assert_eq!(Message::decode(&encoded), Ok(message));
    }

    if let Ok(entry) = EventLogEntry::decode(text) {
        let encoded = entry.encode().expect("decoded entry re-encodes");
        assert_eq!(EventLogEntry::decode(&encoded), Ok(entry));
    }
});
