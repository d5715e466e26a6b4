//! Event sink shared between a simulated process and the test.

use std::{
    io,
    sync::{Arc, Mutex},
};

use lamport_core::EventSink;
use lamport_proto::EventLogEntry;

/// In-memory event log readable after the simulation ends.
///
/// Every appended entry is round-tripped through its text encoding, so a
/// record the codec cannot represent fails the run the way a file sink
/// would.
#[derive(Debug, Clone, Default)]
pub struct SharedLog {
    entries: Arc<Mutex<Vec<EventLogEntry>>>,
}

impl SharedLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything appended so far.
    pub fn entries(&self) -> Vec<EventLogEntry> {
        self.entries.lock().map(|entries| entries.clone()).unwrap_or_default()
    }
}

impl EventSink for SharedLog {
    fn append(&mut self, entry: &EventLogEntry) -> io::Result<()> {
        let line = entry.encode().map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let decoded =
            EventLogEntry::decode(&line).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        self.entries
            .lock()
            .map_err(|_| io::Error::other("event log mutex poisoned"))?
            .push(decoded);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use lamport_proto::{EventKind, MessageKind};

    use super::*;

    #[test]
    fn clones_see_the_same_entries() {
        let log = SharedLog::new();
        let mut writer = log.clone();

        writer.append(&EventLogEntry::new(3, EventKind::Send, 1, MessageKind::Request, "2")).unwrap();
        writer.append(&EventLogEntry::new(5, EventKind::Receive, 1, MessageKind::Grant, "2")).unwrap();

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].info, MessageKind::Grant);
    }

    #[test]
    fn unencodable_entry_is_rejected() {
        let mut log = SharedLog::new();
        let entry = EventLogEntry::new(1, EventKind::Send, 0, MessageKind::Request, "a:b");

        assert!(log.append(&entry).is_err());
        assert!(log.entries().is_empty());
    }
}
