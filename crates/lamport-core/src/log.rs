//! Append-only event log.
//!
//! The worker appends one entry per SEND and RECEIVE. The runtime drains new
//! entries to an [`EventSink`] after every step; entries are never mutated or
//! reordered once appended.

use std::io;

use lamport_proto::EventLogEntry;

/// Destination for event-log entries.
pub trait EventSink {
    /// Append one entry.
    fn append(&mut self, entry: &EventLogEntry) -> io::Result<()>;

    /// Make appended entries durable.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl EventSink for Vec<EventLogEntry> {
    fn append(&mut self, entry: &EventLogEntry) -> io::Result<()> {
        self.push(entry.clone());
        Ok(())
    }
}

/// In-memory event log with a flush cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventLog {
    entries: Vec<EventLogEntry>,
    flushed: usize,
}

impl EventLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a log. Restored entries count as already flushed.
    pub fn from_entries(entries: Vec<EventLogEntry>) -> Self {
        let flushed = entries.len();
        Self { entries, flushed }
    }

    /// Append an entry.
    pub fn append(&mut self, entry: EventLogEntry) {
        self.entries.push(entry);
    }

    /// All entries in append order.
    pub fn entries(&self) -> &[EventLogEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing was logged.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries not yet written to a sink.
    pub fn unflushed(&self) -> &[EventLogEntry] {
        &self.entries[self.flushed..]
    }

    /// Write unflushed entries to `sink` and return how many were written.
    ///
    /// On error the cursor stays after the last entry the sink accepted.
    pub fn flush_to<K: EventSink + ?Sized>(&mut self, sink: &mut K) -> io::Result<usize> {
        let start = self.flushed;
        while let Some(entry) = self.entries.get(self.flushed) {
            sink.append(entry)?;
            self.flushed += 1;
        }
        if self.flushed > start {
            sink.flush()?;
        }
        Ok(self.flushed - start)
    }
}
