//! Event log file.

use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use lamport_core::EventSink;
use lamport_proto::{EventLogEntry, ProcessId};

use crate::NodeError;

/// Writes one encoded entry per line to `<dir>/process_<id>.log`.
pub struct FileSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl FileSink {
    /// Log file for `process` inside `dir`.
    pub fn path_for(dir: &Path, process: ProcessId) -> PathBuf {
        dir.join(format!("process_{process}.log"))
    }

    /// Create (or truncate) the log file for `process`.
    ///
    /// # Errors
    ///
    /// `NodeError::EventLog` if the directory or file cannot be created.
    pub fn create(dir: &Path, process: ProcessId) -> Result<Self, NodeError> {
        let path = Self::path_for(dir, process);
        let fail = |err: io::Error| NodeError::EventLog { path: path.clone(), reason: err.to_string() };

        std::fs::create_dir_all(dir).map_err(fail)?;
        let file = File::create(&path).map_err(fail)?;

        Ok(Self { path, writer: BufWriter::new(file) })
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSink for FileSink {
    fn append(&mut self, entry: &EventLogEntry) -> io::Result<()> {
        let line = entry.encode().map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writeln!(self.writer, "{line}")
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Parse a log file written by [`FileSink`].
///
/// # Errors
///
/// I/O failures, or `InvalidData` for a line that does not decode.
pub fn read_log(path: &Path) -> io::Result<Vec<EventLogEntry>> {
    std::fs::read_to_string(path)?
        .lines()
        .map(|line| {
            EventLogEntry::decode(line).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
        })
        .collect()
}
