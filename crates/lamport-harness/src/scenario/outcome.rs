//! Collected results of a cluster run.

use std::collections::BTreeMap;

use lamport_core::{RunReport, RuntimeError};
use lamport_proto::{EventLogEntry, ProcessId};

use crate::monitor::{Occupancy, Overlap};

/// Everything a cluster run produced, for oracles to inspect.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub(crate) results: BTreeMap<ProcessId, Result<RunReport, RuntimeError>>,
    pub(crate) logs: BTreeMap<ProcessId, Vec<EventLogEntry>>,
    pub(crate) occupancies: Vec<Occupancy>,
    pub(crate) overlaps: Vec<Overlap>,
}

impl Outcome {
    /// Processes that were launched.
    pub fn processes(&self) -> Vec<ProcessId> {
        self.results.keys().copied().collect()
    }

    /// Report of a process that ran to the end of its budget.
    pub fn report(&self, process: ProcessId) -> Option<&RunReport> {
        self.results.get(&process).and_then(|result| result.as_ref().ok())
    }

    /// Fatal error of a process that did not.
    pub fn error(&self, process: ProcessId) -> Option<&RuntimeError> {
        self.results.get(&process).and_then(|result| result.as_ref().err())
    }

    /// Reports of every process that completed.
    pub fn reports(&self) -> impl Iterator<Item = &RunReport> {
        self.results.values().filter_map(|result| result.as_ref().ok())
    }

    /// Event log written by `process`.
    pub fn log(&self, process: ProcessId) -> &[EventLogEntry] {
        self.logs.get(&process).map_or(&[], Vec::as_slice)
    }

    /// Every process's event log.
    pub fn logs(&self) -> &BTreeMap<ProcessId, Vec<EventLogEntry>> {
        &self.logs
    }

    /// Completed critical-section stays, in order of exit.
    pub fn occupancies(&self) -> &[Occupancy] {
        &self.occupancies
    }

    /// Overlapping critical-section entries.
    pub fn overlaps(&self) -> &[Overlap] {
        &self.overlaps
    }

    /// Sum of admissions over every completed process.
    pub fn total_admissions(&self) -> u32 {
        self.reports().map(|report| report.admissions).sum()
    }
}
