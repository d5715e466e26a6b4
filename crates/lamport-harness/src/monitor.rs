//! Critical-section occupancy monitor.
//!
//! Every simulated process shares one [`OccupancyMonitor`]. Its
//! [`MonitoredSection`] records when a process enters and leaves, in virtual
//! time, and counts every entry that happens while another process holds
//! the section. In a correct run that count stays at zero.

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use lamport_core::{CriticalSection, Environment};
use lamport_proto::{ProcessId, Request};
use tracing::error;

use crate::SimEnv;

/// One completed stay in the critical section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occupancy {
    /// Process that held the section
    pub process: ProcessId,
    /// Request it was admitted for
    pub request: Request,
    /// Virtual time of entry
    pub entered: Instant,
    /// Virtual time of exit
    pub left: Instant,
}

/// Two processes inside the section at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overlap {
    /// Process already inside
    pub holder: ProcessId,
    /// Process that entered anyway
    pub intruder: ProcessId,
}

#[derive(Debug, Default)]
struct State {
    inside: Vec<(ProcessId, Request, Instant)>,
    completed: Vec<Occupancy>,
    overlaps: Vec<Overlap>,
}

/// Shared record of who holds the critical section.
#[derive(Debug, Clone, Default)]
pub struct OccupancyMonitor {
    state: Arc<Mutex<State>>,
}

impl OccupancyMonitor {
    /// Empty monitor.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| {
            // Turmoil is single threaded. The mutex can only be poisoned if
            // another thread panics while holding the lock.
            unreachable!("occupancy mutex poisoned in single-threaded context: {}", e)
        })
    }

    /// Record `process` entering for `request` at `now`.
    pub fn enter(&self, process: ProcessId, request: Request, now: Instant) {
        let mut state = self.lock();
        let overlaps: Vec<Overlap> = state
            .inside
            .iter()
            .map(|&(holder, held, _)| {
                error!(holder, intruder = process, %held, %request, "critical section overlap");
                Overlap { holder, intruder: process }
            })
            .collect();
        state.overlaps.extend(overlaps);
        state.inside.push((process, request, now));
    }

    /// Record `process` leaving at `now`.
    pub fn leave(&self, process: ProcessId, now: Instant) {
        let mut state = self.lock();
        if let Some(index) = state.inside.iter().position(|(holder, ..)| *holder == process) {
            let (process, request, entered) = state.inside.remove(index);
            state.completed.push(Occupancy { process, request, entered, left: now });
        }
    }

    /// Completed stays, in order of exit.
    pub fn occupancies(&self) -> Vec<Occupancy> {
        self.lock().completed.clone()
    }

    /// Every overlap observed so far.
    pub fn overlaps(&self) -> Vec<Overlap> {
        self.lock().overlaps.clone()
    }

    /// Processes inside the section right now.
    pub fn holders(&self) -> Vec<ProcessId> {
        self.lock().inside.iter().map(|(process, ..)| *process).collect()
    }
}

/// Critical section that holds for a random virtual duration and reports to
/// an [`OccupancyMonitor`].
pub struct MonitoredSection {
    monitor: OccupancyMonitor,
    env: SimEnv,
    max_hold: Duration,
}

impl MonitoredSection {
    /// Section reporting to `monitor`, holding up to `max_hold`.
    pub fn new(monitor: OccupancyMonitor, env: SimEnv, max_hold: Duration) -> Self {
        Self { monitor, env, max_hold }
    }
}

#[async_trait]
impl CriticalSection for MonitoredSection {
    async fn execute(&mut self, process: ProcessId, request: Request) {
        self.monitor.enter(process, request, self.env.now());
        self.env.sleep(self.env.random_duration(self.max_hold)).await;
        self.monitor.leave(process, self.env.now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_stays_do_not_overlap() {
        let monitor = OccupancyMonitor::new();
        let t0 = Instant::now();

        monitor.enter(0, Request::new(1, 0), t0);
        monitor.leave(0, t0 + Duration::from_millis(5));
        monitor.enter(1, Request::new(3, 1), t0 + Duration::from_millis(6));
        monitor.leave(1, t0 + Duration::from_millis(9));

        assert!(monitor.overlaps().is_empty());
        assert!(monitor.holders().is_empty());

        let stays = monitor.occupancies();
        assert_eq!(stays.len(), 2);
        assert_eq!(stays[1].request, Request::new(3, 1));
        assert_eq!(stays[1].left - stays[1].entered, Duration::from_millis(3));
    }

    #[test]
    fn concurrent_entry_is_flagged() {
        let monitor = OccupancyMonitor::new();
        let now = Instant::now();

        monitor.enter(0, Request::new(1, 0), now);
        monitor.enter(2, Request::new(1, 2), now);

        assert_eq!(monitor.overlaps(), vec![Overlap { holder: 0, intruder: 2 }]);
        assert_eq!(monitor.holders(), vec![0, 2]);
    }

    #[test]
    fn section_runs_in_virtual_time() {
        let monitor = OccupancyMonitor::new();
        let mut sim = turmoil::Builder::new().build();

        let shared = monitor.clone();
        sim.client("node0", async move {
            let env = SimEnv::with_seed(3);
            let mut section = MonitoredSection::new(shared, env, Duration::from_millis(200));
            section.execute(0, Request::new(4, 0)).await;
            Ok(())
        });

        sim.run().expect("simulation failed");

        let stays = monitor.occupancies();
        assert_eq!(stays.len(), 1);
        assert!(stays[0].left - stays[0].entered <= Duration::from_millis(200));
    }
}
