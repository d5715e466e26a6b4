//! Cluster builder API.
//!
//! Provides a declarative API for constructing cluster simulations that
//! enforce the Oracle Pattern.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, Mutex},
    time::Duration,
};

use lamport_core::{Environment, NodeConfig, RunReport, RuntimeError, runtime};
use lamport_proto::{PeerAddr, ProcessId, Snapshot, snapshot::DEFAULT_MAX_ATTEMPTS};
use tracing::info;

use crate::{
    MonitoredSection, OccupancyMonitor, SharedLog, SimEnv, SimTransport,
    scenario::{OracleFn, Outcome},
};

/// Port every simulated process listens on.
pub const PORT: u16 = 7000;

/// Turmoil host name of `process`.
pub fn host_name(process: ProcessId) -> String {
    format!("node{process}")
}

/// Cluster builder.
///
/// Configure the cluster, then add an oracle to obtain a runnable scenario.
pub struct Cluster {
    size: u16,
    absent: BTreeSet<ProcessId>,
    late: BTreeMap<ProcessId, Duration>,
    seed: u64,
    max_attempts: u32,
    max_hold: Duration,
    latency: Option<(Duration, Duration)>,
    config: NodeConfig,
}

impl Cluster {
    /// Cluster of `size` processes with simulation-friendly defaults.
    pub fn new(size: u16) -> Self {
        let mut config = NodeConfig::default();
        config.worker.request_probability = 0.5;
        config.session.handshake_timeout = Some(Duration::from_secs(10));
        config.runtime.budget = Duration::from_secs(30);
        config.runtime.max_rest = Duration::from_millis(200);

        Self {
            size,
            absent: BTreeSet::new(),
            late: BTreeMap::new(),
            seed: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_hold: Duration::from_millis(100),
            latency: None,
            config,
        }
    }

    /// Seed for turmoil and every process's environment.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Critical-section requests each process may issue.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Wall-clock budget of every process, in virtual time.
    pub fn budget(mut self, budget: Duration) -> Self {
        self.config.runtime.budget = budget;
        self
    }

    /// Upper bound on the randomized rests of the run loop.
    pub fn max_rest(mut self, max_rest: Duration) -> Self {
        self.config.runtime.max_rest = max_rest;
        self
    }

    /// Upper bound on how long a process holds the critical section.
    pub fn max_hold(mut self, max_hold: Duration) -> Self {
        self.max_hold = max_hold;
        self
    }

    /// Chance that an idle process requests on a given iteration.
    pub fn request_probability(mut self, probability: f64) -> Self {
        self.config.worker.request_probability = probability;
        self
    }

    /// Bootstrap deadline; `None` waits forever.
    pub fn handshake_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.session.handshake_timeout = timeout;
        self
    }

    /// Per-segment network latency range.
    pub fn latency(mut self, min: Duration, max: Duration) -> Self {
        self.latency = Some((min, max));
        self
    }

    /// Keep `process` in the peer table but never start it.
    pub fn absent(mut self, process: ProcessId) -> Self {
        self.absent.insert(process);
        self
    }

    /// Start `process` only after `delay`, so its peers must retry.
    pub fn late(mut self, process: ProcessId, delay: Duration) -> Self {
        self.late.insert(process, delay);
        self
    }

    /// Set the oracle function and return a runnable cluster.
    ///
    /// The oracle is mandatory - you cannot run a cluster without
    /// verification.
    pub fn oracle(self, oracle: OracleFn) -> RunnableCluster {
        RunnableCluster { cluster: self, oracle }
    }

    fn peers(&self) -> Vec<PeerAddr> {
        (0..ProcessId::from(self.size)).map(|id| PeerAddr::new(host_name(id), PORT)).collect()
    }

    fn simulation_duration(&self) -> Duration {
        let bootstrap = self.config.session.handshake_timeout.unwrap_or(Duration::from_secs(60));
        let late = self.late.values().max().copied().unwrap_or_default();
        let runtime = &self.config.runtime;

        late + bootstrap + runtime.budget + self.max_hold + 4 * runtime.max_rest
            + Duration::from_secs(10)
    }
}

type Results = Arc<Mutex<BTreeMap<ProcessId, Result<RunReport, RuntimeError>>>>;

/// A cluster with an oracle function that can be executed.
pub struct RunnableCluster {
    cluster: Cluster,
    oracle: OracleFn,
}

impl RunnableCluster {
    /// Execute the cluster.
    ///
    /// Every present process binds its listener, bootstraps the mesh and
    /// runs until its budget expires. Once all of them have returned, the
    /// oracle is invoked on the collected [`Outcome`], which is also
    /// returned so callers can compare runs.
    pub fn run(self) -> Result<Outcome, String> {
        let cluster = self.cluster;
        let peers = cluster.peers();

        info!(
            processes = cluster.size,
            absent = ?cluster.absent,
            seed = cluster.seed,
            "starting cluster simulation"
        );

        let mut builder = turmoil::Builder::new();
        builder.simulation_duration(cluster.simulation_duration()).rng_seed(cluster.seed);
        if let Some((min, max)) = cluster.latency {
            builder.min_message_latency(min).max_message_latency(max);
        }
        let mut sim = builder.build();

        let monitor = OccupancyMonitor::new();
        let results: Results = Arc::default();
        let mut logs = BTreeMap::new();

        for snapshot in Snapshot::bootstrap_all(&peers, cluster.max_attempts) {
            let id = snapshot.self_id;

            if cluster.absent.contains(&id) {
                sim.host(host_name(id), || async {
                    std::future::pending::<turmoil::Result>().await
                });
                continue;
            }

            let log = SharedLog::new();
            logs.insert(id, log.clone());

            let env = SimEnv::with_seed(cluster.seed.wrapping_add(u64::from(id)));
            let section = MonitoredSection::new(monitor.clone(), env.clone(), cluster.max_hold);
            let config = cluster.config.clone();
            let results = Arc::clone(&results);
            let delay = cluster.late.get(&id).copied();

            sim.client(host_name(id), async move {
                if let Some(delay) = delay {
                    env.sleep(delay).await;
                }
                let transport = SimTransport::bind(&format!("0.0.0.0:{PORT}")).await?;
                let result = runtime::launch(&transport, env, snapshot, section, log, &config).await;

                results.lock().map_err(|_| "results mutex poisoned")?.insert(id, result);
                Ok(())
            });
        }

        sim.run().map_err(|e| format!("simulation failed: {e}"))?;

        let results = std::mem::take(
            &mut *results.lock().map_err(|_| "results mutex poisoned".to_string())?,
        );
        let logs = logs.into_iter().map(|(id, log)| (id, log.entries())).collect();
        let outcome = Outcome {
            results,
            logs,
            occupancies: monitor.occupancies(),
            overlaps: monitor.overlaps(),
        };

        (self.oracle)(&outcome)?;

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_requires_oracle() {
        // This should compile - oracle provided
        let _cluster = Cluster::new(2).oracle(Box::new(|_outcome| Ok(())));

        // This should NOT compile - no oracle
        // Cluster::new(2).run(); // ERROR: no method `run` on type `Cluster`
    }

    #[test]
    fn peers_are_addressed_by_host_name() {
        let peers = Cluster::new(3).peers();

        assert_eq!(peers.len(), 3);
        assert_eq!(peers[2].to_string(), "node2:7000");
    }

    #[test]
    fn simulation_outlasts_bootstrap_and_budget() {
        let cluster = Cluster::new(3).budget(Duration::from_secs(20));
        assert!(cluster.simulation_duration() > Duration::from_secs(30));
    }
}
