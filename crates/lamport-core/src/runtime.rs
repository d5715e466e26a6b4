//! Control loop driving one worker over an established mesh.
//!
//! The runtime is the single owner of the [`Worker`]. Each iteration:
//!
//! 1. roll the request decision and broadcast REQUEST if it fires
//! 2. rest for a random duration
//! 3. for every peer in turn: handle at most one inbound message, then run the
//!    admission check
//! 4. run the admission check once more, so a process without peers is
//!    admitted too
//! 5. rest again
//!
//! Actions returned by the worker are executed in order. Entering the critical
//! section runs the caller's [`CriticalSection`] and then immediately exits
//! it, appending the RELEASE broadcast to the same action batch. New event-log
//! entries are flushed to the sink after every step, and once more before a
//! fatal error is returned.
//!
//! The loop stops once the wall-clock budget has elapsed, regardless of phase.
//! An in-flight request is abandoned and all outbound channels are shut down.

use std::{collections::VecDeque, time::Duration};

use async_trait::async_trait;
use lamport_proto::{Message, ProcessId, Request, Snapshot, Timestamp};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, trace, warn};

use crate::{
    env::Environment,
    error::RuntimeError,
    log::EventSink,
    mesh::Mesh,
    session::SessionConfig,
    transport::Transport,
    worker::{Phase, Worker, WorkerAction, WorkerConfig},
};

/// The protected resource.
#[async_trait]
pub trait CriticalSection: Send {
    /// Hold the critical section for `request`. Must terminate.
    async fn execute(&mut self, process: ProcessId, request: Request);
}

/// Run loop configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Wall-clock run time
    pub budget: Duration,
    /// Upper bound on each randomized rest
    pub max_rest: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { budget: Duration::from_secs(1000), max_rest: Duration::from_secs(5) }
    }
}

/// Everything a node needs besides its snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeConfig {
    /// Worker settings
    pub worker: WorkerConfig,
    /// Bootstrap settings
    pub session: SessionConfig,
    /// Run loop settings
    pub runtime: RuntimeConfig,
}

/// Per-process result of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Process id
    pub process: ProcessId,
    /// Critical-section requests issued
    pub attempts: u32,
    /// Times the critical section was entered
    pub admissions: u32,
    /// Logical clock at the end of the run
    pub final_clock: Timestamp,
    /// Phase when the budget expired
    pub final_phase: Phase,
    /// Event-log entries recorded
    pub events: usize,
    /// Peers whose channel failed during the run
    pub disconnected: Vec<ProcessId>,
}

/// Driver for one worker.
pub struct Runtime<E, S, C, K> {
    env: E,
    mesh: Mesh<S>,
    worker: Worker,
    section: C,
    sink: K,
    config: RuntimeConfig,
    admissions: u32,
}

impl<E, S, C, K> Runtime<E, S, C, K>
where
    E: Environment,
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    C: CriticalSection,
    K: EventSink + Send,
{
    /// Assemble a runtime from its parts.
    pub fn new(
        env: E,
        mesh: Mesh<S>,
        worker: Worker,
        section: C,
        sink: K,
        config: RuntimeConfig,
    ) -> Self {
        Self { env, mesh, worker, section, sink, config, admissions: 0 }
    }

    /// The worker being driven.
    pub fn worker(&self) -> &Worker {
        &self.worker
    }

    /// The event sink.
    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Run until the budget expires.
    ///
    /// # Errors
    ///
    /// Protocol violations, corrupt streams and sink failures end the run.
    /// Connection loss does not: the peer is skipped from then on.
    pub async fn run(&mut self) -> Result<RunReport, RuntimeError> {
        let start = self.env.now();
        let peers = self.mesh.peers();
        let process = self.worker.id();

        info!(process, peers = peers.len(), budget = ?self.config.budget, "run started");

        let outcome = self.iterate(start, &peers).await;
        let flushed = self.flush();
        if let Err(err) = outcome {
            warn!(process, error = %err, "run aborted");
            return Err(err);
        }
        flushed?;

        info!(process, phase = ?self.worker.phase(), "budget expired");

        self.mesh.close().await;
        self.flush()?;

        Ok(self.report())
    }

    async fn iterate(
        &mut self,
        start: E::Instant,
        peers: &[ProcessId],
    ) -> Result<(), RuntimeError> {
        self.rest().await;

        while self.env.now() - start < self.config.budget {
            let actions = self.worker.decide(self.env.random_unit())?;
            self.execute(actions).await?;
            self.flush()?;

            self.rest().await;

            for &peer in peers {
                self.poll_peer(peer).await?;
                self.admit().await?;
            }
            self.admit().await?;

            self.rest().await;
        }
        Ok(())
    }

    async fn admit(&mut self) -> Result<(), RuntimeError> {
        let actions = self.worker.poll_admission();
        self.execute(actions).await?;
        self.flush()
    }

    /// Summary of the run so far.
    pub fn report(&self) -> RunReport {
        RunReport {
            process: self.worker.id(),
            attempts: self.worker.attempts(),
            admissions: self.admissions,
            final_clock: self.worker.clock(),
            final_phase: self.worker.phase(),
            events: self.worker.log().len(),
            disconnected: self.mesh.broken_peers(),
        }
    }

    async fn poll_peer(&mut self, peer: ProcessId) -> Result<(), RuntimeError> {
        if self.mesh.is_broken(peer) {
            return Ok(());
        }

        match self.mesh.try_receive(peer) {
            Ok(Some(message)) => {
                trace!(process = self.worker.id(), peer, %message, "received");
                let actions = self.worker.handle_message(peer, message)?;
                self.execute(actions).await
            },
            Ok(None) => Ok(()),
            Err(err) if err.is_connection_loss() => {
                warn!(process = self.worker.id(), peer, error = %err, "lost connection to peer");
                Ok(())
            },
            Err(err) => Err(err.into()),
        }
    }

    async fn execute(&mut self, actions: Vec<WorkerAction>) -> Result<(), RuntimeError> {
        let mut pending: VecDeque<WorkerAction> = actions.into();

        while let Some(action) = pending.pop_front() {
            match action {
                WorkerAction::Send { to, message } => self.deliver(to, &message).await?,
                WorkerAction::EnterCriticalSection { request } => {
                    self.admissions += 1;
                    self.flush()?;
                    self.section.execute(self.worker.id(), request).await;
                    pending.extend(self.worker.exit_critical_section()?);
                },
            }
        }
        Ok(())
    }

    async fn deliver(&mut self, to: ProcessId, message: &Message) -> Result<(), RuntimeError> {
        if self.mesh.is_broken(to) {
            debug!(process = self.worker.id(), peer = to, "not sending to disconnected peer");
            return Ok(());
        }

        match self.mesh.send(to, message).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_connection_loss() => {
                warn!(process = self.worker.id(), peer = to, error = %err, "lost connection to peer");
                Ok(())
            },
            Err(err) => Err(err.into()),
        }
    }

    fn flush(&mut self) -> Result<(), RuntimeError> {
        self.worker
            .log_mut()
            .flush_to(&mut self.sink)
            .map(|_| ())
            .map_err(|err| RuntimeError::Sink(err.to_string()))
    }

    async fn rest(&self) {
        let pause = self.env.random_duration(self.config.max_rest);
        self.env.sleep(pause).await;
    }
}

/// Restore a worker from `snapshot`, bootstrap its mesh and run it.
///
/// # Errors
///
/// Fails on an invalid snapshot, a bootstrap failure, or any fatal error
/// during the run.
pub async fn launch<T, E, C, K>(
    transport: &T,
    env: E,
    snapshot: Snapshot,
    section: C,
    sink: K,
    config: &NodeConfig,
) -> Result<RunReport, RuntimeError>
where
    T: Transport,
    E: Environment,
    C: CriticalSection,
    K: EventSink + Send,
{
    let worker = Worker::from_snapshot(snapshot, config.worker)?;
    let mesh =
        Mesh::establish(transport, &env, worker.peers(), worker.id(), &config.session).await?;

    let mut runtime = Runtime::new(env, mesh, worker, section, sink, config.runtime.clone());
    runtime.run().await
}
