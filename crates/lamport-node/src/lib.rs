//! One process of a Lamport mutual-exclusion cluster over TCP.
//!
//! The node reads its bootstrap snapshot, binds the listening endpoint named
//! at its own index of the peer table, establishes the full mesh and runs
//! the protocol until its budget expires. Protocol events are appended to
//! `<log-dir>/process_<id>.log`; diagnostics go through `tracing`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod env;
pub mod error;
pub mod section;
pub mod sink;
pub mod transport;

use std::path::Path;

pub use config::{Args, NodeOptions};
pub use env::SystemEnv;
pub use error::NodeError;
use lamport_core::{RunReport, runtime};
use lamport_proto::Snapshot;
pub use section::SleepSection;
pub use sink::FileSink;
use tracing::{Instrument, info, info_span};
pub use transport::TcpTransport;

/// Read and decode a snapshot file.
///
/// # Errors
///
/// `NodeError::Snapshot` if the file is unreadable or not a valid snapshot.
pub fn load_snapshot(path: &Path) -> Result<Snapshot, NodeError> {
    let fail = |reason: String| NodeError::Snapshot { path: path.to_path_buf(), reason };

    let bytes = std::fs::read(path).map_err(|e| fail(e.to_string()))?;
    Snapshot::from_cbor(&bytes).map_err(|e| fail(e.to_string()))
}

/// Run a node from its command-line arguments.
///
/// # Errors
///
/// Invalid settings, an unusable snapshot, a failed bind, or any fatal
/// bootstrap or protocol error.
pub async fn run(args: &Args) -> Result<RunReport, NodeError> {
    let options = args.options()?;
    let snapshot = load_snapshot(&args.snapshot)?;

    let address = snapshot
        .own_address()
        .ok_or_else(|| {
            NodeError::Config(format!(
                "process {} is not in the {}-entry peer table",
                snapshot.self_id,
                snapshot.peers.len()
            ))
        })?
        .to_string();

    let transport = TcpTransport::bind(&address)
        .await
        .map_err(|e| NodeError::Bind { address: address.clone(), reason: e.to_string() })?;

    serve(&transport, snapshot, &options).await
}

/// Run a node on an already bound transport.
///
/// # Errors
///
/// Any fatal bootstrap or protocol error, or an unusable log directory.
pub async fn serve(
    transport: &TcpTransport,
    snapshot: Snapshot,
    options: &NodeOptions,
) -> Result<RunReport, NodeError> {
    let process = snapshot.self_id;

    async move {
        let env = SystemEnv::from_entropy()?;
        let sink = FileSink::create(&options.log_dir, process)?;
        let section = SleepSection::new(env.clone(), options.max_hold);

        info!(
            address = ?transport.local_addr().ok(),
            log = %sink.path().display(),
            peers = snapshot.peers.len(),
            "node starting"
        );

        let report =
            runtime::launch(transport, env, snapshot, section, sink, &options.config).await?;

        info!(
            attempts = report.attempts,
            admissions = report.admissions,
            final_clock = report.final_clock,
            final_phase = ?report.final_phase,
            events = report.events,
            disconnected = ?report.disconnected,
            "run complete"
        );

        Ok::<_, NodeError>(report)
    }
    .instrument(info_span!("node", process))
    .await
}
