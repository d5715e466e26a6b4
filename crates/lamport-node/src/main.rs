//! Lamport mutual-exclusion node.
//!
//! ```text
//! lamport-node --snapshot node0.cbor --log-dir .display
//! ```

use std::process::ExitCode;

use clap::Parser;
use lamport_node::Args;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match lamport_node::run(&args).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, peer = ?err.peer(), "node failed");
            ExitCode::FAILURE
        },
    }
}
