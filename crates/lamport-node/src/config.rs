//! Command-line configuration.

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use lamport_core::{NodeConfig, RuntimeConfig, SessionConfig, WorkerConfig};

use crate::NodeError;

/// Longest accepted rest or hold, in milliseconds (one day).
pub const MAX_PAUSE_MS: u64 = 24 * 60 * 60 * 1000;

/// One process of a Lamport mutual-exclusion cluster.
#[derive(Debug, Clone, Parser)]
#[command(name = "lamport-node", version, about, long_about = None)]
pub struct Args {
    /// Bootstrap snapshot (CBOR) for this process
    #[arg(long)]
    pub snapshot: PathBuf,

    /// Directory that receives `process_<id>.log`
    #[arg(long, default_value = ".")]
    pub log_dir: PathBuf,

    /// Wall-clock run time in seconds
    #[arg(long, default_value_t = 1000)]
    pub budget_secs: u64,

    /// Upper bound on each randomized rest, in milliseconds
    #[arg(long, default_value_t = 5000, value_parser = clap::value_parser!(u64).range(..=MAX_PAUSE_MS))]
    pub max_rest_ms: u64,

    /// Upper bound on each stay in the critical section, in milliseconds
    #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(..=MAX_PAUSE_MS))]
    pub max_hold_ms: u64,

    /// Chance of requesting the critical section on an idle iteration
    #[arg(long, default_value_t = 0.3)]
    pub request_probability: f64,

    /// Bootstrap deadline in seconds; 0 waits forever
    #[arg(long, default_value_t = 30)]
    pub handshake_timeout_secs: u64,

    /// Delay between connect attempts, in milliseconds
    #[arg(long, default_value_t = 100)]
    pub connect_retry_ms: u64,

    /// Log filter used when `RUST_LOG` is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Validated settings for one node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeOptions {
    /// Protocol, bootstrap and run loop settings
    pub config: NodeConfig,
    /// Upper bound on each stay in the critical section
    pub max_hold: Duration,
    /// Event log directory
    pub log_dir: PathBuf,
}

impl Args {
    /// Validate the arguments.
    ///
    /// # Errors
    ///
    /// `NodeError::Config` naming the first setting out of range.
    pub fn options(&self) -> Result<NodeOptions, NodeError> {
        if !(0.0..=1.0).contains(&self.request_probability) {
            return Err(NodeError::Config(format!(
                "request probability {} is outside [0, 1]",
                self.request_probability
            )));
        }
        if self.budget_secs == 0 {
            return Err(NodeError::Config("budget must be at least one second".into()));
        }
        if self.max_rest_ms > MAX_PAUSE_MS || self.max_hold_ms > MAX_PAUSE_MS {
            return Err(NodeError::Config(format!(
                "rests and holds are limited to {MAX_PAUSE_MS} ms"
            )));
        }
        if self.connect_retry_ms == 0 {
            return Err(NodeError::Config("connect retry interval must be positive".into()));
        }

        let handshake_timeout = match self.handshake_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(NodeOptions {
            config: NodeConfig {
                worker: WorkerConfig { request_probability: self.request_probability },
                session: SessionConfig {
                    handshake_timeout,
                    connect_retry_interval: Duration::from_millis(self.connect_retry_ms),
                },
                runtime: RuntimeConfig {
                    budget: Duration::from_secs(self.budget_secs),
                    max_rest: Duration::from_millis(self.max_rest_ms),
                },
            },
            max_hold: Duration::from_millis(self.max_hold_ms),
            log_dir: self.log_dir.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["lamport-node", "--snapshot", "node0.cbor"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_match_the_protocol_defaults() {
        let options = parse(&[]).options().unwrap();

        assert_eq!(options.config, NodeConfig::default());
        assert_eq!(options.max_hold, Duration::from_secs(1));
        assert_eq!(options.log_dir, PathBuf::from("."));
    }

    #[test]
    fn zero_handshake_timeout_waits_forever() {
        let options = parse(&["--handshake-timeout-secs", "0"]).options().unwrap();
        assert_eq!(options.config.session.handshake_timeout, None);
    }

    #[test]
    fn out_of_range_probability_is_rejected() {
        let err = parse(&["--request-probability", "1.5"]).options().unwrap_err();
        assert!(matches!(err, NodeError::Config(_)), "{err}");

        assert!(parse(&["--request-probability", "NaN"]).options().is_err());
    }

    #[test]
    fn zero_budget_is_rejected() {
        assert!(parse(&["--budget-secs", "0"]).options().is_err());
    }

    #[test]
    fn absurd_pauses_are_rejected() {
        let max = u64::MAX.to_string();
        for flag in ["--max-rest-ms", "--max-hold-ms"] {
            let argv = ["lamport-node", "--snapshot", "s", flag, max.as_str()];
            assert!(Args::try_parse_from(argv).is_err(), "{flag}");
        }

        let mut args = parse(&[]);
        args.max_hold_ms = u64::MAX;
        assert!(matches!(args.options(), Err(NodeError::Config(_))));

        let longest = MAX_PAUSE_MS.to_string();
        assert!(parse(&["--max-rest-ms", &longest]).options().is_ok());
    }

    #[test]
    fn snapshot_is_required() {
        assert!(Args::try_parse_from(["lamport-node"]).is_err());
    }
}
