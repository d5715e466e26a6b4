//! Stand-in critical section.

use std::time::Duration;

use async_trait::async_trait;
use lamport_core::{CriticalSection, Environment};
use lamport_proto::{ProcessId, Request};
use tracing::debug;

use crate::SystemEnv;

/// Holds the critical section for a random duration up to `max_hold`.
pub struct SleepSection {
    env: SystemEnv,
    max_hold: Duration,
}

impl SleepSection {
    /// Section drawing its hold times from `env`.
    pub fn new(env: SystemEnv, max_hold: Duration) -> Self {
        Self { env, max_hold }
    }
}

#[async_trait]
impl CriticalSection for SleepSection {
    async fn execute(&mut self, process: ProcessId, request: Request) {
        let hold = self.env.random_duration(self.max_hold);
        debug!(process, %request, ?hold, "holding critical section");
        self.env.sleep(hold).await;
    }
}
