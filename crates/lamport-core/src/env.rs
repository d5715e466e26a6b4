//! Environment abstraction for deterministic testing.
//!
//! The runtime loop never reads the system clock or draws randomness itself.
//! Everything goes through [`Environment`], which is implemented twice:
//!
//! 1. `SimEnv` (lamport-harness): turmoil virtual time and a seeded RNG
//! 2. `SystemEnv` (lamport-node): tokio time and an RNG seeded from OS entropy
//!
//! # Invariants
//!
//! - Monotonicity: `now()` never goes backwards
//! - Determinism: given the same seed, `random_bytes()` yields the same
//!   sequence
//! - Isolation: implementations do not share global state

use std::time::Duration;

/// Time, sleep and randomness for the driver code.
pub trait Environment: Clone + Send + Sync + 'static {
    /// A point in time.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time.
    fn now(&self) -> Self::Instant;

    /// Sleep for `duration`.
    ///
    /// In simulation this advances virtual time without wall-clock delay.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fill `buffer` with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Uniform sample from `[0, 1)` with 53 bits of precision.
    fn random_unit(&self) -> f64 {
        (self.random_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Uniform duration in `[0, max]` at millisecond granularity.
    fn random_duration(&self, max: Duration) -> Duration {
        let max_ms = max.as_millis().min(u128::from(u64::MAX)) as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        match max_ms.checked_add(1) {
            Some(span) => Duration::from_millis(self.random_u64() % span),
            None => Duration::from_millis(self.random_u64()),
        }
    }
}
