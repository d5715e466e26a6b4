//! Turmoil-based Environment implementation for deterministic testing.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use lamport_core::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Simulation environment using turmoil's virtual time and a seeded RNG.
///
/// - **Virtual time**: `now()` returns turmoil's simulated time, advanced
///   instantly by `sleep()`
/// - **Seeded RNG**: request decisions, rests and hold times all draw from a
///   ChaCha20 stream, so a run is reproducible from its seed
///
/// Give every simulated process its own seed. Clones share the RNG stream.
///
/// # Panics
///
/// `now()` and `sleep()` panic outside a turmoil simulation.
#[derive(Clone)]
pub struct SimEnv {
    /// Shared across clones so they advance one sequence.
    /// Turmoil is single-threaded, so this Mutex never blocks.
    rng: Arc<Mutex<ChaCha20Rng>>,
}

impl SimEnv {
    /// SimEnv with seed 0.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// SimEnv with a specific seed.
    pub fn with_seed(seed: u64) -> Self {
        Self { rng: Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))) }
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SimEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        tokio::time::Instant::now().into()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn random_bytes(&self, dest: &mut [u8]) {
        self.rng
            .lock()
            .unwrap_or_else(|e| {
                // Turmoil is single threaded. The mutex can only be poisoned if
                // another thread panics while holding the lock.
                unreachable!("RNG mutex poisoned in single-threaded context: {}", e)
            })
            .fill_bytes(dest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleep_advances_virtual_time() {
        let mut sim = turmoil::Builder::new().build();

        sim.client("test", async {
            let env = SimEnv::new();

            let start = env.now();
            env.sleep(Duration::from_secs(5)).await;

            assert_eq!(env.now() - start, Duration::from_secs(5));
            Ok(())
        });

        sim.run().expect("simulation failed");
    }

    #[test]
    fn same_seed_same_decisions() {
        let draws = |seed: u64| -> Vec<u64> {
            let env = SimEnv::with_seed(seed);
            (0..16).map(|_| env.random_u64()).collect()
        };

        assert_eq!(draws(12345), draws(12345));
        assert_ne!(draws(12345), draws(54321));
    }

    #[test]
    fn clones_share_rng_state() {
        let first = SimEnv::with_seed(999);
        let second = first.clone();

        assert_ne!(first.random_u64(), second.random_u64());
    }

    #[test]
    fn rests_respect_the_bound() {
        let env = SimEnv::with_seed(7);
        let max = Duration::from_millis(300);

        let rests: Vec<Duration> = (0..256).map(|_| env.random_duration(max)).collect();

        assert!(rests.iter().all(|rest| *rest <= max));
        assert!(rests.iter().any(|rest| *rest > max / 2));
    }
}
