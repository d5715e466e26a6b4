//! Production environment.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use lamport_core::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::NodeError;

/// Tokio time and a ChaCha20 stream seeded once from OS entropy.
#[derive(Clone)]
pub struct SystemEnv {
    rng: Arc<Mutex<ChaCha20Rng>>,
}

impl SystemEnv {
    /// Seed from the operating system.
    ///
    /// # Errors
    ///
    /// `NodeError::Entropy` if the OS source is unavailable.
    pub fn from_entropy() -> Result<Self, NodeError> {
        let mut seed = [0u8; 32];
        getrandom::fill(&mut seed).map_err(|e| NodeError::Entropy(e.to_string()))?;
        Ok(Self::with_seed(seed))
    }

    /// Fixed seed, for reproducing a run.
    pub fn with_seed(seed: [u8; 32]) -> Self {
        Self { rng: Arc::new(Mutex::new(ChaCha20Rng::from_seed(seed))) }
    }
}

impl Environment for SystemEnv {
    type Instant = tokio::time::Instant;

    fn now(&self) -> Self::Instant {
        tokio::time::Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn random_bytes(&self, dest: &mut [u8]) {
        // A panic elsewhere cannot leave the generator half-updated.
        self.rng.lock().unwrap_or_else(std::sync::PoisonError::into_inner).fill_bytes(dest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entropy_seeds_differ() {
        let first = SystemEnv::from_entropy().unwrap();
        let second = SystemEnv::from_entropy().unwrap();

        assert_ne!(first.random_u64(), second.random_u64());
    }

    #[test]
    fn fixed_seed_is_reproducible() {
        let draws = || {
            let env = SystemEnv::with_seed([7; 32]);
            (0..8).map(|_| env.random_u64()).collect::<Vec<_>>()
        };
        assert_eq!(draws(), draws());
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_uses_tokio_time() {
        let env = SystemEnv::with_seed([1; 32]);
        let start = env.now();

        env.sleep(Duration::from_secs(3)).await;

        assert!(env.now() - start >= Duration::from_secs(3));
    }
}
