//! Lamport logical clock.
//!
//! # Invariants
//!
//! - The clock never decreases.
//! - After [`LamportClock::observe`] of `t`, the clock is strictly greater than
//!   `t`.
//! - An update that would overflow leaves the clock unchanged and returns
//!   `None`.

use lamport_proto::Timestamp;

/// Per-process logical clock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct LamportClock {
    value: Timestamp,
}

impl LamportClock {
    /// Clock starting at zero.
    pub const fn new() -> Self {
        Self { value: 0 }
    }

    /// Clock restored at `value`.
    pub const fn at(value: Timestamp) -> Self {
        Self { value }
    }

    /// Current value.
    pub const fn now(&self) -> Timestamp {
        self.value
    }

    /// Local event: advance by one and return the new value.
    pub fn tick(&mut self) -> Option<Timestamp> {
        self.value = self.value.checked_add(1)?;
        Some(self.value)
    }

    /// Merge a received timestamp: `max(clock + 1, received + 1)`.
    pub fn observe(&mut self, received: Timestamp) -> Option<Timestamp> {
        self.value = self.value.checked_add(1)?.max(received.checked_add(1)?);
        Some(self.value)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn tick_increments() {
        let mut clock = LamportClock::new();
        assert_eq!(clock.tick(), Some(1));
        assert_eq!(clock.tick(), Some(2));
    }

    #[test]
    fn observe_jumps_past_remote() {
        let mut clock = LamportClock::at(3);
        assert_eq!(clock.observe(10), Some(11));
    }

    #[test]
    fn observe_of_stale_timestamp_still_advances() {
        let mut clock = LamportClock::at(10);
        assert_eq!(clock.observe(2), Some(11));
    }

    #[test]
    fn observe_of_max_timestamp_fails_closed() {
        let mut clock = LamportClock::at(3);
        assert_eq!(clock.observe(Timestamp::MAX), None);
        assert_eq!(clock.now(), 3);
    }

    #[test]
    fn tick_at_max_fails_closed() {
        let mut clock = LamportClock::at(Timestamp::MAX);
        assert_eq!(clock.tick(), None);
        assert_eq!(clock.observe(0), None);
        assert_eq!(clock.now(), Timestamp::MAX);
    }

    proptest! {
        #[test]
        fn clock_is_monotonic(start in 0u64..1_000_000, events in prop::collection::vec(prop::option::of(0u64..2_000_000), 0..64)) {
            let mut clock = LamportClock::at(start);
            for event in events {
                let before = clock.now();
                match event {
                    Some(received) => {
                        let after = clock.observe(received).unwrap();
                        prop_assert!(after > received);
                        prop_assert!(after > before);
                    },
                    None => prop_assert_eq!(clock.tick(), Some(before + 1)),
                }
            }
        }
    }
}
