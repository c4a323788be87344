//! Lamport-style scalar logical clock.
//!
//! `tick()` advances the counter for a locally originated event; `observe()`
//! folds in a remote timestamp so the counter stays ahead of everything this
//! site has produced or seen.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Logical timestamp carried by operations and versions.
pub type Timestamp = u64;

/// Monotonic scalar clock shared by the write path, the consumer and the
/// reconciliation engine.
#[derive(Debug)]
pub struct LogicalClock {
    counter: AtomicU64,
}

impl LogicalClock {
    /// Create a clock starting at `initial`.
    pub fn new(initial: Timestamp) -> Self {
        Self {
            counter: AtomicU64::new(initial),
        }
    }

    /// Create a clock seeded from wall-clock milliseconds.
    ///
    /// The clock is not persisted; after a restart the seed keeps new local
    /// timestamps in the same range as timestamps issued before it.
    pub fn from_wall_clock() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        Self::new(millis)
    }

    /// Advance for a local event and return the fresh timestamp.
    pub fn tick(&self) -> Timestamp {
        self.advance(|current| current.saturating_add(1))
    }

    /// Fold in a remote timestamp: `max(current, remote) + 1`.
    pub fn observe(&self, remote: Timestamp) -> Timestamp {
        self.advance(|current| current.max(remote).saturating_add(1))
    }

    /// Current value without advancing.
    pub fn now(&self) -> Timestamp {
        self.counter.load(Ordering::SeqCst)
    }

    fn advance(&self, next: impl Fn(Timestamp) -> Timestamp) -> Timestamp {
        let mut current = self.counter.load(Ordering::SeqCst);
        loop {
            let candidate = next(current);
            match self.counter.compare_exchange_weak(
                current,
                candidate,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return candidate,
                Err(actual) => current = actual,
            }
        }
    }
}

impl Default for LogicalClock {
    fn default() -> Self {
        Self::from_wall_clock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn tick_is_strictly_increasing() {
        let clock = LogicalClock::new(5);
        let a = clock.tick();
        let b = clock.tick();
        let c = clock.tick();
        assert!(a > 5);
        assert!(b > a);
        assert!(c > b);
        assert_eq!(clock.now(), 8);
    }

    #[test]
    fn observe_jumps_past_remote() {
        let clock = LogicalClock::new(5);
        assert_eq!(clock.observe(10), 11);
        assert_eq!(clock.now(), 11);
    }

    #[test]
    fn observe_of_stale_timestamp_still_advances() {
        let clock = LogicalClock::new(20);
        let before = clock.now();
        let after = clock.observe(3);
        assert_eq!(after, 21);
        assert!(after > before);
    }

    #[test]
    fn saturates_at_max() {
        let clock = LogicalClock::new(u64::MAX - 1);
        assert_eq!(clock.tick(), u64::MAX);
        assert_eq!(clock.tick(), u64::MAX);
        assert_eq!(clock.observe(u64::MAX), u64::MAX);
    }

    #[test]
    fn wall_clock_seed_is_nonzero() {
        assert!(LogicalClock::from_wall_clock().now() > 0);
    }

    #[test]
    fn concurrent_ticks_never_repeat() {
        let clock = Arc::new(LogicalClock::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let clock = Arc::clone(&clock);
                std::thread::spawn(move || (0..1000).map(|_| clock.tick()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 4000);
        assert_eq!(clock.now(), 4000);
    }
}
