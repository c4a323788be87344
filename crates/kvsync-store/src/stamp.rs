//! Write timestamps.

use kvsync_core::Timestamp;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Issues wall-clock millisecond write timestamps, strictly increasing within
/// one store so two writes to the same store never tie.
#[derive(Debug, Default)]
pub struct WriteStamp {
    last: AtomicU64,
}

impl WriteStamp {
    /// Create a stamp source
    pub fn new() -> Self {
        Self::default()
    }

    /// Next write timestamp
    pub fn next(&self) -> Timestamp {
        let now = wall_clock_ms();
        let prev = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last.saturating_add(1)))
            })
            .unwrap_or(now);
        now.max(prev.saturating_add(1))
    }

    /// Ensure later stamps are greater than `seen` (used after replay)
    pub fn observe(&self, seen: Timestamp) {
        self.last.fetch_max(seen, Ordering::SeqCst);
    }
}

fn wall_clock_ms() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
