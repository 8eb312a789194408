//! Hash table statistics.

use parking_lot::Mutex;
use std::fmt::{self, Debug};

/// A point-in-time copy of the hash table statistics.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct HashStatsSnapshot {
    hash_power_level: u32,
    hash_bytes: u64,
    hash_is_expanding: bool,
    expansions_completed: u64,
}

impl Debug for HashStatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashStatsSnapshot")
            .field("hash_power_level", &self.hash_power_level)
            .field("hash_bytes", &self.hash_bytes)
            .field("hash_is_expanding", &self.hash_is_expanding)
            .field("expansions_completed", &self.expansions_completed)
            .finish()
    }
}

impl HashStatsSnapshot {
    /// The power of two of the primary bucket array.
    pub fn hash_power_level(&self) -> u32 {
        self.hash_power_level
    }

    /// Bytes used by the bucket arrays. While the table is expanding, this
    /// counts both the old and the new array.
    pub fn hash_bytes(&self) -> u64 {
        self.hash_bytes
    }

    pub fn hash_is_expanding(&self) -> bool {
        self.hash_is_expanding
    }

    pub fn expansions_completed(&self) -> u64 {
        self.expansions_completed
    }
}

/// Collects the hash table statistics.
///
/// The counters are updated together under one lock, so a snapshot never shows
/// a power level and a byte count from different table states.
#[derive(Default)]
pub struct HashStats {
    state: Mutex<HashStatsSnapshot>,
}

impl HashStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> HashStatsSnapshot {
        *self.state.lock()
    }

    pub(crate) fn record_init(&self, power: u32, bytes: u64) {
        let mut s = self.state.lock();
        s.hash_power_level = power;
        s.hash_bytes = bytes;
    }

    pub(crate) fn record_expand_started(&self, new_power: u32, new_bytes: u64) {
        let mut s = self.state.lock();
        s.hash_power_level = new_power;
        s.hash_bytes = s.hash_bytes.saturating_add(new_bytes);
        s.hash_is_expanding = true;
    }

    pub(crate) fn record_expand_done(&self, old_bytes: u64) {
        let mut s = self.state.lock();
        s.hash_bytes = s.hash_bytes.saturating_sub(old_bytes);
        s.hash_is_expanding = false;
        s.expansions_completed = s.expansions_completed.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::HashStats;

    #[test]
    fn expansion_cycle() {
        let stats = HashStats::new();
        stats.record_init(2, 16);
        let s = stats.snapshot();
        assert_eq!(s.hash_power_level(), 2);
        assert_eq!(s.hash_bytes(), 16);
        assert!(!s.hash_is_expanding());

        stats.record_expand_started(3, 32);
        let s = stats.snapshot();
        assert_eq!(s.hash_power_level(), 3);
        assert_eq!(s.hash_bytes(), 48);
        assert!(s.hash_is_expanding());

        stats.record_expand_done(16);
        let s = stats.snapshot();
        assert_eq!(s.hash_bytes(), 32);
        assert!(!s.hash_is_expanding());
        assert_eq!(s.expansions_completed(), 1);
    }
}
