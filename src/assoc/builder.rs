use super::index::AssocIndex;
use crate::{
    common::concurrent::constants::{
        DEFAULT_HASHPOWER, DEFAULT_HASH_BULK_MOVE, DEFAULT_ITEM_LOCK_POWER, MAX_HASHPOWER,
        MAX_ITEM_LOCK_POWER,
    },
    item::ItemTable,
    lock::ItemLocks,
    pause::{NoPause, ThreadPauser},
    stats::HashStats,
};

use std::{
    collections::hash_map::RandomState,
    hash::BuildHasher,
    sync::Arc,
};

/// Builds an [`AssocIndex`][assoc-index] with various configuration knobs.
///
/// [assoc-index]: ./struct.AssocIndex.html
///
/// # Examples
///
/// ```rust
/// use assoc_index::{AssocIndex, HashStats, ItemArena};
/// use std::sync::Arc;
///
/// let items = Arc::new(ItemArena::<u64>::with_capacity(100_000));
/// let stats = Arc::new(HashStats::new());
///
/// let index = AssocIndex::builder(items)
///     // Start with 2^12 buckets.
///     .initial_power(12)
///     // Migrate 16 buckets per maintenance pass.
///     .hash_bulk_move(16)
///     .stats(Arc::clone(&stats))
///     .build();
///
/// assert_eq!(index.hashpower(), 12);
/// assert_eq!(stats.snapshot().hash_power_level(), 12);
/// ```
pub struct AssocIndexBuilder<T, S = RandomState> {
    items: Arc<T>,
    initial_power: u32,
    hash_bulk_move: usize,
    item_lock_power: u32,
    item_locks: Option<Arc<ItemLocks>>,
    build_hasher: S,
    thread_pauser: Option<Arc<dyn ThreadPauser>>,
    stats: Option<Arc<HashStats>>,
}

impl<T: ItemTable> AssocIndexBuilder<T, RandomState> {
    /// Constructs a new builder for an index over `items`.
    pub fn new(items: Arc<T>) -> Self {
        Self {
            items,
            initial_power: DEFAULT_HASHPOWER,
            hash_bulk_move: DEFAULT_HASH_BULK_MOVE,
            item_lock_power: DEFAULT_ITEM_LOCK_POWER,
            item_locks: None,
            build_hasher: RandomState::default(),
            thread_pauser: None,
            stats: None,
        }
    }
}

impl<T, S> AssocIndexBuilder<T, S>
where
    T: ItemTable + 'static,
    S: BuildHasher + Send + Sync + 'static,
{
    /// Sets the initial number of buckets to `2^power`. Default: 16.
    ///
    /// # Panics
    ///
    /// Panics if `power` is zero or greater than 32.
    pub fn initial_power(self, power: u32) -> Self {
        assert!(
            (1..=MAX_HASHPOWER).contains(&power),
            "initial hash power must be in 1..={MAX_HASHPOWER}, got {power}"
        );
        Self {
            initial_power: power,
            ..self
        }
    }

    /// Sets how many old buckets the maintenance worker migrates per pass.
    /// Default: 1.
    ///
    /// # Panics
    ///
    /// Panics if `count` is zero.
    pub fn hash_bulk_move(self, count: usize) -> Self {
        assert!(count > 0);
        Self {
            hash_bulk_move: count,
            ..self
        }
    }

    /// Sets the number of item lock stripes to `2^power`. Default: 13.
    ///
    /// The value is capped at the initial hash power, because a stripe must
    /// never cover less than a whole bucket, and at 24. Ignored when
    /// [`item_locks`](#method.item_locks) is set.
    pub fn item_lock_power(self, power: u32) -> Self {
        Self {
            item_lock_power: power,
            ..self
        }
    }

    /// Uses an existing item lock array, typically shared with the layer that
    /// calls the index.
    pub fn item_locks(self, locks: Arc<ItemLocks>) -> Self {
        Self {
            item_locks: Some(locks),
            ..self
        }
    }

    /// Sets the hasher used to compute key digests.
    pub fn build_hasher<S2>(self, build_hasher: S2) -> AssocIndexBuilder<T, S2>
    where
        S2: BuildHasher + Send + Sync + 'static,
    {
        AssocIndexBuilder {
            items: self.items,
            initial_power: self.initial_power,
            hash_bulk_move: self.hash_bulk_move,
            item_lock_power: self.item_lock_power,
            item_locks: self.item_locks,
            build_hasher,
            thread_pauser: self.thread_pauser,
            stats: self.stats,
        }
    }

    /// Sets the barrier invoked around the bucket array swap. Default:
    /// [`NoPause`](./struct.NoPause.html).
    pub fn thread_pauser(self, pauser: Arc<dyn ThreadPauser>) -> Self {
        Self {
            thread_pauser: Some(pauser),
            ..self
        }
    }

    /// Reports hash table statistics to `stats`.
    pub fn stats(self, stats: Arc<HashStats>) -> Self {
        Self {
            stats: Some(stats),
            ..self
        }
    }

    /// Builds the index.
    ///
    /// Aborts the process if the initial bucket array cannot be allocated.
    ///
    /// # Panics
    ///
    /// Panics if a shared item lock array has more stripes than the initial
    /// number of buckets.
    pub fn build(self) -> AssocIndex<T, S> {
        let item_locks = match self.item_locks {
            Some(locks) => {
                assert!(
                    locks.power() <= self.initial_power,
                    "item lock power ({}) exceeds the initial hash power ({})",
                    locks.power(),
                    self.initial_power
                );
                locks
            }
            None => Arc::new(ItemLocks::new(effective_lock_power(
                self.item_lock_power,
                self.initial_power,
            ))),
        };

        AssocIndex::with_everything(
            self.items,
            self.initial_power,
            self.hash_bulk_move,
            self.build_hasher,
            item_locks,
            self.thread_pauser.unwrap_or_else(|| Arc::new(NoPause)),
            self.stats.unwrap_or_default(),
        )
    }
}

fn effective_lock_power(requested: u32, initial_power: u32) -> u32 {
    requested.min(initial_power).min(MAX_ITEM_LOCK_POWER)
}
