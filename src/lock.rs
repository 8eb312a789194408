//! Striped bucket locks.

use crate::common::concurrent::constants::MAX_ITEM_LOCK_POWER;

use crossbeam_utils::CachePadded;
use parking_lot::{Mutex, MutexGuard};

/// An array of `2^power` mutexes, selected by the low bits of a key digest.
///
/// Callers of [`AssocIndex::find`][find], [`insert`][insert] and
/// [`delete`][delete] must hold the lock for the key's digest for the whole
/// operation. Because the number of stripes never exceeds the number of
/// buckets, a single stripe covers a key's bucket in both the old and the new
/// bucket array while the table is expanding.
///
/// [find]: ./struct.AssocIndex.html#method.find
/// [insert]: ./struct.AssocIndex.html#method.insert
/// [delete]: ./struct.AssocIndex.html#method.delete
pub struct ItemLocks {
    power: u32,
    locks: Box<[CachePadded<Mutex<()>>]>,
}

/// Holds one stripe of [`ItemLocks`]. The stripe is released on drop.
#[must_use = "the item lock is released as soon as the guard is dropped"]
pub struct ItemLockGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl ItemLocks {
    /// Creates `2^power` lock stripes.
    ///
    /// # Panics
    ///
    /// Panics if `power` is larger than 24.
    pub fn new(power: u32) -> Self {
        assert!(
            power <= MAX_ITEM_LOCK_POWER,
            "too many item lock stripes: 2^{power}"
        );
        let locks = (0..(1usize << power))
            .map(|_| CachePadded::new(Mutex::new(())))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { power, locks }
    }

    pub fn power(&self) -> u32 {
        self.power
    }

    /// Blocks until the stripe covering `hv` is acquired.
    pub fn lock(&self, hv: u32) -> ItemLockGuard<'_> {
        ItemLockGuard {
            _guard: self.stripe(hv).lock(),
        }
    }

    /// Acquires the stripe covering `hv` if nobody holds it.
    pub fn try_lock(&self, hv: u32) -> Option<ItemLockGuard<'_>> {
        self.stripe(hv)
            .try_lock()
            .map(|guard| ItemLockGuard { _guard: guard })
    }

    #[inline]
    fn stripe(&self, hv: u32) -> &Mutex<()> {
        let mask = (self.locks.len() - 1) as u32;
        &self.locks[(hv & mask) as usize]
    }
}
