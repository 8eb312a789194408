use super::{bucket_array::BucketArray, index::Inner, maintenance::MaintenanceState};
use crate::{
    item::{ItemId, ItemTable},
    lock::{ItemLockGuard, ItemLocks},
};

use parking_lot::MutexGuard;
use std::sync::Arc;

struct Scan {
    array: Arc<BucketArray>,
    bucket: usize,
}

/// A scan over every item in an [`AssocIndex`][assoc-index].
///
/// Created by [`AssocIndex::iter`][iter]. The iterator holds the maintenance
/// lock until it is dropped, so the bucket arrays cannot be replaced during the
/// scan, and it holds the item lock of the bucket it is currently walking.
///
/// [assoc-index]: ./struct.AssocIndex.html
/// [iter]: ./struct.AssocIndex.html#method.iter
pub struct AssocIter<'a, T> {
    items: &'a T,
    item_locks: &'a ItemLocks,
    current: Option<Scan>,
    /// The old buckets of a suspended migration, scanned after `current`.
    pending_old: Option<Scan>,
    next: Option<ItemId>,
    bucket_lock: Option<ItemLockGuard<'a>>,
    _maintenance: MutexGuard<'a, MaintenanceState>,
}

impl<'a, T> AssocIter<'a, T> {
    pub(crate) fn new<S>(inner: &'a Inner<T, S>) -> Self {
        // Blocks while the maintenance worker is migrating.
        let maintenance = inner.maintenance.lock();

        let guard = &crossbeam_epoch::pin();
        let tables = inner.tables(guard);
        let current = Scan {
            array: Arc::clone(tables.primary()),
            bucket: 0,
        };
        // Only possible when the worker was stopped in the middle of a
        // migration. The cursor cannot move while we hold the lock.
        let pending_old = tables.old().map(|old| Scan {
            array: Arc::clone(old),
            bucket: tables.expand_cursor(),
        });

        Self {
            items: &*inner.items,
            item_locks: &inner.item_locks,
            current: Some(current),
            pending_old,
            next: None,
            bucket_lock: None,
            _maintenance: maintenance,
        }
    }
}

impl<'a, T: ItemTable> Iterator for AssocIter<'a, T> {
    type Item = ItemId;

    fn next(&mut self) -> Option<Self::Item> {
        let items = self.items;
        let item_locks = self.item_locks;

        loop {
            if self.bucket_lock.is_some() {
                if let Some(id) = self.next {
                    self.next = items.hash_next(id);
                    return Some(id);
                }
                // Done with this bucket.
                self.bucket_lock = None;
                if let Some(scan) = self.current.as_mut() {
                    scan.bucket += 1;
                }
            }

            let scan = self.current.as_mut()?;
            if scan.bucket >= scan.array.len() {
                self.current = self.pending_old.take();
                continue;
            }

            // Stripes are selected by the low bits, which a bucket index shares
            // with every digest stored in it.
            let lock = item_locks.lock(scan.bucket as u32);
            match scan.array.head(scan.bucket) {
                Some(head) => {
                    self.bucket_lock = Some(lock);
                    self.next = items.hash_next(head);
                    return Some(head);
                }
                None => scan.bucket += 1,
            }
        }
    }
}
