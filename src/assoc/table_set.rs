use super::{bucket_array::BucketArray, chain};
use crate::{
    common::hash_mask,
    item::{ItemId, ItemTable},
};

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

/// One bucket of one bucket array.
#[derive(Clone, Copy)]
pub(crate) struct BucketRef<'a> {
    pub(crate) array: &'a BucketArray,
    pub(crate) index: usize,
}

impl<'a> BucketRef<'a> {
    #[inline]
    pub(crate) fn head(&self) -> Option<ItemId> {
        self.array.head(self.index)
    }

    #[inline]
    pub(crate) fn set_head(&self, id: Option<ItemId>) {
        self.array.set_head(self.index, id)
    }
}

/// The bucket arrays of the index and the progress of a running expansion.
///
/// A `TableSet` is immutable apart from `expand_cursor` and the bucket heads.
/// Starting or finishing an expansion publishes a new `TableSet`.
pub(crate) struct TableSet {
    hashpower: u32,
    primary: Arc<BucketArray>,
    /// The array being migrated from. `Some` iff the table is expanding, in
    /// which case `primary` has twice as many buckets.
    old: Option<Arc<BucketArray>>,
    /// The next old bucket to migrate. Buckets below the cursor live in
    /// `primary`. Only advanced while the bucket's item lock is held.
    expand_cursor: AtomicUsize,
}

impl TableSet {
    pub(crate) fn new(primary: BucketArray) -> Self {
        Self {
            hashpower: primary.power(),
            primary: Arc::new(primary),
            old: None,
            expand_cursor: AtomicUsize::new(0),
        }
    }

    /// Returns the set that expands `self` into `new_primary`.
    pub(crate) fn expanding_into(&self, new_primary: BucketArray) -> Self {
        debug_assert!(!self.is_expanding());
        debug_assert_eq!(new_primary.power(), self.hashpower + 1);
        Self {
            hashpower: new_primary.power(),
            primary: Arc::new(new_primary),
            old: Some(Arc::clone(&self.primary)),
            expand_cursor: AtomicUsize::new(0),
        }
    }

    /// Returns the set left after a completed expansion.
    pub(crate) fn settled(&self) -> Self {
        Self {
            hashpower: self.hashpower,
            primary: Arc::clone(&self.primary),
            old: None,
            expand_cursor: AtomicUsize::new(0),
        }
    }

    pub(crate) fn hashpower(&self) -> u32 {
        self.hashpower
    }

    pub(crate) fn primary(&self) -> &Arc<BucketArray> {
        &self.primary
    }

    pub(crate) fn old(&self) -> Option<&Arc<BucketArray>> {
        self.old.as_ref()
    }

    pub(crate) fn is_expanding(&self) -> bool {
        self.old.is_some()
    }

    pub(crate) fn expand_cursor(&self) -> usize {
        self.expand_cursor.load(Ordering::Acquire)
    }

    /// Returns `true` once every old bucket has been migrated.
    pub(crate) fn is_migrated(&self) -> bool {
        self.old
            .as_ref()
            .map_or(true, |old| self.expand_cursor() >= old.len())
    }

    /// Selects the bucket that is authoritative for the digest `hv`.
    ///
    /// While expanding, a digest whose old bucket has not been migrated yet
    /// lives in `old`; every other digest lives in `primary`. find, insert and
    /// delete all go through here, so a key is never visible in both arrays.
    #[inline]
    pub(crate) fn route(&self, hv: u32) -> BucketRef<'_> {
        if let Some(old) = &self.old {
            let old_bucket = (hv as u64 & hash_mask(self.hashpower - 1)) as usize;
            if old_bucket >= self.expand_cursor() {
                return BucketRef {
                    array: old,
                    index: old_bucket,
                };
            }
        }
        BucketRef {
            array: &self.primary,
            index: (hv as u64 & hash_mask(self.hashpower)) as usize,
        }
    }

    /// Moves every entry of the old bucket at the cursor into `primary` and
    /// advances the cursor.
    ///
    /// The caller must hold the item lock covering the old bucket at the
    /// cursor. `digest` recomputes an entry's digest from its key.
    pub(crate) fn migrate_bucket<T, D>(&self, items: &T, digest: D) -> usize
    where
        T: ItemTable,
        D: Fn(&[u8]) -> u32,
    {
        let old = match &self.old {
            Some(old) => old,
            None => return 0,
        };
        let bucket = self.expand_cursor();
        debug_assert!(bucket < old.len());

        let mask = hash_mask(self.hashpower);
        let mut moved = 0;
        let mut next = old.take_head(bucket);
        while let Some(id) = next {
            next = items.hash_next(id);
            let hv = items.with_key(id, &digest);
            let target = BucketRef {
                array: &self.primary,
                index: (hv as u64 & mask) as usize,
            };
            chain::push_front(items, target, id);
            moved += 1;
        }

        self.expand_cursor.store(bucket + 1, Ordering::Release);
        moved
    }
}

#[cfg(test)]
mod tests {
    use super::TableSet;
    use crate::{
        assoc::{bucket_array::BucketArray, chain},
        common::test_utils::{key_with_digest, prefix_digest as digest},
        item::{ItemArena, ItemTable},
    };
    use std::{ptr, sync::Arc};

    #[test]
    fn routes_to_primary_when_stable() {
        let tables = TableSet::new(BucketArray::new(2));
        let b = tables.route(0b1110);
        assert!(ptr::eq(b.array, &**tables.primary()));
        assert_eq!(b.index, 0b10);
    }

    #[test]
    fn routes_by_expand_cursor() {
        let stable = TableSet::new(BucketArray::new(2));
        let tables = stable.expanding_into(BucketArray::new(3));
        assert_eq!(tables.hashpower(), 3);
        assert!(tables.is_expanding());
        assert!(Arc::ptr_eq(tables.old().unwrap(), stable.primary()));

        // Nothing migrated: every digest goes to `old`, masked to 2 bits.
        let b = tables.route(0b110);
        assert!(ptr::eq(b.array, &**tables.old().unwrap()));
        assert_eq!(b.index, 0b10);

        // Old buckets below the cursor have moved to `primary`.
        tables
            .expand_cursor
            .store(3, std::sync::atomic::Ordering::Release);
        let b = tables.route(0b110);
        assert!(ptr::eq(b.array, &**tables.primary()));
        assert_eq!(b.index, 0b110);

        let b = tables.route(0b111);
        assert!(ptr::eq(b.array, &**tables.old().unwrap()));
        assert_eq!(b.index, 0b11);
        assert!(!tables.is_migrated());

        let settled = tables.settled();
        assert!(!settled.is_expanding());
        assert!(settled.is_migrated());
        assert!(Arc::ptr_eq(settled.primary(), tables.primary()));
    }

    #[test]
    fn migrate_splits_a_bucket() {
        let items = ItemArena::with_capacity(8);
        let stable = TableSet::new(BucketArray::new(1));

        // Old bucket 0 holds digests 0b00 and 0b10; they split into new
        // buckets 0 and 2.
        let keys = [key_with_digest("x", 0b00), key_with_digest("y", 0b10)];
        let ids = keys
            .iter()
            .map(|k| {
                let id = items.alloc(k, ()).unwrap();
                chain::push_front(&items, stable.route(digest(k)), id);
                id
            })
            .collect::<Vec<_>>();

        let tables = stable.expanding_into(BucketArray::new(2));
        assert_eq!(tables.migrate_bucket(&items, digest), 2);
        assert_eq!(tables.expand_cursor(), 1);

        let old = tables.old().unwrap();
        assert_eq!(old.head(0), None);
        assert_eq!(tables.primary().head(0), Some(ids[0]));
        assert_eq!(tables.primary().head(2), Some(ids[1]));
        assert_eq!(items.hash_next(ids[0]), None);
        assert_eq!(items.hash_next(ids[1]), None);

        // Old bucket 1 is empty.
        assert_eq!(tables.migrate_bucket(&items, digest), 0);
        assert!(tables.is_migrated());
    }
}
