//! Operations on the singly linked chain of one bucket.
//!
//! All functions here expect the caller to hold the item lock covering the
//! bucket.

use super::table_set::BucketRef;
use crate::item::{ItemId, ItemTable};

/// A link that points at an entry: either a bucket head or the `hash_next`
/// field of the entry before it.
pub(crate) enum Slot<'a> {
    Head(BucketRef<'a>),
    Next(ItemId),
}

impl<'a> Slot<'a> {
    fn get<T: ItemTable>(&self, items: &T) -> Option<ItemId> {
        match self {
            Slot::Head(bucket) => bucket.head(),
            Slot::Next(prev) => items.hash_next(*prev),
        }
    }

    fn set<T: ItemTable>(&self, items: &T, id: Option<ItemId>) {
        match self {
            Slot::Head(bucket) => bucket.set_head(id),
            Slot::Next(prev) => items.set_hash_next(*prev, id),
        }
    }
}

pub(crate) fn find<T: ItemTable>(items: &T, bucket: BucketRef<'_>, key: &[u8]) -> Option<ItemId> {
    let mut next = bucket.head();
    #[cfg(feature = "logging")]
    let mut depth = 0;

    while let Some(id) = next {
        if items.key_eq(id, key) {
            break;
        }
        next = items.hash_next(id);
        #[cfg(feature = "logging")]
        {
            depth += 1;
        }
    }

    #[cfg(feature = "logging")]
    log::trace!("assoc find: depth {depth}, found: {}", next.is_some());

    next
}

/// Returns the slot that links to the entry with `key`, and that entry.
///
/// When no entry matches, the slot is the terminal link of the chain and the
/// entry is `None`.
pub(crate) fn locate_predecessor_slot<'a, T: ItemTable>(
    items: &T,
    bucket: BucketRef<'a>,
    key: &[u8],
) -> (Slot<'a>, Option<ItemId>) {
    let mut slot = Slot::Head(bucket);
    loop {
        match slot.get(items) {
            Some(id) if !items.key_eq(id, key) => slot = Slot::Next(id),
            found => return (slot, found),
        }
    }
}

/// Links `id` in as the new head of the chain.
pub(crate) fn push_front<T: ItemTable>(items: &T, bucket: BucketRef<'_>, id: ItemId) {
    items.set_hash_next(id, bucket.head());
    bucket.set_head(Some(id));
}

/// Unlinks the entry with `key` and returns it.
pub(crate) fn unlink<T: ItemTable>(items: &T, bucket: BucketRef<'_>, key: &[u8]) -> Option<ItemId> {
    let (slot, found) = locate_predecessor_slot(items, bucket, key);
    let id = found?;
    slot.set(items, items.hash_next(id));
    items.set_hash_next(id, None);
    Some(id)
}

#[cfg(test)]
mod tests {
    use super::{find, locate_predecessor_slot, push_front, unlink, Slot};
    use crate::{
        assoc::{bucket_array::BucketArray, table_set::BucketRef},
        item::{ItemArena, ItemId, ItemTable},
    };

    fn setup(keys: &[&str]) -> (ItemArena<()>, BucketArray, Vec<ItemId>) {
        let items = ItemArena::with_capacity(16);
        let array = BucketArray::new(0);
        let ids = keys
            .iter()
            .map(|k| {
                let id = items.alloc(k.as_bytes(), ()).unwrap();
                push_front(&items, BucketRef { array: &array, index: 0 }, id);
                id
            })
            .collect();
        (items, array, ids)
    }

    fn bucket(array: &BucketArray) -> BucketRef<'_> {
        BucketRef { array, index: 0 }
    }

    #[test]
    fn head_insertion_order() {
        let (items, array, ids) = setup(&["a", "b", "c"]);
        assert_eq!(array.head(0), Some(ids[2]));
        assert_eq!(items.hash_next(ids[2]), Some(ids[1]));
        assert_eq!(items.hash_next(ids[1]), Some(ids[0]));
        assert_eq!(items.hash_next(ids[0]), None);

        assert_eq!(find(&items, bucket(&array), b"a"), Some(ids[0]));
        assert_eq!(find(&items, bucket(&array), b"c"), Some(ids[2]));
        assert_eq!(find(&items, bucket(&array), b"d"), None);
        // Same prefix, different length.
        assert_eq!(find(&items, bucket(&array), b"ab"), None);
    }

    #[test]
    fn predecessor_slot() {
        let (items, array, ids) = setup(&["a", "b"]);

        let (slot, found) = locate_predecessor_slot(&items, bucket(&array), b"b");
        assert!(matches!(slot, Slot::Head(_)));
        assert_eq!(found, Some(ids[1]));

        let (slot, found) = locate_predecessor_slot(&items, bucket(&array), b"a");
        assert!(matches!(slot, Slot::Next(prev) if prev == ids[1]));
        assert_eq!(found, Some(ids[0]));

        let (slot, found) = locate_predecessor_slot(&items, bucket(&array), b"z");
        assert!(matches!(slot, Slot::Next(prev) if prev == ids[0]));
        assert_eq!(found, None);
    }

    #[test]
    fn unlink_head_middle_tail() {
        let (items, array, ids) = setup(&["a", "b", "c", "d"]);

        // middle
        assert_eq!(unlink(&items, bucket(&array), b"b"), Some(ids[1]));
        assert_eq!(items.hash_next(ids[1]), None);
        assert_eq!(items.hash_next(ids[2]), Some(ids[0]));

        // head
        assert_eq!(unlink(&items, bucket(&array), b"d"), Some(ids[3]));
        assert_eq!(array.head(0), Some(ids[2]));

        // tail
        assert_eq!(unlink(&items, bucket(&array), b"a"), Some(ids[0]));
        assert_eq!(items.hash_next(ids[2]), None);

        assert_eq!(unlink(&items, bucket(&array), b"a"), None);
        assert_eq!(find(&items, bucket(&array), b"c"), Some(ids[2]));
    }
}
