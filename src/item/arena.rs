use super::{ItemId, ItemTable};
use crate::common::error::Error;

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU32, Ordering};

struct Entry<V> {
    key: Box<[u8]>,
    value: V,
}

struct Slot<V> {
    hash_next: AtomicU32,
    entry: RwLock<Option<Entry<V>>>,
}

/// A fixed-capacity table of items addressed by [`ItemId`].
///
/// Slots are allocated up front and recycled through a free list, so an id
/// stays valid until it is passed to [`free`](#method.free).
pub struct ItemArena<V> {
    slots: Box<[Slot<V>]>,
    free_list: Mutex<Vec<u32>>,
}

impl<V> ItemArena<V> {
    /// Creates an arena holding up to `capacity` items.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or does not fit the `u32` id space.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0);
        assert!(capacity < u32::MAX as usize);

        let slots = (0..capacity)
            .map(|_| Slot {
                hash_next: AtomicU32::new(0),
                entry: RwLock::new(None),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        // Pop from the back, so the lowest ids are handed out first.
        let free_list = (1..=capacity as u32).rev().collect();

        Self {
            slots,
            free_list: Mutex::new(free_list),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns the number of allocated items.
    pub fn len(&self) -> usize {
        self.capacity() - self.free_list.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stores a new item and returns its id.
    pub fn alloc(&self, key: &[u8], value: V) -> Result<ItemId, Error> {
        let raw = self.free_list.lock().pop().ok_or(Error::ArenaFull {
            capacity: self.capacity(),
        })?;
        let id = ItemId::new(raw).expect("arena ids start at 1");

        let slot = self.slot(id);
        slot.hash_next.store(0, Ordering::Release);
        *slot.entry.write() = Some(Entry {
            key: key.into(),
            value,
        });
        Ok(id)
    }

    /// Releases the item `id` and returns its value.
    ///
    /// The item must already be unlinked from the hash index.
    pub fn free(&self, id: ItemId) -> Option<V> {
        let slot = self.slots.get(Self::slot_index(id))?;
        let entry = slot.entry.write().take()?;
        slot.hash_next.store(0, Ordering::Release);
        self.free_list.lock().push(id.get());
        Some(entry.value)
    }

    /// Returns a copy of the key of the item `id`.
    pub fn key(&self, id: ItemId) -> Option<Vec<u8>> {
        let slot = self.slots.get(Self::slot_index(id))?;
        let entry = slot.entry.read();
        entry.as_ref().map(|e| e.key.to_vec())
    }

    /// Returns a clone of the value of the item `id`.
    pub fn value(&self, id: ItemId) -> Option<V>
    where
        V: Clone,
    {
        let slot = self.slots.get(Self::slot_index(id))?;
        let entry = slot.entry.read();
        entry.as_ref().map(|e| e.value.clone())
    }

    #[inline]
    fn slot_index(id: ItemId) -> usize {
        id.get() as usize - 1
    }

    #[inline]
    fn slot(&self, id: ItemId) -> &Slot<V> {
        self.slots
            .get(Self::slot_index(id))
            .unwrap_or_else(|| panic!("{id:?} does not belong to this arena"))
    }
}

/// # Panics
///
/// The chain accessors panic if `id` was not allocated by this arena (its raw
/// value exceeds the capacity). Such an id can only reach the index through a
/// caller bug, and continuing would corrupt a hash chain.
impl<V: Send + Sync> ItemTable for ItemArena<V> {
    fn with_key<R>(&self, id: ItemId, f: impl FnOnce(&[u8]) -> R) -> R {
        let entry = self.slot(id).entry.read();
        // A freed item has no key; it never compares equal to a real one.
        match entry.as_ref() {
            Some(e) => f(&e.key),
            None => f(&[]),
        }
    }

    fn hash_next(&self, id: ItemId) -> Option<ItemId> {
        ItemId::from_link(self.slot(id).hash_next.load(Ordering::Acquire))
    }

    fn set_hash_next(&self, id: ItemId, next: Option<ItemId>) {
        self.slot(id)
            .hash_next
            .store(ItemId::to_link(next), Ordering::Release);
    }
}
