//! Item records as seen by the hash index.
//!
//! The index does not own items. It refers to them by [`ItemId`] and reaches
//! their keys and chain links through the [`ItemTable`] trait, implemented by
//! whatever subsystem allocates the items. [`ItemArena`] is a simple
//! fixed-capacity implementation.

mod arena;

pub use arena::ItemArena;

use std::num::NonZeroU32;

/// A handle to an item record.
///
/// Ids are non-zero so that a chain link (`Option<ItemId>`) fits in a single
/// `u32`, with `0` standing for the end of a chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(NonZeroU32);

impl ItemId {
    /// Creates an id from its raw value. Returns `None` for `0`.
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }

    #[inline]
    pub(crate) fn from_link(link: u32) -> Option<Self> {
        Self::new(link)
    }

    #[inline]
    pub(crate) fn to_link(id: Option<Self>) -> u32 {
        id.map_or(0, Self::get)
    }
}

/// Access to the items referenced by the hash index.
///
/// Every item carries a `hash_next` link used by the index to chain items that
/// share a bucket. The index reads and writes the link only while the bucket
/// lock covering the item is held, but the link may be read by other threads
/// at the same time, so implementations must store it with interior
/// mutability (typically an `AtomicU32`).
pub trait ItemTable: Send + Sync {
    /// Calls `f` with the key of the item `id`.
    fn with_key<R>(&self, id: ItemId, f: impl FnOnce(&[u8]) -> R) -> R;

    /// Returns the next item in the same hash chain.
    fn hash_next(&self, id: ItemId) -> Option<ItemId>;

    /// Sets the next item in the same hash chain.
    fn set_hash_next(&self, id: ItemId, next: Option<ItemId>);

    /// Returns `true` if the key of the item `id` equals `key`.
    fn key_eq(&self, id: ItemId, key: &[u8]) -> bool {
        self.with_key(id, |k| k.len() == key.len() && k == key)
    }
}
