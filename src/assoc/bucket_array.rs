use crate::{common::hash_size, item::ItemId};

use std::{
    alloc::{handle_alloc_error, Layout},
    mem,
    sync::atomic::{AtomicU32, Ordering},
};

/// An array of `2^power` chain heads.
///
/// Each head is an encoded `Option<ItemId>`. Heads are only written while the
/// item lock covering the bucket is held.
pub(crate) struct BucketArray {
    power: u32,
    heads: Box<[AtomicU32]>,
}

impl BucketArray {
    /// Allocates an empty array of `2^power` buckets.
    ///
    /// Aborts the process if the memory cannot be allocated.
    pub(crate) fn new(power: u32) -> Self {
        match Self::try_new(power) {
            Some(array) => array,
            None => handle_alloc_error(Self::layout(power)),
        }
    }

    /// Allocates an empty array of `2^power` buckets, or returns `None` if the
    /// memory cannot be allocated.
    pub(crate) fn try_new(power: u32) -> Option<Self> {
        let len = usize::try_from(hash_size(power)).ok()?;
        let mut heads = Vec::new();
        heads.try_reserve_exact(len).ok()?;
        heads.extend((0..len).map(|_| AtomicU32::new(0)));
        Some(Self {
            power,
            heads: heads.into_boxed_slice(),
        })
    }

    pub(crate) fn power(&self) -> u32 {
        self.power
    }

    pub(crate) fn len(&self) -> usize {
        self.heads.len()
    }

    pub(crate) fn bytes(&self) -> u64 {
        Self::bytes_for(self.power)
    }

    pub(crate) fn bytes_for(power: u32) -> u64 {
        hash_size(power) * mem::size_of::<AtomicU32>() as u64
    }

    #[inline]
    pub(crate) fn head(&self, bucket: usize) -> Option<ItemId> {
        ItemId::from_link(self.heads[bucket].load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn set_head(&self, bucket: usize, id: Option<ItemId>) {
        self.heads[bucket].store(ItemId::to_link(id), Ordering::Release);
    }

    /// Detaches the whole chain of `bucket` and returns its head.
    pub(crate) fn take_head(&self, bucket: usize) -> Option<ItemId> {
        ItemId::from_link(self.heads[bucket].swap(0, Ordering::AcqRel))
    }

    fn layout(power: u32) -> Layout {
        usize::try_from(hash_size(power))
            .ok()
            .and_then(|len| Layout::array::<AtomicU32>(len).ok())
            .unwrap_or_else(Layout::new::<AtomicU32>)
    }
}
