use super::{
    bucket_array::BucketArray,
    builder::AssocIndexBuilder,
    chain,
    iter::AssocIter,
    maintenance::{self, MaintenanceState, MaintenanceWorker},
    table_set::TableSet,
};
use crate::{
    common::{
        concurrent::constants::{MAX_HASHPOWER, MIGRATION_BACKOFF},
        error::Error,
        hash_size,
    },
    item::{ItemId, ItemTable},
    lock::ItemLocks,
    pause::ThreadPauser,
    stats::HashStats,
};

use crossbeam_epoch::{Atomic, Guard, Owned};
use parking_lot::{Condvar, Mutex};
use std::{
    collections::hash_map::RandomState,
    hash::{BuildHasher, Hasher},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

/// A concurrent hash index from byte keys to [`ItemId`]s.
///
/// `find`, `insert` and `delete` take the key's digest, computed once by the
/// caller with [`digest`](#method.digest), and must be called while the caller
/// holds the item lock for that digest:
///
/// ```rust
/// use assoc_index::{AssocIndex, ItemArena};
/// use std::sync::Arc;
///
/// let items = Arc::new(ItemArena::with_capacity(1024));
/// let index = AssocIndex::builder(Arc::clone(&items)).initial_power(4).build();
///
/// let key = b"alice";
/// let hv = index.digest(key);
/// {
///     let _lock = index.item_locks().lock(hv);
///     let id = items.alloc(key, "hello").unwrap();
///     index.insert(id, hv);
///     assert_eq!(index.find(key, hv), Some(id));
/// }
/// ```
///
/// The table grows by doubling. [`maybe_start_expand`](#method.maybe_start_expand)
/// asks the maintenance worker (see
/// [`start_maintenance_worker`](#method.start_maintenance_worker)) to expand
/// once the load factor exceeds 1.5. The worker then migrates buckets in the
/// background while the index keeps serving requests.
pub struct AssocIndex<T, S = RandomState> {
    inner: Arc<Inner<T, S>>,
    worker: Mutex<Option<MaintenanceWorker>>,
    hash_bulk_move: usize,
}

impl<T, S> Drop for AssocIndex<T, S> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.stop(&self.inner);
        }
    }
}

impl<T: ItemTable> AssocIndex<T, RandomState> {
    /// Returns a builder for an index over `items`.
    pub fn builder(items: Arc<T>) -> AssocIndexBuilder<T, RandomState> {
        AssocIndexBuilder::new(items)
    }
}

impl<T, S> AssocIndex<T, S>
where
    T: ItemTable + 'static,
    S: BuildHasher + Send + Sync + 'static,
{
    pub(crate) fn with_everything(
        items: Arc<T>,
        initial_power: u32,
        hash_bulk_move: usize,
        build_hasher: S,
        item_locks: Arc<ItemLocks>,
        pauser: Arc<dyn ThreadPauser>,
        stats: Arc<HashStats>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner::new(
                items,
                initial_power,
                build_hasher,
                item_locks,
                pauser,
                stats,
            )),
            worker: Mutex::new(None),
            hash_bulk_move,
        }
    }

    /// Computes the digest of `key` with the index's hasher.
    pub fn digest(&self, key: &[u8]) -> u32 {
        self.inner.digest(key)
    }

    /// Returns the item with `key`, or `None` if the key is not indexed.
    pub fn find(&self, key: &[u8], hv: u32) -> Option<ItemId> {
        self.inner.find(key, hv)
    }

    /// Links the item `id` into the index.
    ///
    /// The item's key must not be in the index already; duplicates are not
    /// detected.
    pub fn insert(&self, id: ItemId, hv: u32) {
        self.inner.insert(id, hv)
    }

    /// Unlinks the item with `key` and returns its id.
    ///
    /// Deleting a key that is not in the index is a bug in the caller and is
    /// reported as [`Error::KeyNotFound`].
    pub fn delete(&self, key: &[u8], hv: u32) -> Result<ItemId, Error> {
        self.inner.delete(key, hv)
    }

    /// Requests an expansion if `item_count` exceeds 1.5 times the number of
    /// buckets.
    ///
    /// Never blocks: if the maintenance lock is busy (an expansion or a scan is
    /// running) this does nothing. Returns `true` if the maintenance worker was
    /// signalled.
    pub fn maybe_start_expand(&self, item_count: u64) -> bool {
        self.inner.maybe_start_expand(item_count)
    }

    /// Starts the background thread that expands and migrates the table.
    ///
    /// The number of buckets migrated per pass is the configured
    /// `hash_bulk_move`, unless the `ASSOC_HASH_BULK_MOVE` environment variable
    /// overrides it.
    pub fn start_maintenance_worker(&self) -> Result<(), Error> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Err(Error::WorkerAlreadyRunning);
        }
        let bulk_move = maintenance::bulk_move_from_env(self.hash_bulk_move);
        *worker = Some(MaintenanceWorker::start(Arc::clone(&self.inner), bulk_move)?);
        Ok(())
    }

    /// Stops the maintenance thread and waits for it to exit.
    ///
    /// A migration in progress is suspended, not rolled back; the index keeps
    /// routing requests to both bucket arrays until a worker finishes it.
    pub fn stop_maintenance_worker(&self) {
        if let Some(worker) = self.worker.lock().take() {
            worker.stop(&self.inner);
        }
    }

    /// Starts a scan over every indexed item.
    ///
    /// Blocks while an expansion is running, and blocks expansions until the
    /// iterator is dropped. Each yielded item's bucket stays locked until the
    /// iterator moves past that bucket, so the caller must not take the item
    /// lock of a yielded item itself.
    pub fn iter(&self) -> AssocIter<'_, T> {
        AssocIter::new(&self.inner)
    }

    /// The power of two of the primary bucket array.
    pub fn hashpower(&self) -> u32 {
        let guard = &crossbeam_epoch::pin();
        self.inner.tables(guard).hashpower()
    }

    pub fn is_expanding(&self) -> bool {
        self.inner.is_expanding()
    }

    pub fn items(&self) -> &Arc<T> {
        &self.inner.items
    }

    pub fn item_locks(&self) -> &Arc<ItemLocks> {
        &self.inner.item_locks
    }

    pub fn stats(&self) -> &Arc<HashStats> {
        &self.inner.stats
    }
}

#[cfg(test)]
impl<T, S> AssocIndex<T, S> {
    pub(crate) fn inner(&self) -> &Inner<T, S> {
        &self.inner
    }
}

/// The outcome of one attempt to migrate an old bucket.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum MigrationStep {
    /// One old bucket has been migrated; more remain.
    Migrated,
    /// The item lock of the next old bucket is busy.
    Contended,
    /// The last old bucket has been migrated and the old array retired.
    Completed,
    /// The table is not expanding.
    Idle,
}

pub(crate) struct Inner<T, S> {
    tables: Atomic<TableSet>,
    pub(crate) items: Arc<T>,
    build_hasher: S,
    pub(crate) item_locks: Arc<ItemLocks>,
    pub(crate) pauser: Arc<dyn ThreadPauser>,
    pub(crate) stats: Arc<HashStats>,
    pub(crate) maintenance: Mutex<MaintenanceState>,
    pub(crate) maintenance_cond: Condvar,
    is_worker_running: AtomicBool,
    /// Makes the next doubled array allocation fail.
    #[cfg(test)]
    pub(crate) fail_next_expansion: AtomicBool,
}

impl<T, S> Drop for Inner<T, S> {
    fn drop(&mut self) {
        // No thread can observe the tables anymore.
        let guard = unsafe { crossbeam_epoch::unprotected() };
        let current = self.tables.swap(crossbeam_epoch::Shared::null(), Ordering::AcqRel, guard);
        if !current.is_null() {
            std::mem::drop(unsafe { current.into_owned() });
        }
    }
}

// Methods that do not need the item table or the hasher.
impl<T, S> Inner<T, S> {
    /// Loads the current table set.
    #[inline]
    pub(crate) fn tables<'g>(&self, guard: &'g Guard) -> &'g TableSet {
        let shared = self.tables.load(Ordering::Acquire, guard);
        // The pointer is set in `new` and only ever swapped for another valid
        // table set; old sets are destroyed through `guard.defer_destroy`.
        unsafe { shared.deref() }
    }

    pub(crate) fn is_worker_running(&self) -> bool {
        self.is_worker_running.load(Ordering::Acquire)
    }

    pub(crate) fn set_worker_running(&self, running: bool) {
        self.is_worker_running.store(running, Ordering::Release);
    }

    fn publish(&self, tables: TableSet, guard: &Guard) {
        let prev = self.tables.swap(Owned::new(tables), Ordering::AcqRel, guard);
        // Readers may still hold the previous set; it is destroyed once every
        // thread has left its epoch.
        unsafe { guard.defer_destroy(prev) };
    }
}

impl<T, S> Inner<T, S>
where
    T: ItemTable,
    S: BuildHasher,
{
    fn new(
        items: Arc<T>,
        initial_power: u32,
        build_hasher: S,
        item_locks: Arc<ItemLocks>,
        pauser: Arc<dyn ThreadPauser>,
        stats: Arc<HashStats>,
    ) -> Self {
        let primary = BucketArray::new(initial_power);
        stats.record_init(initial_power, primary.bytes());

        Self {
            tables: Atomic::new(TableSet::new(primary)),
            items,
            build_hasher,
            item_locks,
            pauser,
            stats,
            maintenance: Mutex::new(MaintenanceState::default()),
            maintenance_cond: Condvar::new(),
            is_worker_running: AtomicBool::new(false),
            #[cfg(test)]
            fail_next_expansion: AtomicBool::new(false),
        }
    }

    pub(crate) fn digest(&self, key: &[u8]) -> u32 {
        let mut hasher = self.build_hasher.build_hasher();
        hasher.write(key);
        hasher.finish() as u32
    }

    fn find(&self, key: &[u8], hv: u32) -> Option<ItemId> {
        let guard = &crossbeam_epoch::pin();
        let bucket = self.tables(guard).route(hv);
        chain::find(&*self.items, bucket, key)
    }

    fn insert(&self, id: ItemId, hv: u32) {
        let guard = &crossbeam_epoch::pin();
        let bucket = self.tables(guard).route(hv);
        chain::push_front(&*self.items, bucket, id);
    }

    fn delete(&self, key: &[u8], hv: u32) -> Result<ItemId, Error> {
        let guard = &crossbeam_epoch::pin();
        let bucket = self.tables(guard).route(hv);
        chain::unlink(&*self.items, bucket, key).ok_or_else(|| {
            #[cfg(feature = "logging")]
            log::error!("assoc delete: key with digest {hv:#010x} is not in the index");
            Error::KeyNotFound
        })
    }

    fn maybe_start_expand(&self, item_count: u64) -> bool {
        let mut state = match self.maintenance.try_lock() {
            Some(state) => state,
            None => return false,
        };

        let guard = &crossbeam_epoch::pin();
        let hashpower = self.tables(guard).hashpower();
        if item_count > hash_size(hashpower) * 3 / 2 && hashpower < MAX_HASHPOWER {
            state.expand_requested = true;
            self.maintenance_cond.notify_one();
            true
        } else {
            false
        }
    }

    /// Replaces the primary array with one of twice the size and starts a
    /// migration. Returns `false` if the table is already expanding, is at its
    /// maximum size, or the new array cannot be allocated.
    ///
    /// Must be called with the maintenance lock held.
    pub(crate) fn begin_expand(&self) -> bool {
        let guard = &crossbeam_epoch::pin();
        let current = self.tables(guard);
        if current.is_expanding() || current.hashpower() >= MAX_HASHPOWER {
            return false;
        }

        let new_power = current.hashpower() + 1;
        let new_primary = match self.allocate_expansion(new_power) {
            Some(array) => array,
            None => {
                // Keep running at the current size; a later trigger retries.
                #[cfg(feature = "logging")]
                log::warn!(
                    "Hash table expansion to 2^{new_power} buckets failed: out of memory"
                );
                return false;
            }
        };

        #[cfg(feature = "logging")]
        log::info!("Hash table expansion starting (hashpower {new_power})");

        let new_bytes = new_primary.bytes();
        self.publish(current.expanding_into(new_primary), guard);
        self.stats.record_expand_started(new_power, new_bytes);
        true
    }

    fn allocate_expansion(&self, power: u32) -> Option<BucketArray> {
        #[cfg(test)]
        if self.fail_next_expansion.swap(false, Ordering::AcqRel) {
            return None;
        }
        BucketArray::try_new(power)
    }

    /// Migrates the next old bucket if its item lock is free.
    ///
    /// Must be called with the maintenance lock held.
    pub(crate) fn try_migrate_next_bucket(&self) -> MigrationStep {
        let guard = &crossbeam_epoch::pin();
        let tables = self.tables(guard);
        if !tables.is_expanding() {
            return MigrationStep::Idle;
        }

        let bucket = tables.expand_cursor();
        // Lock stripes are selected by the low bits of the digest, which are
        // the low bits of the old bucket index.
        let lock = match self.item_locks.try_lock(bucket as u32) {
            Some(lock) => lock,
            None => return MigrationStep::Contended,
        };
        let _moved = tables.migrate_bucket(&*self.items, |key| self.digest(key));
        std::mem::drop(lock);

        #[cfg(feature = "logging")]
        log::trace!("Migrated old bucket {bucket} ({_moved} items)");

        if tables.is_migrated() {
            self.finish_expand(tables, guard);
            MigrationStep::Completed
        } else {
            MigrationStep::Migrated
        }
    }

    fn finish_expand(&self, tables: &TableSet, guard: &Guard) {
        let old_bytes = tables.old().map_or(0, |old| old.bytes());
        self.publish(tables.settled(), guard);
        self.stats.record_expand_done(old_bytes);

        #[cfg(feature = "logging")]
        log::info!("Hash table expansion done");
    }

    /// Runs up to `bulk_move` migration steps, backing off after each failed
    /// attempt to take a bucket lock.
    ///
    /// Must be called with the maintenance lock held.
    pub(crate) fn migrate_pass(&self, bulk_move: usize) {
        for _ in 0..bulk_move {
            match self.try_migrate_next_bucket() {
                MigrationStep::Migrated => (),
                MigrationStep::Contended => std::thread::sleep(MIGRATION_BACKOFF),
                MigrationStep::Completed | MigrationStep::Idle => break,
            }
        }
    }

    pub(crate) fn is_expanding(&self) -> bool {
        let guard = &crossbeam_epoch::pin();
        self.tables(guard).is_expanding()
    }
}
