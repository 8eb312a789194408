use std::time::Duration;

/// The default power of two of the primary bucket array (65,536 buckets).
pub(crate) const DEFAULT_HASHPOWER: u32 = 16;

/// Digests are 32 bits wide, so a larger table would leave buckets unreachable.
pub(crate) const MAX_HASHPOWER: u32 = 32;

/// The default power of two of the item lock stripes.
pub(crate) const DEFAULT_ITEM_LOCK_POWER: u32 = 13;

/// The largest power of two of the item lock stripes (16M mutexes).
pub(crate) const MAX_ITEM_LOCK_POWER: u32 = 24;

/// The default number of old buckets migrated per maintenance pass.
pub(crate) const DEFAULT_HASH_BULK_MOVE: usize = 1;

/// Overrides the bulk move count when the maintenance worker starts.
pub(crate) const HASH_BULK_MOVE_ENV: &str = "ASSOC_HASH_BULK_MOVE";

/// How long the maintenance worker sleeps after failing to lock a bucket.
pub(crate) const MIGRATION_BACKOFF: Duration = Duration::from_millis(10);

pub(crate) const MAINTENANCE_THREAD_NAME: &str = "assoc-maintenance";
