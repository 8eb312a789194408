#![warn(clippy::all)]
#![warn(rust_2018_idioms)]

//! A concurrent, incrementally resizable hash index for the items of an
//! in-memory key-value cache.
//!
//! [`AssocIndex`] maps byte keys to [`ItemId`]s. Lookups, insertions and
//! deletions run in parallel on many threads, each holding the
//! [`ItemLocks`] stripe of the key it works on. When the table gets too full, a
//! background maintenance thread doubles the bucket array and migrates entries
//! a few buckets at a time, so the index never stops serving requests.
//!
//! The items themselves belong to the caller and are reached through the
//! [`ItemTable`] trait. [`ItemArena`] is a ready-made implementation.
//!
//! # Example
//!
//! ```rust
//! use assoc_index::{AssocIndex, ItemArena};
//! use std::sync::Arc;
//!
//! let items = Arc::new(ItemArena::with_capacity(1_000));
//! let index = AssocIndex::builder(Arc::clone(&items))
//!     .initial_power(4)
//!     .build();
//! index.start_maintenance_worker().unwrap();
//!
//! for i in 0..100 {
//!     let key = format!("key-{i}");
//!     let hv = index.digest(key.as_bytes());
//!     let _lock = index.item_locks().lock(hv);
//!     let id = items.alloc(key.as_bytes(), i).unwrap();
//!     index.insert(id, hv);
//!     index.maybe_start_expand(items.len() as u64);
//! }
//!
//! let hv = index.digest(b"key-42");
//! let _lock = index.item_locks().lock(hv);
//! let id = index.find(b"key-42", hv).unwrap();
//! assert_eq!(items.value(id), Some(42));
//! ```
//!
//! # Logging
//!
//! With the `logging` feature, expansions, allocation failures and misuse
//! (deleting an absent key) are reported through the [`log`] crate.
//!
//! [`log`]: https://docs.rs/log

pub(crate) mod assoc;
pub(crate) mod common;
pub(crate) mod item;
pub(crate) mod lock;
pub(crate) mod pause;
pub(crate) mod stats;

pub use assoc::{AssocIndex, AssocIndexBuilder, AssocIter};
pub use common::error::Error;
pub use item::{ItemArena, ItemId, ItemTable};
pub use lock::{ItemLockGuard, ItemLocks};
pub use pause::{NoPause, ThreadPauser};
pub use stats::{HashStats, HashStatsSnapshot};
