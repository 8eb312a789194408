//! The background thread that expands the hash table.
//!
//! The worker owns the maintenance lock for as long as it is not waiting for
//! work. It has three states:
//!
//! - idle: waiting on the maintenance condition for an expansion request;
//! - swapping the table: the short window, bracketed by the thread pauser,
//!   where the doubled bucket array is published;
//! - migrating: moving `bulk_move` old buckets per pass into the new array
//!   until the old array can be retired.

use super::index::Inner;
use crate::{
    common::{
        concurrent::constants::{
            DEFAULT_HASH_BULK_MOVE, HASH_BULK_MOVE_ENV, MAINTENANCE_THREAD_NAME,
        },
        error::Error,
    },
    item::ItemTable,
};

use std::{
    hash::BuildHasher,
    sync::Arc,
    thread::{self, JoinHandle},
};

/// State protected by the maintenance lock.
#[derive(Debug, Default)]
pub(crate) struct MaintenanceState {
    /// Set by the expansion trigger, consumed by the worker.
    pub(crate) expand_requested: bool,
}

pub(crate) struct MaintenanceWorker {
    handle: JoinHandle<()>,
}

impl MaintenanceWorker {
    pub(crate) fn start<T, S>(inner: Arc<Inner<T, S>>, bulk_move: usize) -> Result<Self, Error>
    where
        T: ItemTable + 'static,
        S: BuildHasher + Send + Sync + 'static,
    {
        inner.set_worker_running(true);
        let worker_inner = Arc::clone(&inner);
        let spawned = thread::Builder::new()
            .name(MAINTENANCE_THREAD_NAME.to_string())
            .spawn(move || run(&worker_inner, bulk_move));

        match spawned {
            Ok(handle) => {
                #[cfg(feature = "logging")]
                log::debug!("Started the hash table maintenance worker (bulk move: {bulk_move})");
                Ok(Self { handle })
            }
            Err(e) => {
                inner.set_worker_running(false);
                Err(Error::SpawnWorker(e))
            }
        }
    }

    /// Signals the worker to exit and waits for it.
    pub(crate) fn stop<T, S>(self, inner: &Inner<T, S>) {
        inner.set_worker_running(false);
        {
            // Notify under the lock, so the signal cannot slip in between the
            // worker's run flag check and its wait.
            let _state = inner.maintenance.lock();
            inner.maintenance_cond.notify_all();
        }
        if self.handle.join().is_err() {
            #[cfg(feature = "logging")]
            log::error!("The hash table maintenance worker panicked");
        }

        #[cfg(feature = "logging")]
        log::debug!("Stopped the hash table maintenance worker");
    }
}

fn run<T, S>(inner: &Inner<T, S>, bulk_move: usize)
where
    T: ItemTable,
    S: BuildHasher,
{
    let mut state = inner.maintenance.lock();

    while inner.is_worker_running() {
        if inner.is_expanding() {
            inner.migrate_pass(bulk_move);
            continue;
        }

        while !state.expand_requested && inner.is_worker_running() {
            inner.maintenance_cond.wait(&mut state);
        }
        if !inner.is_worker_running() {
            break;
        }
        state.expand_requested = false;

        // The bucket arrays change identity here.
        inner.pauser.pause_all();
        inner.begin_expand();
        inner.pauser.resume_all();
    }
}

/// Returns the number of buckets to migrate per pass.
///
/// `ASSOC_HASH_BULK_MOVE` overrides `configured` when set to a positive
/// integer; any other value selects the built-in default.
pub(crate) fn bulk_move_from_env(configured: usize) -> usize {
    resolve_bulk_move(std::env::var(HASH_BULK_MOVE_ENV).ok().as_deref(), configured)
}

fn resolve_bulk_move(env_value: Option<&str>, configured: usize) -> usize {
    match env_value {
        None => configured,
        Some(v) => match v.trim().parse::<usize>() {
            Ok(n) if n > 0 => n,
            _ => DEFAULT_HASH_BULK_MOVE,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::resolve_bulk_move;
    use crate::{
        common::{error::Error, test_utils::key_with_digest},
        item::ItemArena,
        pause::ThreadPauser,
        AssocIndex,
    };

    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        thread,
        time::{Duration, Instant},
    };

    #[derive(Default)]
    struct CountingPauser {
        paused: AtomicUsize,
        resumed: AtomicUsize,
    }

    impl ThreadPauser for CountingPauser {
        fn pause_all(&self) {
            self.paused.fetch_add(1, Ordering::AcqRel);
        }

        fn resume_all(&self) {
            self.resumed.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn bulk_move_resolution() {
        assert_eq!(resolve_bulk_move(None, 1), 1);
        assert_eq!(resolve_bulk_move(None, 8), 8);
        assert_eq!(resolve_bulk_move(Some("16"), 8), 16);
        assert_eq!(resolve_bulk_move(Some(" 4 "), 8), 4);
        assert_eq!(resolve_bulk_move(Some("0"), 8), 1);
        assert_eq!(resolve_bulk_move(Some("lots"), 8), 1);
        assert_eq!(resolve_bulk_move(Some(""), 8), 1);
    }

    #[test]
    fn expands_in_the_background() {
        let items = Arc::new(ItemArena::with_capacity(64));
        let pauser = Arc::new(CountingPauser::default());
        let index = AssocIndex::builder(Arc::clone(&items))
            .initial_power(2)
            .thread_pauser(Arc::clone(&pauser) as Arc<dyn ThreadPauser>)
            .build();

        let keys = (0..7)
            .map(|i| key_with_digest(&format!("key{i}"), 0))
            .map(|k| {
                let hv = index.digest(&k);
                let _lock = index.item_locks().lock(hv);
                let id = items.alloc(&k, ()).unwrap();
                index.insert(id, hv);
                (k, hv, id)
            })
            .collect::<Vec<_>>();

        index.start_maintenance_worker().unwrap();
        assert!(matches!(
            index.start_maintenance_worker(),
            Err(Error::WorkerAlreadyRunning)
        ));

        // 7 items > 4 buckets * 1.5. The worker may still be starting up and
        // holding the maintenance lock, so retry until the signal goes out.
        wait_until(|| index.maybe_start_expand(keys.len() as u64));
        wait_until(|| index.hashpower() == 3 && !index.is_expanding());

        assert_eq!(pauser.paused.load(Ordering::Acquire), 1);
        assert_eq!(pauser.resumed.load(Ordering::Acquire), 1);
        assert_eq!(index.stats().snapshot().expansions_completed(), 1);

        for (k, hv, id) in &keys {
            let _lock = index.item_locks().lock(*hv);
            assert_eq!(index.find(k, *hv), Some(*id));
        }

        // Below the threshold of 8 buckets: no signal.
        assert!(!index.maybe_start_expand(keys.len() as u64));

        index.stop_maintenance_worker();
        // Stopping twice is harmless, and the worker can be restarted.
        index.stop_maintenance_worker();
        index.start_maintenance_worker().unwrap();
    }

    #[test]
    fn stops_promptly_when_idle() {
        let items = Arc::new(ItemArena::<()>::with_capacity(1));
        let index = AssocIndex::builder(items).initial_power(2).build();
        index.start_maintenance_worker().unwrap();

        let started = Instant::now();
        index.stop_maintenance_worker();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn waits_again_after_a_failed_expansion() {
        let items = Arc::new(ItemArena::<()>::with_capacity(1));
        let pauser = Arc::new(CountingPauser::default());
        let index = AssocIndex::builder(items)
            .initial_power(2)
            .thread_pauser(Arc::clone(&pauser) as Arc<dyn ThreadPauser>)
            .build();
        index
            .inner()
            .fail_next_expansion
            .store(true, Ordering::Release);
        index.start_maintenance_worker().unwrap();

        wait_until(|| index.maybe_start_expand(7));
        wait_until(|| pauser.resumed.load(Ordering::Acquire) == 1);
        // The worker releases the lock only to wait for the next request.
        wait_until(|| index.inner().maintenance.try_lock().is_some());
        assert_eq!(index.hashpower(), 2);
        assert!(!index.is_expanding());
        assert_eq!(index.stats().snapshot().expansions_completed(), 0);

        wait_until(|| index.maybe_start_expand(7));
        wait_until(|| index.hashpower() == 3 && !index.is_expanding());
        assert_eq!(pauser.resumed.load(Ordering::Acquire), 2);
        index.stop_maintenance_worker();
    }

    #[test]
    fn resumes_a_suspended_migration() {
        let items = Arc::new(ItemArena::<()>::with_capacity(1));
        let index = AssocIndex::builder(items).initial_power(4).build();
        {
            let _state = index.inner().maintenance.lock();
            assert!(index.inner().begin_expand());
        }
        assert!(index.is_expanding());

        index.start_maintenance_worker().unwrap();
        wait_until(|| !index.is_expanding());
        assert_eq!(index.hashpower(), 5);
    }
}
