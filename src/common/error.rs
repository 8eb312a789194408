/// The error type of the index and its collaborators.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// `delete` was called for a key that is not in the index.
    ///
    /// Callers are required to confirm that a key exists before deleting it, so
    /// this error signals a broken invariant in the calling layer.
    #[error("attempted to delete a key that is not in the hash index")]
    KeyNotFound,

    /// `start_maintenance_worker` was called while the worker was running.
    #[error("the hash table maintenance worker is already running")]
    WorkerAlreadyRunning,

    /// The operating system refused to create the maintenance thread.
    #[error("failed to spawn the hash table maintenance thread: {0}")]
    SpawnWorker(#[source] std::io::Error),

    /// The item arena has no free slot left.
    #[error("the item arena is full (capacity: {capacity})")]
    ArenaFull { capacity: usize },
}
