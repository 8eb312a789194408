//! The hook used to stop request threads around a bucket array swap.

/// Pauses and resumes the threads that access the hash index.
///
/// The maintenance worker calls `pause_all` right before it publishes a new,
/// doubled bucket array and `resume_all` right after. The index itself is safe
/// without pausing: readers load the bucket arrays through an epoch-protected
/// pointer. Servers that want every request thread quiescent during the swap,
/// as a classic stop-the-world expansion, can plug their barrier in here.
pub trait ThreadPauser: Send + Sync {
    fn pause_all(&self);

    fn resume_all(&self);
}

/// A `ThreadPauser` that does not pause anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPause;

impl ThreadPauser for NoPause {
    fn pause_all(&self) {}

    fn resume_all(&self) {}
}
