use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::clock::AudioTime;

/// Identity of a [`crate::schedule::Scheduler`], stored on the engines it owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchedulerId(u64);

impl SchedulerId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        SchedulerId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Anything that can be driven along the audio timeline.
///
/// `advance_time` is called with the time the engine asked for (never earlier
/// than the device time) and returns when it wants to be called next:
///
/// * `Some(t)` with `t` finite: call again at `t`;
/// * `Some(NEVER)`: stay attached to the scheduler, but stop calling;
/// * `None`: done, detach from the scheduler.
///
/// [`NEVER`]: crate::clock::NEVER
pub trait TimeEngine: Send {
    fn advance_time(&mut self, time: AudioTime) -> Option<AudioTime>;

    /// Scheduler currently owning this engine.
    fn master(&self) -> Option<SchedulerId>;

    fn set_master(&mut self, master: Option<SchedulerId>);
}

pub type SharedEngine = Arc<Mutex<dyn TimeEngine>>;

/// Compares engines by identity.
pub fn same_engine(a: &SharedEngine, b: &SharedEngine) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Locks a mutex, ignoring poisoning: engine and scheduler state stay usable
/// after a panicking audio callback.
pub fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
