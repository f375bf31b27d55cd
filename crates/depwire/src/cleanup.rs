#![forbid(unsafe_code)]

//! Deferred tombstone compaction.
//!
//! [`Dependency::remove_subscriber`] only tombstones; it queues the
//! dependency here (once, guarded by its pending flag). Dependencies holding
//! entries for dropped subscribers are queued too: by `notify()` when it
//! finds them, and by [`Computed`]/[`Effect`] when their last handle drops.
//! [`flush`] compacts every queued dependency in one pass.
//!
//! Nothing in the core calls [`flush`]. The scheduler is expected to call it
//! between dispatch cycles, never from inside a `notify()` loop.
//!
//! The queue holds dependencies weakly: a slot dropped before the flush is
//! simply skipped.
//!
//! [`Dependency::remove_subscriber`]: crate::Dependency::remove_subscriber
//! [`Computed`]: crate::Computed
//! [`Effect`]: crate::Effect

use std::cell::RefCell;
use std::rc::Weak;

use crate::dependency::{Dependency, DependencyInner};
use crate::logging::debug;

thread_local! {
    static QUEUE: CleanupQueue = CleanupQueue::default();
}

#[derive(Default)]
struct CleanupQueue {
    pending: RefCell<Vec<Weak<DependencyInner>>>,
}

/// Outcome of one [`flush`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Dependencies compacted (queued ones that were still alive).
    pub dependencies: usize,
    /// Entries discarded across all of them.
    pub removed: usize,
}

pub(crate) fn enqueue(dep: &Dependency) {
    // Subscribers dropped during thread teardown may outlive the queue.
    let _ = QUEUE.try_with(|queue| queue.pending.borrow_mut().push(dep.downgrade()));
}

/// Compact every queued dependency and empty the queue.
pub fn flush() -> FlushStats {
    let drained = QUEUE.with(|queue| std::mem::take(&mut *queue.pending.borrow_mut()));
    let mut stats = FlushStats::default();
    for inner in drained.iter().filter_map(Weak::upgrade) {
        stats.removed += Dependency::from_inner(inner).compact();
        stats.dependencies += 1;
    }
    debug!(
        message = "dep.cleanup.flush",
        queued = drained.len(),
        dependencies = stats.dependencies,
        removed = stats.removed
    );
    stats
}

/// Number of dependencies waiting for compaction.
#[must_use]
pub fn pending_len() -> usize {
    QUEUE.with(|queue| queue.pending.borrow().len())
}

/// Leave the queue empty and every queued dependency compacted.
pub(crate) fn reset() {
    flush();
}
