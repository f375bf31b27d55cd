#![forbid(unsafe_code)]

//! Per-slot subscriber registry.
//!
//! # Design
//!
//! A [`Dependency`] holds its subscribers in insertion order as
//! `Vec<Option<Weak<dyn Subscriber>>>`. Removal does not shift the vector: the
//! matching entry is replaced by `None` (a tombstone) and the dependency is
//! queued for compaction in the [cleanup queue](crate::cleanup). Conditional
//! readers re-evaluate often, and shifting a large subscriber list on every
//! removal is linear work on the hot path.
//!
//! Subscribers are held weakly. A dropped subscriber behaves like a tombstone:
//! it is skipped by dispatch and discarded by compaction.
//!
//! # Invariants
//!
//! 1. Tombstoning never reorders surviving entries.
//! 2. `cleanup_pending` is true iff the dependency sits in the cleanup queue.
//! 3. `notify()` dispatches to a snapshot taken before the first `update()`;
//!    registrations and removals made during dispatch do not affect it.
//! 4. `notify()` never mutates the subscriber list.
//! 5. With `async_mode` off, the snapshot is ordered by ascending
//!    [`SubscriberId`]; equal ids keep insertion order.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::cleanup;
use crate::config;
use crate::context;
use crate::error::{NotifyError, UpdateFailure};
use crate::logging::{debug, trace};
use crate::subscriber::{DebugEvent, DebugInfo, Subscriber, SubscriberId};

static NEXT_DEP_ID: AtomicU64 = AtomicU64::new(0);

/// Process-unique, monotonically assigned dependency id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DepId(u64);

impl DepId {
    fn next() -> Self {
        Self(NEXT_DEP_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dep#{}", self.0)
    }
}

type Slot = Option<Weak<dyn Subscriber>>;

pub(crate) struct DependencyInner {
    id: DepId,
    subscribers: RefCell<Vec<Slot>>,
    cleanup_pending: Cell<bool>,
}

/// The subscriber registry of one observable slot.
///
/// Cloning creates a new handle to the **same** registry.
#[derive(Clone)]
pub struct Dependency {
    inner: Rc<DependencyInner>,
}

impl Default for Dependency {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Dependency {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Dependency {}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency")
            .field("id", &self.inner.id)
            .field("live", &self.len())
            .field("raw", &self.raw_len())
            .field("cleanup_pending", &self.inner.cleanup_pending.get())
            .finish()
    }
}

fn is_live(slot: &Slot) -> bool {
    slot.as_ref().is_some_and(|weak| weak.strong_count() > 0)
}

impl Dependency {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(DependencyInner {
                id: DepId::next(),
                subscribers: RefCell::new(Vec::new()),
                cleanup_pending: Cell::new(false),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> DepId {
        self.inner.id
    }

    /// Append `sub`. Duplicates are kept; deduplication is the caller's job.
    pub fn register_subscriber(&self, sub: &Rc<dyn Subscriber>) {
        self.inner
            .subscribers
            .borrow_mut()
            .push(Some(Rc::downgrade(sub)));
    }

    /// Tombstone the first entry for `sub` and queue this dependency for
    /// compaction.
    ///
    /// Returns `false` (and changes nothing) when `sub` is not registered.
    pub fn remove_subscriber(&self, sub: &Rc<dyn Subscriber>) -> bool {
        let target = Rc::as_ptr(sub);
        let removed = {
            let mut subscribers = self.inner.subscribers.borrow_mut();
            let position = subscribers.iter().position(|slot| {
                slot.as_ref()
                    .is_some_and(|weak| std::ptr::addr_eq(weak.as_ptr(), target))
            });
            match position {
                Some(index) => {
                    subscribers[index] = None;
                    true
                }
                None => false,
            }
        };

        if !removed {
            debug!(
                message = "dep.remove.missing",
                dep_id = self.inner.id.raw(),
                subscriber_id = sub.id().raw()
            );
            return false;
        }

        self.schedule_cleanup();
        true
    }

    /// Queue this dependency for compaction unless it already is.
    pub(crate) fn schedule_cleanup(&self) {
        if !self.inner.cleanup_pending.replace(true) {
            cleanup::enqueue(self);
        }
    }

    /// Register the current subscriber (if any) as interested in this slot.
    pub fn depend(&self) {
        self.depend_inner(None);
    }

    /// [`depend`](Self::depend), forwarding `info` to the subscriber's
    /// `on_track` hook when debug hooks are enabled.
    pub fn depend_with(&self, info: &DebugInfo) {
        self.depend_inner(Some(info));
    }

    fn depend_inner(&self, info: Option<&DebugInfo>) {
        let Some(target) = context::current_target() else {
            return;
        };
        target.register_dependency(self);
        if let Some(info) = info
            && config::config().debug_hooks
        {
            target.on_track(&DebugEvent {
                subscriber: target.id(),
                dependency: self,
                info,
            });
        }
    }

    /// Dispatch `update()` to every subscriber live at this moment.
    ///
    /// Every snapshot subscriber is updated exactly once, even if an earlier
    /// one fails; failures come back together in dispatch order. Panics are
    /// not caught.
    pub fn notify(&self) -> Result<(), NotifyError> {
        self.notify_inner(None)
    }

    /// [`notify`](Self::notify), forwarding `info` to each subscriber's
    /// `on_trigger` hook when debug hooks are enabled.
    pub fn notify_with(&self, info: &DebugInfo) -> Result<(), NotifyError> {
        self.notify_inner(Some(info))
    }

    fn notify_inner(&self, info: Option<&DebugInfo>) -> Result<(), NotifyError> {
        let config = config::config();
        let snapshot = self.snapshot(!config.async_mode);
        trace!(
            message = "dep.notify",
            dep_id = self.inner.id.raw(),
            count = snapshot.len(),
            sorted = !config.async_mode
        );

        let mut failures = Vec::new();
        for sub in &snapshot {
            if let Some(info) = info
                && config.debug_hooks
            {
                sub.on_trigger(&DebugEvent {
                    subscriber: sub.id(),
                    dependency: self,
                    info,
                });
            }
            if let Err(error) = sub.update() {
                debug!(
                    message = "dep.update.failed",
                    dep_id = self.inner.id.raw(),
                    subscriber_id = sub.id().raw(),
                    error = %error
                );
                failures.push(UpdateFailure {
                    subscriber: sub.id(),
                    error,
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(NotifyError { failures })
        }
    }

    /// Upgrade the live entries. Entries whose subscriber was dropped get the
    /// dependency queued for compaction, like a removal would.
    fn snapshot(&self, sort_by_id: bool) -> Vec<Rc<dyn Subscriber>> {
        let mut dead = 0usize;
        let mut snapshot: Vec<Rc<dyn Subscriber>> = Vec::new();
        for weak in self.inner.subscribers.borrow().iter().flatten() {
            match weak.upgrade() {
                Some(sub) => snapshot.push(sub),
                None => dead += 1,
            }
        }
        if dead > 0 {
            trace!(
                message = "dep.notify.dead",
                dep_id = self.inner.id.raw(),
                dead
            );
            self.schedule_cleanup();
        }
        if sort_by_id {
            snapshot.sort_by_key(|sub| sub.id());
        }
        snapshot
    }

    /// Live subscribers (tombstones and dropped subscribers excluded).
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .subscribers
            .borrow()
            .iter()
            .filter(|slot| is_live(slot))
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Length of the underlying sequence, tombstones included.
    #[must_use]
    pub fn raw_len(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }

    #[must_use]
    pub fn is_cleanup_pending(&self) -> bool {
        self.inner.cleanup_pending.get()
    }

    /// Ids of the live subscribers, in sequence order.
    #[must_use]
    pub fn subscriber_ids(&self) -> Vec<SubscriberId> {
        self.inner
            .subscribers
            .borrow()
            .iter()
            .flatten()
            .filter_map(Weak::upgrade)
            .map(|sub| sub.id())
            .collect()
    }

    /// Drop tombstones and dead entries, keeping survivor order, and clear
    /// the pending flag.
    pub(crate) fn compact(&self) -> usize {
        let mut subscribers = self.inner.subscribers.borrow_mut();
        let before = subscribers.len();
        subscribers.retain(is_live);
        self.inner.cleanup_pending.set(false);
        before - subscribers.len()
    }

    pub(crate) fn downgrade(&self) -> Weak<DependencyInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn from_inner(inner: Rc<DependencyInner>) -> Self {
        Self { inner }
    }
}
