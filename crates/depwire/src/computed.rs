#![forbid(unsafe_code)]

//! Lazy computed values with automatic dependency tracking.
//!
//! # Design
//!
//! [`Computed<T>`] wraps a compute function and its cached result in shared,
//! reference-counted storage, and is itself a [`Subscriber`]. Evaluation runs
//! the function with the computed pushed onto the active context, so every
//! [`Dependency::depend`] inside it registers the computed. When any of those
//! dependencies notifies, the cached value is invalidated (marked dirty) and
//! the notification is forwarded through the computed's own dependency. The
//! next call to [`get()`](Computed::get) recomputes and caches the result.
//!
//! Reading a computed inside another evaluation registers the reader on the
//! computed's own dependency, so chains and diamonds propagate.
//!
//! # Invariants
//!
//! 1. `get()` always returns a value consistent with the current state of all
//!    dependencies (no stale reads after a dependency notification completes).
//! 2. The compute function is called at most once per dependency change cycle
//!    (memoization).
//! 3. If no dependency has changed, `get()` returns the cached value without
//!    re-running the compute function.
//! 4. Version increments by exactly 1 per recomputation.
//! 5. A dependency not read by the latest evaluation no longer lists the
//!    computed (it was tombstoned when that evaluation finished).
//!
//! # Failure Modes
//!
//! - **Compute function panics**: The context is still popped. The cached
//!   value remains from the last successful computation and the dirty flag
//!   stays set, so the next `get()` will retry.
//! - **Dependency dropped**: The computed keeps its last cached result and
//!   never becomes dirty again from that dependency.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::context;
use crate::dependency::Dependency;
use crate::error::BoxError;
use crate::subscriber::{Subscriber, SubscriberId};
use crate::tracker::DepTracker;

/// Shared interior for [`Computed<T>`].
struct ComputedInner<T> {
    id: SubscriberId,
    /// Back-reference used to register `Rc<dyn Subscriber>` handles.
    this: Weak<ComputedInner<T>>,
    compute: Box<dyn Fn() -> T>,
    /// Cached result (None only before first computation).
    cached: RefCell<Option<T>>,
    dirty: Cell<bool>,
    /// Set while the compute function runs.
    computing: Cell<bool>,
    /// Monotonically increasing version, bumped on each recomputation.
    version: Cell<u64>,
    /// Readers of this computed.
    dep: Dependency,
    /// Dependencies read by the last evaluation.
    tracker: DepTracker,
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        self.tracker.release();
    }
}

/// Clears the computing flag even if the compute function panics.
struct ComputingGuard<'a>(&'a Cell<bool>);

impl Drop for ComputingGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl<T: 'static> Subscriber for ComputedInner<T> {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn register_dependency(&self, dep: &Dependency) {
        if let Some(this) = self.this.upgrade() {
            let this: Rc<dyn Subscriber> = this;
            self.tracker.add(dep, &this);
        }
    }

    fn update(&self) -> Result<(), BoxError> {
        self.dirty.set(true);
        self.dep.notify().map_err(Into::into)
    }
}

/// A lazily-evaluated, memoized value derived from the dependencies its
/// compute function reads.
///
/// Cloning a `Computed` creates a new handle to the **same** inner state.
pub struct Computed<T> {
    inner: Rc<ComputedInner<T>>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("cached", &self.inner.cached.borrow())
            .field("dirty", &self.inner.dirty.get())
            .field("version", &self.inner.version.get())
            .finish()
    }
}

impl<T: 'static> Computed<T> {
    /// Create a computed value. Nothing runs until the first read.
    pub fn new(compute: impl Fn() -> T + 'static) -> Self {
        let inner = Rc::new_cyclic(|this| ComputedInner {
            id: SubscriberId::next(),
            this: this.clone(),
            compute: Box::new(compute),
            cached: RefCell::new(None),
            dirty: Cell::new(true), // Dirty initially, computed on first get().
            computing: Cell::new(false),
            version: Cell::new(0),
            dep: Dependency::new(),
            tracker: DepTracker::default(),
        });
        Self { inner }
    }

    fn refresh(&self) {
        let inner = &self.inner;
        if !inner.dirty.get() && inner.cached.borrow().is_some() {
            return;
        }
        assert!(
            !inner.computing.replace(true),
            "computed {} read itself while computing",
            inner.id
        );
        let _computing = ComputingGuard(&inner.computing);
        let this: Rc<dyn Subscriber> = Rc::clone(inner) as Rc<dyn Subscriber>;
        inner.tracker.begin();
        let value = context::track(Some(Rc::clone(&this)), || (inner.compute)());
        inner.tracker.finish(&this);
        *inner.cached.borrow_mut() = Some(value);
        inner.dirty.set(false);
        inner.version.set(inner.version.get() + 1);
    }

    /// Access the current value by reference without cloning.
    ///
    /// Forces recomputation if dirty, and registers the current subscriber
    /// (if any) as a reader.
    ///
    /// # Panics
    ///
    /// Panics if the compute function reads this same `Computed`, and if `f`
    /// forces it to recompute (re-entrant borrow).
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.refresh();
        self.inner.dep.depend();
        let cached = self.inner.cached.borrow();
        f(cached.as_ref().expect("cached is always Some after refresh"))
    }

    /// Whether the cached value is stale.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    /// Force invalidation of the cached value. The next `get()` will
    /// recompute.
    pub fn invalidate(&self) {
        self.inner.dirty.set(true);
    }

    /// Current version number. Increments by 1 on each recomputation.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// The dependency readers of this computed subscribe to.
    #[must_use]
    pub fn dependency(&self) -> &Dependency {
        &self.inner.dep
    }

    /// Dependencies read by the last evaluation.
    #[must_use]
    pub fn dependency_count(&self) -> usize {
        self.inner.tracker.len()
    }

    /// This computed as a type-erased subscriber handle.
    #[must_use]
    pub fn as_subscriber(&self) -> Rc<dyn Subscriber> {
        Rc::clone(&self.inner) as Rc<dyn Subscriber>
    }
}

impl<T: Clone + 'static> Computed<T> {
    /// Get the current value, recomputing if any dependency has changed.
    ///
    /// Returns a clone of the cached value.
    #[must_use]
    pub fn get(&self) -> T {
        self.with(T::clone)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
