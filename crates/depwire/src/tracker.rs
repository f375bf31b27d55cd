#![forbid(unsafe_code)]

//! Per-evaluation dependency bookkeeping shared by [`Computed`] and
//! [`Effect`].
//!
//! Each evaluation collects the dependencies it reads into a fresh set. When
//! it finishes, dependencies read last time but not this time drop the
//! subscriber (tombstoning it), and the fresh set becomes current. A
//! dependency read several times in one evaluation registers once.
//!
//! [`Computed`]: crate::Computed
//! [`Effect`]: crate::Effect

use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashSet;

use crate::dependency::{DepId, Dependency};
use crate::subscriber::Subscriber;

#[derive(Default)]
struct DepSet {
    ids: AHashSet<DepId>,
    deps: Vec<Dependency>,
}

impl DepSet {
    fn insert(&mut self, dep: &Dependency) -> bool {
        if self.ids.insert(dep.id()) {
            self.deps.push(dep.clone());
            true
        } else {
            false
        }
    }

    fn contains(&self, id: DepId) -> bool {
        self.ids.contains(&id)
    }

    fn clear(&mut self) {
        self.ids.clear();
        self.deps.clear();
    }
}

#[derive(Default)]
pub(crate) struct DepTracker {
    current: RefCell<DepSet>,
    collecting: RefCell<DepSet>,
}

impl DepTracker {
    /// Start collecting for a new evaluation.
    pub(crate) fn begin(&self) {
        self.collecting.borrow_mut().clear();
    }

    /// Record a read of `dep` by `this`.
    pub(crate) fn add(&self, dep: &Dependency, this: &Rc<dyn Subscriber>) {
        if !self.collecting.borrow_mut().insert(dep) {
            return;
        }
        if !self.current.borrow().contains(dep.id()) {
            dep.register_subscriber(this);
        }
    }

    /// Detach `this` from dependencies the finished evaluation no longer
    /// reads, then adopt the collected set.
    pub(crate) fn finish(&self, this: &Rc<dyn Subscriber>) {
        let mut current = self.current.borrow_mut();
        let mut collecting = self.collecting.borrow_mut();
        for dep in &current.deps {
            if !collecting.contains(dep.id()) {
                dep.remove_subscriber(this);
            }
        }
        std::mem::swap(&mut *current, &mut *collecting);
        collecting.clear();
    }

    /// Detach `this` from everything, including dependencies an evaluation
    /// still in progress has registered on.
    pub(crate) fn teardown(&self, this: &Rc<dyn Subscriber>) {
        let mut current = self.current.borrow_mut();
        let mut collecting = self.collecting.borrow_mut();
        for dep in &current.deps {
            dep.remove_subscriber(this);
        }
        for dep in &collecting.deps {
            if !current.contains(dep.id()) {
                dep.remove_subscriber(this);
            }
        }
        current.clear();
        collecting.clear();
    }

    /// Queue every tracked dependency for compaction. Used once the owning
    /// subscriber is gone and its entries are dead.
    pub(crate) fn release(&self) {
        for dep in &self.current.borrow().deps {
            dep.schedule_cleanup();
        }
        for dep in &self.collecting.borrow().deps {
            dep.schedule_cleanup();
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.current.borrow().deps.len()
    }
}
