#![forbid(unsafe_code)]

//! Eager effects: re-run a closure whenever anything it read changes.
//!
//! An [`Effect`] runs once on creation and again on every `update()`, each
//! time under the active context so its reads are tracked afresh.
//! Dependencies the latest run stopped reading drop it.
//!
//! Re-running happens synchronously inside the notifying dependency's
//! dispatch. Deferring runs to a flush is the scheduler's job, not this
//! type's.
//!
//! # Invariants
//!
//! 1. A stopped effect never runs again and is registered nowhere.
//! 2. An update arriving while the effect is already running (it wrote to
//!    something it reads) is skipped rather than recursing.
//! 3. Dropping the last handle detaches the effect: dependencies only hold it
//!    weakly, and the ones it read are queued for compaction.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::context;
use crate::dependency::Dependency;
use crate::error::BoxError;
use crate::logging::trace;
use crate::subscriber::{DebugEvent, Subscriber, SubscriberId};
use crate::tracker::DepTracker;

type EffectFn = Box<dyn FnMut() -> Result<(), BoxError>>;
type HookFn = Box<dyn Fn(&DebugEvent<'_>)>;

struct EffectInner {
    id: SubscriberId,
    this: Weak<EffectInner>,
    run: RefCell<EffectFn>,
    tracker: DepTracker,
    active: Cell<bool>,
    running: Cell<bool>,
    runs: Cell<u64>,
    on_track: Option<HookFn>,
    on_trigger: Option<HookFn>,
}

/// Resets the running flag even if the effect body panics.
struct RunningGuard<'a>(&'a Cell<bool>);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl EffectInner {
    fn create(run: EffectFn, on_track: Option<HookFn>, on_trigger: Option<HookFn>) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            id: SubscriberId::next(),
            this: this.clone(),
            run: RefCell::new(run),
            tracker: DepTracker::default(),
            active: Cell::new(true),
            running: Cell::new(false),
            runs: Cell::new(0),
            on_track,
            on_trigger,
        })
    }

    fn handle(&self) -> Option<Rc<dyn Subscriber>> {
        self.this.upgrade().map(|this| this as Rc<dyn Subscriber>)
    }

    fn execute(&self) -> Result<(), BoxError> {
        if !self.active.get() {
            return Ok(());
        }
        if self.running.get() {
            trace!(message = "effect.reentrant_skip", subscriber_id = self.id.raw());
            return Ok(());
        }
        let Some(this) = self.handle() else {
            return Ok(());
        };

        self.running.set(true);
        let _running = RunningGuard(&self.running);
        self.tracker.begin();
        let result = context::track(Some(Rc::clone(&this)), || {
            let mut run = self.run.borrow_mut();
            (*run)()
        });
        if self.active.get() {
            self.tracker.finish(&this);
        } else {
            // Stopped by its own body.
            self.tracker.teardown(&this);
        }
        self.runs.set(self.runs.get() + 1);
        result
    }
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        self.tracker.release();
    }
}

impl Subscriber for EffectInner {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn register_dependency(&self, dep: &Dependency) {
        if !self.active.get() {
            return;
        }
        if let Some(this) = self.handle() {
            self.tracker.add(dep, &this);
        }
    }

    fn update(&self) -> Result<(), BoxError> {
        self.execute()
    }

    fn on_track(&self, event: &DebugEvent<'_>) {
        if let Some(hook) = &self.on_track {
            hook(event);
        }
    }

    fn on_trigger(&self, event: &DebugEvent<'_>) {
        if let Some(hook) = &self.on_trigger {
            hook(event);
        }
    }
}

/// Builder for effects with debug hooks.
#[derive(Default)]
pub struct EffectBuilder {
    on_track: Option<HookFn>,
    on_trigger: Option<HookFn>,
}

impl EffectBuilder {
    #[must_use]
    pub fn on_track(mut self, hook: impl Fn(&DebugEvent<'_>) + 'static) -> Self {
        self.on_track = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn on_trigger(mut self, hook: impl Fn(&DebugEvent<'_>) + 'static) -> Self {
        self.on_trigger = Some(Box::new(hook));
        self
    }

    /// Create the effect and run it once.
    pub fn run(
        self,
        f: impl FnMut() -> Result<(), BoxError> + 'static,
    ) -> Result<Effect, BoxError> {
        let inner = EffectInner::create(Box::new(f), self.on_track, self.on_trigger);
        inner.execute()?;
        Ok(Effect { inner })
    }
}

/// A closure re-run whenever a dependency it read notifies.
///
/// Cloning an `Effect` creates a new handle to the **same** effect.
#[derive(Clone)]
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("active", &self.inner.active.get())
            .field("runs", &self.inner.runs.get())
            .field("dependencies", &self.inner.tracker.len())
            .finish()
    }
}

impl Effect {
    /// Create an infallible effect and run it once.
    pub fn new(mut f: impl FnMut() + 'static) -> Self {
        let run: EffectFn = Box::new(move || {
            f();
            Ok(())
        });
        let inner = EffectInner::create(run, None, None);
        // Infallible body: the only possible result is Ok.
        let _ = inner.execute();
        Self { inner }
    }

    /// Create a fallible effect and run it once. A failing first run is
    /// returned as the error and the effect is discarded.
    pub fn try_new(f: impl FnMut() -> Result<(), BoxError> + 'static) -> Result<Self, BoxError> {
        Self::builder().run(f)
    }

    #[must_use]
    pub fn builder() -> EffectBuilder {
        EffectBuilder::default()
    }

    /// Run the effect now, re-tracking its dependencies.
    pub fn run(&self) -> Result<(), BoxError> {
        self.inner.execute()
    }

    /// Detach from every dependency; later updates are no-ops.
    pub fn stop(&self) {
        if !self.inner.active.replace(false) {
            return;
        }
        if let Some(this) = self.inner.handle() {
            self.inner.tracker.teardown(&this);
        }
        trace!(message = "effect.stop", subscriber_id = self.inner.id.raw());
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    /// Completed runs, the initial one included.
    #[must_use]
    pub fn run_count(&self) -> u64 {
        self.inner.runs.get()
    }

    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    #[must_use]
    pub fn dependency_count(&self) -> usize {
        self.inner.tracker.len()
    }

    #[must_use]
    pub fn as_subscriber(&self) -> Rc<dyn Subscriber> {
        Rc::clone(&self.inner) as Rc<dyn Subscriber>
    }
}
