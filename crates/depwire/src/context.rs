#![forbid(unsafe_code)]

//! The active-subscriber context.
//!
//! [`SubscriberContext`] is a stack of "subscriber or none" entries. Its top
//! is the subscriber whose evaluation is currently registering dependencies.
//! Evaluation drivers push before evaluating and pop afterwards, so nested
//! evaluations (a derived value read while another one computes) restore the
//! enclosing subscriber exactly.
//!
//! One instance per thread is *the* context: [`Dependency::depend`] reads its
//! top, and the free functions in this module ([`push_target`],
//! [`pop_target`], [`track`], ...) operate on it.
//!
//! # Invariants
//!
//! 1. The current subscriber is always the top of the stack; there is no
//!    separate variable that could drift from it.
//! 2. Push/pop is strictly LIFO. Popping an empty stack is a programming
//!    error: [`pop`](SubscriberContext::pop) panics,
//!    [`try_pop`](SubscriberContext::try_pop) reports
//!    [`DepError::ContextUnderflow`].
//! 3. No borrow of the stack is held while subscriber code runs.
//!
//! [`Dependency::depend`]: crate::Dependency::depend

use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::error::{DepError, Result};
use crate::logging::{debug, trace};
use crate::subscriber::{Subscriber, SubscriberId};

thread_local! {
    static ACTIVE: SubscriberContext = SubscriberContext::new();
}

/// Stack of subscribers under evaluation.
#[derive(Default)]
pub struct SubscriberContext {
    stack: RefCell<Vec<Option<Rc<dyn Subscriber>>>>,
}

impl std::fmt::Debug for SubscriberContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stack = self.stack.borrow();
        let ids: Vec<Option<SubscriberId>> = stack
            .iter()
            .map(|entry| entry.as_ref().map(|sub| sub.id()))
            .collect();
        f.debug_struct("SubscriberContext")
            .field("stack", &ids)
            .finish()
    }
}

impl SubscriberContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push `target` (possibly `None`, which pauses tracking) and make it current.
    pub fn push(&self, target: Option<Rc<dyn Subscriber>>) {
        let mut stack = self.stack.borrow_mut();
        stack.push(target);
        trace!(
            message = "context.push",
            depth = stack.len(),
            subscriber_id = stack.last().and_then(|e| e.as_ref()).map(|s| s.id().raw())
        );
    }

    /// Pop the top entry; the new top becomes current.
    ///
    /// # Panics
    ///
    /// Panics on underflow (a `pop()` without a matching `push()`).
    pub fn pop(&self) -> Option<Rc<dyn Subscriber>> {
        match self.try_pop() {
            Ok(entry) => entry,
            Err(err) => panic!("{err}"),
        }
    }

    /// Like [`pop`](Self::pop), reporting underflow as an error.
    pub fn try_pop(&self) -> Result<Option<Rc<dyn Subscriber>>> {
        let mut stack = self.stack.borrow_mut();
        let entry = stack.pop().ok_or(DepError::ContextUnderflow)?;
        trace!(message = "context.pop", depth = stack.len());
        Ok(entry)
    }

    /// The subscriber currently being evaluated, if any.
    #[must_use]
    pub fn current(&self) -> Option<Rc<dyn Subscriber>> {
        self.stack.borrow().last().cloned().flatten()
    }

    #[must_use]
    pub fn current_id(&self) -> Option<SubscriberId> {
        self.stack
            .borrow()
            .last()
            .and_then(|entry| entry.as_ref().map(|sub| sub.id()))
    }

    /// Number of pushed entries, `None` entries included.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.borrow().len()
    }

    /// Drop every entry. Only meant for resetting state between tests.
    pub fn clear(&self) {
        // Take first so subscriber drops run without the borrow held.
        let drained = std::mem::take(&mut *self.stack.borrow_mut());
        drop(drained);
    }
}

/// Run `f` with the thread's context.
pub fn with_context<R>(f: impl FnOnce(&SubscriberContext) -> R) -> R {
    ACTIVE.with(f)
}

pub fn push_target(target: Option<Rc<dyn Subscriber>>) {
    ACTIVE.with(|ctx| ctx.push(target));
}

/// # Panics
///
/// Panics on underflow.
pub fn pop_target() -> Option<Rc<dyn Subscriber>> {
    ACTIVE.with(SubscriberContext::pop)
}

#[must_use]
pub fn current_target() -> Option<Rc<dyn Subscriber>> {
    ACTIVE.with(SubscriberContext::current)
}

#[must_use]
pub fn current_id() -> Option<SubscriberId> {
    ACTIVE.with(SubscriberContext::current_id)
}

#[must_use]
pub fn depth() -> usize {
    ACTIVE.with(SubscriberContext::depth)
}

/// Push `target` onto the thread's context until the guard drops.
#[must_use = "dropping this guard pops the context immediately"]
pub fn enter(target: Option<Rc<dyn Subscriber>>) -> TrackingScope {
    push_target(target);
    TrackingScope {
        _not_send: PhantomData,
    }
}

/// Evaluate `f` with `target` as the current subscriber.
///
/// The context is popped even if `f` panics.
pub fn track<R>(target: Option<Rc<dyn Subscriber>>, f: impl FnOnce() -> R) -> R {
    let _scope = enter(target);
    f()
}

/// Evaluate `f` with tracking paused (`None` on top).
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    track(None, f)
}

/// Pops the thread's context on drop.
#[derive(Debug)]
pub struct TrackingScope {
    _not_send: PhantomData<Rc<()>>,
}

impl Drop for TrackingScope {
    fn drop(&mut self) {
        // The stack may have been cleared under the scope; panicking here
        // while unwinding would abort.
        if ACTIVE.with(SubscriberContext::try_pop).is_err() {
            debug!(message = "context.scope.underflow");
        }
    }
}

pub(crate) fn reset() {
    ACTIVE.with(SubscriberContext::clear);
}
