#![forbid(unsafe_code)]

//! Fine-grained dependency tracking.
//!
//! This crate records which computations read which observable slots, and
//! replays change notifications to exactly those computations:
//!
//! - [`Dependency`]: the subscriber registry of one observable slot.
//!   `depend()` on read, `notify()` on write.
//! - [`SubscriberContext`]: the stack of subscribers under evaluation; its top
//!   is the one `depend()` registers.
//! - [`cleanup`]: deferred compaction of removed subscribers.
//! - [`Subscriber`]: the capability contract every notification target
//!   implements.
//! - [`Computed`] and [`Effect`]: ready-made lazy and eager subscribers.
//!
//! # Architecture
//!
//! Everything is single-threaded. Handles are `Rc`-based and the process-wide
//! pieces (active context, cleanup queue, [`DepConfig`]) are thread-local, so
//! each thread, and each test, sees its own state.
//!
//! Evaluation drivers bracket a subscriber's evaluation with
//! [`context::push_target`] / [`context::pop_target`] (or [`context::track`]).
//! Observable reads call [`Dependency::depend`]; writes call
//! [`Dependency::notify`], which dispatches `update()` to a snapshot of the
//! live subscribers. Removal tombstones in place; a scheduler calls
//! [`cleanup::flush`] between dispatch cycles to compact.
//!
//! # Invariants
//!
//! 1. `notify()` updates each subscriber live at its start exactly once,
//!    regardless of registrations or removals made during dispatch.
//! 2. A removed subscriber is never updated by a later `notify()`.
//! 3. `depend()` with no active subscriber does nothing.
//! 4. Nested evaluations restore the enclosing subscriber exactly.
//! 5. Without async mode, dispatch is in ascending subscriber id order.
//! 6. Compaction keeps survivors in registration order.
//!
//! # Example
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use depwire::{Computed, Dependency};
//!
//! let value = Rc::new(Cell::new(2));
//! let dep = Dependency::new();
//!
//! let (v, d) = (Rc::clone(&value), dep.clone());
//! let squared = Computed::new(move || {
//!     d.depend();
//!     v.get() * v.get()
//! });
//! assert_eq!(squared.get(), 4);
//!
//! value.set(3);
//! dep.notify().unwrap();
//! assert!(squared.is_dirty());
//! assert_eq!(squared.get(), 9);
//! ```

pub mod cleanup;
pub mod computed;
pub mod config;
pub mod context;
pub mod dependency;
pub mod effect;
pub mod error;
mod logging;
pub mod subscriber;
mod tracker;

pub use cleanup::FlushStats;
pub use computed::Computed;
pub use config::{ConfigOverride, DepConfig};
pub use context::{SubscriberContext, TrackingScope};
pub use dependency::{DepId, Dependency};
pub use effect::{Effect, EffectBuilder};
pub use error::{BoxError, DepError, NotifyError, UpdateFailure};
pub use subscriber::{DebugEvent, DebugInfo, OperationKind, Subscriber, SubscriberId};

/// Reset this thread's context stack and cleanup queue and restore the
/// default config. Meant for test setup.
pub fn reset() {
    context::reset();
    cleanup::reset();
    config::set_config(DepConfig::default());
}
