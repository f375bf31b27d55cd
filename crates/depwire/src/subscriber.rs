#![forbid(unsafe_code)]

//! The subscriber capability contract and the debug event payload.
//!
//! Anything that can be notified by a [`Dependency`] implements
//! [`Subscriber`]: derived values, effects, watchers, or test probes. The core
//! never inspects what a subscriber does on `update()`.
//!
//! # Identity
//!
//! [`SubscriberId`] orders dispatch when the core sorts (synchronous mode).
//! Identity for removal is the allocation, not the id: a subscriber is matched
//! by the address of its `Rc`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::dependency::Dependency;
use crate::error::BoxError;

static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique, monotonically assigned subscriber id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Allocate the next id from the process-wide counter.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap a raw id. Callers are responsible for uniqueness.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A notification target.
///
/// # Contract
///
/// - `register_dependency` is called by [`Dependency::depend`] while this
///   subscriber is the active one. Implementations usually deduplicate and
///   then call [`Dependency::register_subscriber`] with an `Rc` to themselves.
/// - `update` is called once per `notify()` snapshot that contains this
///   subscriber. An `Err` is collected by the notifying dependency; it does
///   not stop dispatch to the remaining subscribers.
/// - `on_track` / `on_trigger` are debug hooks. They only fire when
///   [`DepConfig::debug_hooks`](crate::DepConfig) is on and the caller passed
///   a [`DebugInfo`].
pub trait Subscriber {
    fn id(&self) -> SubscriberId;

    fn register_dependency(&self, dep: &Dependency);

    fn update(&self) -> Result<(), BoxError>;

    fn on_track(&self, _event: &DebugEvent<'_>) {}

    fn on_trigger(&self, _event: &DebugEvent<'_>) {}
}

/// The kind of access or mutation behind a track/trigger event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Property read.
    Get,
    /// Membership test (`key in obj`).
    Has,
    /// Key or element iteration.
    Iterate,
    /// Existing property overwritten.
    Set,
    /// New property or element.
    Add,
    /// Property removed.
    Delete,
    /// Collection cleared.
    Clear,
    /// Patched array method (push, splice, ...).
    ArrayMutation,
}

impl OperationKind {
    /// Read-side kinds, reported through `on_track`.
    #[must_use]
    pub const fn is_track(self) -> bool {
        matches!(self, Self::Get | Self::Has | Self::Iterate)
    }
}

/// Caller-supplied metadata describing one read or write.
///
/// Values are pre-rendered strings: the core only forwards them to hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugInfo {
    pub kind: OperationKind,
    pub key: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl DebugInfo {
    #[must_use]
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            key: None,
            old_value: None,
            new_value: None,
        }
    }

    #[must_use]
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    #[must_use]
    pub fn old_value(mut self, value: impl Into<String>) -> Self {
        self.old_value = Some(value.into());
        self
    }

    #[must_use]
    pub fn new_value(mut self, value: impl Into<String>) -> Self {
        self.new_value = Some(value.into());
        self
    }
}

/// What a debug hook receives: who, on which dependency, and why.
#[derive(Debug, Clone, Copy)]
pub struct DebugEvent<'a> {
    pub subscriber: SubscriberId,
    pub dependency: &'a Dependency,
    pub info: &'a DebugInfo,
}
