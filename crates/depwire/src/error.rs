#![forbid(unsafe_code)]

//! Error types.
//!
//! The core itself is defensive: tombstones never reach dispatch, and a
//! missing subscriber on removal is a logged no-op. What remains are the
//! caller-contract violations a driver may want as values instead of panics,
//! and the failures collected from subscriber `update()` calls.

use std::fmt;

use thiserror::Error;

use crate::subscriber::SubscriberId;

/// Boxed error returned by a failing [`Subscriber::update`](crate::Subscriber::update).
pub type BoxError = Box<dyn std::error::Error + 'static>;

pub type Result<T> = std::result::Result<T, DepError>;

#[derive(Debug, Error)]
pub enum DepError {
    #[error("subscriber context underflow: pop() without a matching push()")]
    ContextUnderflow,

    #[error("invalid value for {key}: {value:?} (expected 1, 0, true or false)")]
    InvalidConfig { key: &'static str, value: String },
}

/// One subscriber's failed `update()` during a dispatch.
#[derive(Debug)]
pub struct UpdateFailure {
    pub subscriber: SubscriberId,
    pub error: BoxError,
}

impl fmt::Display for UpdateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscriber {}: {}", self.subscriber, self.error)
    }
}

/// Failures collected over a whole `notify()` dispatch, in dispatch order.
///
/// Dispatch never stops early: every subscriber in the snapshot is updated
/// exactly once, and the failures are reported together afterwards.
#[derive(Debug)]
pub struct NotifyError {
    pub failures: Vec<UpdateFailure>,
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} subscriber update(s) failed during notify",
            self.failures.len()
        )?;
        if let Some(first) = self.failures.first() {
            write!(f, " (first: {first})")?;
        }
        Ok(())
    }
}

impl std::error::Error for NotifyError {}

impl NotifyError {
    /// Ids of the failing subscribers, in dispatch order.
    #[must_use]
    pub fn subscriber_ids(&self) -> Vec<SubscriberId> {
        self.failures.iter().map(|f| f.subscriber).collect()
    }
}
