#![forbid(unsafe_code)]

//! Runtime switches read by [`Dependency`](crate::Dependency).
//!
//! - `async_mode`: a batching scheduler owns dispatch order. When off,
//!   `notify()` sorts its snapshot by subscriber id itself.
//! - `debug_hooks`: forward [`DebugInfo`](crate::DebugInfo) to subscriber
//!   `on_track` / `on_trigger` hooks.
//!
//! The active config is thread-local, like the rest of the core's state.

use std::cell::Cell;
use std::env;

use crate::error::{DepError, Result};

pub const ENV_ASYNC: &str = "DEPWIRE_ASYNC";
pub const ENV_DEBUG_HOOKS: &str = "DEPWIRE_DEBUG_HOOKS";

thread_local! {
    static ACTIVE_CONFIG: Cell<DepConfig> = Cell::new(DepConfig::default());
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepConfig {
    pub async_mode: bool,
    pub debug_hooks: bool,
}

impl Default for DepConfig {
    fn default() -> Self {
        Self {
            async_mode: true,
            debug_hooks: cfg!(debug_assertions),
        }
    }
}

impl DepConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous dispatch: `notify()` orders subscribers by id.
    #[must_use]
    pub fn synchronous() -> Self {
        Self::default().with_async_mode(false)
    }

    #[must_use]
    pub fn with_async_mode(mut self, enabled: bool) -> Self {
        self.async_mode = enabled;
        self
    }

    #[must_use]
    pub fn with_debug_hooks(mut self, enabled: bool) -> Self {
        self.debug_hooks = enabled;
        self
    }

    /// Defaults overridden by `DEPWIRE_ASYNC` and `DEPWIRE_DEBUG_HOOKS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(val) = lookup(ENV_ASYNC) {
            config.async_mode = parse_flag(ENV_ASYNC, &val)?;
        }
        if let Some(val) = lookup(ENV_DEBUG_HOOKS) {
            config.debug_hooks = parse_flag(ENV_DEBUG_HOOKS, &val)?;
        }
        Ok(config)
    }
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool> {
    let trimmed = value.trim();
    if trimmed == "1" || trimmed.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if trimmed == "0" || trimmed.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(DepError::InvalidConfig {
            key,
            value: value.to_string(),
        })
    }
}

/// The config in effect on this thread.
#[must_use]
pub fn config() -> DepConfig {
    ACTIVE_CONFIG.with(Cell::get)
}

/// Replace the config on this thread, returning the previous one.
pub fn set_config(config: DepConfig) -> DepConfig {
    ACTIVE_CONFIG.with(|cell| cell.replace(config))
}

/// Install `config` until the returned guard drops.
#[must_use = "dropping this guard restores the previous config"]
pub fn override_config(config: DepConfig) -> ConfigOverride {
    ConfigOverride {
        previous: set_config(config),
    }
}

/// Restores the previous config on drop.
#[derive(Debug)]
pub struct ConfigOverride {
    previous: DepConfig,
}

impl Drop for ConfigOverride {
    fn drop(&mut self) {
        set_config(self.previous);
    }
}
