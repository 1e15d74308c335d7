//! Runtime Configuration
//!
//! Configuration is layered:
//!
//! 1. Process-wide defaults, guarded by a `parking_lot::RwLock`.
//! 2. A per-thread copy, seeded from the defaults the first time a thread
//!    touches the runtime, and replaceable with [`configure`].
//!
//! The reactive runtime is single-threaded, so every hot-path read goes to
//! the thread-local copy and never takes the lock.

use std::cell::RefCell;
use std::sync::OnceLock;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::schedule::TickStrategyKind;

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Batch subscriber runs into one deferred flush per tick. When false,
    /// queuing a subscriber flushes immediately.
    pub async_flush: bool,

    /// Development mode: emit configuration diagnostics, call read-only write
    /// hooks, and sort notification snapshots when flushing synchronously.
    pub strict: bool,

    /// How many times one subscriber may run within a single flush before it
    /// is evicted as a circular update.
    pub max_update_count: usize,

    /// Force a tick strategy instead of probing the platform.
    pub tick_strategy: Option<TickStrategyKind>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            async_flush: true,
            strict: cfg!(debug_assertions),
            max_update_count: 100,
            tick_strategy: None,
        }
    }
}

impl Config {
    /// Parse a configuration document. Missing fields take their defaults.
    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }
}

static DEFAULTS: OnceLock<RwLock<Config>> = OnceLock::new();

fn get_defaults() -> &'static RwLock<Config> {
    DEFAULTS.get_or_init(|| RwLock::new(Config::default()))
}

thread_local! {
    static CURRENT: RefCell<Option<Config>> = const { RefCell::new(None) };
}

/// Replace the process-wide defaults.
///
/// Threads that already touched the runtime keep their own copy.
pub fn set_defaults(config: Config) {
    *get_defaults().write() = config;
}

/// The process-wide defaults.
pub fn defaults() -> Config {
    get_defaults().read().clone()
}

/// Replace the configuration of the current thread.
pub fn configure(config: Config) {
    CURRENT.with(|current| *current.borrow_mut() = Some(config));
}

/// Run `f` against the current thread's configuration.
pub fn with<R>(f: impl FnOnce(&Config) -> R) -> R {
    CURRENT.with(|current| {
        let mut current = current.borrow_mut();
        let config = current.get_or_insert_with(defaults);
        f(config)
    })
}

/// A copy of the current thread's configuration.
pub fn current() -> Config {
    with(Config::clone)
}

pub fn strict() -> bool {
    with(|c| c.strict)
}

pub fn async_flush() -> bool {
    with(|c| c.async_flush)
}

pub fn max_update_count() -> usize {
    with(|c| c.max_update_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config = Config::from_json(r#"{ "max_update_count": 5 }"#).unwrap();
        assert_eq!(config.max_update_count, 5);
        assert!(config.async_flush);
        assert_eq!(config.tick_strategy, None);
    }

    #[test]
    fn tick_strategy_parses_snake_case() {
        let config = Config::from_json(r#"{ "tick_strategy": "timer" }"#).unwrap();
        assert_eq!(config.tick_strategy, Some(TickStrategyKind::Timer));
    }

    #[test]
    fn thread_override_wins() {
        configure(Config {
            async_flush: false,
            ..Config::default()
        });
        assert!(!async_flush());

        configure(Config::default());
        assert!(async_flush());
    }

    #[test]
    fn new_threads_seed_from_defaults() {
        let seen = std::thread::spawn(|| max_update_count()).join().unwrap();
        assert_eq!(seen, defaults().max_update_count);
    }
}
