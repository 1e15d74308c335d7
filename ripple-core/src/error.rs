//! Error Taxonomy and Reporting
//!
//! Nothing in the reactive core throws across its own boundary. Errors fall
//! into three groups:
//!
//! - Configuration errors (adding keys to root data, installing on a
//!   framework-owned object, mutating a primitive). These are *warned*: a
//!   non-fatal diagnostic in strict mode, silently accepted otherwise.
//! - Evaluation errors (a getter or callback returned `Err`). For
//!   user-originated subscribers these are *reported* and execution carries
//!   on with the previous cached value.
//! - Scheduling errors (runaway update cycles) and tick callback panics,
//!   which are always reported.
//!
//! Reporting goes through per-thread handlers so embedders (and tests) can
//! observe it, and always through `tracing`.

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

use crate::config;

/// Errors produced by the reactive core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A getter or callback failed.
    #[error("{0}")]
    Thrown(String),

    /// A watch expression was not a simple dot-delimited path.
    #[error("failed watching path \"{0}\": only simple dot-delimited paths are supported, use a function instead")]
    InvalidPath(String),

    /// A subscriber kept re-queuing itself within one flush.
    #[error("you may have an infinite update loop in subscriber \"{label}\" (ran more than {limit} times in one flush)")]
    CircularUpdate { label: String, limit: usize },

    /// A deferred callback panicked.
    #[error("deferred callback panicked: {0}")]
    CallbackPanicked(String),

    /// `set`/`del` was handed a value that cannot carry properties.
    #[error("cannot {action} reactive property on undefined, null, or primitive value: {value}")]
    PrimitiveTarget { action: &'static str, value: String },

    /// Adding or removing keys on root data at runtime.
    #[error("avoid {action} reactive properties on a framework-owned object or its root data at runtime")]
    RootData { action: &'static str },

    /// The container does not accept new keys.
    #[error("cannot add reactive property \"{0}\": container is not extensible")]
    NotExtensible(String),

    /// The container belongs to the framework and must not be observed.
    #[error("refusing to install reactivity on a framework-owned object")]
    FrameworkOwned,

    /// A configuration document could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ReactiveError {
    /// Build an evaluation error from a message.
    pub fn thrown(message: impl Into<String>) -> Self {
        Self::Thrown(message.into())
    }
}

impl From<serde_json::Error> for ReactiveError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;

/// Receives reported errors together with a short description of where they
/// came from.
pub type ErrorHandler = Rc<dyn Fn(&ReactiveError, &str)>;

/// Receives configuration diagnostics in strict mode.
pub type WarnHandler = Rc<dyn Fn(&ReactiveError)>;

thread_local! {
    static ERROR_HANDLER: RefCell<Option<ErrorHandler>> = const { RefCell::new(None) };
    static WARN_HANDLER: RefCell<Option<WarnHandler>> = const { RefCell::new(None) };
}

/// Install (or clear) the error handler for the current thread.
pub fn set_error_handler<F>(handler: Option<F>)
where
    F: Fn(&ReactiveError, &str) + 'static,
{
    let handler = handler.map(|h| Rc::new(h) as ErrorHandler);
    ERROR_HANDLER.with(|slot| *slot.borrow_mut() = handler);
}

/// Install (or clear) the warn handler for the current thread.
pub fn set_warn_handler<F>(handler: Option<F>)
where
    F: Fn(&ReactiveError) + 'static,
{
    let handler = handler.map(|h| Rc::new(h) as WarnHandler);
    WARN_HANDLER.with(|slot| *slot.borrow_mut() = handler);
}

/// Report a recoverable error.
///
/// `info` describes the failing site, e.g. `callback for watcher "a.b"`.
pub fn report(err: &ReactiveError, info: &str) {
    tracing::error!(target: "ripple::error", info, error = %err, "reactive error");

    // Clone the handler out so it may itself install a new one.
    let handler = ERROR_HANDLER.with(|slot| slot.borrow().clone());
    if let Some(handler) = handler {
        handler(err, info);
    }
}

/// Emit a configuration diagnostic. Only strict mode says anything.
pub fn warn(err: &ReactiveError) {
    if !config::strict() {
        return;
    }

    tracing::warn!(target: "ripple::warn", "{err}");

    let handler = WARN_HANDLER.with(|slot| slot.borrow().clone());
    if let Some(handler) = handler {
        handler(err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn report_reaches_handler() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        set_error_handler(Some(move |err: &ReactiveError, info: &str| {
            sink.borrow_mut().push(format!("{info}: {err}"));
        }));

        report(&ReactiveError::thrown("boom"), "getter for watcher \"x\"");

        assert_eq!(seen.borrow().as_slice(), ["getter for watcher \"x\": boom"]);
        set_error_handler::<fn(&ReactiveError, &str)>(None);
    }

    #[test]
    fn warn_is_silent_outside_strict_mode() {
        let count = Rc::new(Cell::new(0));
        let sink = count.clone();
        set_warn_handler(Some(move |_: &ReactiveError| sink.set(sink.get() + 1)));

        config::configure(config::Config {
            strict: false,
            ..config::Config::default()
        });
        warn(&ReactiveError::FrameworkOwned);
        assert_eq!(count.get(), 0);

        config::configure(config::Config {
            strict: true,
            ..config::Config::default()
        });
        warn(&ReactiveError::FrameworkOwned);
        assert_eq!(count.get(), 1);

        set_warn_handler::<fn(&ReactiveError)>(None);
    }

    #[test]
    fn json_errors_become_config_errors() {
        let err: ReactiveError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, ReactiveError::Config(_)));
    }
}
