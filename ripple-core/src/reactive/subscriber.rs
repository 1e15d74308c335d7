//! Subscriber identity and the notification interface.
//!
//! A subscriber is any computation that depends on reactive values: a
//! re-render, a computed expression, or a user watch. Dependency nodes only
//! see this trait, which keeps the node, the scheduler, and the concrete
//! [`Watcher`](super::Watcher) decoupled.

use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::Dep;
use crate::error::Result;

/// Unique identifier for a subscriber.
///
/// Ids are handed out in creation order, and the flush scheduler runs
/// subscribers in ascending id order. Since a parent is always created
/// before its children, parents update first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Something a dependency node can notify and the scheduler can run.
pub trait Subscriber {
    /// Stable identity; also the flush order key.
    fn id(&self) -> SubscriberId;

    /// Record that `dep` was read during the current evaluation.
    fn add_dep(&self, dep: &Rc<Dep>);

    /// A dependency changed.
    fn update(&self);

    /// Re-run the computation. Called by the flush scheduler.
    fn run(&self) -> Result<()>;

    /// Hook invoked by the scheduler right before `run`.
    fn before_run(&self) {}

    /// Hook invoked once after the flush that ran this subscriber completes.
    fn after_flush(&self) {}

    /// Human-readable description used in error reports.
    fn label(&self) -> String {
        self.id().to_string()
    }
}
