//! Reactive Primitives
//!
//! This module implements the dependency-tracking half of the runtime:
//! dependency nodes, the property installer, and the subscribers that
//! re-run when the properties they read change.
//!
//! # Concepts
//!
//! ## Dependency Nodes
//!
//! A [`Dep`] exists for every reactive property and for every observed
//! container. Reading a property while a subscriber evaluates registers the
//! subscriber with the node; writing the property notifies every registered
//! subscriber.
//!
//! ## Observers
//!
//! [`observe`] walks an object graph and turns every key into a tracked
//! cell. Arrays cannot intercept index access, so they notify through their
//! mutators instead.
//!
//! ## Watchers
//!
//! A [`Watcher`] evaluates a getter, caches its value, and runs a callback
//! when a re-evaluation produces something new. Non-lazy, non-sync watchers
//! are batched by the flush scheduler in [`crate::schedule`].
//!
//! # Implementation Notes
//!
//! Everything here is single-threaded. Shared state is `Rc` + `RefCell`,
//! the active-subscriber stack is thread-local, and no borrow is held while
//! user code (getters, callbacks, hooks) runs.

mod computed;
mod context;
mod dep;
mod observer;
mod owner;
mod subscriber;
mod traverse;
mod watcher;

pub use computed::{Computed, ComputedState};
pub use context::{replace_stack, untracked, ReactiveContext, TargetStack};
pub use dep::{Dep, DepId};
pub use observer::{
    define_reactive, del, observe, set, should_observe, toggle_observing, Key, Observer, ObserverHandle,
};
pub(crate) use observer::ReactiveProperty;
pub use owner::{create_subscriber, Owner};
pub use subscriber::{Subscriber, SubscriberId};
pub use traverse::traverse;
pub use watcher::{parse_path, Callback, CallbackFn, Getter, GetterFn, Hook, Watcher, WatcherOptions};
