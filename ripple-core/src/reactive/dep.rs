//! Dependency Nodes
//!
//! A `Dep` is the publisher half of the graph. One exists per reactive
//! property and one per observed container (for key addition/removal and
//! array mutation).
//!
//! # How Nodes Work
//!
//! 1. When a reactive property is read while a subscriber is evaluating,
//!    [`Dep::depend`] hands the node to that subscriber, which decides
//!    whether to call [`Dep::add_sub`].
//!
//! 2. When the property is written, [`Dep::notify`] tells every subscriber.
//!
//! # Memory Layout
//!
//! Subscribers are held weakly, in insertion order, keyed by id so a
//! subscriber can never appear twice. A subscriber that is dropped without
//! tearing down is skipped (and pruned) at the next notification.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::context::ReactiveContext;
use super::{Subscriber, SubscriberId};
use crate::config;

/// Counter for generating unique dependency node IDs.
static DEP_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a dependency node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DepId(u64);

impl DepId {
    fn next() -> Self {
        Self(DEP_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// An identity-bearing publisher of change notifications.
pub struct Dep {
    id: DepId,
    subs: RefCell<IndexMap<SubscriberId, Weak<dyn Subscriber>>>,
}

impl Dep {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            id: DepId::next(),
            subs: RefCell::new(IndexMap::new()),
        })
    }

    pub fn id(&self) -> DepId {
        self.id
    }

    /// Add a subscriber. Adding the same id twice keeps the first entry.
    pub fn add_sub(&self, id: SubscriberId, sub: Weak<dyn Subscriber>) {
        self.subs.borrow_mut().entry(id).or_insert(sub);
    }

    /// Remove a subscriber, preserving the order of the rest.
    pub fn remove_sub(&self, id: SubscriberId) {
        self.subs.borrow_mut().shift_remove(&id);
    }

    /// Register this node with the currently evaluating subscriber.
    ///
    /// A no-op when nothing is evaluating.
    pub fn depend(self: &Rc<Self>) {
        if let Some(target) = ReactiveContext::current_target() {
            target.add_dep(self);
        }
    }

    /// Tell every subscriber that the value behind this node changed.
    ///
    /// Works on a snapshot, so subscribers may unsubscribe (or subscribe)
    /// during notification without disturbing the iteration.
    pub fn notify(&self) {
        let mut subs: SmallVec<[Rc<dyn Subscriber>; 8]> = {
            let mut live = self.subs.borrow_mut();
            live.retain(|_, sub| sub.strong_count() > 0);
            live.values().filter_map(Weak::upgrade).collect()
        };

        // Without the batching scheduler nothing else sorts, so keep the
        // order deterministic here.
        if config::strict() && !config::async_flush() {
            subs.sort_by_key(|sub| sub.id());
        }

        for sub in subs {
            sub.update();
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subs.borrow().len()
    }

    pub fn has_subscriber(&self, id: SubscriberId) -> bool {
        self.subs.borrow().contains_key(&id)
    }

    /// Subscriber ids in insertion order.
    pub fn subscriber_ids(&self) -> Vec<SubscriberId> {
        self.subs.borrow().keys().copied().collect()
    }
}

impl std::fmt::Debug for Dep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.id)
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::Result;
    use std::cell::{Cell, RefCell};

    struct MockSubscriber {
        id: SubscriberId,
        updates: Cell<usize>,
        deps: RefCell<Vec<Rc<Dep>>>,
        log: Rc<RefCell<Vec<SubscriberId>>>,
    }

    impl MockSubscriber {
        fn new(log: &Rc<RefCell<Vec<SubscriberId>>>) -> Rc<Self> {
            Rc::new(Self {
                id: SubscriberId::new(),
                updates: Cell::new(0),
                deps: RefCell::new(Vec::new()),
                log: log.clone(),
            })
        }

        fn weak(self: &Rc<Self>) -> Weak<dyn Subscriber> {
            let weak: Weak<MockSubscriber> = Rc::downgrade(self);
            weak
        }
    }

    impl Subscriber for MockSubscriber {
        fn id(&self) -> SubscriberId {
            self.id
        }

        fn add_dep(&self, dep: &Rc<Dep>) {
            self.deps.borrow_mut().push(dep.clone());
        }

        fn update(&self) {
            self.updates.set(self.updates.get() + 1);
            self.log.borrow_mut().push(self.id);
        }

        fn run(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn dep_ids_are_unique() {
        assert_ne!(Dep::new().id(), Dep::new().id());
    }

    #[test]
    fn duplicate_subscribers_are_ignored() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let dep = Dep::new();
        let sub = MockSubscriber::new(&log);

        dep.add_sub(sub.id, sub.weak());
        dep.add_sub(sub.id, sub.weak());
        dep.notify();

        assert_eq!(dep.subscriber_count(), 1);
        assert_eq!(sub.updates.get(), 1);
    }

    #[test]
    fn remove_sub_stops_notifications() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let dep = Dep::new();
        let sub = MockSubscriber::new(&log);

        dep.add_sub(sub.id, sub.weak());
        dep.remove_sub(sub.id);
        dep.notify();

        assert_eq!(dep.subscriber_count(), 0);
        assert_eq!(sub.updates.get(), 0);
    }

    #[test]
    fn depend_hands_node_to_current_subscriber() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let dep = Dep::new();
        let sub = MockSubscriber::new(&log);

        dep.depend();
        assert!(sub.deps.borrow().is_empty());

        {
            let _ctx = ReactiveContext::enter(sub.clone());
            dep.depend();
        }
        assert_eq!(sub.deps.borrow().len(), 1);
        assert_eq!(sub.deps.borrow()[0].id(), dep.id());
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let dep = Dep::new();
        let sub = MockSubscriber::new(&log);
        dep.add_sub(sub.id, sub.weak());

        drop(sub);
        dep.notify();

        assert_eq!(dep.subscriber_count(), 0);
    }

    #[test]
    fn synchronous_strict_notify_sorts_by_id() {
        config::configure(Config {
            async_flush: false,
            strict: true,
            ..Config::default()
        });

        let log = Rc::new(RefCell::new(Vec::new()));
        let dep = Dep::new();
        let first = MockSubscriber::new(&log);
        let second = MockSubscriber::new(&log);
        dep.add_sub(second.id, second.weak());
        dep.add_sub(first.id, first.weak());

        dep.notify();

        assert_eq!(log.borrow().as_slice(), [first.id, second.id]);
        config::configure(Config::default());
    }
}
