//! Reactive Context
//!
//! The reactive context tracks which subscriber is currently evaluating.
//! This enables automatic dependency tracking: when a reactive property is
//! read, its dependency node registers itself with the current subscriber.
//!
//! # Implementation
//!
//! We use a thread-local [`TargetStack`] to track the currently evaluating
//! subscriber. Entering a context pushes onto the stack and the returned
//! guard pops on drop, so the stack stays balanced even if a getter panics.
//!
//! Entries are optional: an empty entry on top of the stack suspends
//! tracking for nested reads (see [`untracked`]).

use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;

use super::{Subscriber, SubscriberId};

/// Stack of evaluating subscribers. Only `push`, `pop`, and `current`
/// touch it.
#[derive(Default)]
pub struct TargetStack {
    entries: Vec<Option<Rc<dyn Subscriber>>>,
}

impl TargetStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, target: Option<Rc<dyn Subscriber>>) {
        self.entries.push(target);
    }

    pub fn pop(&mut self) -> Option<Option<Rc<dyn Subscriber>>> {
        self.entries.pop()
    }

    /// The subscriber reads should be attributed to, if any.
    pub fn current(&self) -> Option<Rc<dyn Subscriber>> {
        self.entries.last().cloned().flatten()
    }

    pub fn depth(&self) -> usize {
        self.entries.len()
    }
}

thread_local! {
    static TARGET_STACK: RefCell<TargetStack> = RefCell::new(TargetStack::new());
}

/// Swap in a different stack for the current thread, returning the old one.
pub fn replace_stack(stack: TargetStack) -> TargetStack {
    TARGET_STACK.with(|current| std::mem::replace(&mut *current.borrow_mut(), stack))
}

/// Guard that pops the context when dropped.
pub struct ReactiveContext {
    subscriber_id: Option<SubscriberId>,
    _not_send: PhantomData<Rc<()>>,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given subscriber.
    ///
    /// While this context is active, reactive reads register `target` as a
    /// dependent. The context is exited when the returned guard is dropped.
    pub fn enter(target: Rc<dyn Subscriber>) -> Self {
        let subscriber_id = Some(target.id());
        TARGET_STACK.with(|stack| stack.borrow_mut().push(Some(target)));
        Self {
            subscriber_id,
            _not_send: PhantomData,
        }
    }

    /// Enter a context in which reads are not tracked.
    pub fn suspend() -> Self {
        TARGET_STACK.with(|stack| stack.borrow_mut().push(None));
        Self {
            subscriber_id: None,
            _not_send: PhantomData,
        }
    }

    /// Check if a subscriber is currently collecting dependencies.
    pub fn is_active() -> bool {
        TARGET_STACK.with(|stack| stack.borrow().current().is_some())
    }

    /// The subscriber currently collecting dependencies.
    pub fn current_target() -> Option<Rc<dyn Subscriber>> {
        TARGET_STACK.with(|stack| stack.borrow().current())
    }

    /// Get the current subscriber ID, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        Self::current_target().map(|target| target.id())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let popped = TARGET_STACK.with(|stack| stack.borrow_mut().pop());

        // Catch mismatched enter/exit pairs in debug builds.
        if let Some(entry) = popped {
            debug_assert_eq!(
                entry.map(|target| target.id()),
                self.subscriber_id,
                "ReactiveContext mismatch"
            );
        }
    }
}

/// Run `f` without attributing its reads to the current subscriber.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::suspend();
    f()
}
