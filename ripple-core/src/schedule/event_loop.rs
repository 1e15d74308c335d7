//! In-process host event loop.
//!
//! Embedders without an async executor drive deferred work by hand: the
//! microtask queue is drained completely before each macrotask, exactly like
//! a browser or a JS runtime would.

use std::cell::RefCell;
use std::collections::VecDeque;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce()>;

thread_local! {
    static MICROTASKS: RefCell<VecDeque<Task>> = RefCell::new(VecDeque::new());
    static MACROTASKS: RefCell<VecDeque<Task>> = RefCell::new(VecDeque::new());
}

pub fn queue_microtask(task: impl FnOnce() + 'static) {
    MICROTASKS.with(|queue| queue.borrow_mut().push_back(Box::new(task)));
}

pub fn queue_macrotask(task: impl FnOnce() + 'static) {
    MACROTASKS.with(|queue| queue.borrow_mut().push_back(Box::new(task)));
}

/// Run microtasks until the queue is empty, including any queued while
/// draining. Returns how many ran.
pub fn run_microtasks() -> usize {
    let mut ran = 0;
    while let Some(task) = MICROTASKS.with(|queue| queue.borrow_mut().pop_front()) {
        task();
        ran += 1;
    }
    ran
}

/// Run everything: drain microtasks, then one macrotask at a time (draining
/// microtasks after each), until both queues are empty. Returns how many
/// tasks ran.
pub fn run_until_idle() -> usize {
    let mut ran = run_microtasks();
    while let Some(task) = MACROTASKS.with(|queue| queue.borrow_mut().pop_front()) {
        task();
        ran += 1 + run_microtasks();
    }
    ran
}

/// True when any task is waiting.
pub fn has_pending() -> bool {
    MICROTASKS.with(|queue| !queue.borrow().is_empty()) || MACROTASKS.with(|queue| !queue.borrow().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn log() -> Rc<RefCell<Vec<&'static str>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn microtasks_drain_before_macrotasks() {
        let order = log();
        let (a, b, c) = (order.clone(), order.clone(), order.clone());

        queue_macrotask(move || a.borrow_mut().push("macro"));
        queue_microtask(move || {
            b.borrow_mut().push("micro");
            queue_microtask(move || c.borrow_mut().push("nested micro"));
        });

        assert_eq!(run_until_idle(), 3);
        assert_eq!(order.borrow().as_slice(), ["micro", "nested micro", "macro"]);
        assert!(!has_pending());
    }

    #[test]
    fn macrotasks_see_their_microtasks_first() {
        let order = log();
        let (a, b, c) = (order.clone(), order.clone(), order.clone());

        queue_macrotask(move || {
            a.borrow_mut().push("first macro");
            queue_microtask(move || b.borrow_mut().push("micro"));
        });
        queue_macrotask(move || c.borrow_mut().push("second macro"));

        run_until_idle();
        assert_eq!(order.borrow().as_slice(), ["first macro", "micro", "second macro"]);
    }
}
