//! Flush Scheduler
//!
//! Subscribers that need to re-run are queued here and run together on the
//! next tick, in ascending id order. Ids are handed out in creation order, so
//! a parent always runs before the children it created.
//!
//! # Algorithm
//!
//! 1. The first subscriber queued while idle arms one tick (or, with
//!    `async_flush` disabled, flushes right away). Later ones are
//!    deduplicated by id.
//! 2. On flush, the queue is sorted and walked with a cursor. Nothing is
//!    borrowed while a subscriber runs.
//! 3. A subscriber queued mid-flush is inserted in sort order if its id is
//!    still ahead of the cursor; otherwise it waits for the next pass of the
//!    same flush.
//! 4. A subscriber that runs more than `max_update_count` times in one flush
//!    is reported as a circular update and evicted for the rest of the flush.
//! 5. When every pass has drained, the state resets, `after_flush` hooks run
//!    in reverse run order, then the one-shot [`on_flushed`] callbacks.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use super::tick::next_tick;
use crate::config;
use crate::error::{report, ReactiveError};
use crate::reactive::{Subscriber, SubscriberId};

/// Scheduler state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushPhase {
    #[default]
    Idle,
    /// A flush is armed on the tick queue.
    Pending,
    Flushing,
}

#[derive(Default)]
struct FlushState {
    phase: FlushPhase,
    queue: Vec<Rc<dyn Subscriber>>,
    next_pass: Vec<Rc<dyn Subscriber>>,
    has: HashSet<SubscriberId>,
    runs: HashMap<SubscriberId, usize>,
    evicted: HashSet<SubscriberId>,
    index: usize,
    passes: usize,
    flushed: Vec<Box<dyn FnOnce()>>,
}

impl FlushState {
    fn reset(&mut self) {
        self.phase = FlushPhase::Idle;
        self.queue.clear();
        self.next_pass.clear();
        self.has.clear();
        self.runs.clear();
        self.evicted.clear();
        self.index = 0;
        self.passes = 0;
    }
}

thread_local! {
    static STATE: RefCell<FlushState> = RefCell::new(FlushState::default());
}

/// Queue a subscriber for the next flush.
pub fn schedule_flush(sub: Rc<dyn Subscriber>) {
    let id = sub.id();
    let arm = STATE.with(|state| {
        let mut state = state.borrow_mut();
        if state.evicted.contains(&id) || !state.has.insert(id) {
            return false;
        }

        let phase = state.phase;
        match phase {
            FlushPhase::Idle => {
                state.queue.push(sub);
                state.phase = FlushPhase::Pending;
                true
            }
            FlushPhase::Pending => {
                state.queue.push(sub);
                false
            }
            FlushPhase::Flushing => {
                let cursor = state.index;
                let current = cursor.checked_sub(1).map(|i| state.queue[i].id());
                if current.map_or(true, |current| id > current) {
                    let offset = state.queue[cursor..].partition_point(|queued| queued.id() < id);
                    state.queue.insert(cursor + offset, sub);
                } else {
                    state.next_pass.push(sub);
                }
                false
            }
        }
    });

    tracing::trace!(target: "ripple::scheduler", %id, arm, "subscriber queued");
    if arm {
        if config::async_flush() {
            next_tick(flush_queue);
        } else {
            flush_queue();
        }
    }
}

/// Run `callback` once after the next flush completes.
pub fn on_flushed(callback: impl FnOnce() + 'static) {
    STATE.with(|state| state.borrow_mut().flushed.push(Box::new(callback)));
}

pub fn phase() -> FlushPhase {
    STATE.with(|state| state.borrow().phase)
}

/// Number of subscribers waiting to run.
pub fn pending_count() -> usize {
    STATE.with(|state| {
        let state = state.borrow();
        state.queue.len().saturating_sub(state.index) + state.next_pass.len()
    })
}

/// Restores the idle state if a subscriber panics mid-flush.
struct ResetOnUnwind;

impl Drop for ResetOnUnwind {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let _ = STATE.try_with(|state| {
                if let Ok(mut state) = state.try_borrow_mut() {
                    state.reset();
                }
            });
        }
    }
}

/// Pop the next subscriber, starting a new pass when the current one is
/// exhausted.
fn next_subscriber() -> Option<Rc<dyn Subscriber>> {
    STATE.with(|state| {
        let mut state = state.borrow_mut();
        if state.index >= state.queue.len() {
            if state.next_pass.is_empty() {
                return None;
            }
            let mut pass = std::mem::take(&mut state.next_pass);
            pass.sort_by_key(|sub| sub.id());
            state.queue = pass;
            state.index = 0;
            state.passes += 1;
            tracing::trace!(target: "ripple::scheduler", pass = state.passes, len = state.queue.len(), "flush pass");
        }
        let sub = state.queue[state.index].clone();
        state.index += 1;
        Some(sub)
    })
}

/// Run every queued subscriber. Normally invoked by the tick queue.
pub fn flush_queue() {
    let _guard = ResetOnUnwind;
    let limit = config::max_update_count();

    STATE.with(|state| {
        let mut state = state.borrow_mut();
        state.phase = FlushPhase::Flushing;
        state.queue.sort_by_key(|sub| sub.id());
        state.index = 0;
        tracing::trace!(target: "ripple::scheduler", len = state.queue.len(), "flush started");
    });

    let mut ran: Vec<Rc<dyn Subscriber>> = Vec::new();
    while let Some(sub) = next_subscriber() {
        let id = sub.id();
        let runs = STATE.with(|state| {
            let mut state = state.borrow_mut();
            let runs = state.runs.entry(id).or_insert(0);
            *runs += 1;
            *runs
        });

        if runs > limit {
            report(
                &ReactiveError::CircularUpdate {
                    label: sub.label(),
                    limit,
                },
                "scheduler flush",
            );
            STATE.with(|state| {
                let mut state = state.borrow_mut();
                state.has.remove(&id);
                state.evicted.insert(id);
            });
            continue;
        }

        sub.before_run();
        STATE.with(|state| state.borrow_mut().has.remove(&id));
        if let Err(err) = sub.run() {
            report(&err, &format!("flush of subscriber \"{}\"", sub.label()));
        }
        ran.push(sub);
    }

    let flushed = STATE.with(|state| {
        let mut state = state.borrow_mut();
        state.reset();
        std::mem::take(&mut state.flushed)
    });
    tracing::debug!(target: "ripple::scheduler", ran = ran.len(), "flush complete");

    let mut seen = HashSet::new();
    for sub in ran.iter().rev() {
        if seen.insert(sub.id()) {
            sub.after_flush();
        }
    }
    for callback in flushed {
        callback();
    }
}
