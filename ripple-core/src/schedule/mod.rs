//! Scheduling
//!
//! Two layers:
//!
//! - The **flush scheduler** ([`schedule_flush`]) batches subscriber runs
//!   into one deterministic, id-ordered flush.
//! - The **tick queue** ([`next_tick`]) defers that flush, and any other
//!   callback, until the current synchronous work is done. How the tick is
//!   armed depends on the host; see [`TickStrategyKind`].
//!
//! Without tokio, deferred work sits in the in-process event loop until the
//! embedder drains it with [`run_until_idle`] or [`run_microtasks`].

mod event_loop;
mod queue;
mod strategy;
mod tick;

pub use event_loop::{has_pending, queue_macrotask, queue_microtask, run_microtasks, run_until_idle, Task};
pub use queue::{flush_queue, on_flushed, pending_count, phase, schedule_flush, FlushPhase};
pub use strategy::{
    run_local, select, strategy_for, LocalExecutor, Microtask, PlatformCaps, TickStrategy, TickStrategyKind, Timer,
};
pub use tick::{defer_callback, is_pending, next_tick, next_tick_async, pending_callbacks, strategy_kind, NextTick};
