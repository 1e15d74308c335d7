//! Tick Arming Strategies
//!
//! The tick queue needs one primitive from its host: "run this callback soon,
//! after the current synchronous work". Preference order:
//!
//! 1. [`TickStrategyKind::LocalExecutor`]: the drain task of a tokio
//!    `LocalSet`, when the thread is inside a [`run_local`] scope.
//! 2. [`TickStrategyKind::Microtask`]: the in-process microtask queue (see
//!    [`super::event_loop`]).
//! 3. [`TickStrategyKind::Timer`]: the in-process macrotask queue.

use std::cell::RefCell;
use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::LocalSet;

use super::event_loop::{queue_macrotask, queue_microtask, run_microtasks, Task};

/// Which primitive arms the tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickStrategyKind {
    LocalExecutor,
    Microtask,
    Timer,
}

/// Schedules a task to run after the current synchronous work.
pub trait TickStrategy {
    fn kind(&self) -> TickStrategyKind;

    fn arm(&self, task: Task);
}

thread_local! {
    // One sender per nested `run_local`; the innermost receives.
    static LOCAL_SENDERS: RefCell<Vec<UnboundedSender<Task>>> = const { RefCell::new(Vec::new()) };
}

struct LocalScope;

impl LocalScope {
    fn enter(sender: UnboundedSender<Task>) -> Self {
        LOCAL_SENDERS.with(|senders| senders.borrow_mut().push(sender));
        LocalScope
    }
}

impl Drop for LocalScope {
    fn drop(&mut self) {
        LOCAL_SENDERS.with(|senders| senders.borrow_mut().pop());
    }
}

/// Run `future` inside a tokio `LocalSet` whose drain task runs armed ticks.
/// Every task on this thread can arm ticks while the scope is open,
/// including plain `tokio::spawn` tasks polled here. Waits for every armed
/// tick before returning.
///
/// Must be awaited from within a tokio runtime.
pub async fn run_local<F: Future>(future: F) -> F::Output {
    let local = LocalSet::new();
    let (tx, mut rx) = mpsc::unbounded_channel::<Task>();
    local.spawn_local(async move {
        while let Some(task) = rx.recv().await {
            task();
        }
    });

    let scope = LocalScope::enter(tx);
    let output = local.run_until(future).await;
    // Closing the channel lets the drain task finish once it is empty.
    drop(scope);
    local.await;
    // Ticks armed by the last drained callbacks fell back to the microtask queue.
    run_microtasks();
    output
}

fn local_sender() -> Option<UnboundedSender<Task>> {
    LOCAL_SENDERS.with(|senders| senders.borrow().last().filter(|tx| !tx.is_closed()).cloned())
}

fn local_executor_available() -> bool {
    local_sender().is_some()
}

/// Arms ticks on the drain task of the innermost [`run_local`] scope.
#[derive(Debug, Default)]
pub struct LocalExecutor;

impl TickStrategy for LocalExecutor {
    fn kind(&self) -> TickStrategyKind {
        TickStrategyKind::LocalExecutor
    }

    fn arm(&self, task: Task) {
        let task = match local_sender() {
            Some(tx) => match tx.send(task) {
                Ok(()) => return,
                Err(mpsc::error::SendError(task)) => task,
            },
            None => task,
        };
        // Left the local scope since the strategy was chosen.
        tracing::debug!(target: "ripple::tick", "no local executor, arming as microtask");
        queue_microtask(task);
    }
}

/// Arms ticks on the host microtask queue.
#[derive(Debug, Default)]
pub struct Microtask;

impl TickStrategy for Microtask {
    fn kind(&self) -> TickStrategyKind {
        TickStrategyKind::Microtask
    }

    fn arm(&self, task: Task) {
        queue_microtask(task);
    }
}

/// Arms ticks on the host macrotask queue.
#[derive(Debug, Default)]
pub struct Timer;

impl TickStrategy for Timer {
    fn kind(&self) -> TickStrategyKind {
        TickStrategyKind::Timer
    }

    fn arm(&self, task: Task) {
        queue_macrotask(task);
    }
}

/// What the current thread can arm ticks with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformCaps {
    pub local_executor: bool,
    pub microtask: bool,
    pub timer: bool,
}

impl PlatformCaps {
    pub fn probe() -> Self {
        Self {
            local_executor: local_executor_available(),
            microtask: true,
            timer: true,
        }
    }

    fn supports(&self, kind: TickStrategyKind) -> bool {
        match kind {
            TickStrategyKind::LocalExecutor => self.local_executor,
            TickStrategyKind::Microtask => self.microtask,
            TickStrategyKind::Timer => self.timer,
        }
    }
}

/// Pick a strategy: `preferred` when the platform supports it, otherwise
/// the first supported one in preference order. Falls back to
/// [`TickStrategyKind::Timer`].
pub fn select(caps: PlatformCaps, preferred: Option<TickStrategyKind>) -> TickStrategyKind {
    if let Some(kind) = preferred.filter(|kind| caps.supports(*kind)) {
        return kind;
    }
    [TickStrategyKind::LocalExecutor, TickStrategyKind::Microtask]
        .into_iter()
        .find(|kind| caps.supports(*kind))
        .unwrap_or(TickStrategyKind::Timer)
}

pub fn strategy_for(kind: TickStrategyKind) -> Box<dyn TickStrategy> {
    match kind {
        TickStrategyKind::LocalExecutor => Box::new(LocalExecutor),
        TickStrategyKind::Microtask => Box::new(Microtask),
        TickStrategyKind::Timer => Box::new(Timer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVERYTHING: PlatformCaps = PlatformCaps {
        local_executor: true,
        microtask: true,
        timer: true,
    };

    #[test]
    fn select_follows_preference_order() {
        assert_eq!(select(EVERYTHING, None), TickStrategyKind::LocalExecutor);

        let no_executor = PlatformCaps {
            local_executor: false,
            ..EVERYTHING
        };
        assert_eq!(select(no_executor, None), TickStrategyKind::Microtask);

        let timer_only = PlatformCaps {
            local_executor: false,
            microtask: false,
            timer: true,
        };
        assert_eq!(select(timer_only, None), TickStrategyKind::Timer);
    }

    #[test]
    fn preferred_strategy_wins_when_supported() {
        assert_eq!(select(EVERYTHING, Some(TickStrategyKind::Timer)), TickStrategyKind::Timer);

        let no_executor = PlatformCaps {
            local_executor: false,
            ..EVERYTHING
        };
        assert_eq!(
            select(no_executor, Some(TickStrategyKind::LocalExecutor)),
            TickStrategyKind::Microtask
        );
    }

    #[test]
    fn probe_outside_a_runtime_has_no_executor() {
        assert!(!PlatformCaps::probe().local_executor);
    }

    #[tokio::test]
    async fn probe_inside_run_local_finds_the_executor() {
        assert!(!PlatformCaps::probe().local_executor);
        let inside = run_local(async { PlatformCaps::probe().local_executor }).await;
        assert!(inside);
        assert!(!PlatformCaps::probe().local_executor);
    }

    #[test]
    fn strategy_kinds_round_trip_through_serde() {
        let kind: TickStrategyKind = serde_json::from_str("\"local_executor\"").unwrap();
        assert_eq!(kind, TickStrategyKind::LocalExecutor);
        assert_eq!(strategy_for(kind).kind(), kind);
    }
}
