//! Tick Queue
//!
//! Callbacks handed to [`next_tick`] are collected in one list per thread
//! and run together when the tick fires. At most one tick is armed at a
//! time, no matter how many callbacks are queued before it fires.
//!
//! A panicking callback is caught and reported; its siblings still run.

use std::any::Any;
use std::cell::{Cell, OnceCell, RefCell};
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use super::event_loop::Task;
use super::strategy::{select, strategy_for, PlatformCaps, TickStrategy, TickStrategyKind};
use crate::config;
use crate::error::{report, ReactiveError};

thread_local! {
    static CALLBACKS: RefCell<Vec<Task>> = RefCell::new(Vec::new());
    static PENDING: Cell<bool> = const { Cell::new(false) };
    static STRATEGY: OnceCell<Box<dyn TickStrategy>> = const { OnceCell::new() };
}

/// Run `callback` on the next tick.
pub fn next_tick(callback: impl FnOnce() + 'static) {
    CALLBACKS.with(|callbacks| callbacks.borrow_mut().push(Box::new(callback)));

    if !PENDING.with(Cell::get) {
        with_strategy(|strategy| strategy.arm(Box::new(flush_callbacks)));
        PENDING.with(|pending| pending.set(true));
    }
}

/// A future that resolves on the next tick.
pub fn next_tick_async() -> NextTick {
    let (tx, rx) = oneshot::channel();
    next_tick(move || {
        let _ = tx.send(());
    });
    NextTick { rx, done: false }
}

/// Run `callback` on the next tick, or, without a callback, return a future
/// resolving on the next tick.
pub fn defer_callback<F>(callback: Option<F>) -> Option<NextTick>
where
    F: FnOnce() + 'static,
{
    match callback {
        Some(callback) => {
            next_tick(callback);
            None
        }
        None => Some(next_tick_async()),
    }
}

/// The strategy this thread arms ticks with, choosing it if needed.
pub fn strategy_kind() -> TickStrategyKind {
    with_strategy(|strategy| strategy.kind())
}

/// True while a tick is armed and has not fired.
pub fn is_pending() -> bool {
    PENDING.with(Cell::get)
}

/// Number of callbacks waiting for the next tick.
pub fn pending_callbacks() -> usize {
    CALLBACKS.with(|callbacks| callbacks.borrow().len())
}

fn with_strategy<R>(f: impl FnOnce(&dyn TickStrategy) -> R) -> R {
    STRATEGY.with(|cell| {
        let strategy = cell.get_or_init(|| {
            let preferred = config::with(|config| config.tick_strategy);
            let kind = select(PlatformCaps::probe(), preferred);
            tracing::debug!(target: "ripple::tick", ?kind, ?preferred, "tick strategy selected");
            strategy_for(kind)
        });
        f(strategy.as_ref())
    })
}

fn flush_callbacks() {
    PENDING.with(|pending| pending.set(false));
    let callbacks = CALLBACKS.with(|callbacks| std::mem::take(&mut *callbacks.borrow_mut()));

    for callback in callbacks {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(callback)) {
            report(&ReactiveError::CallbackPanicked(panic_message(&*payload)), "next_tick");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// Resolves once the tick it was created for has fired.
#[derive(Debug)]
pub struct NextTick {
    rx: oneshot::Receiver<()>,
    done: bool,
}

impl NextTick {
    /// Non-blocking check. True once the tick has fired.
    pub fn try_complete(&mut self) -> bool {
        if !self.done {
            self.done = !matches!(self.rx.try_recv(), Err(oneshot::error::TryRecvError::Empty));
        }
        self.done
    }
}

impl Future for NextTick {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.done {
            return Poll::Ready(());
        }
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(_) => {
                self.done = true;
                Poll::Ready(())
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::set_error_handler;
    use crate::schedule::event_loop::run_until_idle;
    use std::rc::Rc;

    #[test]
    fn callbacks_run_in_order_on_one_tick() {
        let order = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            next_tick(move || order.borrow_mut().push(i));
        }

        assert!(is_pending());
        assert_eq!(pending_callbacks(), 3);
        assert!(order.borrow().is_empty());

        run_until_idle();

        assert_eq!(order.borrow().as_slice(), [0, 1, 2]);
        assert!(!is_pending());
    }

    #[test]
    fn callbacks_queued_while_flushing_wait_for_the_next_tick() {
        let ran = Rc::new(Cell::new(0));
        let inner = ran.clone();
        next_tick(move || {
            inner.set(inner.get() + 1);
            let nested = inner.clone();
            next_tick(move || nested.set(nested.get() + 10));
            assert!(is_pending());
        });

        run_until_idle();
        assert_eq!(ran.get(), 11);
    }

    #[test]
    fn panicking_callbacks_do_not_stop_siblings() {
        let reports = Rc::new(RefCell::new(Vec::new()));
        let sink = reports.clone();
        set_error_handler(Some(move |err: &ReactiveError, _: &str| sink.borrow_mut().push(err.clone())));

        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        next_tick(|| panic!("boom"));
        next_tick(move || flag.set(true));
        run_until_idle();

        assert!(ran.get());
        assert_eq!(reports.borrow().as_slice(), [ReactiveError::CallbackPanicked("boom".into())]);
        set_error_handler::<fn(&ReactiveError, &str)>(None);
    }

    #[test]
    fn next_tick_future_completes_after_the_tick() {
        let mut tick = next_tick_async();
        assert!(!tick.try_complete());
        run_until_idle();
        assert!(tick.try_complete());
    }

    #[test]
    fn defer_callback_without_callback_returns_a_future() {
        assert!(defer_callback(Some(|| {})).is_none());
        let tick = defer_callback::<fn()>(None);
        assert!(tick.is_some());
        run_until_idle();
    }

    #[tokio::test]
    async fn local_executor_fires_ticks() {
        let fired = crate::schedule::run_local(async {
            assert_eq!(strategy_kind(), TickStrategyKind::LocalExecutor);
            next_tick_async().await;
            true
        })
        .await;
        assert!(fired);
    }

    #[tokio::test]
    async fn ticks_armed_from_spawned_tasks_fire() {
        let joined = crate::schedule::run_local(async {
            assert_eq!(strategy_kind(), TickStrategyKind::LocalExecutor);
            tokio::spawn(async { next_tick_async().await }).await
        })
        .await;

        assert!(joined.is_ok());
        assert!(!is_pending());

        let later = Rc::new(Cell::new(false));
        let flag = later.clone();
        next_tick(move || flag.set(true));
        run_until_idle();
        assert!(later.get());
    }

    #[tokio::test]
    async fn ticks_queued_by_the_last_tick_still_run() {
        let ran = Rc::new(Cell::new(0));
        let inner = ran.clone();
        crate::schedule::run_local(async move {
            next_tick(move || {
                inner.set(inner.get() + 1);
                let nested = inner.clone();
                next_tick(move || nested.set(nested.get() + 10));
            });
        })
        .await;

        assert_eq!(ran.get(), 11);
        assert!(!is_pending());
    }
}
