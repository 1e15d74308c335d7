//! Computed Values
//!
//! A `Computed` is a cached derived value that re-evaluates only when one of
//! its dependencies changed and someone reads it.
//!
//! # How Computed Values Work
//!
//! 1. The backing watcher is lazy: creating a computed evaluates nothing.
//!
//! 2. When a dependency changes, the watcher is only marked dirty.
//!
//! 3. On the next [`Computed::get`], a dirty watcher re-evaluates; a clean
//!    one returns its cache.
//!
//! 4. If another subscriber is evaluating while the computed is read, that
//!    subscriber is made to depend on everything the computed depends on, so
//!    it re-runs when the computed's sources change.

use super::context::ReactiveContext;
use super::watcher::{Getter, Watcher, WatcherOptions};
use crate::error::Result;
use crate::value::Value;

/// Dirty state for a computed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputedState {
    /// The cached value is up-to-date.
    Clean,

    /// A dependency changed since the last evaluation.
    Dirty,
}

/// A lazily evaluated, cached derived value.
#[derive(Debug, Clone)]
pub struct Computed {
    watcher: Watcher,
}

impl Computed {
    /// Create a computed value over `target`. Nothing is evaluated yet.
    pub fn new(target: Value, getter: Getter) -> Self {
        Self::from_watcher(Watcher::build(
            target,
            getter,
            None,
            WatcherOptions::new().lazy(true),
            std::rc::Weak::new(),
        ))
    }

    pub(crate) fn from_watcher(watcher: Watcher) -> Self {
        debug_assert!(watcher.options().lazy, "computed values need a lazy watcher");
        Self { watcher }
    }

    /// Read the value, recomputing first if it is dirty.
    pub fn get(&self) -> Result<Value> {
        let value = self.watcher.evaluate_if_dirty()?;
        if ReactiveContext::is_active() {
            self.watcher.depend_on_all();
        }
        Ok(value)
    }

    /// The cached value, without recomputing or tracking.
    pub fn peek(&self) -> Value {
        self.watcher.value()
    }

    pub fn state(&self) -> ComputedState {
        if self.watcher.is_dirty() {
            ComputedState::Dirty
        } else {
            ComputedState::Clean
        }
    }

    pub fn watcher(&self) -> &Watcher {
        &self.watcher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::observe;
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    fn sum_of(counter: Rc<Cell<usize>>) -> Getter {
        Getter::function(move |target| {
            counter.set(counter.get() + 1);
            let object = target.as_object().unwrap();
            let a = object.get("a").as_f64().unwrap_or(0.0);
            let b = object.get("b").as_f64().unwrap_or(0.0);
            Ok(Value::from(a + b))
        })
    }

    #[test]
    fn computed_is_lazy() {
        let data = Value::from_json(&json!({ "a": 1, "b": 2 }));
        observe(&data, false);
        let runs = Rc::new(Cell::new(0));

        let sum = Computed::new(data, sum_of(runs.clone()));

        assert_eq!(runs.get(), 0);
        assert_eq!(sum.state(), ComputedState::Dirty);
        assert_eq!(sum.get().unwrap(), Value::from(3));
        assert_eq!(sum.state(), ComputedState::Clean);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn computed_caches_until_a_dependency_changes() {
        let data = Value::from_json(&json!({ "a": 1, "b": 2 }));
        observe(&data, false);
        let object = data.as_object().unwrap().clone();
        let runs = Rc::new(Cell::new(0));
        let sum = Computed::new(data, sum_of(runs.clone()));

        sum.get().unwrap();
        sum.get().unwrap();
        assert_eq!(runs.get(), 1);

        object.set("b", 10.into());
        assert_eq!(sum.state(), ComputedState::Dirty);
        assert_eq!(sum.peek(), Value::from(3));
        assert_eq!(sum.get().unwrap(), Value::from(11));
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn readers_depend_on_the_computed_sources() {
        let data = Value::from_json(&json!({ "a": 1, "b": 2 }));
        observe(&data, false);
        let object = data.as_object().unwrap().clone();
        let sum = Computed::new(data.clone(), sum_of(Rc::new(Cell::new(0))));

        let source = sum.clone();
        let reader = Watcher::new(
            data,
            Getter::function(move |_| source.get()),
            None,
            WatcherOptions::new(),
        )
        .unwrap();

        assert_eq!(reader.value(), Value::from(3));
        assert_eq!(reader.dep_count(), 2);
        assert_eq!(object.property_dep("a").unwrap().subscriber_count(), 2);
    }
}
