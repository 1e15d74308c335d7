//! Property-based tests for the write/notify/flush contracts.

use std::cell::RefCell;
use std::rc::Rc;

use proptest::prelude::*;
use ripple_core::reactive::{observe, Owner, WatcherOptions};
use ripple_core::schedule::run_until_idle;
use ripple_core::{Object, Value};
use serde_json::json;

type Calls = Rc<RefCell<Vec<(Value, Value)>>>;

fn counter_owner() -> (Owner, Object, Calls, Calls) {
    let owner = Owner::new("counter", Value::from_json(&json!({ "x": 0 })));
    let data = owner.data().as_object().unwrap().clone();

    let batched = Calls::default();
    let sink = batched.clone();
    owner
        .watch(
            "x",
            move |new: &Value, old: &Value| {
                sink.borrow_mut().push((new.clone(), old.clone()));
                Ok(())
            },
            WatcherOptions::new(),
        )
        .unwrap();

    let immediate = Calls::default();
    let sink = immediate.clone();
    owner
        .watch(
            "x",
            move |new: &Value, old: &Value| {
                sink.borrow_mut().push((new.clone(), old.clone()));
                Ok(())
            },
            WatcherOptions::new().sync(true),
        )
        .unwrap();

    (owner, data, batched, immediate)
}

fn write_value() -> impl Strategy<Value = f64> {
    prop_oneof![
        (-1000i32..1000).prop_map(f64::from),
        Just(f64::NAN),
        Just(0.5),
    ]
}

proptest! {
    /// Property: a read after any sequence of writes returns the last write.
    #[test]
    fn reads_return_the_last_write(writes in prop::collection::vec(write_value(), 1..20)) {
        let data = Value::from_json(&json!({ "x": 0 }));
        observe(&data, false);
        let object = data.as_object().unwrap();

        for write in &writes {
            object.set("x", (*write).into());
            prop_assert_eq!(object.get("x"), Value::from(*write));
        }
    }

    /// Property: batched watchers see one callback per tick carrying the
    /// last value and the value from before the first write.
    #[test]
    fn writes_within_a_tick_coalesce(writes in prop::collection::vec(-50i32..50, 1..20)) {
        let (_owner, data, batched, _) = counter_owner();

        for write in &writes {
            data.set("x", (*write).into());
        }
        run_until_idle();

        let last = *writes.last().unwrap();
        if last == 0 {
            prop_assert!(batched.borrow().is_empty());
        } else {
            let batched = batched.borrow();
            prop_assert_eq!(batched.as_slice(), [(Value::from(last), Value::from(0))]);
        }
    }

    /// Property: sync watchers see one callback per effective write.
    #[test]
    fn sync_watchers_see_every_change(writes in prop::collection::vec(-50i32..50, 1..20)) {
        let (_owner, data, _, immediate) = counter_owner();

        let mut previous = 0;
        let mut expected = Vec::new();
        for write in writes {
            data.set("x", write.into());
            if write != previous {
                expected.push((Value::from(write), Value::from(previous)));
                previous = write;
            }
        }
        run_until_idle();

        let immediate = immediate.borrow();
        prop_assert_eq!(immediate.as_slice(), expected.as_slice());
    }

    /// Property: writing the value a property already holds never notifies.
    #[test]
    fn same_value_writes_are_silent(value in write_value(), repeats in 1usize..5) {
        let (_owner, data, batched, immediate) = counter_owner();
        data.set("x", value.into());
        run_until_idle();
        batched.borrow_mut().clear();
        immediate.borrow_mut().clear();

        for _ in 0..repeats {
            data.set("x", value.into());
        }
        run_until_idle();

        prop_assert!(batched.borrow().is_empty());
        prop_assert!(immediate.borrow().is_empty());
    }
}
