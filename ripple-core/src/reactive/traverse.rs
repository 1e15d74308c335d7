//! Deep dependency collection for `deep` watchers.

use std::cell::RefCell;
use std::collections::HashSet;

use crate::value::Value;

/// Identity of a visited container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Seen {
    Dep(u64),
    Addr(usize),
}

thread_local! {
    static SEEN: RefCell<HashSet<Seen>> = RefCell::new(HashSet::new());
}

/// Read every nested property of `value` so the current subscriber depends
/// on all of them.
///
/// Each container is visited once per call, which makes cyclic graphs safe.
/// Frozen containers are skipped.
pub fn traverse(value: &Value) {
    walk(value);
    SEEN.with(|seen| seen.borrow_mut().clear());
}

fn walk(value: &Value) {
    let frozen = match value {
        Value::Object(object) => object.is_frozen(),
        Value::Array(array) => array.is_frozen(),
        _ => return,
    };
    if frozen {
        return;
    }

    let key = match (value.observer(), value) {
        (Some(observer), _) => Seen::Dep(observer.dep().id().raw()),
        (None, Value::Object(object)) => Seen::Addr(object.addr()),
        (None, Value::Array(array)) => Seen::Addr(array.addr()),
        (None, _) => return,
    };
    if !SEEN.with(|seen| seen.borrow_mut().insert(key)) {
        return;
    }

    match value {
        Value::Array(array) => {
            for item in array.to_vec() {
                walk(&item);
            }
        }
        Value::Object(object) => {
            for name in object.keys() {
                walk(&object.get(&name));
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{observe, Dep, ReactiveContext, Subscriber, SubscriberId};
    use crate::value::Object;
    use serde_json::json;
    use std::rc::Rc;

    struct Collector {
        id: SubscriberId,
        deps: RefCell<Vec<Rc<Dep>>>,
    }

    impl Subscriber for Collector {
        fn id(&self) -> SubscriberId {
            self.id
        }
        fn add_dep(&self, dep: &Rc<Dep>) {
            self.deps.borrow_mut().push(dep.clone());
        }
        fn update(&self) {}
        fn run(&self) -> crate::error::Result<()> {
            Ok(())
        }
    }

    fn collect(value: &Value) -> usize {
        let collector = Rc::new(Collector {
            id: SubscriberId::new(),
            deps: RefCell::new(Vec::new()),
        });
        {
            let _ctx = ReactiveContext::enter(collector.clone());
            traverse(value);
        }
        let count = collector.deps.borrow().len();
        count
    }

    #[test]
    fn reads_every_nested_property() {
        let value = Value::from_json(&json!({ "a": { "b": 1 }, "c": 2 }));
        observe(&value, false);

        // a, a's container node, a.b, c
        assert_eq!(collect(&value), 4);
    }

    #[test]
    fn cycles_terminate() {
        let object = Object::new();
        object.set("me", Value::Object(object.clone()));
        let value = Value::Object(object);
        observe(&value, false);

        assert!(collect(&value) > 0);
    }

    #[test]
    fn frozen_containers_are_skipped() {
        let value = Value::from_json(&json!({ "a": 1 }));
        observe(&value, false);
        value.as_object().unwrap().freeze();

        assert_eq!(collect(&value), 0);
    }
}
