//! Reactive Property Installer
//!
//! [`observe`] converts an object's keys into tracked cells, each backed by
//! its own [`Dep`], and attaches an [`Observer`] marker carrying the
//! container-level node. Nested containers are observed recursively; arrays
//! are observed element-wise and rely on their mutators for notification.
//!
//! # Reads
//!
//! Reading a tracked cell while a subscriber evaluates registers the cell's
//! node. If the value is itself an observed container, its container node is
//! registered too, and for arrays every element's container node, all the
//! way down through nested arrays (elements cannot be intercepted per
//! index). Containers nested in plain objects are not walked this way; they
//! register only when their own keys are read.
//!
//! # Writes
//!
//! Writes compare by identity ([`Value::same_value`]) and return early when
//! nothing changed. Otherwise the new value is observed (unless the cell is
//! shallow) and the node notifies.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::Dep;
use crate::config;
use crate::error::{warn, ReactiveError};
use crate::value::{Array, Object, Value};

/// Marker attached to every observed container.
pub struct Observer {
    dep: Rc<Dep>,
    root_count: Cell<usize>,
}

/// Handle returned by [`observe`].
pub type ObserverHandle = Rc<Observer>;

impl Observer {
    fn new() -> Rc<Self> {
        Rc::new(Self {
            dep: Dep::new(),
            root_count: Cell::new(0),
        })
    }

    /// The container-level dependency node.
    pub fn dep(&self) -> &Rc<Dep> {
        &self.dep
    }

    /// How many owners use this container as their root data.
    pub fn root_count(&self) -> usize {
        self.root_count.get()
    }

    pub(crate) fn release_root(&self) {
        self.root_count.set(self.root_count.get().saturating_sub(1));
    }
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer")
            .field("dep", &self.dep.id())
            .field("root_count", &self.root_count())
            .finish()
    }
}

/// A tracked cell: the value behind one reactive key.
pub struct ReactiveProperty {
    dep: Rc<Dep>,
    value: RefCell<Value>,
    child: RefCell<Option<Rc<Observer>>>,
    shallow: bool,
    on_readonly_write: Option<Rc<dyn Fn()>>,
}

impl ReactiveProperty {
    pub(crate) fn dep(&self) -> &Rc<Dep> {
        &self.dep
    }

    /// Read without registering anything.
    pub(crate) fn peek(&self) -> Value {
        self.value.borrow().clone()
    }

    pub(crate) fn get(&self) -> Value {
        let value = self.peek();
        if super::ReactiveContext::is_active() {
            self.dep.depend();
            let child = self.child.borrow().clone();
            if let Some(child) = child {
                child.dep().depend();
                if let Value::Array(array) = &value {
                    depend_array(array);
                }
            }
        }
        value
    }

    pub(crate) fn set(&self, new_value: Value) {
        if new_value.same_value(&self.value.borrow()) {
            return;
        }
        if config::strict() {
            if let Some(hook) = &self.on_readonly_write {
                hook();
            }
        }

        let child = if self.shallow {
            None
        } else {
            observe(&new_value, false)
        };
        *self.value.borrow_mut() = new_value;
        *self.child.borrow_mut() = child;
        self.dep.notify();
    }
}

thread_local! {
    static SHOULD_OBSERVE: Cell<bool> = const { Cell::new(true) };
}

/// Enable or disable creation of new observers on this thread.
///
/// Existing observers keep working; only unobserved containers are affected.
pub fn toggle_observing(enabled: bool) {
    SHOULD_OBSERVE.with(|flag| flag.set(enabled));
}

pub fn should_observe() -> bool {
    SHOULD_OBSERVE.with(Cell::get)
}

/// Install reactivity on an object or array.
///
/// Returns the container's observer (the existing one when already observed)
/// or `None` for primitives and containers that cannot be observed. When
/// `as_root` is set the observer's root count is incremented.
pub fn observe(value: &Value, as_root: bool) -> Option<ObserverHandle> {
    let observer = match value {
        Value::Object(object) => observe_object(object),
        Value::Array(array) => observe_array(array),
        _ => return None,
    }?;

    if as_root {
        observer.root_count.set(observer.root_count.get() + 1);
    }
    Some(observer)
}

fn observe_object(object: &Object) -> Option<Rc<Observer>> {
    if let Some(existing) = object.observer() {
        return Some(existing);
    }
    if !should_observe() {
        return None;
    }
    if object.is_framework_owned() {
        warn(&ReactiveError::FrameworkOwned);
        return None;
    }
    if !object.is_extensible() {
        tracing::debug!(target: "ripple::observer", "skipping non-extensible object");
        return None;
    }

    // Attach first so cycles back to this object find the marker.
    let observer = object.attach_observer(Observer::new());
    for key in object.keys() {
        define_reactive(object, &key, None, None, false);
    }
    Some(observer)
}

fn observe_array(array: &Array) -> Option<Rc<Observer>> {
    if let Some(existing) = array.observer() {
        return Some(existing);
    }
    if !should_observe() {
        return None;
    }
    if !array.is_extensible() {
        tracing::debug!(target: "ripple::observer", "skipping non-extensible array");
        return None;
    }

    let observer = array.attach_observer(Observer::new());
    for item in array.to_vec() {
        observe(&item, false);
    }
    Some(observer)
}

/// Make a single key of `object` reactive.
///
/// `value` overrides the key's current value. `on_readonly_write` runs (in
/// strict mode) before every effective write, which lets the framework flag
/// writes to fields it considers read-only. Shallow cells do not observe the
/// values stored in them.
///
/// Keys that are already reactive, and non-configurable keys, are left
/// untouched.
pub fn define_reactive(
    object: &Object,
    key: &str,
    value: Option<Value>,
    on_readonly_write: Option<Rc<dyn Fn()>>,
    shallow: bool,
) {
    use crate::value::SlotInfo;

    let initial = match object.slot_info(key) {
        Some(SlotInfo::Reactive) => return,
        Some(SlotInfo::Data {
            configurable: false,
            ..
        }) => return,
        Some(SlotInfo::Data { value: current, .. }) => value.unwrap_or(current),
        None if !object.is_extensible() => {
            warn(&ReactiveError::NotExtensible(key.to_owned()));
            return;
        }
        None => value.unwrap_or_default(),
    };

    let child = if shallow {
        None
    } else {
        observe(&initial, false)
    };
    let prop = Rc::new(ReactiveProperty {
        dep: Dep::new(),
        value: RefCell::new(initial),
        child: RefCell::new(child),
        shallow,
        on_readonly_write,
    });
    object.install(key, prop);
}

/// Register the container node of every observed element, descending into
/// nested arrays.
pub(crate) fn depend_array(array: &Array) {
    for item in array.to_vec() {
        if let Some(observer) = item.observer() {
            observer.dep().depend();
        }
        if let Value::Array(nested) = &item {
            depend_array(nested);
        }
    }
}

/// A property name or array index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Index(usize),
    Name(String),
}

impl Key {
    fn as_index(&self) -> Option<usize> {
        match self {
            Key::Index(index) => Some(*index),
            Key::Name(name) => name.parse().ok().filter(|_| !name.starts_with('+')),
        }
    }

    fn name(&self) -> String {
        match self {
            Key::Index(index) => index.to_string(),
            Key::Name(name) => name.clone(),
        }
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Name(name.to_owned())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Name(name)
    }
}

/// Set a property, adding it reactively (and notifying the container) when
/// it is new. Returns the value.
///
/// Refuses, with a diagnostic, primitive targets, non-extensible objects,
/// framework-owned objects, and root data.
pub fn set(target: &Value, key: impl Into<Key>, value: Value) -> Value {
    let key = key.into();
    match target {
        Value::Array(array) => {
            match key.as_index() {
                Some(index) => {
                    array.set_len(array.len().max(index));
                    array.splice(index, 1, [value.clone()]);
                }
                None => warn(&ReactiveError::PrimitiveTarget {
                    action: "set named",
                    value: format!("array key {}", key.name()),
                }),
            }
            value
        }
        Value::Object(object) => {
            let name = key.name();
            if object.has_own(&name) {
                object.set(&name, value.clone());
                return value;
            }

            let observer = object.observer();
            if object.is_framework_owned() || observer.as_ref().is_some_and(|ob| ob.root_count() > 0) {
                warn(&ReactiveError::RootData { action: "adding" });
                return value;
            }
            if !object.is_extensible() {
                warn(&ReactiveError::NotExtensible(name));
                return value;
            }
            let Some(observer) = observer else {
                object.set(&name, value.clone());
                return value;
            };

            define_reactive(object, &name, Some(value.clone()), None, false);
            observer.dep().notify();
            value
        }
        primitive => {
            warn(&ReactiveError::PrimitiveTarget {
                action: "set",
                value: primitive.to_string(),
            });
            value
        }
    }
}

/// Delete a property and notify the container when it was observed.
pub fn del(target: &Value, key: impl Into<Key>) {
    let key = key.into();
    match target {
        Value::Array(array) => {
            if let Some(index) = key.as_index() {
                array.splice(index, 1, []);
            }
        }
        Value::Object(object) => {
            let observer = object.observer();
            if object.is_framework_owned() || observer.as_ref().is_some_and(|ob| ob.root_count() > 0) {
                warn(&ReactiveError::RootData { action: "deleting" });
                return;
            }
            let name = key.name();
            if !object.has_own(&name) {
                return;
            }
            if object.remove(&name).is_none() {
                return;
            }
            if let Some(observer) = observer {
                observer.dep().notify();
            }
        }
        primitive => warn(&ReactiveError::PrimitiveTarget {
            action: "delete",
            value: primitive.to_string(),
        }),
    }
}
