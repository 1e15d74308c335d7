//! Shared keyed containers.

use std::cell::{Cell, OnceCell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::Value;
use crate::reactive::{Dep, Observer, ReactiveProperty};

/// Storage behind one key.
pub(crate) enum Slot {
    /// A plain data property. Reads and writes are not tracked.
    Data { value: Value, configurable: bool },
    /// A tracked cell installed by the observer.
    Reactive(Rc<ReactiveProperty>),
}

impl Slot {
    fn is_configurable(&self) -> bool {
        match self {
            Slot::Data { configurable, .. } => *configurable,
            Slot::Reactive(_) => true,
        }
    }
}

/// What the installer needs to know about an existing key.
pub(crate) enum SlotInfo {
    Data { value: Value, configurable: bool },
    Reactive,
}

/// A shared, insertion-ordered map from string keys to values.
///
/// Cloning an `Object` clones the handle, not the contents.
#[derive(Clone)]
pub struct Object(Rc<ObjectInner>);

struct ObjectInner {
    props: RefCell<IndexMap<String, Slot>>,
    observer: OnceCell<Rc<Observer>>,
    extensible: Cell<bool>,
    frozen: Cell<bool>,
    framework_owned: Cell<bool>,
}

impl Object {
    pub fn new() -> Self {
        Self(Rc::new(ObjectInner {
            props: RefCell::new(IndexMap::new()),
            observer: OnceCell::new(),
            extensible: Cell::new(true),
            frozen: Cell::new(false),
            framework_owned: Cell::new(false),
        }))
    }

    pub fn from_pairs<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let object = Self::new();
        {
            let mut props = object.0.props.borrow_mut();
            for (key, value) in pairs {
                props.insert(
                    key.into(),
                    Slot::Data {
                        value,
                        configurable: true,
                    },
                );
            }
        }
        object
    }

    /// Read a property. Reactive properties register the read with the
    /// currently evaluating subscriber. Missing keys read as `Undefined`.
    pub fn get(&self, key: &str) -> Value {
        let prop = {
            let props = self.0.props.borrow();
            match props.get(key) {
                None => return Value::Undefined,
                Some(Slot::Data { value, .. }) => return value.clone(),
                Some(Slot::Reactive(prop)) => prop.clone(),
            }
        };
        prop.get()
    }

    /// Plain assignment.
    ///
    /// Writes through the tracked cell when the key is reactive. A missing
    /// key is added as a plain, untracked property; use
    /// [`crate::reactive::set`] to add a key reactively.
    pub fn set(&self, key: &str, value: Value) {
        if self.is_frozen() {
            return;
        }

        let prop = {
            let mut props = self.0.props.borrow_mut();
            match props.get_mut(key) {
                Some(Slot::Reactive(prop)) => Some(prop.clone()),
                Some(Slot::Data { value: slot, .. }) => {
                    *slot = value;
                    return;
                }
                None => None,
            }
        };

        match prop {
            Some(prop) => prop.set(value),
            None if self.is_extensible() => {
                self.0.props.borrow_mut().insert(
                    key.to_owned(),
                    Slot::Data {
                        value,
                        configurable: true,
                    },
                );
            }
            None => {}
        }
    }

    /// Define a plain data property. A non-configurable property can be
    /// neither redefined, deleted, nor made reactive.
    pub fn define_property(&self, key: &str, value: Value, configurable: bool) {
        let mut props = self.0.props.borrow_mut();
        let allowed = match props.get(key) {
            Some(slot) => slot.is_configurable(),
            None => self.is_extensible(),
        };
        if allowed {
            props.insert(key.to_owned(), Slot::Data { value, configurable });
        }
    }

    /// Raw delete. Returns the removed value, or `None` when the key is
    /// missing or cannot be deleted. Does not notify.
    pub fn remove(&self, key: &str) -> Option<Value> {
        if self.is_frozen() {
            return None;
        }

        let mut props = self.0.props.borrow_mut();
        if !props.get(key)?.is_configurable() {
            return None;
        }
        match props.shift_remove(key)? {
            Slot::Data { value, .. } => Some(value),
            Slot::Reactive(prop) => Some(prop.peek()),
        }
    }

    pub fn has_own(&self, key: &str) -> bool {
        self.0.props.borrow().contains_key(key)
    }

    /// Own keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.0.props.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.props.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make every property read-only and refuse new keys.
    pub fn freeze(&self) {
        self.0.frozen.set(true);
        self.0.extensible.set(false);
        for slot in self.0.props.borrow_mut().values_mut() {
            if let Slot::Data { configurable, .. } = slot {
                *configurable = false;
            }
        }
    }

    /// Refuse new keys.
    pub fn prevent_extensions(&self) {
        self.0.extensible.set(false);
    }

    pub fn is_frozen(&self) -> bool {
        self.0.frozen.get()
    }

    pub fn is_extensible(&self) -> bool {
        self.0.extensible.get()
    }

    /// Flag the object as owned by the framework itself. Such objects are
    /// never observed and refuse `set`/`del`.
    pub fn mark_framework_owned(&self) {
        self.0.framework_owned.set(true);
    }

    pub fn is_framework_owned(&self) -> bool {
        self.0.framework_owned.get()
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// The dependency node backing a reactive property.
    pub fn property_dep(&self, key: &str) -> Option<Rc<Dep>> {
        match self.0.props.borrow().get(key)? {
            Slot::Reactive(prop) => Some(prop.dep().clone()),
            Slot::Data { .. } => None,
        }
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    pub fn observer(&self) -> Option<Rc<Observer>> {
        self.0.observer.get().cloned()
    }

    /// Attach the observer marker. The first marker wins.
    pub(crate) fn attach_observer(&self, observer: Rc<Observer>) -> Rc<Observer> {
        self.0.observer.get_or_init(|| observer).clone()
    }

    pub(crate) fn slot_info(&self, key: &str) -> Option<SlotInfo> {
        Some(match self.0.props.borrow().get(key)? {
            Slot::Data {
                value,
                configurable,
            } => SlotInfo::Data {
                value: value.clone(),
                configurable: *configurable,
            },
            Slot::Reactive(_) => SlotInfo::Reactive,
        })
    }

    /// Install a tracked cell under `key`, keeping the key's position.
    pub(crate) fn install(&self, key: &str, prop: Rc<ReactiveProperty>) {
        self.0
            .props
            .borrow_mut()
            .insert(key.to_owned(), Slot::Reactive(prop));
    }

    /// Snapshot of all entries without registering dependencies.
    pub(crate) fn entries_untracked(&self) -> Vec<(String, Value)> {
        self.0
            .props
            .borrow()
            .iter()
            .map(|(key, slot)| {
                let value = match slot {
                    Slot::Data { value, .. } => value.clone(),
                    Slot::Reactive(prop) => prop.peek(),
                };
                (key.clone(), value)
            })
            .collect()
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("keys", &self.keys())
            .field("observed", &self.0.observer.get().is_some())
            .finish()
    }
}
