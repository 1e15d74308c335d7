//! Owner Context
//!
//! An `Owner` is the narrow slice of a component the reactive core needs: a
//! root data object, and the subscribers created on its behalf so they can
//! be torn down together.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::computed::Computed;
use super::context::untracked;
use super::observer::observe;
use super::watcher::{Callback, Getter, Watcher, WatcherOptions};
use super::SubscriberId;
use crate::error::{report, Result};
use crate::value::Value;

pub(crate) struct OwnerInner {
    name: String,
    data: Value,
    watchers: RefCell<Vec<Watcher>>,
    being_destroyed: Cell<bool>,
    destroyed: Cell<bool>,
}

impl OwnerInner {
    pub(crate) fn is_being_destroyed(&self) -> bool {
        self.being_destroyed.get()
    }

    /// Drop a torn-down watcher from the owned list.
    pub(crate) fn forget(&self, id: SubscriberId) {
        self.watchers.borrow_mut().retain(|watcher| watcher.id() != id);
    }
}

/// Root data plus the subscribers that live and die with it.
#[derive(Clone)]
pub struct Owner(Rc<OwnerInner>);

impl Owner {
    /// Create an owner. `data` is observed as root data: adding or removing
    /// its keys at runtime is refused.
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        observe(&data, true);
        Self(Rc::new(OwnerInner {
            name: name.into(),
            data,
            watchers: RefCell::new(Vec::new()),
            being_destroyed: Cell::new(false),
            destroyed: Cell::new(false),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn data(&self) -> &Value {
        &self.0.data
    }

    /// Watch an expression or function over the owner's data.
    ///
    /// The watcher is user-originated: errors in the getter or callback are
    /// reported instead of returned. With `immediate` the callback also
    /// runs once right away with `Undefined` as the old value.
    pub fn watch<F>(&self, getter: impl Into<Getter>, callback: F, options: WatcherOptions) -> Result<Watcher>
    where
        F: Fn(&Value, &Value) -> Result<()> + 'static,
    {
        let immediate = options.immediate;
        let watcher = create_subscriber(self, getter.into(), Some(Rc::new(callback)), options.user(true))?;

        if immediate {
            if let Some(callback) = watcher.callback() {
                let value = watcher.value();
                if let Err(err) = untracked(|| callback(&value, &Value::Undefined)) {
                    report(&err, &format!("callback for immediate watcher \"{}\"", watcher.label()));
                }
            }
        }
        Ok(watcher)
    }

    /// Define a computed value over the owner's data.
    pub fn computed(&self, getter: Getter) -> Computed {
        let watcher = Watcher::build(
            self.0.data.clone(),
            getter,
            None,
            WatcherOptions::new().lazy(true),
            Rc::downgrade(&self.0),
        );
        self.0.watchers.borrow_mut().push(watcher.clone());
        Computed::from_watcher(watcher)
    }

    /// Number of live subscribers owned.
    pub fn watcher_count(&self) -> usize {
        self.0.watchers.borrow().len()
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.get()
    }

    /// Tear down every owned subscriber and release the root data.
    /// Idempotent.
    pub fn destroy(&self) {
        if self.0.being_destroyed.get() {
            return;
        }
        self.0.being_destroyed.set(true);

        let watchers = std::mem::take(&mut *self.0.watchers.borrow_mut());
        for watcher in watchers.iter().rev() {
            watcher.teardown();
        }
        if let Some(observer) = self.0.data.observer() {
            observer.release_root();
        }

        self.0.destroyed.set(true);
        tracing::debug!(target: "ripple::owner", name = %self.0.name, torn_down = watchers.len(), "owner destroyed");
    }
}

impl std::fmt::Debug for Owner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Owner")
            .field("name", &self.0.name)
            .field("watchers", &self.watcher_count())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// Create a watcher over `owner`'s data and register it with the owner.
pub fn create_subscriber(
    owner: &Owner,
    getter: Getter,
    callback: Option<Callback>,
    options: WatcherOptions,
) -> Result<Watcher> {
    let watcher = Watcher::with_owner(owner.0.data.clone(), getter, callback, options, Rc::downgrade(&owner.0))?;
    owner.0.watchers.borrow_mut().push(watcher.clone());
    Ok(watcher)
}
